use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};

use streamdis::codec::{CodecError, FrameCodec};
use streamdis::connection::Connection;
use streamdis::frame::Frame;

async fn create_tcp_connection() -> Result<(UnboundedSender<Vec<u8>>, TcpStream), std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            while let Some(data) = rx.recv().await {
                // Write the received channel data to the socket.
                if socket.write_all(&data).await.is_err() {
                    break;
                }
            }
        }
    });

    // Connect to the server as a client to complete the setup.
    let stream = TcpStream::connect(local_addr).await?;

    Ok((tx, stream))
}

fn bulk(s: &'static str) -> Frame {
    Frame::Bulk(Bytes::from(s))
}

#[tokio::test]
async fn test_parse_array() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream, FrameCodec::default());

    tcp_stream_tx
        .send(b"*2\r\n$3\r\nGET\r\n$5\r\nmykey\r\n".to_vec())
        .unwrap();

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![bulk("GET"), bulk("mykey")]));

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_inline_command() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream, FrameCodec::default());

    tcp_stream_tx.send(b"GET mykey\r\n".to_vec()).unwrap();

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![bulk("GET"), bulk("mykey")]));

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_multiple_commands_sequentially() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream, FrameCodec::default());

    let ping = b"*1\r\n$4\r\nPING\r\n";
    let get = b"*2\r\n$3\r\nGET\r\n$7\r\nmykey_1\r\n";
    let del = b"*3\r\n$3\r\nDEL\r\n$7\r\nmykey_1\r\n$7\r\nmykey_2\r\n";

    tcp_stream_tx.send(ping.to_vec()).unwrap();
    tcp_stream_tx.send(get.to_vec()).unwrap();
    tcp_stream_tx.send(del.to_vec()).unwrap();

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(Frame::Array(vec![bulk("PING")])));

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(Frame::Array(vec![bulk("GET"), bulk("mykey_1")])));

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(
        actual,
        Some(Frame::Array(vec![
            bulk("DEL"),
            bulk("mykey_1"),
            bulk("mykey_2")
        ]))
    );
}

#[tokio::test]
async fn test_parse_incomplete_frame() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream, FrameCodec::default());

    // Command split into three parts to simulate partial/incomplete data sending.
    // "*2\r\n$3\r\nGET\r\n$5\r\nmykey\r\n";
    let part1 = b"*2\r\n$3\r\nGE";
    let part2 = b"T\r\n$5\r\nmyke";
    let part3 = b"y\r\n";

    tokio::spawn(async move {
        let parts = vec![part1.to_vec(), part2.to_vec(), part3.to_vec()];
        for part in parts {
            tcp_stream_tx.send(part).unwrap();
            // Simulate a delay in sending/receiving the data.
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    });

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![bulk("GET"), bulk("mykey")]));
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_malformed_frame_then_valid_frame() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream, FrameCodec::default());

    tcp_stream_tx.send(b"$3\r\nfoobar\r\n".to_vec()).unwrap();

    let err = connection.read_frame().await.unwrap_err();
    assert!(matches!(err, CodecError::Protocol(_)));
    assert!(connection.is_batch_drained());

    tcp_stream_tx.send(b"*1\r\n$4\r\nPING\r\n".to_vec()).unwrap();

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(Frame::Array(vec![bulk("PING")])));
}

#[tokio::test]
async fn test_write_and_flush() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut client = TcpStream::connect(listener.local_addr().unwrap())
        .await
        .unwrap();
    let (socket, _) = listener.accept().await.unwrap();
    let mut connection = Connection::new(socket, FrameCodec::default());

    connection
        .write_frame(Frame::Simple("PONG".to_string()))
        .await
        .unwrap();
    connection.write_frame(bulk("payload")).await.unwrap();
    connection.flush().await.unwrap();

    let mut buf = [0u8; 20];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"+PONG\r\n$7\r\npayload\r\n");
}
