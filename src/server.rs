use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument};

use crate::codec::FrameCodec;
use crate::commands::executable::Context;
use crate::session::Session;
use crate::source::MessageSource;
use crate::Error;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts clients and runs one session per connection until `shutdown` is cancelled.
///
/// Shutdown happens in two steps. The listener is closed first so no new client gets in, then
/// `serve` waits until every session still running has ended.
pub struct Server {
    listener: TcpListener,
    source: Arc<dyn MessageSource>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    codec: FrameCodec,
}

impl Server {
    /// Binds the listening socket. This is the only fallible step of running a server.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        source: Arc<dyn MessageSource>,
        shutdown: CancellationToken,
    ) -> Result<Server, Error> {
        let listener = TcpListener::bind(addr).await?;

        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            source,
            shutdown,
            sessions: TaskTracker::new(),
            codec: FrameCodec::default(),
        })
    }

    pub fn with_codec(mut self, codec: FrameCodec) -> Server {
        self.codec = codec;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle on the running sessions. It outlives `serve`, `len()` is the number of connections in
    /// flight.
    pub fn sessions(&self) -> TaskTracker {
        self.sessions.clone()
    }

    pub async fn serve(self) {
        let Server {
            listener,
            source,
            shutdown,
            sessions,
            codec,
        } = self;

        loop {
            let (socket, client_address) = tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                res = listener.accept() => match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Usually out of file descriptors, give sessions a moment to release some.
                        error!("Error on accept: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            info!("Accepted connection from {:?}", client_address);

            if let Err(e) = socket.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY: {}", e);
            }

            let ctx = Context {
                source: source.clone(),
                shutdown: shutdown.clone(),
            };
            let session = Session::new(socket, codec.clone(), ctx);

            sessions.spawn(handle_connection(session, client_address));
        }

        // Closes the socket, clients still connecting are refused from here on.
        drop(listener);
        info!("Shutting down, no longer accepting connections");

        sessions.close();
        info!(in_flight = sessions.len(), "Waiting for in-flight connections...");
        sessions.wait().await;
        info!("All connections handled, bye!");
    }
}

/// Binds `addr` and serves clients until `shutdown` is cancelled and every session has ended.
/// Only a bind failure is reported as an error.
pub async fn listen_and_serve(
    addr: impl ToSocketAddrs,
    source: Arc<dyn MessageSource>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    Server::bind(addr, source, shutdown).await?.serve().await;
    Ok(())
}

#[instrument(
    name = "connection",
    skip_all,
    fields(connection_id = %session.id(), client_address = %client_address)
)]
async fn handle_connection(session: Session<TcpStream>, client_address: SocketAddr) {
    session.run().await;
    info!("Connection closed");
}
