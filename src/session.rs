use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec::{CodecError, FrameCodec};
use crate::commands::executable::{Context, Executable, Shutdown};
use crate::commands::Command;
use crate::connection::Connection;
use crate::frame::Frame;

/// Serves a single client connection, one command at a time, replies in request order.
///
/// A session ends when the peer goes away, the stream breaks, or the server shuts down while the
/// session waits on a `GET`. The connection is closed when the session is dropped.
pub struct Session<S> {
    id: Uuid,
    connection: Connection<S>,
    ctx: Context,
}

/// What to do after a frame was handled.
enum Outcome {
    /// Send the reply and read the next command.
    Reply(Frame),
    /// Send the reply, flush and end the session.
    Close(Frame),
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, codec: FrameCodec, ctx: Context) -> Session<S> {
        Session {
            id: Uuid::new_v4(),
            connection: Connection::new(stream, codec),
            ctx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn run(mut self) {
        loop {
            let outcome = match self.connection.read_frame().await {
                Ok(Some(frame)) => match self.dispatch(frame).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(%err, "Failed to flush replies");
                        break;
                    }
                },
                Ok(None) => {
                    debug!("Connection closed by peer");
                    break;
                }
                Err(err) => match err.to_reply() {
                    Some(reply) if err.is_fatal() => {
                        warn!(%err, "Closing connection");
                        Outcome::Close(reply)
                    }
                    Some(reply) => {
                        debug!(%err, "Malformed frame");
                        Outcome::Reply(reply)
                    }
                    None => {
                        warn!(%err, "Connection closed");
                        break;
                    }
                },
            };

            let (reply, closing) = match outcome {
                Outcome::Reply(reply) => (reply, false),
                Outcome::Close(reply) => (reply, true),
            };

            if let Err(err) = self.respond(reply, closing).await {
                warn!(%err, "Failed to write reply");
                break;
            }

            if closing {
                break;
            }
        }

        // Replies of a batch cut short by a broken read are still owed to the peer.
        if self.connection.has_pending_output() {
            if let Err(err) = self.connection.flush().await {
                debug!(%err, "Failed to flush pending replies");
            }
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<Outcome, CodecError> {
        debug!(%frame, "Received frame from client");

        let command = match Command::try_from(frame) {
            Ok(command) => command,
            Err(err) => {
                debug!(%err, "Rejected command");
                return Ok(Outcome::Reply(err.to_reply()));
            }
        };

        // Earlier replies of the batch must not wait for a command that may never complete.
        if command.is_blocking() && self.connection.has_pending_output() {
            self.connection.flush().await?;
        }

        let outcome = match AssertUnwindSafe(command.exec(&self.ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(reply)) => Outcome::Reply(reply),
            Ok(Err(Shutdown)) => {
                info!("Server is shutting down, interrupted a waiting command");
                Outcome::Close(Shutdown.to_reply())
            }
            Err(_) => {
                error!("Command panicked");
                Outcome::Reply(Frame::Error("ERR internal error".to_string()))
            }
        };

        Ok(outcome)
    }

    async fn respond(&mut self, reply: Frame, closing: bool) -> Result<(), CodecError> {
        debug!(%reply, "Sending response to client");
        self.connection.write_frame(reply).await?;

        // Pipelined commands get their replies flushed together, once the batch is consumed.
        if closing || self.connection.is_batch_drained() {
            self.connection.flush().await?;
        }

        Ok(())
    }
}
