use futures::StreamExt;
use tracing::debug;

use crate::commands::executable::{Context, Executable, Shutdown};
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::source::ConsumerId;

/// Waits for the next message of consumer `id` and returns it as a bulk string. Only this session
/// is suspended while waiting. Shutting the server down interrupts the wait.
#[derive(Debug, PartialEq)]
pub struct Get {
    pub id: ConsumerId,
}

impl Executable for Get {
    async fn exec(self, ctx: &Context) -> Result<Frame, Shutdown> {
        debug!(consumer = %self.id, "Waiting for the next message");
        let mut messages = ctx.source.lookup(&self.id);

        tokio::select! {
            biased;

            _ = ctx.shutdown.cancelled() => Err(Shutdown),
            payload = messages.next() => match payload {
                Some(payload) => Ok(Frame::Bulk(payload)),
                None => Ok(Frame::Error("ERR consumer closed".to_string())),
            },
        }
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let id = ConsumerId::new(parser.next_bytes()?);
        parser.finish()?;
        Ok(Self { id })
    }
}
