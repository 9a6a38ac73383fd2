use crate::commands::executable::{Context, Executable, Shutdown};
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;

/// Returns PONG. Arguments are accepted and ignored.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
#[derive(Debug, PartialEq)]
pub struct Ping;

impl Executable for Ping {
    async fn exec(self, _ctx: &Context) -> Result<Frame, Shutdown> {
        Ok(Frame::Simple("PONG".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Ping {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.skip_remaining();
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::source::Hub;
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn context() -> Context {
        Context {
            source: Arc::new(Hub::new()),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn without_arguments() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("PING"))]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(cmd, Command::Ping(Ping));
        assert_eq!(
            cmd.exec(&context()).await,
            Ok(Frame::Simple("PONG".to_string()))
        );
    }

    #[tokio::test]
    async fn extra_arguments_are_ignored() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("ping")),
            Frame::Bulk(Bytes::from("hello")),
            Frame::Integer(3),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd.exec(&context()).await,
            Ok(Frame::Simple("PONG".to_string()))
        );
    }
}
