use crate::commands::executable::{Context, Executable, Shutdown};
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::source::ConsumerId;

/// Acknowledges the given ids. Messages are already gone once `GET` delivered them, so nothing is
/// removed from the source. The command only exists for client compatibility.
#[derive(Debug, PartialEq)]
pub struct Del {
    pub ids: Vec<ConsumerId>,
}

impl Executable for Del {
    async fn exec(self, _ctx: &Context) -> Result<Frame, Shutdown> {
        Ok(Frame::Bulk("OK".into()))
    }
}

impl TryFrom<&mut CommandParser> for Del {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut ids = vec![ConsumerId::new(parser.next_bytes()?)];

        while parser.has_remaining() {
            ids.push(ConsumerId::new(parser.next_bytes()?));
        }

        Ok(Self { ids })
    }
}
