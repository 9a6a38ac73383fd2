use std::future::Future;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;

use crate::frame::Frame;
use crate::source::MessageSource;

/// What a command may touch while it runs.
#[derive(Clone)]
pub struct Context {
    pub source: Arc<dyn MessageSource>,
    pub shutdown: CancellationToken,
}

/// The server started shutting down while a command was waiting. The session answers with a
/// `SHUTDOWN` error and ends.
#[derive(Debug, ThisError, PartialEq)]
#[error("SHUTDOWN")]
pub struct Shutdown;

impl Shutdown {
    pub fn to_reply(&self) -> Frame {
        Frame::Error(self.to_string())
    }
}

pub trait Executable {
    fn exec(self, ctx: &Context) -> impl Future<Output = Result<Frame, Shutdown>> + Send;
}
