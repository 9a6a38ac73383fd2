pub mod del;
pub mod executable;
pub mod get;
pub mod ping;

use bytes::Bytes;
use std::vec;
use thiserror::Error as ThisError;

use crate::commands::executable::{Context, Executable, Shutdown};
use crate::frame::Frame;

use del::Del;
use get::Get;
use ping::Ping;

#[derive(Debug, PartialEq)]
pub enum Command {
    Del(Del),
    Get(Get),
    Ping(Ping),
}

impl Command {
    /// Whether executing the command may suspend until an external event happens.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Command::Get(_))
    }
}

impl Executable for Command {
    async fn exec(self, ctx: &Context) -> Result<Frame, Shutdown> {
        match self {
            Command::Del(cmd) => cmd.exec(ctx).await,
            Command::Get(cmd) => cmd.exec(ctx).await,
            Command::Ping(cmd) => cmd.exec(ctx).await,
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                })
            }
        };

        let mut parts = frames.into_iter();
        let command_name = parse_command_name(&mut parts)?;

        let parser = &mut CommandParser {
            command: command_name.clone(),
            parts,
        };

        match &command_name[..] {
            "del" => Del::try_from(parser).map(Command::Del),
            "get" => Get::try_from(parser).map(Command::Get),
            "ping" => Ping::try_from(parser).map(Command::Ping),
            _ => Err(CommandParserError::UnknownCommand {
                command: parser.command.clone(),
            }),
        }
    }
}

fn parse_command_name(parts: &mut vec::IntoIter<Frame>) -> Result<String, CommandParserError> {
    // Verbs are matched case-insensitively.
    match parts.next() {
        Some(Frame::Simple(s)) => Ok(s.to_lowercase()),
        Some(Frame::Bulk(bytes)) => Ok(String::from_utf8_lossy(&bytes).to_lowercase()),
        Some(frame) => Err(CommandParserError::InvalidFrame {
            expected: "simple or bulk string".to_string(),
            actual: frame,
        }),
        None => Err(CommandParserError::EmptyCommand),
    }
}

/// Hands out the arguments of a command one by one.
pub struct CommandParser {
    command: String,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self.parts.next().ok_or_else(|| self.wrong_arity())?;

        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn has_remaining(&self) -> bool {
        self.parts.len() > 0
    }

    /// Fails if there are arguments left over.
    fn finish(&mut self) -> Result<(), CommandParserError> {
        if self.has_remaining() {
            return Err(self.wrong_arity());
        }
        Ok(())
    }

    /// Discards every argument that has not been consumed.
    fn skip_remaining(&mut self) {
        self.parts.by_ref().for_each(drop);
    }

    fn wrong_arity(&self) -> CommandParserError {
        CommandParserError::WrongArity {
            command: self.command.clone(),
        }
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("protocol error; unknown command {command}")]
    UnknownCommand { command: String },
    #[error("wrong number of arguments for '{command}' command")]
    WrongArity { command: String },
    #[error("protocol error; empty command")]
    EmptyCommand,
}

impl CommandParserError {
    /// The error reply sent back to the client. The session goes on after it.
    pub fn to_reply(&self) -> Frame {
        match self {
            CommandParserError::UnknownCommand { .. } => {
                Frame::Error("Command not support".to_string())
            }
            err => Frame::Error(format!("ERR {}", err)),
        }
    }
}
