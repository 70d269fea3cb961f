use std::io;

use thiserror::Error;

/// A single VM line that cannot be turned into a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("`{opcode}` takes {expected} token(s), found {found}")]
    Arity {
        opcode: String,
        expected: usize,
        found: usize,
    },
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown segment: {0}")]
    UnknownSegment(String),
    #[error("not a non-negative integer: {0}")]
    InvalidOperand(String),
    #[error("index {index} is out of range for segment {segment}")]
    IndexOutOfRange { segment: &'static str, index: u16 },
    #[error("cannot pop into the constant segment")]
    PopConstant,
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{module}:{line}: {error}")]
    Parse {
        module: String,
        line: usize,
        error: CommandError,
    },
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("failed to read {module}")]
    Read {
        module: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write assembly output")]
    Write(#[from] io::Error),
}

impl Error {
    /// The underlying command error, if this is a parse or codegen rejection.
    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            Error::Parse { error, .. } => Some(error),
            Error::Command(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
