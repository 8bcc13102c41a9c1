use std::fmt;
use std::time::Duration;

use crate::frame::NodeId;

/// Errors produced by the modem and MAC layers.
#[derive(Debug, Clone, PartialEq)]
pub enum MacError {
    /// A DATA/RTS/CTS frame contained one or more undecodable (`?`) symbols.
    DecodeError,
    /// A preamble or END wait exceeded its budget.
    Timeout { waited: Duration },
    /// A CTS arrived addressed to a different node than expected.
    WrongAddress { expected: NodeId, got: NodeId },
    /// The audio device failed to open, read, or write.
    AudioIo(String),
    /// Startup/config input was invalid (e.g. node-id out of range).
    Config(String),
    /// The outbound message-source file could not be read.
    QueueIo(String),
}

impl fmt::Display for MacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacError::DecodeError => write!(f, "decode error: frame contained undecodable symbols"),
            MacError::Timeout { waited } => write!(f, "timed out after {:.2}s", waited.as_secs_f32()),
            MacError::WrongAddress { expected, got } => write!(
                f,
                "wrong-address CTS: expected {:?}, got {:?}",
                expected, got
            ),
            MacError::AudioIo(msg) => write!(f, "audio I/O error: {}", msg),
            MacError::Config(msg) => write!(f, "configuration error: {}", msg),
            MacError::QueueIo(msg) => write!(f, "outbound queue error: {}", msg),
        }
    }
}

impl std::error::Error for MacError {}

impl From<std::io::Error> for MacError {
    fn from(e: std::io::Error) -> Self {
        MacError::QueueIo(e.to_string())
    }
}
