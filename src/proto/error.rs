use std::io;

use thiserror::Error;

/// SSH protocol error.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A message ended before all of its declared content was read.
    #[error("insufficient data in message")]
    InsufficientData,

    /// A field violated the wire format (wrong length, bad magic, non-UTF-8
    /// text where text is required).
    #[error("invalid wire format: {0}")]
    InvalidFormat(&'static str),

    /// A framed message exceeded the size ceiling.
    #[error("message of {length} bytes exceeds the frame size limit")]
    MessageTooLong {
        /// Length declared by the frame header.
        length: usize,
    },

    /// Received a message whose type byte this agent does not speak.
    #[error("command not supported ({command})")]
    UnsupportedCommand {
        /// Type byte of the offending message.
        command: u8,
    },

    /// SSH encoding error.
    #[error("SSH encoding error: {0}")]
    SshEncoding(ssh_encoding::Error),

    /// Input/output error.
    #[error("I/O error: {0}")]
    IO(#[from] io::Error),
}

impl From<ssh_encoding::Error> for ProtoError {
    fn from(error: ssh_encoding::Error) -> Self {
        match error {
            ssh_encoding::Error::Length => Self::InsufficientData,
            other => Self::SshEncoding(other),
        }
    }
}

/// Protocol result.
pub type ProtoResult<T> = std::result::Result<T, ProtoError>;
