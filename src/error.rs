use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::proto::ProtoError;

/// Top-level agent error.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Protocol-level error on a connection.
    #[error("Agent: Protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// A socket path does not fit into `sockaddr_un`.
    #[error("Agent: socket path {} exceeds the platform limit", .0.display())]
    SocketPathTooLong(PathBuf),

    /// Transport-level error.
    #[error("Agent: I/O error: {0}")]
    IO(#[from] io::Error),

    /// Any other error.
    #[error("Other error: {0:#}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl AgentError {
    /// Wrap an arbitrary error.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}
