use bleterm_frame::FrameError;
use bleterm_transport::TransportError;

use crate::identity::IdentityField;

/// Errors that can occur in terminal operations.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    /// A send was attempted with no peer attached.
    #[error("no device connected")]
    NotConnected,

    /// A set-once identity field already holds a value.
    #[error("{field} already set to '{existing}'")]
    IdentityAlreadySet {
        field: IdentityField,
        existing: String,
    },

    /// The transport could not be started. The terminal cannot operate.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),

    /// Transport-level error after start.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[source] FrameError),
}

impl From<FrameError> for TerminalError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Transport(err) => TerminalError::Transport(err),
            other => TerminalError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TerminalError>;
