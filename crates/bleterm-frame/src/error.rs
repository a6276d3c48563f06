use bleterm_transport::TransportError;

/// Errors that can occur while framing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A framing tunable is out of range.
    #[error("invalid frame configuration: {0}")]
    InvalidConfig(String),

    /// The transport rejected a chunk write.
    #[error("chunk write failed: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
