use std::path::PathBuf;

/// Errors that can occur in link transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the peripheral to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified peripheral.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming central.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the link stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// A value exceeds the attribute's maximum value size.
    #[error("attribute value too large ({size} bytes, max {max})")]
    ValueTooLarge { size: usize, max: usize },

    /// A write was attempted with no peer attached.
    #[error("no peer connected")]
    NotConnected,

    /// The transport was used before `begin`.
    #[error("transport not started")]
    NotStarted,

    /// The underlying radio or link could not be brought up.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
