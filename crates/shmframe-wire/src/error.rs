/// Errors that can occur while encoding or decoding control traffic.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The control message is shorter than the fixed structure size.
    #[error("malformed control message ({len} bytes, expected at least {expected})")]
    Malformed { len: usize, expected: usize },

    /// The envelope header contains an invalid magic number.
    #[error("invalid envelope magic (expected 0x5346 \"SF\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing envelopes.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete envelope was received.
    #[error("connection closed (incomplete envelope)")]
    ConnectionClosed,
}

impl WireError {
    /// Whether this error describes an unusable control payload (as
    /// opposed to a broken stream).
    pub fn is_malformed_message(&self) -> bool {
        matches!(self, WireError::Malformed { .. })
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
