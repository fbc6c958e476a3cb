use std::path::PathBuf;

/// Failures of the Unix-socket control channel that carries frame
/// descriptors from producer to receivers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The producer could not listen on the control socket path (in use,
    /// stale file we may not remove, or missing directory).
    #[error("cannot listen on control socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No producer is listening on the control socket, or it refused us.
    #[error("cannot reach control socket {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The producer's listener failed while taking in a receiver.
    #[error("control socket accept failed: {0}")]
    Accept(std::io::Error),

    /// Reading or writing descriptor envelopes on an established control
    /// connection failed.
    #[error("control socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The control socket path does not fit in `sockaddr_un`.
    #[error("control socket path is {len} bytes, platform limit is {max}: {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The control address names a scheme other than a local socket.
    #[error("unsupported control address `{address}` (expected ipc://, unix:// or a socket path)")]
    UnsupportedScheme { address: String },
}

pub type Result<T> = std::result::Result<T, TransportError>;
