use shmframe_shm::ShmError;
use shmframe_transport::TransportError;
use shmframe_wire::WireError;

/// Errors that can occur in receiver operations.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// The control channel could not be reached.
    #[error("failed to connect control channel `{address}`: {source}")]
    Connect {
        address: String,
        source: TransportError,
    },

    /// The shared-memory object could not be opened.
    #[error("failed to open shared memory: {0}")]
    Open(#[source] ShmError),

    /// The shared-memory object could not be mapped at the declared size.
    #[error("failed to map shared memory: {0}")]
    Map(#[source] ShmError),

    /// A control payload was too short or carried unknown enum values.
    #[error("malformed control message: {0}")]
    Malformed(#[source] WireError),

    /// `start()` was called while the receiver was already running.
    #[error("receiver is already running (state: {state})")]
    AlreadyRunning { state: &'static str },

    /// No init message has been observed yet.
    #[error("receiver has not been initialized by a control message")]
    NotInitialized,

    /// Output scale factor outside `(0.0, 1.0]`.
    #[error("invalid scale factor {0} (expected a value in (0.0, 1.0])")]
    InvalidScaleFactor(f32),

    /// Receiver configuration failed validation.
    #[error("invalid receiver configuration: {0}")]
    InvalidConfig(String),

    /// The worker thread could not be spawned.
    #[error("failed to spawn receiver worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire-level error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Shared-memory error outside of open/map.
    #[error("shared memory error: {0}")]
    Shm(#[from] ShmError),

    /// The worker thread panicked (typically inside a frame sink).
    #[error("receiver worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, ReceiverError>;
