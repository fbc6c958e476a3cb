/// Errors raised by shared-memory operations.
#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    /// The object name cannot be used with `shm_open`.
    #[error("invalid shared memory name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The named object could not be opened (missing, or permission denied).
    #[error("failed to open shared memory `{name}`: {source}")]
    Open {
        name: String,
        source: std::io::Error,
    },

    /// The object could not be mapped at the requested size.
    #[error("failed to map {len} bytes of shared memory `{name}`: {source}")]
    Map {
        name: String,
        len: usize,
        source: std::io::Error,
    },

    /// The producer-side object could not be created or resized.
    #[error("failed to create shared memory `{name}`: {source}")]
    Create {
        name: String,
        source: std::io::Error,
    },

    /// No mapping exists yet (or any more).
    #[error("shared memory is not mapped")]
    NotMapped,

    /// The handle was already closed.
    #[error("shared memory handle is closed")]
    Closed,

    /// A view was requested for an epoch that has since been replaced.
    #[error("stale frame view (epoch {view_epoch}, current {current_epoch})")]
    StaleView { view_epoch: u64, current_epoch: u64 },
}

pub type Result<T> = std::result::Result<T, ShmError>;
