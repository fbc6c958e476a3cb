//! Receive video frames that a producer writes into POSIX shared memory.
//!
//! The producer announces each frame with a 16-byte control message on a
//! Unix socket. A [`FrameReceiver`](receiver::FrameReceiver) keeps a
//! read-only mapping sized to the latest announcement and hands every frame
//! to a [`FrameSink`](receiver::FrameSink) on its worker thread.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket transport and control addresses
//! - [`wire`]: control message layout and the stream envelope codec
//! - [`shm`]: shared-memory handles, epoch-tracked mappings, producer segments
//! - [`receiver`]: control client, receiver state machine, sinks, publisher

/// Re-export transport types.
pub mod transport {
    pub use shmframe_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use shmframe_wire::*;
}

/// Re-export shared-memory types.
pub mod shm {
    pub use shmframe_shm::*;
}

/// Re-export receiver types.
pub mod receiver {
    pub use shmframe_receiver::*;
}
