//! Frame receiver for shared-memory video producers.
//!
//! A producer writes pixels into a named shared-memory object and then
//! publishes a 16-byte [`ControlMessage`](shmframe_wire::ControlMessage)
//! on a Unix socket. [`FrameReceiver`] subscribes to those messages, keeps
//! a read-only mapping sized to the latest descriptor, and calls a
//! [`FrameSink`] with a borrowed view of each frame.
//!
//! [`FramePublisher`] is the matching producer end, used by tests and the
//! `shmframe produce` diagnostic.

pub mod channel;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod publisher;
pub mod receiver;
pub mod sink;
pub mod state;

pub use channel::ControlClient;
pub use config::{
    ChannelConfig, ReceiverConfig, DEFAULT_CONTROL_ADDRESS, DEFAULT_POLL_INTERVAL,
    DEFAULT_RECONNECT_INTERVAL, DEFAULT_SHM_NAME,
};
pub use error::{ReceiverError, Result};
pub use mailbox::{FrameMailbox, FrameSnapshot, MailboxSink};
pub use publisher::FramePublisher;
pub use receiver::{FrameReceiver, ReceiverStats, WORKER_THREAD_NAME};
pub use sink::{ConvertingSink, FrameConverter, FrameSink, ScaleFactor, StopReason};
pub use state::ReceiverState;
