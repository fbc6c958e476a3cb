//! Shared-memory frame buffers.
//!
//! The producer writes pixel payloads into a named POSIX shared-memory
//! object; the consumer maps it read-only. A mapping is sized by the
//! declared payload size of the most recent frame descriptor and is
//! replaced whenever that size changes. Every successful map starts a new
//! epoch; [`FrameView`]s remember the epoch they were drawn from.
//!
//! - [`ShmHandle`]: read-only handle to a named object.
//! - [`MappedBuffer`]: one read-only mapping.
//! - [`SharedFrameBuffer`]: owner of handle + mapping, drives remapping.
//! - [`ShmSegment`]: producer-side writable segment.

pub mod buffer;
pub mod error;
pub mod handle;
pub mod mapping;
pub mod segment;

mod sys;

pub use buffer::{MapOutcome, SharedFrameBuffer};
pub use error::{Result, ShmError};
pub use handle::ShmHandle;
pub use mapping::{FrameView, MappedBuffer};
pub use segment::ShmSegment;
