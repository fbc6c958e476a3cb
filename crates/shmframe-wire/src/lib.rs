//! Wire format for the shmframe control channel.
//!
//! Two layers live here:
//! - [`message`]: the fixed 16-byte [`ControlMessage`] that describes one
//!   frame sitting in shared memory (topic byte, frame counter, descriptor).
//! - [`codec`]: the stream envelope that delimits messages on a byte
//!   stream. Every envelope carries a 2-byte magic ("SF") and a 4-byte
//!   little-endian payload length.
//!
//! [`FrameReader`] and [`FrameWriter`] move envelopes over any `Read` /
//! `Write` stream, including the non-blocking control socket.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{Result, WireError};
pub use message::{
    ControlMessage, Depth, FrameDescriptor, PixelFormat, CONTROL_MESSAGE_SIZE,
    FRAME_DESCRIPTOR_SIZE, FRAME_TOPIC_MAGIC,
};
pub use reader::FrameReader;
pub use writer::FrameWriter;
