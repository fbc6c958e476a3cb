use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};

/// Leading byte of every frame-stream control message.
///
/// Subscribers filter on this byte; it must never be changed by producers.
pub const FRAME_TOPIC_MAGIC: u8 = 0x7d;

/// Wire size of [`FrameDescriptor`]: 2 + 2 + 1 + 1 + 4 + 1.
pub const FRAME_DESCRIPTOR_SIZE: usize = 11;

/// Wire size of [`ControlMessage`]: topic (1) + frame count (4) + descriptor.
pub const CONTROL_MESSAGE_SIZE: usize = 1 + 4 + FRAME_DESCRIPTOR_SIZE;

/// Sample depth of one channel value.
///
/// Values this build has no name for decode to [`Depth::Other`] and are
/// written back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    U8,
    S8,
    U16,
    S16,
    S32,
    F32,
    F64,
    F16,
    Other(u8),
}

impl From<u8> for Depth {
    fn from(value: u8) -> Self {
        match value {
            0 => Depth::U8,
            1 => Depth::S8,
            2 => Depth::U16,
            3 => Depth::S16,
            4 => Depth::S32,
            5 => Depth::F32,
            6 => Depth::F64,
            7 => Depth::F16,
            other => Depth::Other(other),
        }
    }
}

impl From<Depth> for u8 {
    fn from(depth: Depth) -> Self {
        match depth {
            Depth::U8 => 0,
            Depth::S8 => 1,
            Depth::U16 => 2,
            Depth::S16 => 3,
            Depth::S32 => 4,
            Depth::F32 => 5,
            Depth::F64 => 6,
            Depth::F16 => 7,
            Depth::Other(raw) => raw,
        }
    }
}

impl Depth {
    /// Size of a single sample in bytes; `None` for unnamed depths.
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            Depth::U8 | Depth::S8 => Some(1),
            Depth::U16 | Depth::S16 | Depth::F16 => Some(2),
            Depth::S32 | Depth::F32 => Some(4),
            Depth::F64 => Some(8),
            Depth::Other(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Depth::U8 => "U8",
            Depth::S8 => "S8",
            Depth::U16 => "U16",
            Depth::S16 => "S16",
            Depth::S32 => "S32",
            Depth::F32 => "F32",
            Depth::F64 => "F64",
            Depth::F16 => "F16",
            Depth::Other(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Other(raw) => write!(f, "UNKNOWN({raw})"),
            known => f.write_str(known.as_str()),
        }
    }
}

/// Pixel layout of a frame.
///
/// Like [`Depth`], unnamed wire values survive as [`PixelFormat::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Usually 24-bit RGB (three U8 channels).
    Rgb,
    #[default]
    Bgr,
    Rgba,
    Bgra,
    /// Single channel.
    Gray,
    /// Planar YUV.
    Yuv,
    /// Packed YUYV (4:2:2).
    Yuyv,
    Other(u8),
}

impl From<u8> for PixelFormat {
    fn from(value: u8) -> Self {
        match value {
            0 => PixelFormat::Rgb,
            1 => PixelFormat::Bgr,
            2 => PixelFormat::Rgba,
            3 => PixelFormat::Bgra,
            4 => PixelFormat::Gray,
            5 => PixelFormat::Yuv,
            6 => PixelFormat::Yuyv,
            other => PixelFormat::Other(other),
        }
    }
}

impl From<PixelFormat> for u8 {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Rgb => 0,
            PixelFormat::Bgr => 1,
            PixelFormat::Rgba => 2,
            PixelFormat::Bgra => 3,
            PixelFormat::Gray => 4,
            PixelFormat::Yuv => 5,
            PixelFormat::Yuyv => 6,
            PixelFormat::Other(raw) => raw,
        }
    }
}

impl PixelFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgr => "BGR",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Gray => "GRAY",
            PixelFormat::Yuv => "YUV",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Other(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Other(raw) => write!(f, "UNKNOWN({raw})"),
            known => f.write_str(known.as_str()),
        }
    }
}

/// Geometry and encoding of one frame in shared memory.
///
/// `payload_byte_size` is the producer's declared size of the pixel
/// payload. It is carried as-is and is the only value used to size a
/// mapping; [`FrameDescriptor::packed_size`] is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameDescriptor {
    pub width: u16,
    pub height: u16,
    pub channels: u8,
    pub depth: Depth,
    pub payload_byte_size: u32,
    pub pixel_format: PixelFormat,
}

impl FrameDescriptor {
    /// Width × height × channels × bytes-per-sample, for packed layouts.
    /// `None` when the depth has no known sample size.
    pub fn packed_size(&self) -> Option<u64> {
        let sample = self.depth.bytes_per_sample()? as u64;
        Some(u64::from(self.width) * u64::from(self.height) * u64::from(self.channels) * sample)
    }

    /// Whether two descriptors need differently sized mappings.
    pub fn size_differs(&self, other: &FrameDescriptor) -> bool {
        self.payload_byte_size != other.payload_byte_size
    }

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u16_ne(self.width);
        dst.put_u16_ne(self.height);
        dst.put_u8(self.channels);
        dst.put_u8(self.depth.into());
        dst.put_u32_ne(self.payload_byte_size);
        dst.put_u8(self.pixel_format.into());
    }

    fn get(src: &mut impl Buf) -> Self {
        let width = src.get_u16_ne();
        let height = src.get_u16_ne();
        let channels = src.get_u8();
        let depth = Depth::from(src.get_u8());
        let payload_byte_size = src.get_u32_ne();
        let pixel_format = PixelFormat::from(src.get_u8());
        Self {
            width,
            height,
            channels,
            depth,
            payload_byte_size,
            pixel_format,
        }
    }
}

impl fmt::Display for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{} {} {} ({} bytes)",
            self.width,
            self.height,
            self.channels,
            self.depth,
            self.pixel_format,
            self.payload_byte_size
        )
    }
}

/// Per-frame control message published by the producer.
///
/// Wire layout, native byte order, no padding:
/// ```text
/// ┌───────┬─────────────┬───────┬────────┬──────────┬───────┬──────────────┬────────┐
/// │ topic │ frame_count │ width │ height │ channels │ depth │ payload_size │ format │
/// │  u8   │    u32      │  u16  │  u16   │    u8    │  u8   │     u32      │   u8   │
/// └───────┴─────────────┴───────┴────────┴──────────┴───────┴──────────────┴────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlMessage {
    pub topic: u8,
    pub frame_count: u32,
    pub descriptor: FrameDescriptor,
}

impl ControlMessage {
    /// Create a frame-stream message with the standard topic byte.
    pub fn new(frame_count: u32, descriptor: FrameDescriptor) -> Self {
        Self {
            topic: FRAME_TOPIC_MAGIC,
            frame_count,
            descriptor,
        }
    }

    /// Encode into exactly [`CONTROL_MESSAGE_SIZE`] bytes.
    pub fn marshal(&self) -> [u8; CONTROL_MESSAGE_SIZE] {
        let mut out = [0u8; CONTROL_MESSAGE_SIZE];
        let mut dst = &mut out[..];
        self.put(&mut dst);
        out
    }

    /// Append the encoded message to `dst`.
    pub fn marshal_into(&self, dst: &mut BytesMut) {
        dst.reserve(CONTROL_MESSAGE_SIZE);
        self.put(dst);
    }

    /// Decode a message.
    ///
    /// Inputs shorter than [`CONTROL_MESSAGE_SIZE`] are rejected; trailing
    /// bytes are ignored. Any full-length input decodes: the topic byte is
    /// not checked and unnamed depth or layout values are kept as-is.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CONTROL_MESSAGE_SIZE {
            return Err(WireError::Malformed {
                len: bytes.len(),
                expected: CONTROL_MESSAGE_SIZE,
            });
        }
        let mut src = &bytes[..CONTROL_MESSAGE_SIZE];
        let topic = src.get_u8();
        let frame_count = src.get_u32_ne();
        let descriptor = FrameDescriptor::get(&mut src);
        Ok(Self {
            topic,
            frame_count,
            descriptor,
        })
    }

    fn put(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.topic);
        dst.put_u32_ne(self.frame_count);
        self.descriptor.put(dst);
    }
}
