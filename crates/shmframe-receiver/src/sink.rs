use std::fmt;

use shmframe_shm::FrameView;
use shmframe_wire::{ControlMessage, FrameDescriptor};
use tracing::{debug, warn};

use crate::error::{ReceiverError, Result};

/// Why a receiver left the streaming states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// Mapping (or remapping) the shared memory failed.
    MapFailed(String),
    /// The worker thread panicked.
    WorkerPanicked,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => f.write_str("stop requested"),
            StopReason::MapFailed(detail) => write!(f, "mapping failed: {detail}"),
            StopReason::WorkerPanicked => f.write_str("worker panicked"),
        }
    }
}

/// Application code that receives frames.
///
/// Called synchronously on the receiver's worker thread. The pixel view is
/// only valid for the duration of the call; a slow sink stalls delivery
/// and newer frames replace older ones on the control channel.
pub trait FrameSink: Send {
    fn on_frame(&mut self, message: &ControlMessage, pixels: FrameView<'_>);

    /// Terminal notification. Called once when the receiver stops.
    fn on_stopped(&mut self, reason: &StopReason) {
        let _ = reason;
    }
}

impl<F> FrameSink for F
where
    F: FnMut(&ControlMessage, FrameView<'_>) + Send,
{
    fn on_frame(&mut self, message: &ControlMessage, pixels: FrameView<'_>) {
        self(message, pixels)
    }
}

/// Output scale for converters, always in `(0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor(f32);

impl ScaleFactor {
    pub const FULL: ScaleFactor = ScaleFactor(1.0);

    pub fn new(value: f32) -> Result<Self> {
        if value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ReceiverError::InvalidScaleFactor(value))
        }
    }

    pub fn get(self) -> f32 {
        self.0
    }

    /// Scaled output dimensions, never below 1x1.
    pub fn apply(self, width: u16, height: u16) -> (u16, u16) {
        let scale = |v: u16| ((f32::from(v) * self.0).round() as u16).max(1);
        (scale(width), scale(height))
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::FULL
    }
}

impl TryFrom<f32> for ScaleFactor {
    type Error = ReceiverError;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

/// Pixel conversion performed outside the receiver (colour space, scaling).
pub trait FrameConverter: Send {
    type Output;
    type Error: fmt::Display;

    fn convert(
        &mut self,
        pixels: &[u8],
        descriptor: &FrameDescriptor,
        scale: ScaleFactor,
    ) -> std::result::Result<Self::Output, Self::Error>;
}

/// Sink that runs a [`FrameConverter`] and hands the owned result on.
///
/// Conversion failures are logged and the frame is dropped.
pub struct ConvertingSink<C, F> {
    converter: C,
    scale: ScaleFactor,
    downstream: F,
    failures: u64,
}

impl<C, F> ConvertingSink<C, F>
where
    C: FrameConverter,
    F: FnMut(&ControlMessage, C::Output) + Send,
{
    pub fn new(converter: C, scale: ScaleFactor, downstream: F) -> Self {
        Self {
            converter,
            scale,
            downstream,
            failures: 0,
        }
    }

    pub fn scale(&self) -> ScaleFactor {
        self.scale
    }

    /// Frames dropped because conversion failed.
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl<C, F> FrameSink for ConvertingSink<C, F>
where
    C: FrameConverter,
    F: FnMut(&ControlMessage, C::Output) + Send,
{
    fn on_frame(&mut self, message: &ControlMessage, pixels: FrameView<'_>) {
        match self
            .converter
            .convert(&pixels, &message.descriptor, self.scale)
        {
            Ok(output) => (self.downstream)(message, output),
            Err(err) => {
                self.failures += 1;
                warn!(
                    frame_count = message.frame_count,
                    error = %err,
                    "frame conversion failed; frame dropped"
                );
            }
        }
    }

    fn on_stopped(&mut self, reason: &StopReason) {
        debug!(%reason, failures = self.failures, "converting sink stopped");
    }
}
