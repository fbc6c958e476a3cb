use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use shmframe_transport::IpcStream;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete envelopes from any `Read` stream.
///
/// Handles partial reads internally. Callers always get complete frames;
/// incomplete bytes stay buffered between calls.
#[derive(Debug)]
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(frame);
            }
            self.fill()?;
        }
    }

    /// Return the next complete frame if one is available right now.
    ///
    /// Intended for streams in non-blocking mode: a `WouldBlock` from the
    /// underlying reader yields `Ok(None)` and any partial envelope is kept
    /// for the next call.
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(Some(frame));
            }
            match self.fill() {
                Ok(()) => continue,
                Err(WireError::Io(err)) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(err),
            }
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
            return Ok(());
        }
    }
}

impl FrameReader<IpcStream> {
    /// Create a frame reader for `IpcStream` and apply read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }

    /// Create a frame reader over an `IpcStream` switched to non-blocking
    /// mode, for use with [`FrameReader::try_read_frame`].
    pub fn nonblocking_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_nonblocking(true)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_wire_error(err: shmframe_transport::TransportError) -> WireError {
    match err {
        shmframe_transport::TransportError::Io(io)
        | shmframe_transport::TransportError::Accept(io) => WireError::Io(io),
        shmframe_transport::TransportError::Bind { source, .. }
        | shmframe_transport::TransportError::Connect { source, .. } => WireError::Io(source),
        other => WireError::Io(std::io::Error::other(other.to_string())),
    }
}
