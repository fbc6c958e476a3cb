use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use shmframe_transport::IpcStream;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{Result, WireError};
use crate::message::ControlMessage;
use crate::reader::transport_to_wire_error;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete envelopes to any `Write` stream.
#[derive(Debug)]
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Marshal a control message and send it in one envelope.
    pub fn send_message(&mut self, message: &ControlMessage) -> Result<()> {
        self.send(&message.marshal())
    }

    /// Encode and send a payload (blocking).
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.encode(payload)?;
        self.write_from(0)?;
        self.flush()
    }

    /// Encode and send a payload unless the stream cannot take it right now.
    ///
    /// Returns `Ok(false)` if the very first write would block, in which
    /// case nothing was written and the envelope is dropped. Once any byte
    /// of the envelope is on the wire the rest is always completed, so a
    /// dropped envelope never leaves the stream misaligned.
    pub fn try_send(&mut self, payload: &[u8]) -> Result<bool> {
        self.encode(payload)?;
        let first = loop {
            match self.inner.write(&self.buf) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(err) => return Err(WireError::Io(err)),
            }
        };
        self.write_from(first)?;
        self.flush()?;
        Ok(true)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn encode(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(WireError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        self.buf.clear();
        encode_frame(payload, &mut self.buf)
    }

    fn write_from(&mut self, mut offset: usize) -> Result<()> {
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(err) => return Err(WireError::Io(err)),
            }
        }
        Ok(())
    }
}

impl FrameWriter<IpcStream> {
    /// Create a frame writer for `IpcStream` and apply write timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }

    /// Create a frame writer over an `IpcStream` switched to non-blocking
    /// mode, for use with [`FrameWriter::try_send`].
    pub fn nonblocking_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_nonblocking(true)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}
