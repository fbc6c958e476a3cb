use std::io;
use std::ops::Deref;

use memmap2::{Mmap, MmapOptions};
use shmframe_wire::FrameDescriptor;
use tracing::debug;

use crate::error::{Result, ShmError};
use crate::handle::ShmHandle;

/// A read-only mapping of the first `len` bytes of a shared-memory object.
///
/// Either a complete mapping of the requested size exists or none does.
/// The mapping is released by [`MappedBuffer::unmap`] or on drop.
#[derive(Debug)]
pub struct MappedBuffer {
    mmap: Option<Mmap>,
    len: usize,
    epoch: u64,
}

impl MappedBuffer {
    /// Map `descriptor.payload_byte_size` bytes of `handle` read-only at offset 0.
    ///
    /// Fails with [`ShmError::Map`] if the size is zero, larger than the
    /// object, or rejected by the OS. The mapping does not borrow
    /// `descriptor`.
    pub fn map(handle: &ShmHandle, descriptor: &FrameDescriptor, epoch: u64) -> Result<Self> {
        let len = descriptor.payload_byte_size as usize;
        let map_err = |source| ShmError::Map {
            name: handle.name().to_string(),
            len,
            source,
        };

        if len == 0 {
            return Err(map_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map zero bytes",
            )));
        }
        let segment_len = handle.segment_len().map_err(map_err)?;
        if len as u64 > segment_len {
            return Err(map_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("segment holds only {segment_len} bytes"),
            )));
        }

        // SAFETY: the producer may keep writing through its own mapping;
        // readers only ever copy bytes out and never rely on them staying
        // fixed. `len` fits inside the object as checked above.
        let mmap = unsafe { MmapOptions::new().len(len).map(handle.file()) }.map_err(map_err)?;
        debug!(name = handle.name(), len, epoch, "mapped shared memory");
        Ok(Self {
            mmap: Some(mmap),
            len,
            epoch,
        })
    }

    /// Zero-copy view of the mapped bytes.
    ///
    /// The view borrows `self`, so it cannot outlive an [`unmap`](Self::unmap).
    pub fn view(&self) -> Result<FrameView<'_>> {
        let mmap = self.mmap.as_ref().ok_or(ShmError::NotMapped)?;
        Ok(FrameView {
            bytes: &mmap[..],
            epoch: self.epoch,
        })
    }

    /// Release the mapping. Calling this on an unmapped buffer is a no-op.
    pub fn unmap(&mut self) {
        if self.mmap.take().is_some() {
            debug!(len = self.len, epoch = self.epoch, "unmapped shared memory");
        }
    }

    /// Whether the mapping is still live.
    pub fn is_mapped(&self) -> bool {
        self.mmap.is_some()
    }

    /// Mapped length in bytes (the descriptor's declared payload size).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Epoch this mapping was created in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        self.unmap();
    }
}

/// Borrowed, read-only bytes of one frame.
///
/// The lifetime ties the view to the mapping it came from; the epoch
/// identifies which mapping that was.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
    epoch: u64,
}

impl<'a> FrameView<'a> {
    /// Wrap bytes that did not come from a mapping (tests, replays).
    pub fn from_bytes(bytes: &'a [u8], epoch: u64) -> Self {
        Self { bytes, epoch }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The last `n` bytes (or fewer if the view is shorter).
    pub fn tail(&self, n: usize) -> &'a [u8] {
        &self.bytes[self.bytes.len().saturating_sub(n)..]
    }
}

impl Deref for FrameView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl AsRef<[u8]> for FrameView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}
