use shmframe_wire::FrameDescriptor;
use tracing::{debug, info};

use crate::error::{Result, ShmError};
use crate::handle::ShmHandle;
use crate::mapping::{FrameView, MappedBuffer};

/// What [`SharedFrameBuffer::ensure_mapped`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOutcome {
    /// First mapping of this handle.
    Mapped,
    /// The declared size changed; the old mapping was replaced.
    Remapped { previous_len: usize },
    /// The existing mapping already has the right size.
    Unchanged,
}

/// Single owner of the consumer's shared-memory handle and mapping.
///
/// The mapping is sized by the declared payload size of the most recent
/// descriptor. A descriptor whose size differs from the current mapping
/// triggers an unmap followed by a map; other descriptor changes (for
/// example transposed width and height with the same byte size) keep the
/// existing mapping.
///
/// Every successful map advances the epoch. Views carry the epoch they
/// were drawn from and [`SharedFrameBuffer::view_at`] refuses epochs that
/// are no longer current.
#[derive(Debug)]
pub struct SharedFrameBuffer {
    name: String,
    handle: Option<ShmHandle>,
    mapping: Option<MappedBuffer>,
    descriptor: Option<FrameDescriptor>,
    epoch: u64,
}

impl SharedFrameBuffer {
    /// Open the named object read-only. Nothing is mapped yet.
    pub fn open(name: &str) -> Result<Self> {
        let handle = ShmHandle::open(name)?;
        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            mapping: None,
            descriptor: None,
            epoch: 0,
        })
    }

    /// Make sure a mapping sized for `descriptor` exists.
    ///
    /// On failure no mapping is left behind and the stored descriptor is
    /// cleared.
    pub fn ensure_mapped(&mut self, descriptor: &FrameDescriptor) -> Result<MapOutcome> {
        let handle = self.handle.as_ref().ok_or(ShmError::Closed)?;

        let previous_len = match (&self.mapping, &self.descriptor) {
            (Some(mapping), Some(current)) if mapping.is_mapped() => {
                if !current.size_differs(descriptor) {
                    self.descriptor = Some(*descriptor);
                    return Ok(MapOutcome::Unchanged);
                }
                Some(mapping.len())
            }
            _ => None,
        };

        if let Some(mut old) = self.mapping.take() {
            old.unmap();
        }
        self.descriptor = None;

        let epoch = self.epoch + 1;
        let mapping = MappedBuffer::map(handle, descriptor, epoch)?;
        self.epoch = epoch;
        self.mapping = Some(mapping);
        self.descriptor = Some(*descriptor);

        Ok(match previous_len {
            Some(previous_len) => {
                info!(
                    name = %self.name,
                    from = previous_len,
                    to = descriptor.payload_byte_size,
                    epoch,
                    "remapped shared memory"
                );
                MapOutcome::Remapped { previous_len }
            }
            None => MapOutcome::Mapped,
        })
    }

    /// View of the current mapping.
    pub fn view(&self) -> Result<FrameView<'_>> {
        self.mapping.as_ref().ok_or(ShmError::NotMapped)?.view()
    }

    /// View of the current mapping, provided it is still the one from `epoch`.
    pub fn view_at(&self, epoch: u64) -> Result<FrameView<'_>> {
        let view = self.view()?;
        if view.epoch() != epoch {
            return Err(ShmError::StaleView {
                view_epoch: epoch,
                current_epoch: view.epoch(),
            });
        }
        Ok(view)
    }

    /// Descriptor the current mapping was sized for.
    pub fn descriptor(&self) -> Option<&FrameDescriptor> {
        self.descriptor.as_ref()
    }

    /// Epoch of the most recent successful map (0 before the first).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.as_ref().is_some_and(MappedBuffer::is_mapped)
    }

    /// Length of the current mapping, if any.
    pub fn mapped_len(&self) -> Option<usize> {
        self.mapping
            .as_ref()
            .filter(|m| m.is_mapped())
            .map(MappedBuffer::len)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the mapping, keeping the handle open. Idempotent.
    pub fn unmap(&mut self) {
        if let Some(mut mapping) = self.mapping.take() {
            mapping.unmap();
        }
        self.descriptor = None;
    }

    /// Unmap, then close the handle. Idempotent.
    pub fn close(&mut self) {
        self.unmap();
        if let Some(handle) = self.handle.take() {
            handle.close();
            debug!(name = %self.name, "shared frame buffer closed");
        }
    }
}

impl Drop for SharedFrameBuffer {
    fn drop(&mut self) {
        self.close();
    }
}
