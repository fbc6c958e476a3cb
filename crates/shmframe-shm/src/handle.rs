use std::ffi::CString;
use std::fs::File;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use tracing::debug;

use crate::error::{Result, ShmError};
use crate::sys;

/// Read-only handle to a named shared-memory object.
///
/// The producer owns the object's lifetime; this handle never creates,
/// resizes or unlinks it. Dropping the handle closes the descriptor.
#[derive(Debug)]
pub struct ShmHandle {
    name: String,
    file: File,
}

impl ShmHandle {
    /// Open an existing object read-only.
    ///
    /// A missing leading `/` is added. Fails with [`ShmError::Open`] if
    /// the object does not exist or access is denied.
    pub fn open(name: &str) -> Result<Self> {
        let c_name: CString = sys::object_name(name)?;
        let file = sys::shm_open(&c_name, OFlag::O_RDONLY, Mode::empty()).map_err(|source| {
            ShmError::Open {
                name: name.to_string(),
                source,
            }
        })?;
        debug!(name, "opened shared memory");
        Ok(Self {
            name: name.to_string(),
            file,
        })
    }

    /// Name as supplied to [`ShmHandle::open`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current size of the object in bytes, as reported by `fstat`.
    pub fn segment_len(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    /// Close the descriptor.
    pub fn close(self) {
        debug!(name = %self.name, "closing shared memory");
    }
}
