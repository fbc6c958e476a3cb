use std::ffi::CString;
use std::fs::File;
use std::io;

use memmap2::{MmapMut, MmapOptions};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use tracing::{debug, info};

use crate::error::{Result, ShmError};
use crate::sys;

/// Producer-side shared-memory segment, mapped read-write.
///
/// Creates (or truncates) the named object, keeps a writable mapping of
/// its full length, and unlinks the name on drop. Consumers open the same
/// name through [`ShmHandle`](crate::ShmHandle).
#[derive(Debug)]
pub struct ShmSegment {
    name: String,
    c_name: CString,
    file: File,
    mmap: MmapMut,
}

impl ShmSegment {
    /// Create the object with `len` bytes (zero-filled) and map it.
    ///
    /// A zero `len` is rejected before anything is created.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        let c_name = sys::object_name(name)?;
        let create_err = |source| ShmError::Create {
            name: name.to_string(),
            source,
        };
        check_len(len).map_err(create_err)?;

        let file = sys::shm_open(
            &c_name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(create_err)?;
        let mmap = match file.set_len(len as u64).and_then(|()| map_writable(&file, len)) {
            Ok(mmap) => mmap,
            Err(err) => {
                let _ = sys::shm_unlink(&c_name);
                return Err(create_err(err));
            }
        };

        info!(name, len, "created shared memory segment");
        Ok(Self {
            name: name.to_string(),
            c_name,
            file,
            mmap,
        })
    }

    /// Grow or shrink the segment, replacing the writable mapping.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        let create_err = |source| ShmError::Create {
            name: self.name.clone(),
            source,
        };
        check_len(len).map_err(create_err)?;
        self.file.set_len(len as u64).map_err(create_err)?;
        let mmap = map_writable(&self.file, len).map_err(create_err)?;

        debug!(name = %self.name, from = self.mmap.len(), to = len, "resized shared memory segment");
        self.mmap = mmap;
        Ok(())
    }

    /// Copy a payload to the start of the segment.
    ///
    /// Fails if the payload does not fit.
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.len() {
            return Err(ShmError::Create {
                name: self.name.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "payload of {} bytes exceeds segment of {} bytes",
                        payload.len(),
                        self.len()
                    ),
                ),
            });
        }
        self.as_mut_slice()[..payload.len()].copy_from_slice(payload);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        if let Err(err) = sys::shm_unlink(&self.c_name) {
            debug!(error = %err, name = %self.name, "shm_unlink failed");
        }
    }
}

fn check_len(len: usize) -> io::Result<()> {
    if len == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "segment length must be non-zero",
        ));
    }
    Ok(())
}

fn map_writable(file: &File, len: usize) -> io::Result<MmapMut> {
    // SAFETY: the object is private to this process until its name is
    // shared, and consumers only map it read-only.
    unsafe { MmapOptions::new().len(len).map_mut(file) }
}
