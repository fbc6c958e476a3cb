//! Object naming plus the `shm_open`/`shm_unlink` calls, with errors
//! surfaced as `io::Error`.

use std::ffi::{CStr, CString};
use std::fs::File;
use std::io;

use nix::fcntl::OFlag;
use nix::sys::mman;
use nix::sys::stat::Mode;

use crate::error::{Result, ShmError};

/// Longest name `shm_open` accepts (NAME_MAX, including the leading slash).
const MAX_NAME_LEN: usize = 255;

/// Normalize a shared-memory object name into the `/name` form.
pub(crate) fn object_name(name: &str) -> Result<CString> {
    let invalid = |reason| ShmError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let body = name.strip_prefix('/').unwrap_or(name);
    if body.is_empty() {
        return Err(invalid("name is empty"));
    }
    if body.contains('/') {
        return Err(invalid("name may not contain '/' after the leading slash"));
    }
    if body.len() + 1 > MAX_NAME_LEN {
        return Err(invalid("name is longer than 255 bytes"));
    }
    CString::new(format!("/{body}")).map_err(|_| invalid("name contains a NUL byte"))
}

pub(crate) fn shm_open(name: &CStr, flags: OFlag, mode: Mode) -> io::Result<File> {
    let fd = mman::shm_open(name, flags | OFlag::O_CLOEXEC, mode)?;
    Ok(File::from(fd))
}

pub(crate) fn shm_unlink(name: &CStr) -> io::Result<()> {
    mman::shm_unlink(name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_adds_leading_slash() {
        assert_eq!(object_name("psm_default").unwrap().to_str().unwrap(), "/psm_default");
        assert_eq!(object_name("/psm_default").unwrap().to_str().unwrap(), "/psm_default");
    }

    #[test]
    fn object_name_rejects_bad_input() {
        for bad in ["", "/", "/a/b", "nul\0byte"] {
            assert!(
                matches!(object_name(bad), Err(ShmError::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
        let long = "x".repeat(300);
        assert!(object_name(&long).is_err());
    }

    #[test]
    fn unlink_missing_object_is_not_found() {
        let name = object_name(&crate::test_support::unique_name("unlink")).unwrap();
        let err = shm_unlink(&name).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
