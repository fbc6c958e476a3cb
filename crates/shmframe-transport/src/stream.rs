use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::Result;

/// Credentials of the process on the other end of a Unix socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

/// A connected control-channel stream.
///
/// Thin wrapper over a Unix stream socket so the layers above never touch
/// `std::os::unix` types directly.
pub struct IpcStream {
    socket: UnixStream,
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}

impl IpcStream {
    pub(crate) fn from_unix(socket: UnixStream) -> Self {
        Self { socket }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_write_timeout(timeout)?)
    }

    /// Switch between blocking and non-blocking mode.
    ///
    /// In non-blocking mode a read with nothing pending fails with
    /// `ErrorKind::WouldBlock` instead of parking the thread.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        Ok(self.socket.set_nonblocking(nonblocking)?)
    }

    /// Shut down both directions. The peer sees end-of-stream.
    pub fn shutdown(&self) -> Result<()> {
        Ok(self.socket.shutdown(std::net::Shutdown::Both)?)
    }

    /// `SO_PEERCRED` of the connected peer, or `None` if the call fails.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        use std::os::fd::AsRawFd;

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers of the sizes
        // passed, and the descriptor is an open socket owned by `self`.
        let rc = unsafe {
            libc::getsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        (rc == 0 && len as usize == std::mem::size_of::<libc::ucred>()).then(|| PeerCredentials {
            uid: cred.uid,
            gid: cred.gid,
            pid: cred.pid as u32,
        })
    }

    /// Peer credentials are only read on Linux.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        None
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("peer", &self.socket.peer_addr().ok())
            .finish()
    }
}
