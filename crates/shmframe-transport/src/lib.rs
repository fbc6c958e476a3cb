//! Local transport for the shmframe control channel.
//!
//! The control channel is a low-bandwidth stream that carries frame
//! metadata only; pixel payloads never travel over it. On Unix it runs
//! over a stream-oriented Unix domain socket: the producer binds, the
//! consumer connects.
//!
//! This is the lowest layer of shmframe. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod address;
pub mod error;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use address::ControlAddress;
pub use error::{Result, TransportError};
#[cfg(unix)]
pub use stream::{IpcStream, PeerCredentials};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
