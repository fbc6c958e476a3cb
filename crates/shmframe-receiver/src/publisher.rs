use std::fmt;
use std::time::{Duration, Instant};

use shmframe_transport::{ControlAddress, IpcStream, UnixDomainSocket};
use shmframe_wire::{ControlMessage, FrameConfig, FrameWriter};
use tracing::{debug, info, trace, warn};

use crate::error::Result;

struct Subscriber {
    id: u64,
    writer: FrameWriter<IpcStream>,
}

/// Producer end of the control channel.
///
/// Binds the socket, accepts subscribers without blocking and writes each
/// published message to all of them. A subscriber whose socket buffer is
/// full misses that message; one whose write fails is dropped.
pub struct FramePublisher {
    socket: UnixDomainSocket,
    address: ControlAddress,
    subscribers: Vec<Subscriber>,
    frame_config: FrameConfig,
    next_id: u64,
}

impl FramePublisher {
    /// Bind the control socket (owner-only permissions).
    pub fn bind(address: &ControlAddress) -> Result<Self> {
        let socket = UnixDomainSocket::bind(address.path())?;
        info!(address = %address, "control publisher bound");
        Ok(Self {
            socket,
            address: address.clone(),
            subscribers: Vec::new(),
            frame_config: FrameConfig::default(),
            next_id: 1,
        })
    }

    /// Accept every subscriber currently waiting. Returns how many joined.
    pub fn accept_pending(&mut self) -> Result<usize> {
        let mut accepted = 0;
        while let Some(stream) = self.socket.try_accept()? {
            let id = self.next_id;
            self.next_id += 1;
            match stream.peer_credentials() {
                Some(cred) => debug!(
                    id,
                    uid = cred.uid,
                    gid = cred.gid,
                    pid = cred.pid,
                    "subscriber connected"
                ),
                None => debug!(id, "subscriber connected"),
            }
            let writer = FrameWriter::nonblocking_ipc(stream, self.frame_config.clone())?;
            self.subscribers.push(Subscriber { id, writer });
            accepted += 1;
        }
        Ok(accepted)
    }

    /// Block (polling) until at least `count` subscribers are attached.
    pub fn wait_for_subscribers(&mut self, count: usize, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            self.accept_pending()?;
            if self.subscribers.len() >= count {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Publish one control message. Returns the number of subscribers that
    /// received it.
    pub fn publish(&mut self, message: &ControlMessage) -> Result<usize> {
        self.publish_raw(&message.marshal())
    }

    /// Publish an arbitrary payload in one envelope.
    pub fn publish_raw(&mut self, payload: &[u8]) -> Result<usize> {
        self.accept_pending()?;

        let mut delivered = 0;
        self.subscribers
            .retain_mut(|sub| match sub.writer.try_send(payload) {
                Ok(true) => {
                    delivered += 1;
                    true
                }
                Ok(false) => {
                    trace!(id = sub.id, "subscriber busy; message dropped");
                    true
                }
                Err(err) => {
                    warn!(id = sub.id, error = %err, "dropping subscriber");
                    false
                }
            });
        Ok(delivered)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn address(&self) -> &ControlAddress {
        &self.address
    }
}

impl fmt::Debug for FramePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePublisher")
            .field("address", &self.address)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
