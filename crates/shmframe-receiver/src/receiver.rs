use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use shmframe_shm::{FrameView, MapOutcome, SharedFrameBuffer};
use shmframe_transport::ControlAddress;
use shmframe_wire::{ControlMessage, FrameDescriptor, FRAME_TOPIC_MAGIC};
use tracing::{debug, error, info, warn};

use crate::channel::ControlClient;
use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, Result};
use crate::sink::{FrameSink, StopReason};
use crate::state::ReceiverState;

/// Name of the worker thread spawned by [`FrameReceiver::start`].
pub const WORKER_THREAD_NAME: &str = "shmframe-receiver";

/// Longest prefix of a malformed payload included in debug logs.
const MAX_HEX_DUMP: usize = 64;

/// Counters since the receiver was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    /// Topic-matching payloads taken off the control channel.
    pub received: u64,
    /// Frames handed to a sink.
    pub delivered: u64,
    /// Payloads dropped as malformed.
    pub malformed: u64,
    /// Mappings replaced after a size change.
    pub remaps: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    delivered: AtomicU64,
    malformed: AtomicU64,
    remaps: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReceiverStats {
        ReceiverStats {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            remaps: self.remaps.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the receiver handle and its worker.
#[derive(Default)]
struct Shared {
    state: Mutex<ReceiverState>,
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    stop: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ReceiverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> MutexGuard<'_, Option<Box<dyn FrameSink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ReceiverState) {
        *self.state() = state;
    }

    /// Move to Stopped unless already there, and tell the sink.
    fn finish(&self, reason: StopReason) {
        {
            let mut state = self.state();
            if matches!(*state, ReceiverState::Stopped { .. }) {
                return;
            }
            *state = ReceiverState::Stopped {
                reason: reason.clone(),
            };
        }
        if let Some(sink) = self.sink().as_mut() {
            sink.on_stopped(&reason);
        }
    }
}

/// Receives frames published by a shared-memory producer.
///
/// [`start`](Self::start) connects the control channel and opens the
/// shared-memory object, then hands both to a worker thread. The worker
/// maps the object when the first control message arrives, remaps it
/// whenever the declared payload size changes, and calls the registered
/// [`FrameSink`] once per message with a view of the mapped pixels.
///
/// ```no_run
/// use shmframe_receiver::{FrameReceiver, ReceiverConfig};
///
/// let mut receiver = FrameReceiver::new(ReceiverConfig::new("/psm_default", "ipc:///tmp/0"));
/// receiver.set_on_frame(|message, pixels| {
///     println!("frame {} ({} bytes)", message.frame_count, pixels.len());
/// });
/// receiver.start()?;
/// // ...
/// receiver.stop()?;
/// # Ok::<(), shmframe_receiver::ReceiverError>(())
/// ```
pub struct FrameReceiver {
    config: ReceiverConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Worker>>,
}

impl FrameReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            worker: None,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Register (or replace) the frame sink.
    ///
    /// Takes effect from the next frame. Must not be called from inside a
    /// sink callback.
    pub fn set_sink(&self, sink: impl FrameSink + 'static) {
        *self.shared.sink() = Some(Box::new(sink));
    }

    /// Register a closure as the frame sink.
    pub fn set_on_frame<F>(&self, on_frame: F)
    where
        F: FnMut(&ControlMessage, FrameView<'_>) + Send + 'static,
    {
        self.set_sink(on_frame);
    }

    /// Remove the sink. Frames keep being consumed but go nowhere.
    pub fn clear_sink(&self) {
        *self.shared.sink() = None;
    }

    /// Connect, open the shared memory, and spawn the worker.
    ///
    /// Fails with [`ReceiverError::AlreadyRunning`] unless the receiver is
    /// Idle or Stopped. Any other failure releases what was acquired and
    /// leaves the receiver Idle.
    pub fn start(&mut self) -> Result<()> {
        {
            let state = self.shared.state();
            if state.is_active() {
                return Err(ReceiverError::AlreadyRunning {
                    state: state.name(),
                });
            }
        }
        self.reap_worker();

        match self.spawn_worker() {
            Ok(handle) => {
                self.worker = Some(handle);
                info!(
                    shm = %self.config.shm_name,
                    address = %self.config.control_address,
                    "receiver started"
                );
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(ReceiverState::Idle);
                Err(err)
            }
        }
    }

    /// Stop the worker and release the mapping, handle and connection.
    ///
    /// Blocks until the worker notices the stop flag (at most about one
    /// poll interval plus the sink call in progress). Calling it again, or
    /// on a receiver that never started, does nothing.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.shared.stop.store(true, Ordering::Release);

        match handle.join() {
            Ok(worker) => worker.shutdown(),
            Err(_) => {
                error!("receiver worker panicked");
                self.shared.finish(StopReason::WorkerPanicked);
                return Err(ReceiverError::WorkerPanicked);
            }
        }
        self.shared.finish(StopReason::Requested);
        info!(shm = %self.config.shm_name, "receiver stopped");
        Ok(())
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ReceiverState {
        self.shared.state().clone()
    }

    /// AwaitingInit or Streaming.
    pub fn is_running(&self) -> bool {
        self.shared.state().is_active()
    }

    pub fn stats(&self) -> ReceiverStats {
        self.shared.counters.snapshot()
    }

    /// Descriptor of the most recent frame.
    ///
    /// Fails with [`ReceiverError::NotInitialized`] until an init message
    /// has been observed.
    pub fn current_descriptor(&self) -> Result<FrameDescriptor> {
        self.shared
            .state()
            .descriptor()
            .copied()
            .ok_or(ReceiverError::NotInitialized)
    }

    fn spawn_worker(&mut self) -> Result<JoinHandle<Worker>> {
        self.config.validate()?;

        let address = ControlAddress::parse(&self.config.control_address).map_err(|source| {
            ReceiverError::Connect {
                address: self.config.control_address.clone(),
                source,
            }
        })?;
        let mut client = ControlClient::connect(&address, self.config.channel.clone())?;
        client.subscribe(FRAME_TOPIC_MAGIC);

        let buffer = match SharedFrameBuffer::open(&self.config.shm_name) {
            Ok(buffer) => buffer,
            Err(err) => {
                client.close();
                return Err(ReceiverError::Open(err));
            }
        };

        self.shared.stop.store(false, Ordering::Release);
        self.shared.set_state(ReceiverState::AwaitingInit);

        let worker = Worker {
            client,
            buffer,
            shared: Arc::clone(&self.shared),
            poll_interval: self.config.poll_interval,
        };
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(ReceiverError::Spawn)
    }

    /// Join a worker that already ended on its own (map failure).
    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(worker) => worker.shutdown(),
                Err(_) => warn!("previous receiver worker panicked"),
            }
        }
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "receiver stop during drop failed");
        }
    }
}

impl fmt::Debug for FrameReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReceiver")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

/// Owns the control client and the mapping while the receiver runs.
struct Worker {
    client: ControlClient,
    buffer: SharedFrameBuffer,
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl Worker {
    fn run(mut self) -> Self {
        debug!(poll_interval = ?self.poll_interval, "receiver worker running");
        while !self.shared.stop.load(Ordering::Acquire) {
            match self.client.try_receive() {
                Ok(Some(payload)) => {
                    if let Err(reason) = self.handle(&payload) {
                        self.fail(reason);
                        break;
                    }
                }
                Ok(None) => thread::sleep(self.poll_interval),
                Err(err) => {
                    debug!(error = %err, "control channel interrupted");
                    thread::sleep(self.poll_interval);
                }
            }
        }
        debug!("receiver worker exiting");
        self
    }

    fn handle(&mut self, payload: &[u8]) -> std::result::Result<(), StopReason> {
        let counters = &self.shared.counters;
        Counters::bump(&counters.received);

        let message = match ControlMessage::unmarshal(payload) {
            Ok(message) => message,
            Err(err) => {
                Counters::bump(&counters.malformed);
                let err = ReceiverError::Malformed(err);
                warn!(len = payload.len(), error = %err, "dropping control message");
                debug!(payload = %hex_prefix(payload), "malformed payload");
                return Ok(());
            }
        };

        match self.buffer.ensure_mapped(&message.descriptor) {
            Ok(MapOutcome::Mapped) => info!(
                frame_count = message.frame_count,
                descriptor = %message.descriptor,
                "init message received"
            ),
            Ok(MapOutcome::Remapped { .. }) => Counters::bump(&counters.remaps),
            Ok(MapOutcome::Unchanged) => {}
            Err(err) => {
                let err = ReceiverError::Map(err);
                error!(
                    frame_count = message.frame_count,
                    descriptor = %message.descriptor,
                    error = %err,
                    "stopping receiver"
                );
                return Err(StopReason::MapFailed(err.to_string()));
            }
        }

        let view = self
            .buffer
            .view()
            .map_err(|err| StopReason::MapFailed(err.to_string()))?;
        if let Some(sink) = self.shared.sink().as_mut() {
            sink.on_frame(&message, view);
            Counters::bump(&counters.delivered);
        }

        self.shared.set_state(ReceiverState::Streaming {
            descriptor: message.descriptor,
        });
        Ok(())
    }

    fn fail(&mut self, reason: StopReason) {
        self.buffer.close();
        self.client.close();
        self.shared.finish(reason);
    }

    fn shutdown(mut self) {
        self.buffer.close();
        self.client.close();
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().min(MAX_HEX_DUMP) * 2);
    for byte in bytes.iter().take(MAX_HEX_DUMP) {
        let _ = write!(out, "{byte:02x}");
    }
    if bytes.len() > MAX_HEX_DUMP {
        out.push_str("...");
    }
    out
}
