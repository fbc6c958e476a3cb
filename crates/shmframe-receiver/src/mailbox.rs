use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use shmframe_shm::FrameView;
use shmframe_wire::ControlMessage;

use crate::sink::{FrameSink, StopReason};

/// Owned copy of one delivered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub message: ControlMessage,
    /// Mapping epoch the pixels were copied from.
    pub epoch: u64,
    pub pixels: Bytes,
}

impl FrameSnapshot {
    /// Copy the pixels out of a borrowed view.
    pub fn capture(message: &ControlMessage, pixels: FrameView<'_>) -> Self {
        Self {
            message: *message,
            epoch: pixels.epoch(),
            pixels: Bytes::copy_from_slice(&pixels),
        }
    }

    /// The last `n` pixel bytes (or fewer).
    pub fn tail(&self, n: usize) -> &[u8] {
        &self.pixels[self.pixels.len().saturating_sub(n)..]
    }
}

#[derive(Debug, Default)]
struct Slot {
    frame: Option<FrameSnapshot>,
    closed: Option<StopReason>,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
    posted: AtomicU64,
    dropped: AtomicU64,
}

/// Single-slot hand-off between the receiver worker and another thread.
///
/// Posting never blocks: a new snapshot replaces one that has not been
/// taken yet (drop-oldest). Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct FrameMailbox {
    shared: Arc<Shared>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that posts every frame into this mailbox.
    pub fn sink(&self) -> MailboxSink {
        MailboxSink {
            mailbox: self.clone(),
        }
    }

    /// Replace the pending snapshot. Ignored once the mailbox is closed.
    pub fn post(&self, snapshot: FrameSnapshot) {
        let mut slot = self.lock();
        if slot.closed.is_some() {
            return;
        }
        if slot.frame.replace(snapshot).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.posted.fetch_add(1, Ordering::Relaxed);
        drop(slot);
        self.shared.ready.notify_all();
    }

    /// Take the pending snapshot without waiting.
    pub fn take(&self) -> Option<FrameSnapshot> {
        self.lock().frame.take()
    }

    /// Wait up to `timeout` for a snapshot.
    ///
    /// Returns `None` on timeout, or right away once the mailbox is closed
    /// and empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            if slot.closed.is_some() {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .shared
                .ready
                .wait_timeout(slot, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Mark the stream finished and wake every waiter. A pending snapshot
    /// can still be taken.
    pub fn close(&self, reason: StopReason) {
        let mut slot = self.lock();
        if slot.closed.is_none() {
            slot.closed = Some(reason);
        }
        drop(slot);
        self.shared.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// Why the mailbox was closed, if it was.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.lock().closed.clone()
    }

    /// Snapshots replaced before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Snapshots posted in total.
    pub fn posted(&self) -> u64 {
        self.shared.posted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`FrameSink`] that copies frames into a [`FrameMailbox`].
#[derive(Debug, Clone)]
pub struct MailboxSink {
    mailbox: FrameMailbox,
}

impl MailboxSink {
    pub fn mailbox(&self) -> &FrameMailbox {
        &self.mailbox
    }
}

impl FrameSink for MailboxSink {
    fn on_frame(&mut self, message: &ControlMessage, pixels: FrameView<'_>) {
        self.mailbox.post(FrameSnapshot::capture(message, pixels));
    }

    fn on_stopped(&mut self, reason: &StopReason) {
        self.mailbox.close(reason.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use shmframe_wire::{Depth, FrameDescriptor, PixelFormat};

    use super::*;

    fn message(frame_count: u32) -> ControlMessage {
        ControlMessage::new(
            frame_count,
            FrameDescriptor {
                width: 2,
                height: 1,
                channels: 1,
                depth: Depth::U8,
                payload_byte_size: 2,
                pixel_format: PixelFormat::Gray,
            },
        )
    }

    #[test]
    fn newest_snapshot_wins() {
        let mailbox = FrameMailbox::new();
        let mut sink = mailbox.sink();

        for n in 1..=3u32 {
            let pixels = [n as u8, 0xff];
            sink.on_frame(&message(n), FrameView::from_bytes(&pixels, 7));
        }

        let snapshot = mailbox.take().expect("snapshot should be pending");
        assert_eq!(snapshot.message.frame_count, 3);
        assert_eq!(snapshot.epoch, 7);
        assert_eq!(snapshot.pixels.as_ref(), &[3, 0xff]);
        assert_eq!(snapshot.tail(1), &[0xff]);
        assert_eq!(mailbox.dropped(), 2);
        assert_eq!(mailbox.posted(), 3);
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn snapshot_outlives_source_bytes() {
        let mailbox = FrameMailbox::new();
        {
            let pixels = vec![9u8; 2];
            mailbox.post(FrameSnapshot::capture(
                &message(1),
                FrameView::from_bytes(&pixels, 1),
            ));
        }
        assert_eq!(mailbox.take().unwrap().pixels.as_ref(), &[9, 9]);
    }

    #[test]
    fn recv_timeout_wakes_on_post() {
        let mailbox = FrameMailbox::new();
        let producer = mailbox.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.post(FrameSnapshot::capture(
                &message(5),
                FrameView::from_bytes(&[1, 2], 1),
            ));
        });

        let snapshot = mailbox
            .recv_timeout(Duration::from_secs(5))
            .expect("snapshot should arrive");
        assert_eq!(snapshot.message.frame_count, 5);
        handle.join().unwrap();
    }

    #[test]
    fn recv_timeout_expires() {
        let mailbox = FrameMailbox::new();
        let start = Instant::now();
        assert!(mailbox.recv_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn close_wakes_waiters_and_rejects_posts() {
        let mailbox = FrameMailbox::new();
        let mut sink = mailbox.sink();

        let waiter = {
            let mailbox = mailbox.clone();
            thread::spawn(move || mailbox.recv_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        sink.on_stopped(&StopReason::Requested);

        assert!(waiter.join().unwrap().is_none());
        assert!(mailbox.is_closed());
        assert_eq!(mailbox.stop_reason(), Some(StopReason::Requested));

        sink.on_frame(&message(1), FrameView::from_bytes(&[0, 0], 1));
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn pending_snapshot_survives_close() {
        let mailbox = FrameMailbox::new();
        mailbox.post(FrameSnapshot::capture(
            &message(1),
            FrameView::from_bytes(&[4, 4], 1),
        ));
        mailbox.close(StopReason::MapFailed("gone".into()));

        assert!(mailbox.recv_timeout(Duration::from_millis(1)).is_some());
        assert!(mailbox.recv_timeout(Duration::from_millis(1)).is_none());
    }
}
