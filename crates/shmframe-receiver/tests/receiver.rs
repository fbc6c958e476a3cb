#![cfg(unix)]

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use shmframe_receiver::{
    FrameMailbox, FramePublisher, FrameReceiver, ReceiverConfig, ReceiverError, ReceiverState,
    StopReason, WORKER_THREAD_NAME,
};
use shmframe_shm::ShmSegment;
use shmframe_transport::ControlAddress;
use shmframe_wire::{ControlMessage, Depth, FrameDescriptor, PixelFormat};

const TIMEOUT: Duration = Duration::from_secs(5);

fn unique(tag: &str) -> String {
    format!(
        "shmframe-it-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    )
}

struct Harness {
    dir: PathBuf,
    shm_name: String,
    address: ControlAddress,
    publisher: FramePublisher,
}

impl Harness {
    fn new(tag: &str) -> Self {
        let name = unique(tag);
        let dir = std::env::temp_dir().join(&name);
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let address = ControlAddress::from_path(dir.join("control.sock"));
        let publisher = FramePublisher::bind(&address).expect("publisher should bind");
        Self {
            dir,
            shm_name: format!("/{name}"),
            address,
            publisher,
        }
    }

    fn segment(&self, len: usize) -> ShmSegment {
        ShmSegment::create(&self.shm_name, len).expect("segment should be created")
    }

    fn config(&self) -> ReceiverConfig {
        ReceiverConfig::new(self.shm_name.clone(), self.address.to_string())
            .with_reconnect_interval(Duration::from_millis(10))
    }

    fn attach(&mut self) {
        assert!(
            self.publisher
                .wait_for_subscribers(1, TIMEOUT)
                .expect("accept should succeed"),
            "receiver should subscribe"
        );
    }

    fn publish(&mut self, message: ControlMessage) {
        assert_eq!(
            self.publisher.publish(&message).expect("publish should succeed"),
            1
        );
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn descriptor(width: u16, height: u16, size: u32) -> FrameDescriptor {
    FrameDescriptor {
        width,
        height,
        channels: 3,
        depth: Depth::U8,
        payload_byte_size: size,
        pixel_format: PixelFormat::Bgr,
    }
}

#[derive(Debug)]
struct Seen {
    frame_count: u32,
    len: usize,
    epoch: u64,
    tail: Vec<u8>,
}

/// Receiver whose sink forwards a summary of every frame.
fn receiver_with_channel(config: ReceiverConfig) -> (FrameReceiver, mpsc::Receiver<Seen>) {
    let (tx, rx) = mpsc::channel();
    let receiver = FrameReceiver::new(config);
    receiver.set_on_frame(move |message, pixels| {
        let _ = tx.send(Seen {
            frame_count: message.frame_count,
            len: pixels.len(),
            epoch: pixels.epoch(),
            tail: pixels.tail(2).to_vec(),
        });
    });
    (receiver, rx)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn init_then_remap_on_size_change() {
    let mut h = Harness::new("remap");
    let mut segment = h.segment(64 * 1024);
    let (mut receiver, rx) = receiver_with_channel(h.config());

    receiver.start().expect("start should succeed");
    assert_eq!(receiver.state(), ReceiverState::AwaitingInit);
    assert!(receiver.is_running());
    h.attach();

    segment.as_mut_slice()[14_998..15_000].copy_from_slice(&[0xAB, 0xCD]);
    h.publish(ControlMessage::new(1, descriptor(100, 50, 15_000)));
    let first = rx.recv_timeout(TIMEOUT).expect("init frame should arrive");
    assert_eq!(first.frame_count, 1);
    assert_eq!(first.len, 15_000);
    assert_eq!(first.tail, vec![0xAB, 0xCD]);
    assert_eq!(first.epoch, 1);

    assert!(wait_until(|| receiver.state().has_initialized()));
    assert_eq!(
        receiver.current_descriptor().expect("descriptor after init"),
        descriptor(100, 50, 15_000)
    );

    h.publish(ControlMessage::new(2, descriptor(100, 100, 30_000)));
    let second = rx.recv_timeout(TIMEOUT).expect("second frame should arrive");
    assert_eq!(second.frame_count, 2);
    assert_eq!(second.len, 30_000);
    assert_eq!(second.epoch, 2);

    h.publish(ControlMessage::new(3, descriptor(100, 100, 30_000)));
    let third = rx.recv_timeout(TIMEOUT).expect("third frame should arrive");
    assert_eq!(third.len, 30_000);
    assert_eq!(third.epoch, 2, "same size keeps the mapping");

    assert!(wait_until(|| receiver.stats().delivered == 3));
    let stats = receiver.stats();
    assert_eq!(stats.remaps, 1);
    assert_eq!(stats.received, 3);
    assert_eq!(stats.malformed, 0);

    receiver.stop().expect("stop should succeed");
    assert_eq!(
        receiver.state(),
        ReceiverState::Stopped {
            reason: StopReason::Requested
        }
    );
    assert!(matches!(
        receiver.current_descriptor(),
        Err(ReceiverError::NotInitialized)
    ));
}

#[test]
fn transposed_dimensions_do_not_remap() {
    let mut h = Harness::new("transpose");
    let _segment = h.segment(64 * 1024);
    let (mut receiver, rx) = receiver_with_channel(h.config());
    receiver.start().expect("start should succeed");
    h.attach();

    h.publish(ControlMessage::new(1, descriptor(100, 50, 15_000)));
    assert_eq!(rx.recv_timeout(TIMEOUT).expect("frame").epoch, 1);
    h.publish(ControlMessage::new(2, descriptor(50, 100, 15_000)));
    let seen = rx.recv_timeout(TIMEOUT).expect("frame");
    assert_eq!(seen.epoch, 1);
    assert_eq!(seen.len, 15_000);
    assert_eq!(receiver.stats().remaps, 0);

    assert!(wait_until(|| receiver
        .current_descriptor()
        .map(|d| d.width == 50)
        .unwrap_or(false)));
    receiver.stop().expect("stop should succeed");
}

#[test]
fn missing_shared_memory_fails_start_then_recovers() {
    let mut h = Harness::new("missing");
    let (mut receiver, rx) = receiver_with_channel(h.config());

    let err = receiver.start().expect_err("start should fail without segment");
    assert!(matches!(err, ReceiverError::Open(_)), "got {err:?}");
    assert_eq!(receiver.state(), ReceiverState::Idle);
    assert!(!receiver.is_running());

    let _segment = h.segment(4096);
    receiver.start().expect("start should succeed once the segment exists");
    assert_eq!(receiver.state(), ReceiverState::AwaitingInit);

    // The failed attempt's connection was released; wait for the live one.
    assert!(wait_until(|| {
        let _ = h.publisher.accept_pending();
        h.publisher.publish(&ControlMessage::new(1, descriptor(10, 10, 300))).unwrap_or(0) > 0
            && receiver.state().has_initialized()
    }));
    assert_eq!(rx.recv_timeout(TIMEOUT).expect("frame").len, 300);
    receiver.stop().expect("stop should succeed");
}

#[test]
fn missing_control_socket_is_a_connect_error() {
    let h = Harness::new("noconnect");
    let _segment = h.segment(4096);
    let config = ReceiverConfig::new(
        h.shm_name.clone(),
        format!("ipc://{}", h.dir.join("absent.sock").display()),
    );
    let mut receiver = FrameReceiver::new(config);

    assert!(matches!(
        receiver.start(),
        Err(ReceiverError::Connect { .. })
    ));
    assert_eq!(receiver.state(), ReceiverState::Idle);
}

#[test]
fn second_start_is_rejected() {
    let h = Harness::new("twice");
    let _segment = h.segment(4096);
    let mut receiver = FrameReceiver::new(h.config());

    receiver.start().expect("first start should succeed");
    let err = receiver.start().expect_err("second start should fail");
    assert!(matches!(
        err,
        ReceiverError::AlreadyRunning {
            state: "awaiting_init"
        }
    ));
    assert_eq!(receiver.state(), ReceiverState::AwaitingInit);
    receiver.stop().expect("stop should succeed");
}

#[test]
fn stop_is_idempotent() {
    let h = Harness::new("stop");
    let _segment = h.segment(4096);
    let mut receiver = FrameReceiver::new(h.config());

    receiver.stop().expect("stop before start is a no-op");
    assert_eq!(receiver.state(), ReceiverState::Idle);

    receiver.start().expect("start should succeed");
    receiver.stop().expect("first stop should succeed");
    receiver.stop().expect("second stop should be a no-op");
    assert_eq!(
        receiver.state(),
        ReceiverState::Stopped {
            reason: StopReason::Requested
        }
    );

    receiver.start().expect("restart after stop should succeed");
    assert!(receiver.is_running());
    receiver.stop().expect("stop should succeed");
}

#[test]
fn malformed_messages_are_dropped_without_state_change() {
    let mut h = Harness::new("malformed");
    let _segment = h.segment(4096);
    let (mut receiver, rx) = receiver_with_channel(h.config());
    receiver.start().expect("start should succeed");
    h.attach();

    h.publisher
        .publish_raw(&[0x7d, 1, 2, 3])
        .expect("publish should succeed");
    assert!(wait_until(|| receiver.stats().malformed == 1));
    assert_eq!(receiver.state(), ReceiverState::AwaitingInit);

    let truncated = ControlMessage::new(2, descriptor(10, 10, 300)).marshal();
    h.publisher
        .publish_raw(&truncated[..15])
        .expect("publish should succeed");
    assert!(wait_until(|| receiver.stats().malformed == 2));
    assert_eq!(receiver.state(), ReceiverState::AwaitingInit);

    h.publish(ControlMessage::new(3, descriptor(10, 10, 300)));
    let seen = rx.recv_timeout(TIMEOUT).expect("valid frame should arrive");
    assert_eq!(seen.frame_count, 3);
    assert!(rx.try_recv().is_err(), "malformed payloads never reach the sink");
    receiver.stop().expect("stop should succeed");
}

#[test]
fn unknown_layout_values_reach_the_sink() {
    let mut h = Harness::new("rawlayout");
    let _segment = h.segment(4096);
    let mut receiver = FrameReceiver::new(h.config());

    let (tx, rx) = mpsc::channel();
    receiver.set_on_frame(move |message, pixels| {
        let _ = tx.send((message.descriptor, pixels.len()));
    });
    receiver.start().expect("start should succeed");
    h.attach();

    let mut bytes = ControlMessage::new(1, descriptor(10, 10, 300)).marshal();
    bytes[10] = 9;
    bytes[15] = 7;
    assert_eq!(
        h.publisher.publish_raw(&bytes).expect("publish should succeed"),
        1
    );

    let (seen, len) = rx.recv_timeout(TIMEOUT).expect("frame should arrive");
    assert_eq!(seen.depth, Depth::Other(9));
    assert_eq!(seen.pixel_format, PixelFormat::Other(7));
    assert_eq!(len, 300);
    assert_eq!(receiver.stats().malformed, 0);
    assert!(receiver.state().has_initialized());
    receiver.stop().expect("stop should succeed");
}

#[test]
fn other_topics_are_filtered() {
    let mut h = Harness::new("topic");
    let _segment = h.segment(4096);
    let (mut receiver, rx) = receiver_with_channel(h.config());
    receiver.start().expect("start should succeed");
    h.attach();

    let mut foreign = ControlMessage::new(1, descriptor(10, 10, 300));
    foreign.topic = 0x01;
    h.publish(foreign);
    h.publish(ControlMessage::new(2, descriptor(10, 10, 300)));

    let seen = rx.recv_timeout(TIMEOUT).expect("frame should arrive");
    assert_eq!(seen.frame_count, 2);
    assert_eq!(receiver.stats().received, 1);
    receiver.stop().expect("stop should succeed");
}

#[test]
fn conflation_keeps_newest_while_sink_is_busy() {
    let mut h = Harness::new("conflate");
    let _segment = h.segment(4096);
    let receiver_config = h.config();
    let mut receiver = FrameReceiver::new(receiver_config);

    let (seen_tx, seen_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    receiver.set_on_frame(move |message, _pixels| {
        let _ = seen_tx.send(message.frame_count);
        if message.frame_count == 1 {
            let _ = release_rx.recv_timeout(TIMEOUT);
        }
    });

    receiver.start().expect("start should succeed");
    h.attach();

    h.publish(ControlMessage::new(1, descriptor(10, 10, 300)));
    assert_eq!(seen_rx.recv_timeout(TIMEOUT).expect("frame 1"), 1);

    // The sink is blocked on frame 1; both of these queue on the socket.
    h.publish(ControlMessage::new(2, descriptor(10, 10, 300)));
    h.publish(ControlMessage::new(3, descriptor(10, 10, 300)));
    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).expect("sink should be waiting");

    assert_eq!(seen_rx.recv_timeout(TIMEOUT).expect("frame 3"), 3);
    assert!(seen_rx.recv_timeout(Duration::from_millis(100)).is_err());
    receiver.stop().expect("stop should succeed");
}

#[test]
fn without_conflation_every_frame_is_delivered() {
    let mut h = Harness::new("noconflate");
    let _segment = h.segment(4096);
    let (mut receiver, rx) = receiver_with_channel(h.config().with_conflate(false));
    receiver.start().expect("start should succeed");
    h.attach();

    for n in 1..=5 {
        h.publish(ControlMessage::new(n, descriptor(10, 10, 300)));
    }
    let counts: Vec<u32> = (0..5)
        .map(|_| rx.recv_timeout(TIMEOUT).expect("frame").frame_count)
        .collect();
    assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    receiver.stop().expect("stop should succeed");
}

#[test]
fn frame_counter_regression_is_accepted() {
    let mut h = Harness::new("regress");
    let _segment = h.segment(4096);
    let (mut receiver, rx) = receiver_with_channel(h.config());
    receiver.start().expect("start should succeed");
    h.attach();

    h.publish(ControlMessage::new(u32::MAX, descriptor(10, 10, 300)));
    assert_eq!(rx.recv_timeout(TIMEOUT).expect("frame").frame_count, u32::MAX);
    h.publish(ControlMessage::new(0, descriptor(10, 10, 300)));
    assert_eq!(rx.recv_timeout(TIMEOUT).expect("frame").frame_count, 0);
    receiver.stop().expect("stop should succeed");
}

#[test]
fn init_map_failure_stops_and_notifies() {
    let mut h = Harness::new("initfail");
    let _segment = h.segment(1024);
    let mailbox = FrameMailbox::new();
    let mut receiver = FrameReceiver::new(h.config());
    receiver.set_sink(mailbox.sink());
    receiver.start().expect("start should succeed");
    h.attach();

    h.publish(ControlMessage::new(1, descriptor(100, 100, 30_000)));
    assert!(wait_until(|| !receiver.is_running()));
    assert!(matches!(
        receiver.state(),
        ReceiverState::Stopped {
            reason: StopReason::MapFailed(_)
        }
    ));
    assert!(mailbox.is_closed());
    assert!(mailbox.take().is_none());

    receiver.stop().expect("stop after failure should succeed");
    assert!(matches!(
        receiver.state(),
        ReceiverState::Stopped {
            reason: StopReason::MapFailed(_)
        }
    ));
}

#[test]
fn remap_failure_mid_stream_stops() {
    let mut h = Harness::new("remapfail");
    let _segment = h.segment(1024);
    let (mut receiver, rx) = receiver_with_channel(h.config());
    receiver.start().expect("start should succeed");
    h.attach();

    h.publish(ControlMessage::new(1, descriptor(10, 10, 300)));
    assert_eq!(rx.recv_timeout(TIMEOUT).expect("frame").len, 300);

    h.publish(ControlMessage::new(2, descriptor(100, 100, 30_000)));
    assert!(wait_until(|| matches!(
        receiver.state(),
        ReceiverState::Stopped {
            reason: StopReason::MapFailed(_)
        }
    )));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    receiver.stop().expect("stop should succeed");
}

#[test]
fn mailbox_sink_hands_off_snapshots() {
    let mut h = Harness::new("mailbox");
    let mut segment = h.segment(4096);
    let mailbox = FrameMailbox::new();
    let mut receiver = FrameReceiver::new(h.config());
    receiver.set_sink(mailbox.sink());
    receiver.start().expect("start should succeed");
    h.attach();

    segment.as_mut_slice()[..4].copy_from_slice(b"PIXL");
    h.publish(ControlMessage::new(7, descriptor(2, 2, 4)));
    let snapshot = mailbox.recv_timeout(TIMEOUT).expect("snapshot");
    assert_eq!(snapshot.message.frame_count, 7);
    assert_eq!(snapshot.pixels.as_ref(), b"PIXL");

    receiver.stop().expect("stop should succeed");
    assert!(mailbox.is_closed());
    assert_eq!(mailbox.stop_reason(), Some(StopReason::Requested));
    // Bytes copied out of shared memory stay readable after unmap.
    assert_eq!(snapshot.pixels.as_ref(), b"PIXL");
}

#[test]
fn sink_runs_on_named_worker_and_can_be_swapped() {
    let mut h = Harness::new("swap");
    let _segment = h.segment(4096);
    let mut receiver = FrameReceiver::new(h.config());

    let (first_tx, first_rx) = mpsc::channel();
    receiver.set_on_frame(move |message, _| {
        let name = thread::current().name().map(str::to_string);
        let _ = first_tx.send((message.frame_count, name));
    });
    receiver.start().expect("start should succeed");
    h.attach();

    h.publish(ControlMessage::new(1, descriptor(10, 10, 300)));
    let (count, name) = first_rx.recv_timeout(TIMEOUT).expect("frame");
    assert_eq!(count, 1);
    assert_eq!(name.as_deref(), Some(WORKER_THREAD_NAME));

    let (second_tx, second_rx) = mpsc::channel();
    receiver.set_on_frame(move |message, _| {
        let _ = second_tx.send(message.frame_count);
    });
    h.publish(ControlMessage::new(2, descriptor(10, 10, 300)));
    assert_eq!(second_rx.recv_timeout(TIMEOUT).expect("frame"), 2);
    assert!(first_rx.try_recv().is_err());
    receiver.stop().expect("stop should succeed");
}

#[test]
fn reconnects_after_producer_restart() {
    let mut h = Harness::new("reconnect");
    let _segment = h.segment(4096);
    let (mut receiver, rx) = receiver_with_channel(h.config());
    receiver.start().expect("start should succeed");
    h.attach();

    h.publish(ControlMessage::new(1, descriptor(10, 10, 300)));
    assert_eq!(rx.recv_timeout(TIMEOUT).expect("frame").frame_count, 1);

    // A new producer binds over the old socket; dropping the old one closes
    // the receiver's connection and it reconnects to the new listener.
    h.publisher = FramePublisher::bind(&h.address).expect("rebind should succeed");
    h.attach();

    h.publish(ControlMessage::new(2, descriptor(10, 10, 300)));
    assert_eq!(rx.recv_timeout(TIMEOUT).expect("frame").frame_count, 2);
    assert!(receiver.state().has_initialized());
    receiver.stop().expect("stop should succeed");
}

#[test]
fn drop_stops_the_worker() {
    let mut h = Harness::new("drop");
    let _segment = h.segment(4096);
    let mailbox = FrameMailbox::new();
    {
        let mut receiver = FrameReceiver::new(h.config());
        receiver.set_sink(mailbox.sink());
        receiver.start().expect("start should succeed");
        h.attach();
    }
    assert!(mailbox.is_closed());
    assert!(wait_until(|| {
        let _ = h.publisher.publish(&ControlMessage::new(1, descriptor(10, 10, 300)));
        h.publisher.subscriber_count() == 0
    }));
}
