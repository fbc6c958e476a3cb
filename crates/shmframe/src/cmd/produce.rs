use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use shmframe::receiver::FramePublisher;
use shmframe::shm::ShmSegment;
use shmframe::transport::ControlAddress;
use shmframe::wire::{ControlMessage, Depth, FrameDescriptor, PixelFormat};
use tracing::{debug, info};

use crate::cmd::receive::install_ctrlc_handler;
use crate::cmd::ProduceArgs;
use crate::exit::{receiver_error, shm_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_summary, OutputFormat};

#[derive(Serialize)]
struct ProduceSummary<'a> {
    schema_id: &'a str,
    shm: &'a str,
    address: String,
    published: u64,
    delivered: u64,
    subscribers: usize,
    elapsed_ms: u128,
}

pub fn run(args: ProduceArgs, format: OutputFormat) -> CliResult<i32> {
    if !(args.fps.is_finite() && args.fps > 0.0) {
        return Err(CliError::new(USAGE, "--fps must be a positive number"));
    }
    let interval = Duration::from_secs_f64(1.0 / args.fps);
    let full = descriptor(args.width, args.height, args.channels)?;

    let address = ControlAddress::parse(&args.addr)
        .map_err(|err| transport_error("invalid control address", err))?;
    let mut segment = ShmSegment::create(&args.shm, full.payload_byte_size as usize)
        .map_err(|err| shm_error("segment setup failed", err))?;
    let mut publisher = FramePublisher::bind(&address)
        .map_err(|err| receiver_error("control socket setup failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let half = descriptor(args.width, (args.height / 2).max(1), args.channels)?;
    let started = Instant::now();
    let mut published = 0u64;
    let mut delivered = 0u64;
    let mut frame_count = 0u32;

    info!(
        shm = segment.name(),
        address = %address,
        frame = %full,
        fps = args.fps,
        "producing test pattern"
    );

    while running.load(Ordering::SeqCst) && args.count.is_none_or(|count| published < count) {
        let tick = Instant::now();
        let current = match args.resize_every {
            Some(every) if every > 0 && (published / every) % 2 == 1 => half,
            _ => full,
        };

        let len = current.payload_byte_size as usize;
        paint(&mut segment.as_mut_slice()[..len], &current, frame_count);
        let reached = publisher
            .publish(&ControlMessage::new(frame_count, current))
            .map_err(|err| receiver_error("publish failed", err))?;
        debug!(frame_count, reached, "published frame");

        published += 1;
        delivered += reached as u64;
        frame_count = frame_count.wrapping_add(1);

        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
    }

    let summary = ProduceSummary {
        schema_id: "shmframe/cli/v1/produce-summary",
        shm: segment.name(),
        address: address.to_string(),
        published,
        delivered,
        subscribers: publisher.subscriber_count(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    print_summary(
        &summary,
        &[
            ("shm", summary.shm.to_string()),
            ("address", summary.address.clone()),
            ("published", published.to_string()),
            ("delivered", delivered.to_string()),
            ("subscribers", summary.subscribers.to_string()),
            ("elapsed_ms", summary.elapsed_ms.to_string()),
        ],
        format,
    );

    Ok(SUCCESS)
}

fn descriptor(width: u16, height: u16, channels: u8) -> CliResult<FrameDescriptor> {
    let pixel_format = match channels {
        1 => PixelFormat::Gray,
        2 => PixelFormat::Yuyv,
        3 => PixelFormat::Bgr,
        4 => PixelFormat::Bgra,
        other => {
            return Err(CliError::new(
                USAGE,
                format!("unsupported channel count {other}"),
            ))
        }
    };
    let mut descriptor = FrameDescriptor {
        width,
        height,
        channels,
        depth: Depth::U8,
        payload_byte_size: 0,
        pixel_format,
    };
    descriptor.payload_byte_size = descriptor
        .packed_size()
        .and_then(|size| u32::try_from(size).ok())
        .ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("frame {width}x{height}x{channels} is too large"),
            )
        })?;
    Ok(descriptor)
}

/// Diagonal gradient that shifts one step per frame.
fn paint(pixels: &mut [u8], descriptor: &FrameDescriptor, frame_count: u32) {
    let width = usize::from(descriptor.width);
    let channels = usize::from(descriptor.channels);
    let row_len = width * channels;
    for (y, row) in pixels.chunks_mut(row_len).enumerate() {
        for (i, sample) in row.iter_mut().enumerate() {
            let x = i / channels;
            let c = i % channels;
            *sample = (x + y + c * 64) as u8 ^ (frame_count as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_matches_channel_layout() {
        let d = descriptor(4, 2, 3).unwrap();
        assert_eq!(d.pixel_format, PixelFormat::Bgr);
        assert_eq!(d.payload_byte_size, 24);
        assert_eq!(descriptor(4, 2, 1).unwrap().pixel_format, PixelFormat::Gray);
        assert_eq!(descriptor(4, 2, 4).unwrap().payload_byte_size, 32);
        assert!(descriptor(4, 2, 5).is_err());
    }

    #[test]
    fn pattern_moves_between_frames() {
        let d = descriptor(8, 4, 1).unwrap();
        let mut first = vec![0u8; 32];
        let mut second = vec![0u8; 32];
        paint(&mut first, &d, 0);
        paint(&mut second, &d, 1);
        assert_ne!(first, second);
        assert_eq!(first[0], 0);
        assert_eq!(first[9], 2);
    }
}
