use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shmframe::receiver::{FrameMailbox, FrameReceiver, ReceiverConfig, ScaleFactor};
use tracing::info;

use crate::cmd::{parse_duration, ReceiveArgs};
use crate::exit::{receiver_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_frame, OutputFormat};

/// How long one mailbox wait lasts before the Ctrl-C flag is checked again.
const WAIT_SLICE: Duration = Duration::from_millis(100);

pub fn run(args: ReceiveArgs, format: OutputFormat) -> CliResult<i32> {
    let poll_interval = parse_duration(&args.poll_interval)?;
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let mut config = ReceiverConfig::new(args.shm, args.addr)
        .with_poll_interval(poll_interval)
        .with_conflate(!args.no_conflate);
    if let Some(scale) = args.scale {
        config = config.with_scale_factor(scale);
    }
    config
        .validate()
        .map_err(|err| receiver_error("invalid receiver settings", err))?;
    let scale = config
        .scale_factor
        .map(ScaleFactor::new)
        .transpose()
        .map_err(|err| receiver_error("invalid receiver settings", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mailbox = FrameMailbox::new();
    let mut receiver = FrameReceiver::new(config);
    receiver.set_sink(mailbox.sink());
    receiver
        .start()
        .map_err(|err| receiver_error("receiver start failed", err))?;

    let started = Instant::now();
    let mut printed = 0usize;

    let outcome = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(SUCCESS);
        }

        if let Some(snapshot) = mailbox.recv_timeout(WAIT_SLICE) {
            print_frame(&snapshot, scale, args.tail, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                break Ok(SUCCESS);
            }
            continue;
        }

        if let Some(reason) = mailbox.stop_reason() {
            break Err(CliError::new(FAILURE, format!("receiver stopped: {reason}")));
        }
        if let Some(limit) = timeout {
            if printed == 0 && started.elapsed() >= limit {
                break Err(CliError::new(
                    TIMEOUT,
                    format!("no frame received within {}ms", limit.as_millis()),
                ));
            }
        }
    };

    let stopped = receiver.stop();
    let stats = receiver.stats();
    info!(
        printed,
        received = stats.received,
        delivered = stats.delivered,
        malformed = stats.malformed,
        remaps = stats.remaps,
        skipped = mailbox.dropped(),
        "receive finished"
    );

    match (outcome, stopped) {
        (Err(err), _) => Err(err),
        (Ok(_), Err(err)) => Err(receiver_error("receiver stop failed", err)),
        (Ok(code), Ok(())) => Ok(code),
    }
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
