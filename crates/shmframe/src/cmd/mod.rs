use std::time::Duration;

use clap::{Args, Subcommand};
use shmframe::receiver::{DEFAULT_CONTROL_ADDRESS, DEFAULT_SHM_NAME};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod produce;
pub mod receive;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive frames and print their metadata.
    Receive(ReceiveArgs),
    /// Publish a synthetic test pattern.
    Produce(ProduceArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Receive(args) => receive::run(args, format),
        Command::Produce(args) => produce::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Shared-memory object the producer writes frames into.
    #[arg(long, env = "SHMFRAME_SHM_NAME", default_value = DEFAULT_SHM_NAME)]
    pub shm: String,
    /// Control channel address (ipc:///path or a socket path).
    #[arg(long, env = "SHMFRAME_CONTROL_ADDR", default_value = DEFAULT_CONTROL_ADDRESS)]
    pub addr: String,
    /// Exit after printing this many frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Idle wait between control channel polls (e.g. 1ms, 5ms).
    #[arg(long, default_value = "1ms")]
    pub poll_interval: String,
    /// Deliver every control message instead of only the newest.
    #[arg(long)]
    pub no_conflate: bool,
    /// Report frame sizes scaled by this factor, in (0, 1].
    #[arg(long)]
    pub scale: Option<f32>,
    /// Trailing payload bytes shown in hex.
    #[arg(long, default_value_t = 8)]
    pub tail: usize,
    /// Give up if no frame arrives within this long (e.g. 5s).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProduceArgs {
    /// Shared-memory object to create.
    #[arg(long, env = "SHMFRAME_SHM_NAME", default_value = DEFAULT_SHM_NAME)]
    pub shm: String,
    /// Control channel address to bind.
    #[arg(long, env = "SHMFRAME_CONTROL_ADDR", default_value = DEFAULT_CONTROL_ADDRESS)]
    pub addr: String,
    #[arg(long, default_value_t = 640, value_parser = clap::value_parser!(u16).range(1..))]
    pub width: u16,
    #[arg(long, default_value_t = 480, value_parser = clap::value_parser!(u16).range(1..))]
    pub height: u16,
    /// 1 (GRAY), 3 (BGR) or 4 (BGRA).
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub channels: u8,
    /// Frames per second.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,
    /// Stop after this many frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Halve the height every N frames, forcing consumers to remap.
    #[arg(long)]
    pub resize_every: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Include build details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s`, `1m`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| CliError::new(USAGE, format!("duration out of range: {input}"))),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
