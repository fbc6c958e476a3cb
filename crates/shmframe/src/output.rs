use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use shmframe::receiver::{FrameSnapshot, ScaleFactor};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    schema_id: &'a str,
    frame_count: u32,
    width: u16,
    height: u16,
    channels: u8,
    depth: String,
    pixel_format: String,
    payload_byte_size: u32,
    epoch: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    scaled: Option<[u16; 2]>,
    tail: String,
    timestamp: String,
}

/// Print one received frame. `tail` is how many trailing payload bytes to
/// show in hex; `Raw` writes the whole payload instead.
pub fn print_frame(
    snapshot: &FrameSnapshot,
    scale: Option<ScaleFactor>,
    tail: usize,
    format: OutputFormat,
) {
    let descriptor = &snapshot.message.descriptor;
    let scaled = scale.map(|scale| {
        let (w, h) = scale.apply(descriptor.width, descriptor.height);
        [w, h]
    });
    let tail_hex = hex(snapshot.tail(tail));

    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                schema_id: "shmframe/cli/v1/frame-received",
                frame_count: snapshot.message.frame_count,
                width: descriptor.width,
                height: descriptor.height,
                channels: descriptor.channels,
                depth: descriptor.depth.to_string(),
                pixel_format: descriptor.pixel_format.to_string(),
                payload_byte_size: descriptor.payload_byte_size,
                epoch: snapshot.epoch,
                scaled,
                tail: tail_hex,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FRAME", "SIZE", "FORMAT", "BYTES", "EPOCH", "TAIL"])
                .add_row(vec![
                    snapshot.message.frame_count.to_string(),
                    dimensions(descriptor.width, descriptor.height, scaled),
                    format!(
                        "{}x{} {}",
                        descriptor.channels, descriptor.depth, descriptor.pixel_format
                    ),
                    descriptor.payload_byte_size.to_string(),
                    snapshot.epoch.to_string(),
                    tail_hex,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "frame={} size={} format={} bytes={} epoch={} tail={}",
                snapshot.message.frame_count,
                dimensions(descriptor.width, descriptor.height, scaled),
                descriptor.pixel_format,
                descriptor.payload_byte_size,
                snapshot.epoch,
                tail_hex
            );
        }
        OutputFormat::Raw => {
            print_raw(&snapshot.pixels);
        }
    }
}

/// Print a flat record of `(label, value)` pairs; `record` is the JSON form.
pub fn print_summary<T: Serialize>(record: &T, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (label, value) in rows {
                table.add_row(vec![label.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = rows
                .iter()
                .map(|(label, value)| format!("{label}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn dimensions(width: u16, height: u16, scaled: Option<[u16; 2]>) -> String {
    match scaled {
        Some([w, h]) => format!("{width}x{height} -> {w}x{h}"),
        None => format!("{width}x{height}"),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
