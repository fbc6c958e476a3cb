#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_suffix() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    )
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shmframe-cli-{tag}-{}", unique_suffix()));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn shmframe() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_shmframe"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn receive(shm: &str, addr: &str, extra: &[&str]) -> Output {
    shmframe()
        .args(["--format", "json", "receive", "--shm", shm, "--addr", addr])
        .args(extra)
        .output()
        .expect("receive should run")
}

#[test]
fn version_prints_package_version() {
    let output = shmframe().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("shmframe {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_as_json() {
    let output = shmframe()
        .args(["--format", "json", "version", "--extended"])
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version output should be json");
    assert_eq!(value["name"], "shmframe");
    assert_eq!(value["worker_thread"], "shmframe-receiver");
}

#[test]
fn missing_control_socket_exits_with_failure() {
    let dir = unique_temp_dir("missing");
    let addr = format!("ipc://{}", dir.join("absent.sock").display());

    let output = receive("/shmframe-cli-absent", &addr, &["--count", "1"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("receiver start failed"), "stderr: {stderr}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bad_settings_are_usage_errors() {
    let dir = unique_temp_dir("usage");
    let addr = format!("ipc://{}", dir.join("ctl.sock").display());

    for extra in [
        ["--poll-interval", "0ms"],
        ["--scale", "1.5"],
        ["--timeout", "soon"],
    ] {
        let output = receive("/shmframe-cli-usage", &addr, &extra);
        assert_eq!(output.status.code(), Some(64), "{extra:?}");
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn produce_then_receive_prints_frames() {
    let dir = unique_temp_dir("e2e");
    let shm = format!("/shmframe-cli-{}", unique_suffix());
    let addr = format!("ipc://{}", dir.join("ctl.sock").display());

    let producer = shmframe()
        .args(["--format", "json", "produce", "--shm", &shm, "--addr", &addr])
        .args(["--width", "16", "--height", "8", "--channels", "3"])
        .args(["--fps", "200", "--count", "400"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("produce should start");

    let deadline = Instant::now() + Duration::from_secs(10);
    let output = loop {
        let output = receive(
            &shm,
            &addr,
            &["--count", "3", "--timeout", "5s", "--scale", "0.5"],
        );
        if output.status.success() || Instant::now() >= deadline {
            break output;
        }
        thread::sleep(Duration::from_millis(25));
    };

    let produced = producer
        .wait_with_output()
        .expect("producer should finish");
    let _ = std::fs::remove_dir_all(&dir);

    assert!(
        output.status.success(),
        "receive failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let frames: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!(frame["width"], 16);
        assert_eq!(frame["height"], 8);
        assert_eq!(frame["channels"], 3);
        assert_eq!(frame["pixel_format"], "BGR");
        assert_eq!(frame["payload_byte_size"], 384);
        assert_eq!(frame["scaled"], serde_json::json!([8, 4]));
        assert_eq!(frame["tail"].as_str().map(str::len), Some(16));
    }

    assert!(produced.status.success());
    let summary: serde_json::Value =
        serde_json::from_slice(&produced.stdout).expect("summary should be json");
    assert_eq!(summary["published"], 400);
}
