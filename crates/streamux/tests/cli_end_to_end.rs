#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::net::UdpSocket;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "streamux-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn free_udp_addr() -> String {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("probe socket should bind");
    socket
        .local_addr()
        .expect("probe socket should have an address")
        .to_string()
}

/// Start `listen` and block until it logs that it is bound.
fn spawn_listener(args: &[&str]) -> (Child, mpsc::Receiver<String>) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_streamux"))
        .args(["--log-level", "info", "--format", "json", "listen"])
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen command should start");

    let stderr = child.stderr.take().expect("stderr should be piped");
    let (ready_tx, ready_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut ready = Some(ready_tx);
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if line.contains("listening") {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
            }
        }
    });
    ready_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("listener should report it is listening");

    let stdout = child.stdout.take().expect("stdout should be piped");
    let (out_tx, out_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut all = String::new();
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            all.push_str(&line);
            all.push('\n');
        }
        let _ = out_tx.send(all);
    });

    (child, out_rx)
}

#[test]
fn send_and_listen_roundtrip_with_saved_streams() {
    let dir = unique_temp_dir("roundtrip");
    let out_dir = dir.join("out");
    let input = dir.join("input.bin");
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&input, &payload).expect("input should be writable");

    let addr = free_udp_addr();
    let out_dir_arg = out_dir.to_string_lossy().to_string();
    let (mut listener, stdout) = spawn_listener(&[&addr, "--output-dir", &out_dir_arg]);

    let output = Command::new(env!("CARGO_BIN_EXE_streamux"))
        .args(["--log-level", "error", "--format", "json", "send", &addr])
        .args(["--data", "hello streams", "--file"])
        .arg(&input)
        .args(["--chunk-size", "1400", "--timeout", "5s"])
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let sent = String::from_utf8_lossy(&output.stdout);
    assert!(sent.contains("\"streams\":2"));
    assert!(sent.contains(&format!("\"bytes_sent\":{}", 13 + payload.len())));

    let status = listener.wait().expect("listener should exit after FIN");
    assert!(status.success());

    let report = stdout
        .recv_timeout(Duration::from_secs(5))
        .expect("listener report should be captured");
    assert!(report.contains("\"state\":\"closed\""));
    assert!(report.contains("\"throughput\":{\"elapsed_us\":"));
    assert!(report.contains("\"bytes_per_sec\":"));

    assert_eq!(
        std::fs::read(out_dir.join("stream_0.bin")).expect("stream 0 should be saved"),
        b"hello streams"
    );
    assert_eq!(
        std::fs::read(out_dir.join("stream_1.bin")).expect("stream 1 should be saved"),
        payload
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_silent_address_times_out_with_124() {
    let silent = UdpSocket::bind("127.0.0.1:0").expect("silent socket should bind");
    let addr = silent
        .local_addr()
        .expect("silent socket should have an address")
        .to_string();

    let output = Command::new(env!("CARGO_BIN_EXE_streamux"))
        .args(["send", &addr, "--data", "x", "--timeout", "200ms"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn zero_slice_configuration_exits_with_usage() {
    let silent = UdpSocket::bind("127.0.0.1:0").expect("silent socket should bind");
    let addr = silent
        .local_addr()
        .expect("silent socket should have an address")
        .to_string();

    let output = Command::new(env!("CARGO_BIN_EXE_streamux"))
        .args(["send", &addr, "--chunk-size", "1"])
        .args(["--data", "a", "--data", "b", "--data", "c", "--data", "d"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));

    silent
        .set_read_timeout(Some(Duration::from_millis(50)))
        .expect("timeout should apply");
    let mut buf = [0u8; 64];
    assert!(silent.recv_from(&mut buf).is_err(), "nothing should be sent");
}

#[test]
fn version_extended_reports_wire_sizes() {
    let output = Command::new(env!("CARGO_BIN_EXE_streamux"))
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: streamux"));
    assert!(stdout.contains("header=9B frame_header=18B"));
    assert!(stdout.contains("build_profile: "));
    assert!(!stdout.contains("build_target: unknown"));
}

#[test]
fn bad_duration_exits_with_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_streamux"))
        .args(["send", "127.0.0.1:9", "--timeout", "soon"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}
