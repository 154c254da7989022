//! Integration tests for the `replay` binary.

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Helper to run `replay`
fn replay(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args([
            "run",
            "--package",
            "replay-cli",
            "--bin",
            "replay",
            "--quiet",
            "--",
        ])
        .args(args)
        .output()
        .expect("Failed to execute replay")
}

#[test]
fn test_help() {
    let output = replay(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("replay"));
}

#[test]
fn test_run_creates_a_file() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("out.txt");
    let playlist = temp.path().join("playlist.json");
    fs::write(
        &playlist,
        format!(
            r#"[{{"action":"create","to":"{}","content":"hello"}}]"#,
            target.display()
        ),
    )
    .unwrap();

    let output = replay(&["run", playlist.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
}

#[test]
fn test_stream_reads_ndjson_from_stdin() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("out.txt");

    let mut child = Command::new("cargo")
        .args([
            "run",
            "--package",
            "replay-cli",
            "--bin",
            "replay",
            "--quiet",
            "--",
            "stream",
            "--ndjson",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let step = format!(r#"{{"action":"create","to":"{}","content":"streamed"}}"#, target.display());
    child.stdin.as_mut().unwrap().write_all(step.as_bytes()).unwrap();
    child.stdin.take();

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&target).unwrap(), "streamed");
}

#[test]
fn test_analyze_reports_a_dependency_edge_without_running_anything() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("child_dir");
    let playlist = temp.path().join("playlist.json");
    fs::write(
        &playlist,
        format!(
            r#"[{{"action":"create-directory","to":"{}"}},{{"action":"echo","content":"hi"}}]"#,
            dir.display()
        ),
    )
    .unwrap();

    let output = replay(&["analyze", playlist.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(!dir.exists());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("task(s)"));
}

#[test]
fn test_run_reports_failure_for_malformed_playlist() {
    let temp = TempDir::new().unwrap();
    let playlist = temp.path().join("playlist.json");
    fs::write(&playlist, "not valid json").unwrap();

    let output = replay(&["run", playlist.to_str().unwrap()]);
    assert!(!output.status.success());
}
