//! Integration tests for `replay serve` / `replay submit` / `replay submit-batch`.

use std::fs;
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_server(socket: &std::path::Path) -> ServerGuard {
    let child = Command::new("cargo")
        .args([
            "run",
            "--package",
            "replay-cli",
            "--bin",
            "replay",
            "--quiet",
            "--",
            "serve",
            "--socket",
        ])
        .arg(socket)
        .spawn()
        .expect("failed to spawn replay serve");

    let deadline = Instant::now() + Duration::from_secs(30);
    while !socket.exists() {
        if Instant::now() > deadline {
            panic!("server did not create socket at {}", socket.display());
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    ServerGuard(child)
}

#[test]
fn test_submit_runs_a_playlist_over_the_socket() {
    let temp = TempDir::new().unwrap();
    let socket = temp.path().join("replay.sock");
    let _server = spawn_server(&socket);

    let target = temp.path().join("out.txt");
    let playlist = temp.path().join("playlist.json");
    fs::write(
        &playlist,
        format!(
            r#"[{{"action":"create","to":"{}","content":"via-socket"}}]"#,
            target.display()
        ),
    )
    .unwrap();

    let output = Command::new("cargo")
        .args([
            "run",
            "--package",
            "replay-cli",
            "--bin",
            "replay",
            "--quiet",
            "--",
            "submit",
            "--socket",
        ])
        .arg(&socket)
        .arg(&playlist)
        .output()
        .expect("failed to run replay submit");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&target).unwrap(), "via-socket");
}

#[test]
fn test_submit_batch_queues_steps_incrementally() {
    let temp = TempDir::new().unwrap();
    let socket = temp.path().join("replay.sock");
    let _server = spawn_server(&socket);

    let target = temp.path().join("out.txt");
    let playlist = temp.path().join("playlist.json");
    fs::write(
        &playlist,
        format!(
            r#"[{{"action":"create","to":"{}","content":"via-batch"}}]"#,
            target.display()
        ),
    )
    .unwrap();

    let output = Command::new("cargo")
        .args([
            "run",
            "--package",
            "replay-cli",
            "--bin",
            "replay",
            "--quiet",
            "--",
            "submit-batch",
            "--socket",
        ])
        .arg(&socket)
        .arg(&playlist)
        .output()
        .expect("failed to run replay submit-batch");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&target).unwrap(), "via-batch");
}
