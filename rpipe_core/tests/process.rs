//! Handshake and streaming behavior of the external endpoint process,
//! exercised with small shell scripts standing in for the real executable.

use rpipe_core::process::{exit_code, ExternalProcess, ProcessError};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[tokio::test]
async fn stdout_and_stderr_are_merged_in_emission_order() {
    let dir = tempdir().unwrap();
    let exe = write_script(
        dir.path(),
        "endpoint",
        "echo ready\necho out1\necho err1 >&2\necho out2\n",
    );

    let mut endpoint = ExternalProcess::spawn(&exe).unwrap();
    let first = endpoint
        .await_ready(Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(first, "ready");

    let mut rest = Vec::new();
    while let Some(line) = endpoint.next_line().await.unwrap() {
        rest.push(line);
    }
    assert_eq!(rest, ["out1", "err1", "out2"]);

    let status = endpoint.wait().await.unwrap();
    assert_eq!(exit_code(status), 0);
}

#[tokio::test]
async fn await_ready_times_out_on_a_silent_child() {
    let dir = tempdir().unwrap();
    let exe = write_script(dir.path(), "endpoint", "sleep 5\n");

    let mut endpoint = ExternalProcess::spawn(&exe).unwrap();
    let err = endpoint
        .await_ready(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Timeout(_)));

    // Killed, so the status carries the signal rather than a code.
    let status = endpoint.kill_and_wait().await.unwrap();
    assert_eq!(exit_code(status), 128 + 9);
}

#[tokio::test]
async fn await_ready_reports_end_of_stream_for_an_early_exit() {
    let dir = tempdir().unwrap();
    let exe = write_script(dir.path(), "endpoint", "exit 3\n");

    let mut endpoint = ExternalProcess::spawn(&exe).unwrap();
    let err = endpoint
        .await_ready(Some(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::EndOfStream));

    // The kill is best-effort on an already-exited child; the original exit
    // code is still reaped.
    let status = endpoint.kill_and_wait().await.unwrap();
    assert_eq!(exit_code(status), 3);
}

#[tokio::test]
async fn child_exit_code_is_propagated() {
    let dir = tempdir().unwrap();
    let exe = write_script(dir.path(), "endpoint", "echo ready\nexit 7\n");

    let mut endpoint = ExternalProcess::spawn(&exe).unwrap();
    endpoint
        .await_ready(Some(Duration::from_secs(5)))
        .await
        .unwrap();
    let status = endpoint.wait().await.unwrap();
    assert_eq!(exit_code(status), 7);
}

#[tokio::test]
async fn stdin_is_connected_as_a_pipe() {
    let mut endpoint = ExternalProcess::spawn(Path::new("/bin/cat")).unwrap();
    endpoint
        .stdin()
        .unwrap()
        .write_all(b"hello\n")
        .await
        .unwrap();

    let echoed = endpoint
        .await_ready(Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(echoed, "hello");

    endpoint.kill_and_wait().await.unwrap();
}
