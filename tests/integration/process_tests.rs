//! Child process launch and termination.

#![cfg(unix)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::time::Instant;

use mcp_inspector::rpc::process::{spawn_server, LaunchSpec};
use mcp_inspector::AppError;

use super::test_helpers::sh_spec;

async fn first_stdout_line(stdout: tokio::process::ChildStdout) -> String {
    let mut lines = BufReader::new(stdout).lines();
    tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("child printed within 5s")
        .expect("read child stdout")
        .expect("child printed a line")
}

#[tokio::test]
async fn missing_program_is_command_not_found() {
    let spec = LaunchSpec::new("ghost", "mcp-inspector-no-such-binary", vec![]);
    let err = spawn_server(&spec).expect_err("spawn must fail");
    assert!(
        matches!(err, AppError::CommandNotFound(_)),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn missing_working_dir_is_spawn_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut spec = sh_spec("cwd", "pwd");
    spec.working_dir = Some(dir.path().join("no-such-dir"));

    let err = spawn_server(&spec).expect_err("spawn must fail");
    assert!(matches!(err, AppError::Spawn(_)), "unexpected error: {err}");
    assert!(!err.is_command_not_found());
    assert!(err.to_string().contains("no-such-dir"), "{err}");
}

#[tokio::test]
async fn utf8_environment_is_forced() {
    let spec = sh_spec("env", "echo \"$PYTHONUTF8:$PYTHONIOENCODING:${VIRTUAL_ENV-unset}\"");
    let (mut process, streams) = spawn_server(&spec).expect("spawn sh");

    assert_eq!(first_stdout_line(streams.stdout).await, "1:utf-8:unset");
    process.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn per_server_env_overrides_apply() {
    let mut spec = sh_spec("env", "echo \"$API_TOKEN\"");
    spec.env.insert("API_TOKEN".into(), "abc123".into());
    let (mut process, streams) = spawn_server(&spec).expect("spawn sh");

    assert_eq!(first_stdout_line(streams.stdout).await, "abc123");
    process.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn working_directory_is_applied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let expected = dir.path().canonicalize().expect("canonical tempdir");
    let mut spec = sh_spec("cwd", "pwd -P");
    spec.working_dir = Some(dir.path().to_path_buf());
    let (mut process, streams) = spawn_server(&spec).expect("spawn sh");

    assert_eq!(
        first_stdout_line(streams.stdout).await,
        expected.display().to_string()
    );
    process.stop(Duration::from_secs(1)).await;
}

/// A server that exits on end-of-file stops well within the grace period.
#[tokio::test]
async fn stop_is_prompt_for_cooperative_server() {
    let spec = sh_spec("cat", "cat");
    let (mut process, streams) = spawn_server(&spec).expect("spawn sh");
    assert!(process.id().is_some());

    drop(streams.stdin);
    let started = Instant::now();
    process.stop(Duration::from_secs(3)).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(process.id().is_none());
    assert!(process.has_exited());
}

/// SIGTERM is ignored, so the process is killed once the grace expires.
#[tokio::test]
async fn stop_kills_after_grace() {
    let spec = sh_spec("stubborn", "trap '' TERM; echo ready; while :; do sleep 1; done");
    let (mut process, streams) = spawn_server(&spec).expect("spawn sh");
    let mut stdout = streams.stdout;

    // Wait until the trap is installed.
    let mut ready = [0_u8; 6];
    tokio::time::timeout(Duration::from_secs(5), stdout.read_exact(&mut ready))
        .await
        .expect("child became ready")
        .expect("read ready marker");
    assert_eq!(&ready, b"ready\n");

    let grace = Duration::from_millis(300);
    let started = Instant::now();
    process.stop(grace).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= grace, "killed before grace: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "kill took {elapsed:?}");
    assert!(process.has_exited());
}

#[tokio::test]
async fn stop_twice_is_a_noop() {
    let spec = sh_spec("cat", "cat");
    let (mut process, _streams) = spawn_server(&spec).expect("spawn sh");

    process.stop(Duration::from_millis(500)).await;
    let started = Instant::now();
    process.stop(Duration::from_millis(500)).await;

    assert!(started.elapsed() < Duration::from_millis(100));
}
