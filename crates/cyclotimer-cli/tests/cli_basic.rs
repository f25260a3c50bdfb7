//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run with the config directory pointed
//! at a temporary directory, and verify outputs.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

fn cli(config_dir: &Path) -> Command {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "-q", "-p", "cyclotimer-cli", "--"])
        .env("CYCLOTIMER_CONFIG_DIR", config_dir)
        .env_remove("CYCLOTIMER_LOG");
    cmd
}

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(config_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = cli(config_dir)
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_config_get_default() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "timer.rest_duration_ms"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "20000");
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_config_set_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "timer.repeat_count", "4"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(dir.path(), &["config", "get", "timer.repeat_count"]);
    assert_eq!(stdout.trim(), "4");
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "set", "timer.active_duration_ms", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
    let (stdout, _, _) = run_cli(dir.path(), &["config", "get", "timer.active_duration_ms"]);
    assert_eq!(stdout.trim(), "1200000");
}

#[test]
fn test_config_get_unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "timer.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown config key"));
}

#[test]
fn test_config_list_and_reset() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["config", "set", "notifications.enable_sound", "false"]);
    let (stdout, _, code) = run_cli(dir.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("notifications.enable_sound = false"));

    let (_, _, code) = run_cli(dir.path(), &["config", "reset"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(dir.path(), &["config", "list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["notifications"]["enable_sound"], true);
}

#[test]
fn test_run_short_session_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = cli(dir.path())
        .args([
            "run", "--active", "200ms", "--rest", "100ms", "--repeat", "1", "--json",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn CLI");

    // Keep stdin open so the session is not stopped by EOF.
    let stdin = child.stdin.take();
    let mut stdout = String::new();
    child
        .stdout
        .take()
        .unwrap()
        .read_to_string(&mut stdout)
        .unwrap();
    drop(stdin);
    assert!(child.wait().unwrap().success());

    let types: Vec<String> = stdout
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .filter_map(|v| v["type"].as_str().map(str::to_string))
        .collect();
    assert_eq!(types.first().map(String::as_str), Some("started"));
    assert!(types.contains(&"phase_completed".to_string()));
    assert_eq!(types.last().map(String::as_str), Some("session_finished"));
}

#[test]
fn test_run_quit_from_stdin() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let mut child = cli(dir.path())
        .args(["run", "--active", "1h", "--json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn CLI");

    let mut stdin = child.stdin.take().unwrap();
    writeln!(stdin, "pause").unwrap();
    writeln!(stdin, "status").unwrap();
    writeln!(stdin, "quit").unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"status\":\"paused\""));
    assert!(stdout.contains("\"type\":\"stopped\""));
}

#[test]
fn test_run_rejects_bad_duration() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["run", "--active", "soon"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("invalid duration"));
}
