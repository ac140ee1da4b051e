//! End-to-end runs of the `trailsync` binary against a temp data directory.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn trailsync(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("trailsync").unwrap();
    cmd.arg("--data-dir").arg(dir.path());
    cmd
}

// ===========================================================================
// Offline commands
// ===========================================================================

#[test]
fn help_lists_commands() {
    Command::cargo_bin("trailsync")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("set-theme"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn device_id_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();

    let first = trailsync(&dir).arg("device").assert().success();
    let first = String::from_utf8(first.get_output().stdout.clone()).unwrap();
    let second = trailsync(&dir).arg("device").assert().success();
    let second = String::from_utf8(second.get_output().stdout.clone()).unwrap();

    let id_line = |out: &str| {
        out.lines()
            .find(|l| l.trim_start().starts_with("ID:"))
            .map(str::to_string)
    };
    assert!(id_line(&first).is_some());
    assert_eq!(id_line(&first), id_line(&second));
}

#[test]
fn writes_require_login() {
    let dir = tempfile::tempdir().unwrap();
    trailsync(&dir)
        .args(["set-theme", "dark"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn status_without_session() {
    let dir = tempfile::tempdir().unwrap();
    trailsync(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT LOGGED IN"))
        .stdout(predicate::str::contains("Pending migration: none"));
}

#[test]
fn broken_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("trailsync.toml"), "[api\n").unwrap();
    trailsync(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

// ===========================================================================
// Mock server
// ===========================================================================

#[test]
fn mock_login_then_status() {
    let dir = tempfile::tempdir().unwrap();

    trailsync(&dir)
        .args(["--mock", "anonymous", "anon-42", "--chat", "chat-7"])
        .assert()
        .success();

    trailsync(&dir)
        .args(["--mock", "login", "tok-e2e"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in"))
        .stdout(predicate::str::contains("Continue chat: chat-7"));

    trailsync(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in"))
        .stdout(predicate::str::contains("Pending migration: none"));
}

#[test]
fn mock_set_theme_is_cached_locally() {
    let dir = tempfile::tempdir().unwrap();
    trailsync(&dir).args(["--mock", "login", "tok"]).assert().success();

    trailsync(&dir)
        .args(["--mock", "set-theme", "dark"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Theme: dark"));

    trailsync(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Theme:     dark"));
}

#[test]
fn logout_keeps_device_identity() {
    let dir = tempfile::tempdir().unwrap();
    trailsync(&dir).args(["--mock", "login", "tok"]).assert().success();
    trailsync(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
    trailsync(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT LOGGED IN"));
}
