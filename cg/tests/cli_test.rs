//! CLI tests for the `cg` binary
//!
//! Only commands that never touch the network run here.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cg() -> Command {
    let mut cmd = Command::cargo_bin("cg").expect("cg binary should build");
    cmd.env("NO_COLOR", "1");
    cmd
}

const CONFIG: &str = r#"
identities:
  - label: alice
    cookies:
      JSESSIONID: abc
    tables:
      - profile-id: "1234"
        courses: ["1001", "1002"]
      - profile-id: "5678"
        courses: ["3001"]
  - label: bob
    profile-id: "1234"
    courses: ["2001"]
"#;

#[test]
fn test_help_lists_commands() {
    cg().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("add"));
}

#[test]
fn test_list_shows_interleaved_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coursegrab.yml");
    std::fs::write(&path, CONFIG).unwrap();

    cg().arg("list")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("1. profile 1234 course 1001"))
        .stdout(predicate::str::contains("2. profile 5678 course 3001"))
        .stdout(predicate::str::contains("3. profile 1234 course 1002"))
        .stdout(predicate::str::contains("skipped: missing cookies"));
}

#[test]
fn test_add_creates_and_updates_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coursegrab.yml");

    cg().args(["add", "carol", "1234", "4001", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully added course 4001 for user carol"));

    cg().args(["add", "carol", "1234", "4001", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("carol"));
    assert!(saved.contains("4001"));
}

#[test]
fn test_run_without_identities_exits_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coursegrab.yml");
    std::fs::write(&path, "identities: []\n").unwrap();

    cg().arg("run")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("No identities configured"));
}

#[test]
fn test_run_skips_inert_identities_without_network() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coursegrab.yml");
    std::fs::write(
        &path,
        "identities:\n  - label: bob\n    profile-id: \"1234\"\n    courses: [\"2001\"]\n",
    )
    .unwrap();

    cg().args(["run", "--format", "json", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"skipped\""))
        .stdout(predicate::str::contains("missing cookies"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coursegrab.yml");
    std::fs::write(&path, "engine:\n  attempt-timeout-ms: 0\n").unwrap();

    cg().arg("list")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Attempt timeout must be greater than zero"));
}
