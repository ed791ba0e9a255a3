use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

mod common;
use common::ptyrelay_bin;

struct TestEnv {
    _temp_dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            _temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn path(&self, name: &str) -> String {
        self._temp_dir.path().join(name).to_string_lossy().to_string()
    }
}

fn bridge() -> Command {
    let mut cmd = Command::new(ptyrelay_bin());
    cmd.arg("bridge").timeout(Duration::from_secs(20));
    cmd
}

#[test]
fn test_bridge_logs_output() {
    let env = TestEnv::new();
    let plain = env.path("plain.log");
    let raw = env.path("raw.log");

    bridge()
        .arg("--plain-log")
        .arg(&plain)
        .arg("--raw-log")
        .arg(&raw)
        .arg("--")
        .arg("printf")
        .arg("hello\\nworld\\n")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello").and(predicate::str::contains("\\0d\\0a")));

    let plain_text = fs::read_to_string(&plain).expect("plain log missing");
    assert_eq!(plain_text, "hello\nworld\n");

    let raw_bytes = fs::read(&raw).expect("raw log missing");
    assert_eq!(raw_bytes, b"hello\r\nworld\r\n");
}

#[test]
fn test_bridge_delivers_keystrokes() {
    let env = TestEnv::new();
    let plain = env.path("plain.log");

    bridge()
        .arg("--plain-log")
        .arg(&plain)
        .arg("--no-forward")
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("read -r line; echo \"got:$line\"")
        .write_stdin("abc\\\\def\\n")
        .assert()
        .success()
        .stdout("");

    let plain_text = fs::read_to_string(&plain).expect("plain log missing");
    assert!(
        plain_text.lines().any(|l| l == "got:abc\\def"),
        "unexpected plain log: {:?}",
        plain_text
    );
}

#[test]
fn test_bridge_propagates_exit_code() {
    bridge()
        .arg("--no-forward")
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("exit 3")
        .write_stdin("")
        .assert()
        .code(3);
}

#[test]
fn test_bridge_applies_resize() {
    let env = TestEnv::new();
    let plain = env.path("plain.log");

    bridge()
        .arg("--plain-log")
        .arg(&plain)
        .arg("--no-forward")
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("read line; stty size")
        .write_stdin("\\w00300100\\n")
        .assert()
        .success();

    let plain_text = fs::read_to_string(&plain).expect("plain log missing");
    assert!(
        plain_text.lines().any(|l| l == "30 100"),
        "unexpected plain log: {:?}",
        plain_text
    );
}

#[test]
fn test_bridge_line_too_long_writes_dump() {
    let env = TestEnv::new();
    let dump = env.path("dump.json");

    bridge()
        .arg("--line-capacity")
        .arg("8")
        .arg("--dump")
        .arg(&dump)
        .arg("--no-forward")
        .arg("--")
        .arg("printf")
        .arg("0123456789")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session terminated"));

    let text = fs::read_to_string(&dump).expect("dump missing");
    let value: serde_json::Value = serde_json::from_str(&text).expect("dump is not JSON");
    assert_eq!(value["line"], "01234567");
    assert_eq!(value["line_len"], 8);
}

#[test]
fn test_bridge_dump_directive_writes_dump() {
    let env = TestEnv::new();
    let dump = env.path("dump.json");

    bridge()
        .arg("--dump")
        .arg(&dump)
        .arg("--no-forward")
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("read -r line")
        .write_stdin("\\w00300100\\d\\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("diagnostic dump written"));

    let text = fs::read_to_string(&dump).expect("dump missing");
    let value: serde_json::Value = serde_json::from_str(&text).expect("dump is not JSON");
    assert_eq!(value["modes"]["window"]["rows"], 30);
    assert_eq!(value["modes"]["window"]["cols"], 100);
    assert_eq!(value["key_state"], "Idle");
}

#[test]
fn test_bridge_rejects_bad_size() {
    bridge()
        .arg("--size")
        .arg("80")
        .arg("--")
        .arg("true")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid size format"));
}
