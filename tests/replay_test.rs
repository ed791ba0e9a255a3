use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

mod common;
use common::{ptyrelay_bin, write_fixture};

#[test]
fn test_replay_rebuilds_lines() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let raw = write_fixture(
        &dir,
        "raw.log",
        b"abcdef\x08\x1b[K\x08\x1b[K\x08\x1b[Kxyz\r\nabc\x1b]0;title\x07xyz\r\n",
    );

    Command::new(ptyrelay_bin())
        .arg("replay")
        .arg(&raw)
        .assert()
        .success()
        .stdout("abcxyz\nabcxyz\n");
}

#[test]
fn test_replay_from_stdin_keeps_unterminated_line() {
    Command::new(ptyrelay_bin())
        .arg("replay")
        .write_stdin("$ ls\r\nfile\r\n$ ")
        .assert()
        .success()
        .stdout("$ ls\nfile\n$ \n");
}

#[test]
fn test_replay_escaped_stream() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let raw = write_fixture(&dir, "raw.log", b"abc \x1b[?1049h-in-\x1b[?1049lout");

    Command::new(ptyrelay_bin())
        .arg("replay")
        .arg("--escaped")
        .arg(&raw)
        .assert()
        .success()
        .stdout("abc \\ss\\s2\\cl-in-\\s1\\rsout\n");
}

#[test]
fn test_replay_line_too_long_fails() {
    Command::new(ptyrelay_bin())
        .arg("replay")
        .arg("--line-capacity")
        .arg("8")
        .write_stdin("0123456789\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("8-byte line buffer"));
}

#[test]
fn test_replay_missing_file() {
    Command::new(ptyrelay_bin())
        .arg("replay")
        .arg("/nonexistent/raw.log")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open"));
}

#[test]
fn test_encode() {
    Command::new(ptyrelay_bin())
        .arg("encode")
        .write_stdin("a\\b\r\n")
        .assert()
        .success()
        .stdout("a\\5cb\\0d\\0a\n");
}
