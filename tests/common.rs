/// Get the ptyrelay binary path to use for testing.
///
/// Set OVERRIDE_CARGO_BIN_EXE_ptyrelay to run the same tests against
/// another build of the relay.
///
/// # Example
///
/// ```bash
/// OVERRIDE_CARGO_BIN_EXE_ptyrelay=/path/to/ptyrelay cargo test
/// ```
pub fn ptyrelay_bin() -> String {
    std::env::var("OVERRIDE_CARGO_BIN_EXE_ptyrelay")
        .unwrap_or_else(|_| env!("CARGO_BIN_EXE_ptyrelay").to_string())
}

/// Write `bytes` to a fresh file inside `dir` and return its path as a string.
#[allow(dead_code)]
pub fn write_fixture(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("Failed to write fixture");
    path.to_string_lossy().to_string()
}
