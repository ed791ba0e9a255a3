// Session configuration

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Bytes buffered for the pty before a forced flush
pub const KEY_BUFFER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Longest logical line that can be reconstructed
    pub line_capacity: usize,
    /// Longest escape sequence that is tracked before it is given up on
    pub escape_capacity: usize,
    /// Unhandled sequences kept for diagnostics
    pub debug_capacity: usize,
    /// Populate the escaped viewer stream on every output chunk
    pub forward_to_viewers: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            line_capacity: 16 * 1024,
            escape_capacity: 64,
            debug_capacity: 16,
            forward_to_viewers: true,
        }
    }
}

/// Parse `COLSxROWS`, e.g. `80x24`. Returns `(cols, rows)`.
pub fn parse_terminal_size(size: &str) -> Result<(u16, u16)> {
    let parts: Vec<&str> = size.split('x').collect();
    if parts.len() != 2 {
        bail!("Invalid size format, expected COLSxROWS like 80x24");
    }
    let cols = parts[0].parse::<u16>().context("Invalid columns")?;
    let rows = parts[1].parse::<u16>().context("Invalid rows")?;
    if cols == 0 || rows == 0 {
        bail!("Terminal size must be non-zero");
    }
    Ok((cols, rows))
}
