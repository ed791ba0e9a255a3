// Keyboard processor: decodes the backslash keystroke protocol
//
// Plain bytes go to the pty as-is. A backslash introduces a one-byte
// directive:
//
//   \n  newline             \\  literal backslash
//   \^  cursor up           \v  cursor down
//   \>  cursor right        \<  cursor left
//   \e  end of line         \h  start of line
//   \d  diagnostic dump     \N  no-op (keepalive)
//   \wRRRRCCCC  window size, four decimal digits each
//
// Decoding state survives between calls, so a directive may be split over
// any number of chunks.

use std::io::Write;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::KEY_BUFFER_CAPACITY;
use crate::error::{Result, Target};
use crate::session::{TermModes, WindowSize};
use crate::sink::write_fully;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyState {
    Idle,
    SawBackslash,
    ReadingWindowSize,
}

const WINSIZE_DIGITS: usize = 8;

fn parse_field(digits: &[u8]) -> Option<u16> {
    let mut value: u16 = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (d - b'0') as u16;
    }
    // Zero is not a valid dimension
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

fn parse_window_size(field: &[u8; WINSIZE_DIGITS]) -> Option<WindowSize> {
    let rows = parse_field(&field[..4])?;
    let cols = parse_field(&field[4..])?;
    Some(WindowSize { rows, cols })
}

pub struct KeyboardProcessor {
    state: KeyState,
    winsize: [u8; WINSIZE_DIGITS],
    winsize_len: usize,
    pending: [u8; KEY_BUFFER_CAPACITY],
    pending_len: usize,
    pending_resize: Option<WindowSize>,
    protocol_errors: u64,
    dump_requested: bool,
}

impl Default for KeyboardProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardProcessor {
    pub fn new() -> Self {
        KeyboardProcessor {
            state: KeyState::Idle,
            winsize: [0; WINSIZE_DIGITS],
            winsize_len: 0,
            pending: [0; KEY_BUFFER_CAPACITY],
            pending_len: 0,
            pending_resize: None,
            protocol_errors: 0,
            dump_requested: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> KeyState {
        self.state
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    pub fn pending_resize(&self) -> Option<WindowSize> {
        self.pending_resize
    }

    pub fn take_pending_resize(&mut self) -> Option<WindowSize> {
        self.pending_resize.take()
    }

    pub fn take_dump_request(&mut self) -> bool {
        std::mem::take(&mut self.dump_requested)
    }

    /// Decode `input`, writing the resulting bytes to `pty` in one write
    /// unless the key buffer fills up first.
    pub fn process<W: Write + ?Sized>(&mut self, modes: &mut TermModes, input: &[u8], pty: &mut W) -> Result<()> {
        for &byte in input {
            self.step(modes, byte, pty)?;
        }
        self.flush(pty)
    }

    fn step<W: Write + ?Sized>(&mut self, modes: &mut TermModes, byte: u8, pty: &mut W) -> Result<()> {
        match self.state {
            KeyState::Idle => {
                if byte == b'\\' {
                    self.state = KeyState::SawBackslash;
                    Ok(())
                } else {
                    self.queue(&[byte], pty)
                }
            }
            KeyState::SawBackslash => {
                self.state = KeyState::Idle;
                self.dispatch(modes, byte, pty)
            }
            KeyState::ReadingWindowSize => {
                self.winsize[self.winsize_len] = byte;
                self.winsize_len += 1;
                if self.winsize_len == WINSIZE_DIGITS {
                    self.state = KeyState::Idle;
                    self.winsize_len = 0;
                    self.finish_window_size(modes);
                }
                Ok(())
            }
        }
    }

    fn dispatch<W: Write + ?Sized>(&mut self, modes: &TermModes, byte: u8, pty: &mut W) -> Result<()> {
        let intro = if modes.app_cursor { b'O' } else { b'[' };
        match byte {
            b'n' => self.queue(b"\n", pty),
            b'\\' => self.queue(b"\\", pty),
            b'd' => {
                self.dump_requested = true;
                Ok(())
            }
            b'N' => Ok(()),
            b'^' => self.queue(&[0x1b, intro, b'A'], pty),
            b'v' => self.queue(&[0x1b, intro, b'B'], pty),
            b'>' => self.queue(&[0x1b, intro, b'C'], pty),
            b'<' => self.queue(&[0x1b, intro, b'D'], pty),
            b'e' => self.queue(&[0x1b, intro, b'F'], pty),
            b'h' => self.queue(&[0x1b, intro, b'H'], pty),
            b'w' => {
                self.state = KeyState::ReadingWindowSize;
                self.winsize_len = 0;
                Ok(())
            }
            other => {
                self.protocol_errors += 1;
                warn!(byte = other, "unknown keyboard escape, discarded");
                Ok(())
            }
        }
    }

    fn finish_window_size(&mut self, modes: &mut TermModes) {
        match parse_window_size(&self.winsize) {
            Some(size) => {
                info!(rows = size.rows, cols = size.cols, "window resize requested");
                modes.window = Some(size);
                self.pending_resize = Some(size);
            }
            None => {
                self.protocol_errors += 1;
                warn!(
                    field = %String::from_utf8_lossy(&self.winsize),
                    "malformed window size, discarded"
                );
            }
        }
    }

    fn queue<W: Write + ?Sized>(&mut self, bytes: &[u8], pty: &mut W) -> Result<()> {
        if self.pending_len + bytes.len() > KEY_BUFFER_CAPACITY {
            self.flush(pty)?;
        }
        self.pending[self.pending_len..self.pending_len + bytes.len()].copy_from_slice(bytes);
        self.pending_len += bytes.len();
        Ok(())
    }

    fn flush<W: Write + ?Sized>(&mut self, pty: &mut W) -> Result<()> {
        if self.pending_len == 0 {
            return Ok(());
        }
        let len = std::mem::take(&mut self.pending_len);
        write_fully(pty, &self.pending[..len], Target::Pty)
    }
}
