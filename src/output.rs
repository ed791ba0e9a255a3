// Output processor: raw pty bytes in, logs and viewer stream out
//
// Tracks just enough terminal state to rebuild logical lines for the plain
// log. Escape sequences are collected in a small accumulator and resolved
// once they are recognisable; the viewer stream gets an escaped copy of the
// bytes, with window titles removed and alternate-screen switches replaced
// by markers.

use serde::Serialize;
use tracing::debug;

use crate::config::SessionConfig;
use crate::diagnostics::DebugBuffer;
use crate::error::{Result, SessionError, Target};
use crate::escape::{self, MARK_ALTERNATE, MARK_CLEAR, MARK_PRIMARY, MARK_RESTORE, MARK_SAVE};
use crate::ring::RingBuffer;
use crate::session::TermModes;
use crate::sink::LogSink;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const BS: u8 = 0x08;

/// Where the escape tracker currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EscapeState {
    Normal,
    Accumulating,
    /// Inside an OSC string, dropping bytes until BEL or `ESC \`
    Osc { saw_esc: bool },
    /// Sequence outgrew the accumulator; passing bytes through until its
    /// final byte
    Overlong,
}

/// Sequences that change line or mode state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    EraseToEol,
    CursorUp(usize),
    CursorForward(usize),
    DeleteChars(usize),
    AppCursor(bool),
    AltScreen { mode: u16, on: bool },
}

/// Result of testing the accumulator after an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Pending,
    Osc,
    Known(Action),
    /// Complete sequence with no meaning for line tracking
    Unknown,
    /// The last byte cannot belong to an escape sequence
    Aborted,
}

fn parse_count(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return Some(1);
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let n: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some(n.max(1))
}

fn parse_private_mode(digits: &[u8]) -> Option<u16> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn scan_csi(rest: &[u8]) -> Scan {
    let Some((&last, body)) = rest.split_last() else {
        return Scan::Pending;
    };
    match last {
        0x20..=0x3f => return Scan::Pending,
        0x40..=0x7e => {}
        _ => return Scan::Aborted,
    }

    let action = match (body, last) {
        (b"" | b"0", b'K') => Some(Action::EraseToEol),
        (_, b'A') => parse_count(body).map(Action::CursorUp),
        (_, b'C') => parse_count(body).map(Action::CursorForward),
        (_, b'P') => parse_count(body).map(Action::DeleteChars),
        ([b'?', digits @ ..], b'h' | b'l') => {
            let on = last == b'h';
            match parse_private_mode(digits) {
                Some(1) => Some(Action::AppCursor(on)),
                Some(mode @ (47 | 1047 | 1049)) => Some(Action::AltScreen { mode, on }),
                _ => None,
            }
        }
        _ => None,
    };
    action.map_or(Scan::Unknown, Scan::Known)
}

fn scan(seq: &[u8]) -> Scan {
    match seq {
        [] | [_] => Scan::Pending,
        [_, b']', ..] => Scan::Osc,
        [_, b'[', rest @ ..] => scan_csi(rest),
        [.., last] => match *last {
            0x20..=0x2f => Scan::Pending,
            0x30..=0x7e => Scan::Unknown,
            _ => Scan::Aborted,
        },
    }
}

fn is_line_byte(byte: u8) -> bool {
    byte == b'\t' || (byte >= 0x20 && byte != 0x7f)
}

pub struct OutputProcessor {
    line: RingBuffer,
    escape: RingBuffer,
    state: EscapeState,
    forward: bool,
    escaped: Vec<u8>,
    plain_log: Option<LogSink>,
    raw_log: Option<LogSink>,
    unhandled: DebugBuffer,
}

impl OutputProcessor {
    pub fn new(config: &SessionConfig) -> Self {
        OutputProcessor {
            line: RingBuffer::new(config.line_capacity.max(1)),
            escape: RingBuffer::new(config.escape_capacity.max(8)),
            state: EscapeState::Normal,
            forward: config.forward_to_viewers,
            escaped: Vec::new(),
            plain_log: None,
            raw_log: None,
            unhandled: DebugBuffer::new(config.debug_capacity),
        }
    }

    /// Back to the zero state. Log handles stay open.
    pub fn reset(&mut self) {
        self.line.reset();
        self.escape.reset();
        self.state = EscapeState::Normal;
        self.escaped.clear();
        self.unhandled.clear();
    }

    pub fn set_logs(&mut self, plain: Option<LogSink>, raw: Option<LogSink>) {
        self.plain_log = plain;
        self.raw_log = raw;
    }

    pub fn set_forward(&mut self, forward: bool) {
        self.forward = forward;
    }

    pub fn forward(&self) -> bool {
        self.forward
    }

    pub fn escaped(&self) -> &[u8] {
        &self.escaped
    }

    pub fn line(&self) -> Vec<u8> {
        self.line.to_vec()
    }

    pub fn linepos(&self) -> usize {
        self.line.cursor()
    }

    pub fn state(&self) -> EscapeState {
        self.state
    }

    pub fn unhandled(&self) -> &DebugBuffer {
        &self.unhandled
    }

    /// Consume one chunk of pty output.
    ///
    /// The raw log receives the chunk even when line reconstruction fails,
    /// so the offending bytes are kept for inspection.
    pub fn process(&mut self, modes: &mut TermModes, chunk: &[u8]) -> Result<()> {
        self.escaped.clear();

        let mut result = Ok(());
        for &byte in chunk {
            result = self.step(modes, byte);
            if result.is_err() {
                break;
            }
        }

        if let Some(raw) = self.raw_log.as_mut() {
            raw.write_all(chunk, Target::RawLog)?;
        }
        result?;

        if self.forward {
            self.escaped.push(b'\n');
        }
        Ok(())
    }

    fn step(&mut self, modes: &mut TermModes, byte: u8) -> Result<()> {
        match byte {
            b'\r' => {
                self.abandon_escape();
                self.forward_byte(byte);
                self.carriage_return(modes);
                return Ok(());
            }
            BS => {
                // Executed in place; a sequence being collected carries on
                if let EscapeState::Osc { .. } = self.state {
                    return Ok(());
                }
                self.forward_byte(byte);
                let pos = self.line.cursor();
                if pos > 0 {
                    self.line.set_cursor(pos - 1);
                }
                return Ok(());
            }
            BEL => {
                if let EscapeState::Osc { .. } = self.state {
                    self.state = EscapeState::Normal;
                } else {
                    self.abandon_escape();
                    self.forward_byte(byte);
                }
                return Ok(());
            }
            _ => {}
        }

        match self.state {
            EscapeState::Osc { saw_esc: false } => {
                if byte == ESC {
                    self.state = EscapeState::Osc { saw_esc: true };
                }
                Ok(())
            }
            EscapeState::Osc { saw_esc: true } => {
                if byte == b'\\' {
                    self.state = EscapeState::Normal;
                    Ok(())
                } else {
                    // A new escape sequence cuts the OSC string short
                    self.begin_escape();
                    self.accumulate(modes, byte)
                }
            }
            EscapeState::Overlong => match byte {
                0x20..=0x3f => {
                    self.forward_byte(byte);
                    Ok(())
                }
                0x40..=0x7e => {
                    self.forward_byte(byte);
                    if byte != b'm' {
                        self.unhandled.push(self.escape.as_slices().0);
                    }
                    self.escape.clear();
                    self.state = EscapeState::Normal;
                    Ok(())
                }
                _ => {
                    self.escape.clear();
                    self.state = EscapeState::Normal;
                    self.step(modes, byte)
                }
            },
            EscapeState::Accumulating => self.accumulate(modes, byte),
            EscapeState::Normal if byte == ESC => {
                self.begin_escape();
                Ok(())
            }
            EscapeState::Normal => self.plain_byte(byte),
        }
    }

    fn plain_byte(&mut self, byte: u8) -> Result<()> {
        self.forward_byte(byte);
        if byte == b'\n' {
            return self.newline();
        }
        if is_line_byte(byte) {
            self.put_line(byte)?;
        }
        Ok(())
    }

    fn put_line(&mut self, byte: u8) -> Result<()> {
        self.line
            .put(byte)
            .map_err(|_| SessionError::LineTooLong { capacity: self.line.capacity() })
    }

    fn newline(&mut self) -> Result<()> {
        self.line.set_cursor(self.line.len());
        if let Some(log) = self.plain_log.as_mut() {
            let (a, b) = self.line.as_slices();
            log.write_all(a, Target::PlainLog)?;
            log.write_all(b, Target::PlainLog)?;
            log.write_all(b"\n", Target::PlainLog)?;
        }
        self.line.clear_and_advance();
        Ok(())
    }

    fn carriage_return(&mut self, modes: &TermModes) {
        let pos = self.line.cursor();
        let row_start = match modes.window {
            Some(w) if w.cols > 0 => pos / w.cols as usize * w.cols as usize,
            _ => 0,
        };
        self.line.set_cursor(row_start);
    }

    fn begin_escape(&mut self) {
        self.escape.clear();
        // Accumulator capacity is at least 8, so the first byte always fits
        let _ = self.escape.put(ESC);
        self.state = EscapeState::Accumulating;
    }

    /// Drop an in-progress sequence. Partial CSI/ESC bytes still reach the
    /// viewers; partial OSC strings do not.
    fn abandon_escape(&mut self) {
        if self.state == EscapeState::Accumulating {
            self.forward_held();
        }
        self.escape.clear();
        self.state = EscapeState::Normal;
    }

    fn accumulate(&mut self, modes: &mut TermModes, byte: u8) -> Result<()> {
        if byte == ESC {
            self.abandon_escape();
            self.begin_escape();
            return Ok(());
        }
        if self.escape.put(byte).is_err() {
            // The held prefix stays in the accumulator until the final byte
            debug!(len = self.escape.len(), "escape sequence too long, passing through");
            self.forward_held();
            self.state = EscapeState::Overlong;
            return self.step(modes, byte);
        }

        let outcome = scan(self.escape.as_slices().0);
        match outcome {
            Scan::Pending => Ok(()),
            Scan::Osc => {
                self.escape.clear();
                self.state = EscapeState::Osc { saw_esc: false };
                Ok(())
            }
            Scan::Known(action) => {
                let result = self.apply(modes, action);
                if let Action::AltScreen { mode, on } = action {
                    self.forward_alt_screen(mode, on);
                } else {
                    self.forward_held();
                }
                self.escape.clear();
                self.state = EscapeState::Normal;
                result
            }
            Scan::Unknown => {
                let seq = self.escape.as_slices().0;
                if seq.last() != Some(&b'm') {
                    debug!(sequence = ?String::from_utf8_lossy(seq), "unhandled escape sequence");
                    self.unhandled.push(seq);
                }
                self.abandon_escape();
                Ok(())
            }
            Scan::Aborted => {
                let held = self.escape.len() - 1;
                self.escape.truncate_at(held);
                self.abandon_escape();
                self.plain_byte(byte)
            }
        }
    }

    fn apply(&mut self, modes: &mut TermModes, action: Action) -> Result<()> {
        match action {
            Action::EraseToEol => self.line.truncate_at(self.line.cursor()),
            Action::CursorUp(n) => {
                if let Some(w) = modes.window {
                    let back = n.saturating_mul(w.cols as usize);
                    self.line.set_cursor(self.line.cursor().saturating_sub(back));
                }
            }
            Action::CursorForward(n) => {
                let pos = self.line.cursor();
                let len = self.line.len();
                if pos < len {
                    self.line.set_cursor(pos + n.min(len - pos));
                } else if self.line.put(b' ').is_err() {
                    debug!("cursor forward on a full line ignored");
                }
            }
            Action::DeleteChars(n) => {
                let pos = self.line.cursor();
                let remaining = self.line.len() - pos;
                if n < remaining {
                    self.line.remove_range(pos, n);
                } else {
                    debug!(count = n, remaining, "delete past end of line ignored");
                }
            }
            Action::AppCursor(on) => modes.app_cursor = on,
            Action::AltScreen { on, .. } => modes.alt_screen = on,
        }
        Ok(())
    }

    fn forward_byte(&mut self, byte: u8) {
        if self.forward {
            escape::encode_byte(byte, &mut self.escaped);
        }
    }

    fn forward_held(&mut self) {
        if self.forward {
            escape::encode_into(self.escape.as_slices().0, &mut self.escaped);
        }
    }

    fn forward_alt_screen(&mut self, mode: u16, on: bool) {
        if !self.forward {
            return;
        }
        let markers: &[&[u8]] = match (mode, on) {
            (1049, true) => &[MARK_SAVE, MARK_ALTERNATE, MARK_CLEAR],
            (1049, false) => &[MARK_PRIMARY, MARK_RESTORE],
            (1047, false) => &[MARK_CLEAR, MARK_PRIMARY],
            (_, true) => &[MARK_ALTERNATE],
            (_, false) => &[MARK_PRIMARY],
        };
        for marker in markers {
            self.escaped.extend_from_slice(marker);
        }
    }
}
