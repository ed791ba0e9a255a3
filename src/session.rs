// Per-session context shared by the output and keyboard processors
//
// One `Session` belongs to one pty. Several may coexist; nothing here is
// global.

use std::io::Write;

use serde::Serialize;

use crate::config::SessionConfig;
use crate::diagnostics::UnhandledSequence;
use crate::error::Result;
use crate::keyboard::{KeyState, KeyboardProcessor};
use crate::output::{EscapeState, OutputProcessor};
use crate::sink::LogSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
}

/// Terminal modes seen in the output and the last window size requested
/// by the viewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TermModes {
    pub alt_screen: bool,
    pub app_cursor: bool,
    pub window: Option<WindowSize>,
}

/// Serializable picture of a session, used for diagnostic dumps
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub line: String,
    pub line_len: usize,
    pub linepos: usize,
    pub escape_state: EscapeState,
    pub modes: TermModes,
    pub forward_to_viewers: bool,
    pub key_state: KeyState,
    pub pending_resize: Option<WindowSize>,
    pub protocol_errors: u64,
    pub unhandled: Vec<UnhandledSequence>,
    pub unhandled_dropped: usize,
}

pub struct Session {
    modes: TermModes,
    output: OutputProcessor,
    keyboard: KeyboardProcessor,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session {
            modes: TermModes::default(),
            output: OutputProcessor::new(&config),
            keyboard: KeyboardProcessor::new(),
        }
    }

    /// Return every field to its zero state. Log handles stay open.
    pub fn reset(&mut self) {
        self.modes = TermModes::default();
        self.output.reset();
        self.keyboard.reset();
    }

    /// Switch to a fresh logging configuration and start over.
    pub fn attach_logs(&mut self, plain: Option<LogSink>, raw: Option<LogSink>) {
        self.output.set_logs(plain, raw);
        self.reset();
    }

    pub fn set_forward_to_viewers(&mut self, forward: bool) {
        self.output.set_forward(forward);
    }

    /// Feed raw pty output. Afterwards `escaped_output()` holds the viewer
    /// stream for exactly this call.
    pub fn process_output(&mut self, chunk: &[u8]) -> Result<()> {
        self.output.process(&mut self.modes, chunk)
    }

    /// Decode viewer keystrokes and write the result to `pty`.
    pub fn process_keyboard<W: Write + ?Sized>(&mut self, input: &[u8], pty: &mut W) -> Result<()> {
        self.keyboard.process(&mut self.modes, input, pty)
    }

    /// Whether a `\d` directive arrived since the last call
    pub fn take_dump_request(&mut self) -> bool {
        self.keyboard.take_dump_request()
    }

    pub fn escaped_output(&self) -> &[u8] {
        self.output.escaped()
    }

    pub fn take_pending_resize(&mut self) -> Option<WindowSize> {
        self.keyboard.take_pending_resize()
    }

    pub fn alt_screen(&self) -> bool {
        self.modes.alt_screen
    }

    pub fn app_cursor(&self) -> bool {
        self.modes.app_cursor
    }

    pub fn window(&self) -> Option<WindowSize> {
        self.modes.window
    }

    /// Bytes of the current, not yet terminated line
    pub fn line(&self) -> Vec<u8> {
        self.output.line()
    }

    pub fn linepos(&self) -> usize {
        self.output.linepos()
    }

    pub fn escape_state(&self) -> EscapeState {
        self.output.state()
    }

    pub fn key_state(&self) -> KeyState {
        self.keyboard.state()
    }

    pub fn protocol_errors(&self) -> u64 {
        self.keyboard.protocol_errors()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let line = self.output.line();
        SessionSnapshot {
            line: String::from_utf8_lossy(&line).into_owned(),
            line_len: line.len(),
            linepos: self.output.linepos(),
            escape_state: self.output.state(),
            modes: self.modes,
            forward_to_viewers: self.output.forward(),
            key_state: self.keyboard.state(),
            pending_resize: self.keyboard.pending_resize(),
            protocol_errors: self.keyboard.protocol_errors(),
            unhandled: self.output.unhandled().entries().to_vec(),
            unhandled_dropped: self.output.unhandled().dropped(),
        }
    }

    /// Pretty JSON rendering of `snapshot()`
    pub fn dump(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot())
            .unwrap_or_else(|e| format!("{{\"error\": \"snapshot failed: {}\"}}", e))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
