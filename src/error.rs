// Error types for the session core
//
// Protocol errors never show up here: they are logged and discarded by the
// processors. Only conditions that end a session are surfaced to the caller.

use std::fmt;
use std::io;
use thiserror::Error;

/// Destination a write was aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    PlainLog,
    RawLog,
    Pty,
    Viewers,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::PlainLog => "plain log",
            Target::RawLog => "raw log",
            Target::Pty => "pty",
            Target::Viewers => "viewer stream",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Logical line exceeds the {capacity}-byte line buffer")]
    LineTooLong { capacity: usize },

    #[error("Failed to write to {target}: {source}")]
    Write {
        target: Target,
        #[source]
        source: io::Error,
    },

    #[error("Write to {target} accepted zero bytes")]
    WriteZero { target: Target },
}

pub type Result<T> = std::result::Result<T, SessionError>;
