// ptyrelay: the translating core between a pty and a remote terminal viewer
//
// Output side: raw pty bytes become a plaintext line log, a raw log and an
// escaped line-oriented stream for viewers. Input side: a backslash
// keystroke protocol becomes raw pty input and window resizes.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod escape;
pub mod keyboard;
pub mod output;
pub mod ring;
pub mod session;
pub mod sink;

pub use config::SessionConfig;
pub use error::{Result, SessionError, Target};
pub use session::{Session, SessionSnapshot, TermModes, WindowSize};
pub use sink::LogSink;
