// Event loop tying a session to a live pty
//
// stdin carries the keystroke protocol, stdout carries the escaped viewer
// stream. Both framing layers around them belong to the caller.

use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::errno::Errno;
use ptyrelay::sink::write_fully;
use ptyrelay::{LogSink, Session, SessionConfig, SessionError, Target};
use tempfile::Builder;
use tracing::{error, info, warn};

use crate::pty;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const EXIT_GRACE_POLLS: u32 = 20;

pub struct BridgeOptions {
    pub command: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    pub term: String,
    pub plain_log: Option<PathBuf>,
    pub raw_log: Option<PathBuf>,
    pub dump: Option<PathBuf>,
    pub config: SessionConfig,
}

fn open_log(path: Option<&Path>) -> Result<Option<LogSink>> {
    path.map(|p| LogSink::append_file(p).with_context(|| format!("Failed to open log {}", p.display())))
        .transpose()
}

fn spawn_stdin_reader() -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut stdin = io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Write the session dump for post-mortem inspection.
fn write_dump(session: &Session, path: Option<&Path>) -> Result<PathBuf> {
    let dump = session.dump();
    match path {
        Some(p) => {
            std::fs::write(p, dump).with_context(|| format!("Failed to write dump {}", p.display()))?;
            Ok(p.to_path_buf())
        }
        None => {
            let mut file = Builder::new()
                .prefix("ptyrelay-dump-")
                .suffix(".json")
                .tempfile()?;
            file.write_all(dump.as_bytes())?;
            let (_, path) = file.keep().context("Failed to keep dump file")?;
            Ok(path)
        }
    }
}

fn fatal(session: &Session, dump: Option<&Path>, err: SessionError) -> anyhow::Error {
    match write_dump(session, dump) {
        Ok(path) => error!(dump = %path.display(), "session terminated: {}", err),
        Err(e) => error!("session terminated: {} (dump failed: {:#})", err, e),
    }
    anyhow::Error::new(err).context("Session terminated")
}

/// Run the command until it exits. Returns its exit code.
pub fn run(opts: BridgeOptions) -> Result<i32> {
    let forward = opts.config.forward_to_viewers;
    let mut session = Session::new(opts.config);
    session.attach_logs(
        open_log(opts.plain_log.as_deref())?,
        open_log(opts.raw_log.as_deref())?,
    );
    let dump = opts.dump.as_deref();

    let mut pty = pty::spawn(&opts.command, opts.cols, opts.rows, &opts.term)?;
    let keys = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut buf = [0u8; 4096];
    let mut quiet_after_exit = 0;

    loop {
        let mut idle = true;

        while stdin_open {
            match keys.try_recv() {
                Ok(chunk) => {
                    idle = false;
                    if let Err(e) = session.process_keyboard(&chunk, pty.master_mut()) {
                        return Err(fatal(&session, dump, e));
                    }
                    if let Some(size) = session.take_pending_resize() {
                        pty.resize(size)?;
                    }
                    if session.take_dump_request() {
                        match write_dump(&session, dump) {
                            Ok(path) => warn!(dump = %path.display(), "diagnostic dump written"),
                            Err(e) => warn!("diagnostic dump failed: {:#}", e),
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("keystroke stream closed");
                    stdin_open = false;
                }
            }
        }

        match pty.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                idle = false;
                quiet_after_exit = 0;
                if let Err(e) = session.process_output(&buf[..n]) {
                    return Err(fatal(&session, dump, e));
                }
                if forward {
                    let mut stdout = io::stdout().lock();
                    write_fully(&mut stdout, session.escaped_output(), Target::Viewers)?;
                    stdout.flush().context("Failed to flush viewer stream")?;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
            // Linux reports EIO once the last slave fd is closed
            Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => break,
            Err(e) => return Err(e).context("Failed to read from PTY"),
        }

        if idle {
            // The child is gone but something else may still hold the slave
            // open, so stop after a short quiet period instead of waiting
            // for EIO
            if pty.try_wait().is_some() {
                quiet_after_exit += 1;
                if quiet_after_exit > EXIT_GRACE_POLLS {
                    break;
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    let code = pty.wait()?;
    info!(code, "child exited");
    Ok(code)
}
