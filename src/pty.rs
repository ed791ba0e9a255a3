// Child process on a pseudo-terminal

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::Command as ProcessCommand;

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::pty::{openpty, Winsize};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{setsid, Pid};
use ptyrelay::WindowSize;
use tracing::{debug, info};

pub struct Pty {
    master: File,
    child: Pid,
    exit_code: Option<i32>,
}

/// Start `command` on a new pty of the given size.
pub fn spawn(command: &[String], cols: u16, rows: u16, term: &str) -> Result<Pty> {
    if command.is_empty() {
        bail!("No command given");
    }

    let winsize = Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let pty = openpty(Some(&winsize), None)?;

    // Use fork crate which provides a safe wrapper around libc::fork()
    use fork::{fork as safe_fork, Fork};

    match safe_fork() {
        Ok(Fork::Parent(child)) => {
            drop(pty.slave);

            use nix::fcntl::{fcntl, FcntlArg, OFlag};
            let flags = fcntl(pty.master.as_raw_fd(), FcntlArg::F_GETFL)
                .context("Failed to get PTY flags")?;
            let mut oflags = OFlag::from_bits_truncate(flags);
            oflags.insert(OFlag::O_NONBLOCK);
            fcntl(pty.master.as_raw_fd(), FcntlArg::F_SETFL(oflags))
                .context("Failed to set PTY non-blocking")?;

            info!(pid = child, cols, rows, "spawned {}", command[0]);
            Ok(Pty {
                master: File::from(pty.master),
                child: Pid::from_raw(child),
                exit_code: None,
            })
        }
        Ok(Fork::Child) => {
            drop(pty.master);
            let err = exec_child(pty.slave, command, term);
            eprintln!("ptyrelay: failed to start {}: {:#}", command[0], err);
            std::process::exit(127);
        }
        Err(e) => bail!("Failed to fork for child: {}", e),
    }
}

/// Runs in the forked child. Only returns on failure.
fn exec_child(slave: OwnedFd, command: &[String], term: &str) -> anyhow::Error {
    // The slave must become the controlling terminal of a new session
    if let Err(e) = setsid() {
        return anyhow::Error::new(e).context("Failed to create new session");
    }

    use nix::unistd::dup2;
    let slave_fd = slave.as_raw_fd();
    for target in 0..=2 {
        if let Err(e) = dup2(slave_fd, target) {
            return anyhow::Error::new(e).context("Failed to dup2 pty slave");
        }
    }

    // TIOCSCTTY has to come after setsid() and the dup2 calls
    if let Err(e) = rustix::process::ioctl_tiocsctty(&slave) {
        eprintln!("Warning: Failed to set controlling terminal: {}", e);
    }
    drop(slave);

    let err = ProcessCommand::new(&command[0])
        .args(&command[1..])
        .env("TERM", term)
        .exec();
    anyhow::Error::new(err).context("exec failed")
}

impl Pty {
    pub fn master_mut(&mut self) -> &mut File {
        &mut self.master
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.master.read(buf)
    }

    /// Report the new size to the kernel's pty layer.
    pub fn resize(&self, size: WindowSize) -> Result<()> {
        use rustix::termios::{tcsetwinsize, Winsize as RustixWinsize};

        let winsize = RustixWinsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        tcsetwinsize(&self.master, winsize).context("Failed to resize terminal")?;
        debug!(rows = size.rows, cols = size.cols, "pty resized");
        Ok(())
    }

    /// Exit code if the child has finished, without blocking.
    pub fn try_wait(&mut self) -> Option<i32> {
        if self.exit_code.is_none() {
            match waitpid(self.child, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => self.exit_code = Some(code),
                Ok(WaitStatus::Signaled(_, sig, _)) => self.exit_code = Some(128 + sig as i32),
                _ => {}
            }
        }
        self.exit_code
    }

    /// Block until the child is gone.
    pub fn wait(&mut self) -> Result<i32> {
        while self.exit_code.is_none() {
            match waitpid(self.child, None) {
                Ok(WaitStatus::Exited(_, code)) => self.exit_code = Some(code),
                Ok(WaitStatus::Signaled(_, sig, _)) => self.exit_code = Some(128 + sig as i32),
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => bail!("waitpid failed: {}", e),
            }
        }
        Ok(self.exit_code.unwrap_or(1))
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        if self.exit_code.is_none() {
            let _ = nix::sys::signal::kill(self.child, nix::sys::signal::Signal::SIGHUP);
        }
    }
}
