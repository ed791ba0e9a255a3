// Append targets and the retrying write helper

use std::io::{self, ErrorKind, Write};

use crate::error::{Result, SessionError, Target};

/// Write every byte of `bytes`, retrying interrupted and would-block writes.
///
/// A write that reports zero bytes means the target stopped accepting data
/// and is fatal for that destination.
pub fn write_fully<W: Write + ?Sized>(writer: &mut W, mut bytes: &[u8], target: Target) -> Result<()> {
    while !bytes.is_empty() {
        match writer.write(bytes) {
            Ok(0) => return Err(SessionError::WriteZero { target }),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::yield_now(),
            Err(source) => return Err(SessionError::Write { target, source }),
        }
    }
    Ok(())
}

/// Open append target for plain or raw logs
pub struct LogSink {
    inner: Box<dyn Write + Send>,
}

impl LogSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        LogSink { inner: Box::new(writer) }
    }

    /// Open `path` for appending, creating it if needed.
    pub fn append_file(path: &std::path::Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(file))
    }

    pub fn write_all(&mut self, bytes: &[u8], target: Target) -> Result<()> {
        write_fully(&mut *self.inner, bytes, target)
    }

    pub fn flush(&mut self, target: Target) -> Result<()> {
        self.inner
            .flush()
            .map_err(|source| SessionError::Write { target, source })
    }
}

/// Shared in-memory sink so tests can read back what was logged
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct MemorySink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl MemorySink {
    pub(crate) fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

#[cfg(test)]
impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that misbehaves in scripted ways before accepting data
    struct Scripted {
        script: Vec<io::Result<usize>>,
        written: Vec<u8>,
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.script.is_empty() {
                self.written.extend_from_slice(buf);
                return Ok(buf.len());
            }
            match self.script.remove(0) {
                Ok(n) => {
                    let n = n.min(buf.len());
                    self.written.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                Err(e) => Err(e),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_partial_and_interrupted_writes_are_retried() {
        let mut w = Scripted {
            script: vec![
                Ok(2),
                Err(io::Error::from(ErrorKind::Interrupted)),
                Err(io::Error::from(ErrorKind::WouldBlock)),
                Ok(1),
            ],
            written: Vec::new(),
        };
        write_fully(&mut w, b"abcdef", Target::Pty).unwrap();
        assert_eq!(w.written, b"abcdef");
    }

    #[test]
    fn test_zero_byte_write_is_fatal() {
        let mut w = Scripted { script: vec![Ok(0)], written: Vec::new() };
        let err = write_fully(&mut w, b"abc", Target::RawLog).unwrap_err();
        assert!(matches!(err, SessionError::WriteZero { target: Target::RawLog }));
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let mut w = Scripted {
            script: vec![Err(io::Error::from(ErrorKind::BrokenPipe))],
            written: Vec::new(),
        };
        let err = write_fully(&mut w, b"abc", Target::PlainLog).unwrap_err();
        match err {
            SessionError::Write { target, source } => {
                assert_eq!(target, Target::PlainLog);
                assert_eq!(source.kind(), ErrorKind::BrokenPipe);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_write_is_noop() {
        let mut w = Scripted { script: vec![Ok(0)], written: Vec::new() };
        write_fully(&mut w, b"", Target::Viewers).unwrap();
        assert!(w.written.is_empty());
    }
}
