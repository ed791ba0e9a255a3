// Diagnostics for the output side
//
// Records escape sequences that matched nothing the processor knows about,
// so a dump can show what a remote program was sending.

use serde::Serialize;

/// Entry in the unhandled escape sequence buffer
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct UnhandledSequence {
    pub sequence: String,
    pub raw_hex: String,
}

impl UnhandledSequence {
    pub fn from_raw(raw: &[u8]) -> Self {
        let mut sequence = String::new();
        for &b in raw {
            match b {
                0x1b => sequence.push_str("\\e"),
                0x20..=0x7e => sequence.push(b as char),
                _ => sequence.push_str(&format!("\\x{:02x}", b)),
            }
        }
        let raw_hex = raw.iter().map(|b| format!("{:02x}", b)).collect();
        UnhandledSequence { sequence, raw_hex }
    }
}

/// Bounded buffer of unhandled sequences, oldest evicted first
pub struct DebugBuffer {
    entries: Vec<UnhandledSequence>,
    capacity: usize,
    dropped: usize,
}

impl DebugBuffer {
    pub fn new(capacity: usize) -> Self {
        DebugBuffer {
            entries: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, raw_bytes: &[u8]) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.remove(0);
            self.dropped += 1;
        }
        self.entries.push(UnhandledSequence::from_raw(raw_bytes));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }

    pub fn entries(&self) -> &[UnhandledSequence] {
        &self.entries
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_form() {
        let entry = UnhandledSequence::from_raw(b"\x1b[2J");
        assert_eq!(entry.sequence, "\\e[2J");
        assert_eq!(entry.raw_hex, "1b5b324a");
    }

    #[test]
    fn test_eviction_counts_dropped() {
        let mut buf = DebugBuffer::new(2);
        buf.push(b"\x1b[1J");
        buf.push(b"\x1b[2J");
        buf.push(b"\x1b[3J");
        assert_eq!(buf.entries().len(), 2);
        assert_eq!(buf.entries()[0].sequence, "\\e[2J");
        assert_eq!(buf.dropped(), 1);

        buf.clear();
        assert!(buf.entries().is_empty());
        assert_eq!(buf.dropped(), 0);
    }
}
