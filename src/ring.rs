// Fixed-capacity ring buffer with a logical write cursor
//
// The backing array never grows. Logical offsets are mapped onto it as
// `(start + i) % capacity`, so the physical start of the content may sit
// anywhere in the array.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    #[error("ring buffer full ({capacity} bytes)")]
    Full { capacity: usize },
}

pub struct RingBuffer {
    buf: Box<[u8]>,
    start: usize,
    len: usize,
    cursor: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        RingBuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            len: 0,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical write position. Always `<= len()`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the write position, clamped to the logical end.
    pub fn set_cursor(&mut self, pos: usize) {
        self.cursor = pos.min(self.len);
    }

    fn physical(&self, i: usize) -> usize {
        (self.start + i) % self.buf.len()
    }

    /// Write `byte` at the cursor and advance it. Overwrites in place when
    /// the cursor sits before the logical end, grows the content otherwise.
    pub fn put(&mut self, byte: u8) -> Result<(), RingError> {
        if self.cursor >= self.buf.len() {
            return Err(RingError::Full { capacity: self.buf.len() });
        }
        let at = self.physical(self.cursor);
        self.buf[at] = byte;
        self.cursor += 1;
        if self.cursor > self.len {
            self.len = self.cursor;
        }
        Ok(())
    }

    /// Drop everything at or beyond `pos`.
    pub fn truncate_at(&mut self, pos: usize) {
        if pos < self.len {
            self.len = pos;
        }
        self.cursor = self.cursor.min(self.len);
    }

    pub fn byte_at(&self, i: usize) -> Option<u8> {
        if i < self.len {
            Some(self.buf[self.physical(i)])
        } else {
            None
        }
    }

    /// Replace the byte at logical offset `i`. Returns false outside the
    /// logical window.
    pub fn set_byte_at(&mut self, i: usize, value: u8) -> bool {
        if i >= self.len {
            return false;
        }
        let at = self.physical(i);
        self.buf[at] = value;
        true
    }

    /// Remove `count` bytes starting at `pos`, shifting the tail left.
    pub fn remove_range(&mut self, pos: usize, count: usize) {
        if pos >= self.len || count == 0 {
            return;
        }
        let count = count.min(self.len - pos);
        for i in pos..self.len - count {
            let b = self.buf[self.physical(i + count)];
            let at = self.physical(i);
            self.buf[at] = b;
        }
        self.len -= count;
        self.cursor = self.cursor.min(self.len);
    }

    /// Empty the content without moving the physical base.
    pub fn clear(&mut self) {
        self.len = 0;
        self.cursor = 0;
    }

    /// Empty the content and continue writing right after where it ended,
    /// so consecutive logical contents walk around the backing array.
    pub fn clear_and_advance(&mut self) {
        self.start = self.physical(self.len);
        self.clear();
    }

    /// Back to the canonical zero state.
    pub fn reset(&mut self) {
        self.start = 0;
        self.clear();
    }

    /// Logical content as at most two physical slices, in order.
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        let cap = self.buf.len();
        if self.len == 0 {
            return (&[], &[]);
        }
        let start = self.start % cap;
        if start + self.len <= cap {
            (&self.buf[start..start + self.len], &[])
        } else {
            let first = cap - start;
            (&self.buf[start..], &self.buf[..self.len - first])
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let (a, b) = self.as_slices();
        let mut v = Vec::with_capacity(a.len() + b.len());
        v.extend_from_slice(a);
        v.extend_from_slice(b);
        v
    }
}
