use std::ops::Range;

/// Fixed-capacity receive buffer with a read start pointer moved by consume().
///
/// Never grows past the capacity given at construction. Unconsumed bytes are moved to the
/// front by `compact()` so the tail can be refilled.
#[derive(Debug)]
pub(crate) struct RecvBuf {
    buf: Box<[u8]>,
    pos: usize,
    end: usize,
}

impl RecvBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        RecvBuf {
            buf: vec![0; capacity].into_boxed_slice(),
            pos: 0,
            end: 0,
        }
    }

    /// Copy as much of `data` as fits, returns the amount taken.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        if self.end == self.buf.len() {
            self.compact();
        }
        let amount = data.len().min(self.buf.len() - self.end);
        self.buf[self.end..(self.end + amount)].copy_from_slice(&data[..amount]);
        self.end += amount;
        amount
    }

    pub fn consume(&mut self, amount: usize) {
        let new_pos = self.pos + amount;
        assert!(new_pos <= self.end);
        self.pos = new_pos;
        if self.pos == self.end {
            self.pos = 0;
            self.end = 0;
        }
    }

    /// Cut a range (relative to the unconsumed bytes) out of the buffer, closing the gap.
    pub fn remove(&mut self, range: Range<usize>) {
        assert!(range.start <= range.end && self.pos + range.end <= self.end);
        let from = self.pos + range.end;
        let to = self.pos + range.start;
        self.buf.copy_within(from..self.end, to);
        self.end -= range.end - range.start;
    }

    /// Move unconsumed bytes to the start of the buffer.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.buf.copy_within(self.pos..self.end, 0);
        self.end -= self.pos;
        self.pos = 0;
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.pos
    }

    /// Take out whatever is left, used when the transport is handed over.
    pub fn take(&mut self) -> Vec<u8> {
        let rest = self.to_vec();
        self.pos = 0;
        self.end = 0;
        rest
    }
}

impl std::ops::Deref for RecvBuf {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.buf[self.pos..self.end]
    }
}
