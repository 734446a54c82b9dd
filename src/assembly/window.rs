//! Out-of-order segment buffer for one direction of a connection.
//!
//! Segments are kept sorted by sequence number in a growable ring
//! (`buffer[start..start + size]`, modulo capacity). They leave the window
//! only through [`ReceiveWindow::confirm`] once the peer ACKs them, or through
//! [`ReceiveWindow::flush_all`] when the connection is torn down.

use super::segment::Segment;
use super::seq;
use std::cmp::Ordering;

#[derive(Debug)]
pub struct ReceiveWindow {
    buffer: Vec<Option<Segment>>,
    start: usize,
    size: usize,
    /// Lowest sequence number not yet delivered.
    expect_begin: Option<u32>,
    last_ack: Option<u32>,
    gaps: u64,
    duplicates: u64,
}

impl ReceiveWindow {
    pub fn new(capacity: usize) -> Self {
        let mut buffer = Vec::with_capacity(capacity.max(1));
        buffer.resize_with(capacity.max(1), || None);
        ReceiveWindow {
            buffer,
            start: 0,
            size: 0,
            expect_begin: None,
            last_ack: None,
            gaps: 0,
            duplicates: 0,
        }
    }

    /// Number of buffered segments.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn expect_begin(&self) -> Option<u32> {
        self.expect_begin
    }

    pub fn last_ack(&self) -> Option<u32> {
        self.last_ack
    }

    /// Segments delivered although bytes before them were never seen.
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Segments dropped because every byte had already been buffered or delivered.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    #[inline]
    fn slot(&self, idx: usize) -> usize {
        (self.start + idx) % self.buffer.len()
    }

    fn seq_at(&self, idx: usize) -> Option<u32> {
        if idx >= self.size {
            return None;
        }
        self.buffer[self.slot(idx)].as_ref().map(|s| s.seq)
    }

    /// Buffer a segment in sequence order.
    pub fn insert(&mut self, segment: Segment) {
        if segment.payload.is_empty() {
            return;
        }
        if let Some(expect) = self.expect_begin {
            if seq::compare(expect, segment.end()) != Ordering::Less {
                self.duplicates += 1;
                return;
            }
        }

        // Retransmissions and in-order arrivals land at the tail, so scan backwards.
        let mut idx = self.size;
        while idx > 0 {
            let Some(prev) = self.seq_at(idx - 1) else {
                break;
            };
            match seq::compare(prev, segment.seq) {
                Ordering::Equal => {
                    self.duplicates += 1;
                    return;
                }
                Ordering::Less => break,
                Ordering::Greater => idx -= 1,
            }
        }

        if self.size == self.buffer.len() {
            self.expand();
        }

        for i in (idx..self.size).rev() {
            let from = self.slot(i);
            let to = self.slot(i + 1);
            self.buffer[to] = self.buffer[from].take();
        }
        let at = self.slot(idx);
        self.buffer[at] = Some(segment);
        self.size += 1;
    }

    /// Release, in order, every buffered segment that starts before `ack`.
    ///
    /// Bytes already delivered are trimmed off the front of each released
    /// segment. A segment that starts past `expect_begin` is delivered anyway
    /// and counted as a gap. Returns the number of segments removed.
    pub fn confirm<F>(&mut self, ack: u32, mut deliver: F) -> usize
    where
        F: FnMut(Segment),
    {
        let mut removed = 0;
        while let Some(head) = self.seq_at(0) {
            if seq::compare(head, ack) != Ordering::Less {
                break;
            }
            let Some(segment) = self.pop_front() else {
                break;
            };
            self.release(segment, &mut deliver);
            removed += 1;
        }

        match self.last_ack {
            Some(last) if seq::compare(last, ack) != Ordering::Less => {}
            _ => self.last_ack = Some(ack),
        }
        removed
    }

    /// Release everything still buffered, regardless of acknowledgement.
    pub fn flush_all<F>(&mut self, mut deliver: F) -> usize
    where
        F: FnMut(Segment),
    {
        let mut removed = 0;
        while let Some(segment) = self.pop_front() {
            self.release(segment, &mut deliver);
            removed += 1;
        }
        removed
    }

    fn pop_front(&mut self) -> Option<Segment> {
        if self.size == 0 {
            return None;
        }
        let slot = self.start;
        self.start = (self.start + 1) % self.buffer.len();
        self.size -= 1;
        self.buffer[slot].take()
    }

    fn release<F>(&mut self, mut segment: Segment, deliver: &mut F)
    where
        F: FnMut(Segment),
    {
        let end = segment.end();
        if let Some(expect) = self.expect_begin {
            match seq::compare(expect, segment.seq) {
                Ordering::Greater => {
                    let overlap = seq::distance(segment.seq, expect) as usize;
                    if overlap >= segment.payload.len() {
                        self.duplicates += 1;
                        return;
                    }
                    segment.payload.drain(..overlap);
                    segment.seq = expect;
                }
                Ordering::Less => {
                    self.gaps += 1;
                    tracing::debug!(
                        expected = expect,
                        seq = segment.seq,
                        missing = seq::distance(expect, segment.seq),
                        "sequence gap, delivering past it"
                    );
                }
                Ordering::Equal => {}
            }
        }
        deliver(segment);
        self.expect_begin = Some(end);
    }

    /// Double the capacity. Only called when full, so rotating `start` to
    /// index 0 leaves the segments contiguous and in order.
    fn expand(&mut self) {
        let capacity = self.buffer.len();
        self.buffer.rotate_left(self.start);
        self.buffer.resize_with(capacity * 2, || None);
        self.start = 0;
    }
}
