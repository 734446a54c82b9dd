//! One direction of a connection as a blocking byte stream.
//!
//! The assembler owns the [`StreamWriter`], which buffers segments in a
//! [`ReceiveWindow`] and pushes confirmed payload into a bounded channel. The
//! pairing thread owns the [`StreamReader`], which implements [`Read`] over
//! that channel and reports end-of-stream once the writer is finished.
//!
//! Pushing never blocks the assembler. A reader that falls `stream_capacity`
//! chunks behind loses the rest of its direction.

use super::segment::Segment;
use super::window::ReceiveWindow;
use crossbeam_channel::{bounded, Receiver, Select, Sender, TrySendError};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Initial ReceiveWindow capacity, in segments.
    pub window_capacity: usize,
    /// Confirmed chunks queued ahead of the reader before the direction is
    /// abandoned.
    pub stream_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            window_capacity: 64,
            stream_capacity: 1024,
        }
    }
}

/// Confirmed payload handed from the assembler to the reader.
#[derive(Debug)]
pub struct Chunk {
    pub ts: f64,
    pub data: Vec<u8>,
}

pub fn channel(options: StreamOptions) -> (StreamWriter, StreamReader) {
    let (tx, rx) = bounded(options.stream_capacity.max(1));
    let ignore = Arc::new(AtomicBool::new(false));
    let writer = StreamWriter {
        window: ReceiveWindow::new(options.window_capacity),
        tx: Some(tx),
        ignore: ignore.clone(),
        closed: false,
        overflowed: false,
    };
    let reader = StreamReader {
        rx,
        remain: Vec::new(),
        pos: 0,
        ignore,
        last_ts: None,
    };
    (writer, reader)
}

#[derive(Debug)]
pub struct StreamWriter {
    window: ReceiveWindow,
    tx: Option<Sender<Chunk>>,
    ignore: Arc<AtomicBool>,
    closed: bool,
    overflowed: bool,
}

impl StreamWriter {
    fn ignored(&self) -> bool {
        self.ignore.load(Ordering::Relaxed)
    }

    pub fn append(&mut self, segment: Segment) {
        if self.ignored() || self.tx.is_none() {
            return;
        }
        self.window.insert(segment);
    }

    pub fn confirm(&mut self, ack: u32) {
        if self.ignored() {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        let ignore = &self.ignore;
        let overflowed = &mut self.overflowed;
        self.window
            .confirm(ack, |segment| push(tx, ignore, overflowed, segment));
    }

    /// Whether the reader fell behind and this direction was abandoned.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Chunks queued and not yet taken by the reader.
    pub fn backlog(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.len())
    }

    /// Mark this direction as closed by FIN or RST.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_finished(&self) -> bool {
        self.tx.is_none()
    }

    pub fn window(&self) -> &ReceiveWindow {
        &self.window
    }

    /// Release whatever is still buffered and close the channel.
    /// The reader sees end-of-stream after the last queued chunk. Idempotent.
    pub fn finish(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        if !self.ignored() {
            let ignore = &self.ignore;
            let overflowed = &mut self.overflowed;
            self.window
                .flush_all(|segment| push(&tx, ignore, overflowed, segment));
        }
        if self.window.gaps() > 0 || self.window.duplicates() > 0 {
            tracing::debug!(
                gaps = self.window.gaps(),
                duplicates = self.window.duplicates(),
                "stream finished"
            );
        }
    }
}

/// Queue one confirmed segment without blocking. A full channel abandons the
/// direction; a disconnected one means the reader is gone.
fn push(tx: &Sender<Chunk>, ignore: &AtomicBool, overflowed: &mut bool, segment: Segment) {
    if ignore.load(Ordering::Relaxed) {
        return;
    }
    let chunk = Chunk {
        ts: segment.ts,
        data: segment.payload,
    };
    match tx.try_send(chunk) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => {
            ignore.store(true, Ordering::Relaxed);
            *overflowed = true;
            tracing::warn!(
                queued = tx.len(),
                "stream reader fell behind, discarding the rest of this direction"
            );
        }
    }
}

/// Which of two readers can make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
    First,
    Second,
}

/// Block until `first` or `second` can be read without waiting. A reader at
/// end-of-stream counts as readable. `first` wins when both are.
pub fn ready(first: &StreamReader, second: &StreamReader) -> Ready {
    if first.has_input() {
        return Ready::First;
    }
    if second.has_input() {
        return Ready::Second;
    }
    let mut select = Select::new();
    let first_op = select.recv(&first.rx);
    select.recv(&second.rx);
    if select.ready() == first_op {
        Ready::First
    } else {
        Ready::Second
    }
}

#[derive(Debug)]
pub struct StreamReader {
    rx: Receiver<Chunk>,
    remain: Vec<u8>,
    pos: usize,
    ignore: Arc<AtomicBool>,
    last_ts: Option<f64>,
}

impl StreamReader {
    /// Capture timestamp of the most recently received chunk.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_ts
    }

    /// Stop accepting bytes for this direction. Segments arriving afterwards
    /// are discarded by the writer.
    pub fn close(&self) {
        self.ignore.store(true, Ordering::Relaxed);
    }

    /// Bytes are buffered or queued, so the next read returns at once.
    pub fn has_input(&self) -> bool {
        self.pos < self.remain.len() || !self.rx.is_empty()
    }

    /// Read and discard everything up to end-of-stream. Returns the byte count.
    pub fn discard_to_end(&mut self) -> u64 {
        io::copy(self, &mut io::sink()).unwrap_or(0)
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.remain.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.last_ts = Some(chunk.ts);
                    self.remain = chunk.data;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.remain.len() - self.pos);
        buf[..n].copy_from_slice(&self.remain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::segment::TcpFlags;
    use std::thread;

    fn seg(seq: u32, payload: &[u8], ts: f64) -> Segment {
        Segment {
            seq,
            ack: 0,
            flags: TcpFlags::default(),
            payload: payload.to_vec(),
            ts,
        }
    }

    fn options() -> StreamOptions {
        StreamOptions {
            window_capacity: 4,
            stream_capacity: 16,
        }
    }

    #[test]
    fn reader_sees_confirmed_bytes_then_eof() {
        let (mut writer, mut reader) = channel(options());
        writer.append(seg(1, b"hello ", 1.0));
        writer.append(seg(7, b"world", 2.0));
        writer.confirm(12);
        writer.finish();

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(reader.last_timestamp(), Some(2.0));
    }

    #[test]
    fn small_reads_keep_the_remainder() {
        let (mut writer, mut reader) = channel(options());
        writer.append(seg(1, b"abcdef", 0.0));
        writer.confirm(7);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn finish_flushes_unconfirmed_tail_once() {
        let (mut writer, mut reader) = channel(options());
        writer.append(seg(1, b"abc", 0.0));
        writer.finish();
        writer.finish();
        assert!(writer.is_finished());
        writer.append(seg(4, b"late", 0.0));
        writer.confirm(100);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn closed_reader_discards_new_segments() {
        let (mut writer, mut reader) = channel(options());
        reader.close();
        writer.append(seg(1, b"abc", 0.0));
        writer.confirm(4);
        writer.finish();
        assert_eq!(reader.discard_to_end(), 0);
    }

    #[test]
    fn blocked_reader_wakes_on_finish() {
        let (mut writer, mut reader) = channel(options());
        let handle = thread::spawn(move || reader.discard_to_end());
        writer.append(seg(1, b"xyz", 0.0));
        writer.confirm(4);
        writer.finish();
        assert_eq!(handle.join().unwrap(), 3);
    }

    #[test]
    fn slow_reader_loses_direction_instead_of_blocking() {
        let (mut writer, mut reader) = channel(StreamOptions {
            window_capacity: 2,
            stream_capacity: 2,
        });
        for i in 0..8u32 {
            writer.append(seg(1 + i * 2, b"ab", 0.0));
        }
        writer.confirm(17);
        assert!(writer.overflowed());
        assert_eq!(writer.backlog(), 2);

        writer.append(seg(17, b"zz", 0.0));
        writer.confirm(19);
        writer.finish();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abab");
    }

    #[test]
    fn finish_into_full_channel_returns() {
        let (mut writer, mut reader) = channel(StreamOptions {
            window_capacity: 4,
            stream_capacity: 1,
        });
        writer.append(seg(1, b"a", 0.0));
        writer.append(seg(2, b"b", 0.0));
        writer.append(seg(3, b"c", 0.0));
        writer.finish();
        assert!(writer.overflowed());
        assert_eq!(reader.discard_to_end(), 1);
    }

    #[test]
    fn ready_prefers_first_and_waits_for_either() {
        let (mut up_writer, up) = channel(options());
        let (mut down_writer, down) = channel(options());
        up_writer.append(seg(1, b"up", 0.0));
        up_writer.confirm(3);
        assert_eq!(ready(&down, &up), Ready::Second);
        down_writer.append(seg(1, b"down", 0.0));
        down_writer.confirm(5);
        assert_eq!(ready(&down, &up), Ready::First);

        let (mut writer, idle) = channel(options());
        let (mut other_writer, other) = channel(options());
        let handle = thread::spawn(move || ready(&idle, &other));
        other_writer.finish();
        assert_eq!(handle.join().unwrap(), Ready::Second);
        writer.finish();
    }

    #[test]
    fn dropped_reader_does_not_block_writer() {
        let (mut writer, reader) = channel(StreamOptions {
            window_capacity: 2,
            stream_capacity: 1,
        });
        drop(reader);
        for i in 0..8u32 {
            writer.append(seg(1 + i * 2, b"ab", 0.0));
        }
        writer.confirm(17);
        writer.finish();
        assert!(writer.window().is_empty());
    }
}
