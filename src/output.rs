//! Output sink.
//!
//! Pairing threads hand finished transcripts to the [`Printer`], which owns
//! a single writer thread. The queue is bounded and never blocks a producer:
//! when it is full the newest transcript is dropped and counted.

use crate::assembly::lock;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;

pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

pub struct Printer {
    tx: Mutex<Option<Sender<String>>>,
    writer: Mutex<Option<thread::JoinHandle<io::Result<()>>>>,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl Printer {
    pub fn stdout(capacity: usize) -> io::Result<Self> {
        Self::to_writer(Box::new(io::stdout()), capacity)
    }

    pub fn to_file(path: &Path, capacity: usize) -> io::Result<Self> {
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), "writing transcripts to file");
        Self::to_writer(Box::new(file), capacity)
    }

    pub fn to_writer(out: Box<dyn Write + Send>, capacity: usize) -> io::Result<Self> {
        let (tx, rx) = bounded::<String>(capacity.max(1));
        let writer = thread::Builder::new()
            .name("httpcap-printer".into())
            .spawn(move || {
                let mut out = BufWriter::new(out);
                for transcript in rx {
                    out.write_all(transcript.as_bytes())?;
                    out.write_all(b"\n")?;
                    out.flush()?;
                }
                out.flush()
            })?;
        Ok(Printer {
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Queue a transcript. Returns false if it was dropped because the queue
    /// is full or the printer is closed.
    pub fn send(&self, transcript: String) -> bool {
        let tx = lock(&self.tx);
        let Some(tx) = tx.as_ref() else {
            tracing::debug!("printer closed, transcript discarded");
            return false;
        };
        match tx.try_send(transcript) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "output queue full, transcript dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "output writer gone, transcript dropped");
                false
            }
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting transcripts, write out everything already queued and
    /// flush the destination. Idempotent.
    pub fn close(&self) -> io::Result<()> {
        lock(&self.tx).take();
        let Some(writer) = lock(&self.writer).take() else {
            return Ok(());
        };
        match writer.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "printer thread panicked")),
        }
    }
}

impl Drop for Printer {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to flush output");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_sink::{Gate, SharedBuf};
    use super::*;

    #[test]
    fn writes_in_acceptance_order() {
        let buf = SharedBuf::default();
        let printer = Printer::to_writer(Box::new(buf.clone()), 16).unwrap();
        assert!(printer.send("first\n".into()));
        assert!(printer.send("second\n".into()));
        printer.close().unwrap();
        assert_eq!(buf.text(), "first\n\nsecond\n\n");
        assert_eq!(printer.accepted(), 2);
        assert_eq!(printer.dropped(), 0);
    }

    #[test]
    fn closed_printer_rejects() {
        let printer = Printer::to_writer(Box::new(io::sink()), 4).unwrap();
        printer.close().unwrap();
        printer.close().unwrap();
        assert!(!printer.send("late".into()));
        assert_eq!(printer.dropped(), 0);
    }

    #[test]
    fn full_queue_drops_newest_without_blocking() {
        let (release, gate) = crossbeam_channel::unbounded();
        let printer = Printer::to_writer(Box::new(Gate(gate)), 1).unwrap();

        // The writer takes one transcript and blocks on it; one more fills
        // the queue. Everything after that is dropped.
        let mut accepted = 0;
        for i in 0..10 {
            if printer.send(format!("t{}", i)) {
                accepted += 1;
            }
        }
        assert!(accepted <= 2);
        assert_eq!(printer.dropped(), 10 - accepted);

        drop(release);
        printer.close().unwrap();
    }

    #[test]
    fn writes_to_file() {
        let path = std::env::temp_dir().join(format!("httpcap-printer-{}.txt", std::process::id()));
        let printer = Printer::to_file(&path, 8).unwrap();
        printer.send("hello".into());
        printer.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
        std::fs::remove_file(&path).unwrap();
    }
}
