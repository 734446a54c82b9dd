//! Join barrier for the per-connection pairing threads.

use crate::assembly::lock;
use std::io;
use std::sync::Mutex;
use std::thread;

#[derive(Debug, Default)]
pub struct Supervisor {
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor::default()
    }

    /// Spawn a named worker thread and track it until [`await_drain`].
    ///
    /// [`await_drain`]: Supervisor::await_drain
    pub fn spawn<F>(&self, name: String, f: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name).spawn(f)?;
        let mut workers = lock(&self.workers);
        // Reap finished workers so long captures don't accumulate handles.
        let (done, running): (Vec<_>, Vec<_>) =
            workers.drain(..).partition(|h| h.is_finished());
        *workers = running;
        workers.push(handle);
        drop(workers);
        for handle in done {
            join(handle);
        }
        Ok(())
    }

    /// Workers not yet joined.
    pub fn active(&self) -> usize {
        lock(&self.workers).iter().filter(|h| !h.is_finished()).count()
    }

    /// Block until every tracked worker has exited, including workers spawned
    /// while draining.
    pub fn await_drain(&self) {
        loop {
            let pending: Vec<_> = lock(&self.workers).drain(..).collect();
            if pending.is_empty() {
                return;
            }
            tracing::debug!(workers = pending.len(), "waiting for pairing threads");
            for handle in pending {
                join(handle);
            }
        }
    }
}

fn join(handle: thread::JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("worker").to_string();
    if handle.join().is_err() {
        tracing::warn!(thread = %name, "worker thread panicked");
    }
}
