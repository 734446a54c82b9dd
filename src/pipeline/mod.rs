//! Assembly loop.
//!
//! ```text
//! capture thread(s) --[CapturedPacket]--> assembly loop (this module)
//!                                            |-- parse_packet
//!                                            |-- Assembler::assemble
//!                                            +-- periodic idle flush
//!
//! Assembler --ConnectionStreams--> pairing thread per connection (Supervisor)
//!                                     +--[transcript]--> Printer thread
//! ```
//!
//! Shutdown order: `finish_all` ends every stream, the supervisor joins the
//! pairing threads, then the printer writes out its queue.

pub mod supervisor;

pub use supervisor::Supervisor;

use crate::assembly::{Assembler, ConnectionHandler, FlowFilter, Segment, StreamOptions};
use crate::capture::CapturedPacket;
use crate::flow::Endpoint;
use crate::http::{ExchangeFilter, HttpConnectionHandler, RenderOptions};
use crate::output::Printer;
use crate::protocol;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Configuration for the assembly loop.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub flow_filter: FlowFilter,
    pub stream: StreamOptions,
    /// Connections silent for this long are flushed.
    pub idle_secs: u64,
    pub flush_interval_secs: u64,
    /// Stop after this many packets (0 = unlimited).
    pub count: u64,
    /// Live capture: the sweep clock is the wall clock instead of the newest
    /// packet timestamp.
    pub live: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            flow_filter: FlowFilter::default(),
            stream: StreamOptions::default(),
            idle_secs: 240,
            flush_interval_secs: 30,
            count: 0,
            live: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub packets: u64,
    pub tcp_segments: u64,
    pub parse_errors: u64,
    pub connections: u64,
    pub idle_flushed: u64,
    pub transcripts: u64,
    pub transcripts_dropped: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packets ({} tcp segments, {} parse errors), {} connections ({} idle flushed), {} transcripts ({} dropped)",
            self.packets,
            self.tcp_segments,
            self.parse_errors,
            self.connections,
            self.idle_flushed,
            self.transcripts,
            self.transcripts_dropped
        )
    }
}

/// Packet-level driver around an [`Assembler`]. Owned by one thread.
pub struct Pipeline<H: ConnectionHandler> {
    assembler: Assembler<H>,
    config: PipelineConfig,
    stats: Stats,
    newest_ts: f64,
    last_flush: Option<f64>,
}

impl<H: ConnectionHandler> Pipeline<H> {
    pub fn new(handler: H, config: PipelineConfig) -> Self {
        let assembler = Assembler::new(handler, config.flow_filter, config.stream);
        Pipeline {
            assembler,
            config,
            stats: Stats::default(),
            newest_ts: 0.0,
            last_flush: None,
        }
    }

    pub fn assembler(&self) -> &Assembler<H> {
        &self.assembler
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The packet limit has been reached.
    pub fn done(&self) -> bool {
        self.config.count > 0 && self.stats.packets >= self.config.count
    }

    pub fn process(&mut self, packet: &CapturedPacket) {
        self.stats.packets += 1;
        if packet.ts > self.newest_ts {
            self.newest_ts = packet.ts;
        }

        let parsed = match protocol::parse_packet(&packet.data, packet.link) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.parse_errors += 1;
                tracing::debug!(error = %e, "parse error on packet #{}", self.stats.packets);
                return;
            }
        };
        let (Some(net), Some(tcp)) = (&parsed.network, &parsed.tcp) else {
            return;
        };
        self.stats.tcp_segments += 1;

        let src = Endpoint::new(net.src_ip(), tcp.src_port());
        let dst = Endpoint::new(net.dst_ip(), tcp.dst_port());
        self.assembler.assemble(src, dst, Segment::from_header(tcp, packet.ts));
        self.stats.connections = self.assembler.created();
    }

    /// Sweep clock: wall clock when live, newest packet timestamp offline.
    fn reference(&self) -> f64 {
        if self.config.live {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(self.newest_ts)
        } else {
            self.newest_ts
        }
    }

    /// Flush idle connections if a flush interval has passed on the sweep
    /// clock. Returns the number of connections flushed.
    pub fn tick(&mut self) -> usize {
        let now = self.reference();
        let last = *self.last_flush.get_or_insert(now);
        if now - last < self.config.flush_interval_secs as f64 {
            return 0;
        }
        self.last_flush = Some(now);
        self.flush_idle(now - self.config.idle_secs as f64)
    }

    pub fn flush_idle(&mut self, cutoff: f64) -> usize {
        let flushed = self.assembler.flush_older_than(cutoff);
        if flushed > 0 {
            self.stats.idle_flushed += flushed as u64;
            tracing::debug!(flushed, remaining = self.assembler.len(), "idle connections flushed");
        }
        flushed
    }

    /// Finish every connection. Pairing threads see end-of-stream afterwards.
    pub fn finish(self) -> (Assembler<H>, Stats) {
        self.assembler.finish_all();
        (self.assembler, self.stats)
    }
}

/// Run the assembly loop until the packet source ends, `running` is cleared
/// or the packet limit is hit, then drain every pairing thread and the
/// printer.
pub fn run(
    config: PipelineConfig,
    packets: Receiver<CapturedPacket>,
    running: &AtomicBool,
    render: RenderOptions,
    filter: ExchangeFilter,
    printer: Arc<Printer>,
) -> Stats {
    let supervisor = Arc::new(Supervisor::new());
    let handler = HttpConnectionHandler::new(render, filter, printer.clone(), supervisor.clone());
    let mut pipeline = Pipeline::new(handler, config);
    let poll = Duration::from_millis(100);

    while running.load(Ordering::SeqCst) {
        match packets.recv_timeout(poll) {
            Ok(packet) => pipeline.process(&packet),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("all capture sources finished");
                break;
            }
        }
        pipeline.tick();
        if pipeline.done() {
            tracing::info!(count = pipeline.stats().packets, "packet limit reached");
            break;
        }
    }
    // Capture threads exit once their next send fails.
    drop(packets);

    let (_assembler, mut stats) = pipeline.finish();
    supervisor.await_drain();
    if let Err(err) = printer.close() {
        tracing::warn!(error = %err, "failed to flush output");
    }
    stats.transcripts = printer.accepted();
    stats.transcripts_dropped = printer.dropped();
    stats
}
