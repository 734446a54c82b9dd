//! Capture threads: one per opened handle, all feeding one channel.

use super::engine::{self, CaptureConfig, CaptureError};
use crate::protocol::LinkType;
use crossbeam_channel::{bounded, Receiver, Sender};
use pcap::{Activated, Capture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// An owned packet buffer sent from a capture thread to the assembly loop.
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    /// pcap timestamp as seconds since epoch.
    pub ts: f64,
    pub link: LinkType,
    pub data: Vec<u8>,
}

/// Running capture threads. Dropping the packet receiver stops them.
pub struct CaptureHandle {
    /// Reading a file rather than live devices.
    pub offline: bool,
    threads: Vec<thread::JoinHandle<()>>,
}

impl CaptureHandle {
    /// Join all capture threads. Call after the receiver has been dropped or
    /// `running` has been cleared.
    pub fn join(self) {
        for handle in self.threads {
            if handle.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
        }
    }
}

/// Open every source named by `config` and start a thread per source.
///
/// With several devices (`any` off Linux) a device that fails to open is
/// logged and skipped; the call fails only if none could be opened.
pub fn start(
    config: &CaptureConfig,
    capacity: usize,
    running: Arc<AtomicBool>,
) -> Result<(CaptureHandle, Receiver<CapturedPacket>), CaptureError> {
    let (tx, rx) = bounded::<CapturedPacket>(capacity.max(1));
    let mut threads = Vec::new();

    if let Some(path) = &config.file {
        let cap = engine::open_offline(path, &config.filter)?;
        threads.push(spawn_reader("httpcap-file".into(), cap, tx, running)?);
        let handle = CaptureHandle {
            offline: true,
            threads,
        };
        return Ok((handle, rx));
    }

    let devices = engine::resolve_devices(&config.interface)?;
    let single = devices.len() == 1;
    let mut last_err = None;
    for name in devices {
        let cap = match engine::open_live(&name, config) {
            Ok(cap) => cap,
            Err(err) if single => return Err(err),
            Err(err) => {
                tracing::warn!(interface = %name, error = %err, "skipping interface");
                last_err = Some(err);
                continue;
            }
        };
        let thread_name = format!("httpcap-cap-{}", name);
        threads.push(spawn_reader(thread_name, cap, tx.clone(), running.clone())?);
    }
    drop(tx);

    if threads.is_empty() {
        return Err(last_err.unwrap_or_else(|| CaptureError::NoDevice("no interface could be opened".into())));
    }
    tracing::info!(sources = threads.len(), "capture sources started");
    let handle = CaptureHandle {
        offline: false,
        threads,
    };
    Ok((handle, rx))
}

fn spawn_reader<T>(
    name: String,
    mut cap: Capture<T>,
    tx: Sender<CapturedPacket>,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>, CaptureError>
where
    T: Activated + Send + 'static,
{
    let link = engine::link_type(&cap);
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let mut packets: u64 = 0;
            while running.load(Ordering::SeqCst) {
                let packet = match cap.next_packet() {
                    Ok(packet) => packet,
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(pcap::Error::NoMorePackets) => break,
                    Err(e) => {
                        tracing::warn!(source = %name, error = %e, "capture error, source stopped");
                        break;
                    }
                };
                let ts = packet.header.ts.tv_sec as f64
                    + packet.header.ts.tv_usec as f64 / 1_000_000.0;
                let owned = CapturedPacket {
                    ts,
                    link,
                    data: packet.data.to_vec(),
                };
                if tx.send(owned).is_err() {
                    break;
                }
                packets += 1;
            }
            tracing::debug!(source = %name, packets, "capture thread exiting");
        })
        .map_err(CaptureError::Spawn)?;
    Ok(handle)
}
