//! Connection registry: routes segments to their connection, creates new
//! connections and evicts closed or idle ones.
//!
//! The map lock only guards membership. Segment processing and stream
//! finishing happen on the connection's own lock, outside the map lock.

use super::connection::{Connection, ConnectionStreams};
use super::lock;
use super::segment::{is_http_request_start, Segment};
use super::stream::StreamOptions;
use crate::flow::{Endpoint, FlowKey};
use ahash::AHashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Receives the reader halves of every new connection.
pub trait ConnectionHandler: Send + Sync {
    /// Called once per connection, at creation. `src`/`dst` are taken from
    /// the segment that created it.
    fn handle(&self, src: Endpoint, dst: Endpoint, streams: ConnectionStreams);

    /// Called after every connection has been finished at shutdown.
    fn finish(&self);
}

/// Capture filter applied before any per-connection state is allocated.
/// A segment passes if either endpoint matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowFilter {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
}

impl FlowFilter {
    pub fn matches(&self, src: &Endpoint, dst: &Endpoint) -> bool {
        if let Some(ip) = self.ip {
            if src.ip != ip && dst.ip != ip {
                return false;
            }
        }
        if let Some(port) = self.port {
            if src.port != port && dst.port != port {
                return false;
            }
        }
        true
    }
}

type SharedConnection = Arc<Mutex<Connection>>;

pub struct Assembler<H: ConnectionHandler> {
    connections: Mutex<AHashMap<FlowKey, SharedConnection>>,
    handler: H,
    filter: FlowFilter,
    options: StreamOptions,
    created: AtomicU64,
}

impl<H: ConnectionHandler> Assembler<H> {
    pub fn new(handler: H, filter: FlowFilter, options: StreamOptions) -> Self {
        Assembler {
            connections: Mutex::new(AHashMap::new()),
            handler,
            filter,
            options,
            created: AtomicU64::new(0),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Number of connections currently tracked.
    pub fn len(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connections created since start.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn assemble(&self, src: Endpoint, dst: Endpoint, segment: Segment) {
        if !self.filter.matches(&src, &dst) {
            return;
        }

        let key = FlowKey::new(src, dst);
        let create = (segment.flags.syn && !segment.flags.ack)
            || is_http_request_start(&segment.payload);
        let Some(connection) = self.retrieve(key, src, dst, segment.ts, create) else {
            return;
        };

        let closed = {
            let mut conn = lock(&connection);
            conn.on_receive(src, segment);
            conn.is_closed()
        };
        if closed {
            self.remove(&key, &connection);
            lock(&connection).finish();
            tracing::debug!(flow = %key, "connection closed");
        }
    }

    fn retrieve(
        &self,
        key: FlowKey,
        src: Endpoint,
        dst: Endpoint,
        ts: f64,
        create: bool,
    ) -> Option<SharedConnection> {
        let mut connections = lock(&self.connections);
        if let Some(existing) = connections.get(&key) {
            return Some(existing.clone());
        }
        if !create {
            return None;
        }
        let (connection, streams) = Connection::new(key, ts, self.options);
        let connection = Arc::new(Mutex::new(connection));
        connections.insert(key, connection.clone());
        self.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(flow = %key, "new connection");
        self.handler.handle(src, dst, streams);
        Some(connection)
    }

    fn remove(&self, key: &FlowKey, connection: &SharedConnection) {
        let mut connections = lock(&self.connections);
        if connections
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, connection))
        {
            connections.remove(key);
        }
    }

    /// Evict connections whose last segment is older than `cutoff`
    /// (capture timestamp, seconds). Returns the number evicted.
    pub fn flush_older_than(&self, cutoff: f64) -> usize {
        let stale: Vec<SharedConnection> = {
            let mut connections = lock(&self.connections);
            let mut stale = Vec::new();
            connections.retain(|_, conn| {
                let keep = lock(conn).last_seen() >= cutoff;
                if !keep {
                    stale.push(conn.clone());
                }
                keep
            });
            stale
        };

        for connection in &stale {
            let mut conn = lock(connection);
            tracing::debug!(flow = %conn.key(), phase = %conn.phase(), "idle connection flushed");
            conn.flush();
        }
        stale.len()
    }

    /// Finish every remaining connection and notify the handler.
    pub fn finish_all(&self) {
        let remaining: Vec<SharedConnection> = {
            let mut connections = lock(&self.connections);
            connections.drain().map(|(_, conn)| conn).collect()
        };
        tracing::debug!(connections = remaining.len(), "finishing all connections");
        for connection in &remaining {
            lock(connection).finish();
        }
        self.handler.finish();
    }
}
