use super::segment::{is_http_request_start, Segment};
use super::stream::{self, StreamOptions, StreamReader, StreamWriter};
use crate::flow::{Endpoint, FlowKey};
use std::fmt;

/// Direction classification of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No HTTP request start seen yet; segments are dropped.
    PendingClassification,
    /// `client` sent the first request. Its segments feed the up stream.
    Active { client: Endpoint },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PendingClassification,
    Active,
    HalfClosed,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::PendingClassification => write!(f, "pending"),
            Phase::Active => write!(f, "active"),
            Phase::HalfClosed => write!(f, "half_closed"),
            Phase::Closed => write!(f, "closed"),
        }
    }
}

/// Reader halves handed to the connection handler.
#[derive(Debug)]
pub struct ConnectionStreams {
    /// Client to server.
    pub up: StreamReader,
    /// Server to client.
    pub down: StreamReader,
}

#[derive(Debug)]
pub struct Connection {
    key: FlowKey,
    state: ConnectionState,
    up: StreamWriter,
    down: StreamWriter,
    last_seen: f64,
}

impl Connection {
    pub fn new(key: FlowKey, ts: f64, options: StreamOptions) -> (Self, ConnectionStreams) {
        let (up, up_reader) = stream::channel(options);
        let (down, down_reader) = stream::channel(options);
        let connection = Connection {
            key,
            state: ConnectionState::PendingClassification,
            up,
            down,
            last_seen: ts,
        };
        let streams = ConnectionStreams {
            up: up_reader,
            down: down_reader,
        };
        (connection, streams)
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client(&self) -> Option<Endpoint> {
        match self.state {
            ConnectionState::Active { client } => Some(client),
            ConnectionState::PendingClassification => None,
        }
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            ConnectionState::PendingClassification => Phase::PendingClassification,
            ConnectionState::Active { .. } => match (self.up.is_closed(), self.down.is_closed()) {
                (true, true) => Phase::Closed,
                (false, false) => Phase::Active,
                _ => Phase::HalfClosed,
            },
        }
    }

    pub fn on_receive(&mut self, src: Endpoint, segment: Segment) {
        self.last_seen = segment.ts;

        let client = match self.state {
            ConnectionState::Active { client } => client,
            ConnectionState::PendingClassification => {
                if !is_http_request_start(&segment.payload) {
                    return;
                }
                self.state = ConnectionState::Active { client: src };
                tracing::debug!(flow = %self.key, client = %src, "connection classified as http");
                src
            }
        };

        // An ACK from one side confirms the bytes sent by the other.
        let (send, confirm) = if src == client {
            (&mut self.up, &mut self.down)
        } else {
            (&mut self.down, &mut self.up)
        };

        let flags = segment.flags;
        let ack = segment.ack;
        send.append(segment);
        if flags.ack {
            confirm.confirm(ack);
        }
        if flags.fin || flags.rst {
            send.mark_closed();
        }
    }

    /// Both directions have seen FIN or RST.
    pub fn is_closed(&self) -> bool {
        self.up.is_closed() && self.down.is_closed()
    }

    /// Force-close both directions and finish them. Used for idle eviction.
    pub fn flush(&mut self) {
        self.up.mark_closed();
        self.down.mark_closed();
        self.finish();
    }

    /// Close both channels; pending reads see end-of-stream. Idempotent.
    pub fn finish(&mut self) {
        self.up.finish();
        self.down.finish();
    }

    pub fn is_finished(&self) -> bool {
        self.up.is_finished() && self.down.is_finished()
    }
}
