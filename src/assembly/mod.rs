//! TCP stream reassembly.
//!
//! ```text
//! Segment --> Assembler (FlowKey -> Connection)
//!               |
//!               +-- Connection.on_receive
//!                     |-- up:   StreamWriter (ReceiveWindow) --[chunks]--> StreamReader
//!                     +-- down: StreamWriter (ReceiveWindow) --[chunks]--> StreamReader
//! ```
//!
//! Bytes are released from a window only when the peer ACKs them, so each
//! reader sees one direction of the connection in sequence order.

pub mod connection;
pub mod registry;
pub mod segment;
pub mod seq;
pub mod stream;
pub mod window;

pub use connection::{Connection, ConnectionStreams, Phase};
pub use registry::{Assembler, ConnectionHandler, FlowFilter};
pub use segment::{Segment, TcpFlags};
pub use stream::{StreamOptions, StreamReader, StreamWriter};
pub use window::ReceiveWindow;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a pairing thread panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
