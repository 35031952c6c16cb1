//! Snapcast JSON-RPC client: one TCP connection to the daemon,
//! newline-delimited JSON-RPC 2.0, id-matched requests plus server-initiated
//! notifications turned into a broadcast `SnapcastEvent` stream.

mod client;
mod error;
mod protocol;

pub use client::{ConnectionState, SnapcastClient};
pub use error::SnapcastError;
pub use protocol::SnapcastEvent;
