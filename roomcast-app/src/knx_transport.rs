//! The composition root's concrete [`KnxTransport`]. Real KNXnet/IP or bus
//! wire framing is out of scope; this logs the group-value
//! write it would have sent instead of touching a socket, so the KNX
//! command/status plumbing is fully wired and testable even with no gateway
//! hardware attached. Swap in a real gateway driver crate behind this same
//! trait once one is selected.

use async_trait::async_trait;
use tracing::info;

use roomcast_adapters::error::AdapterError;
use roomcast_adapters::{GroupAddress, KnxTransport};

pub struct LoggingKnxTransport;

#[async_trait]
impl KnxTransport for LoggingKnxTransport {
    async fn send(&self, ga: GroupAddress, raw: &[u8]) -> Result<(), AdapterError> {
        info!(%ga, ?raw, "knx gateway not configured; logging group-value-write instead of sending it");
        Ok(())
    }
}
