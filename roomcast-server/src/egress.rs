//! The HTTP side of the `(Ingress, Egress)` adapter pair: the
//! ingress half is just the command handlers in [`crate::zones`] and
//! [`crate::clients`] calling `Coordinator::dispatch_sync` directly, so a
//! `PUT`/`POST` can answer with the resulting state instead of racing its own
//! debounce timer. This is the egress half — publishing a `StatusEvent` onto
//! the SSE broadcast channel every `/events` subscriber reads from.

use tokio::sync::broadcast;

use roomcast_coordinator::{Egress, SourceProtocol, StatusEvent};

pub struct HttpEgress {
    tx: broadcast::Sender<StatusEvent>,
}

impl HttpEgress {
    pub fn new(tx: broadcast::Sender<StatusEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl Egress for HttpEgress {
    fn protocol(&self) -> SourceProtocol {
        SourceProtocol::Api
    }

    async fn publish(&self, event: &StatusEvent) {
        // No subscribers is the common case between SSE clients; dropping a
        // send in that case is not a failure.
        let _ = self.tx.send(event.clone());
    }
}
