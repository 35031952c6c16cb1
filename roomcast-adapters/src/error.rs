//! Adapter-local error taxonomy. Adapters never propagate these into the
//! control plane proper — a malformed inbound payload is logged and
//! dropped, matching the "never crash the adapter" requirement.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("malformed payload on {topic}: {reason}")]
    MalformedPayload { topic: String, reason: String },

    #[error("malformed KNX telegram on group address {ga}: {reason}")]
    MalformedTelegram { ga: String, reason: String },

    #[error("no route registered for {0:?}/{1}")]
    UnroutedField(roomcast_coordinator::EntityKind, &'static str),

    #[error("transport error: {0}")]
    Transport(String),
}
