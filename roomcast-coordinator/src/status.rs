//! `StatusEvent`: the typed fact published to every
//! outbound adapter except the originator. Adapters encode `payload` to
//! their own surface (JSON body, MQTT payload, KNX DPT write).

use roomcast_core::model::PlaybackState;

use crate::command::{EntityKind, SourceProtocol};

#[derive(Debug, Clone, PartialEq)]
pub enum StatusPayload {
    Bool(bool),
    U8(u8),
    U32(u32),
    OptionU32(Option<u32>),
    PlaybackState(PlaybackState),
}

#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub entity_kind: EntityKind,
    pub entity_id: u32,
    pub field: &'static str,
    pub payload: StatusPayload,
    /// The protocol whose command caused this event, so the coordinator can
    /// suppress republishing it back to its own originator. `Internal` (e.g. a Snapcast-observer-driven reflection)
    /// is never suppressed anywhere.
    pub source: SourceProtocol,
}

impl StatusEvent {
    pub fn key(&self) -> (EntityKind, u32, &'static str) {
        (self.entity_kind, self.entity_id, self.field)
    }
}
