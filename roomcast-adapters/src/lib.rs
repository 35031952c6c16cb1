//! Protocol adapters: MQTT, KNX, and the Snapcast egress that turns
//! published `StatusEvent`s back into daemon RPCs. The declarative
//! command/status routing table in [`registry`] is the single source of
//! truth every adapter looks field names and addresses up against.

pub mod dpt;
pub mod error;
pub mod knx;
pub mod mqtt;
pub mod registry;
pub mod snapcast_egress;

pub use error::AdapterError;
pub use knx::{GroupAddress, InboundTelegram, KnxEgress, KnxIngress, KnxTransport};
pub use mqtt::{MqttAdapter, MqttEgress};
pub use snapcast_egress::SnapcastEgress;
