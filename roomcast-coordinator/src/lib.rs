//! Protocol coordinator: fans inbound commands from the API,
//! MQTT, and KNX adapters (plus the Snapcast observer, tagged `Internal`)
//! through debounce, per-entity serialization, and the domain [`handlers`]
//! onto the state store, reconciler, and pipeline manager — then publishes
//! the resulting `StatusEvent`s back out to every adapter except the one
//! that caused them.

pub mod command;
pub mod coordinator;
pub mod echo;
pub mod egress;
pub mod entity_lock;
pub mod handlers;
pub mod queue;
pub mod status;

pub use command::{Command, EntityKind, SeekPosition, SourceProtocol, TaggedCommand};
pub use coordinator::Coordinator;
pub use echo::EchoGuard;
pub use egress::Egress;
pub use entity_lock::EntityLocks;
pub use handlers::Deps;
pub use queue::InboundQueue;
pub use status::{StatusEvent, StatusPayload};
