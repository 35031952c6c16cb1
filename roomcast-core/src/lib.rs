//! Domain model, error taxonomy, and the copy-on-write state store
//! shared by every other crate in the workspace.

pub mod error;
pub mod model;
pub mod store;
pub mod topology;

pub use error::ControlPlaneError;
pub use model::{
    Client, HostInfo, PlaybackState, Playlist, Snapshot, SnapcastClientStatus, SnapcastGroup,
    SnapcastView, Track, Zone,
};
pub use store::{SnapshotDelta, StateStore};
pub use topology::DesiredTopology;
