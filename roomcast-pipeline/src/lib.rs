//! Media pipeline manager: per-zone URL → decode → sink lifecycle with an
//! at-most-one-active-pipeline-per-zone guarantee.
//!
//! Pipelines are built from the `Node`/`NodeLogic` split in [`node`], a
//! thin-orchestration-around-swappable-logic shape. This pipeline is always
//! a flat three-node chain: an external-decoder source, a framing node that
//! turns raw decoder bytes into timestamped `PcmFrame`s, and a sink that
//! writes them to the zone's named sink file.

pub mod error;
pub mod frame;
pub mod manager;
pub mod node;
pub mod nodes;

pub use error::PipelineError;
pub use frame::{AudioFormat, PcmFrame, PipelinePayload};
pub use manager::{PipelineEvent, PipelineManager, PipelineState, PipelineStatus, TrackMetadata};
pub use node::{start_pipeline, Node, NodeLogic, PipelineHandle, PipelineNode, StopReason};
