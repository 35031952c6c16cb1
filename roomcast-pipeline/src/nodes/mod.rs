//! Concrete `NodeLogic` implementations for the three-node decode chain:
//! an external-decoder source, a byte→`PcmFrame` framer, and a file sink.

mod framer;
mod sink;
mod source;

pub use framer::FramerLogic;
pub use sink::SinkLogic;
pub use source::{DecoderSourceLogic, SourceSpec};

/// Internal progress/metadata signal threaded from a node back to the
/// `PipelineManager`'s per-zone actor, independent of the `PipelinePayload`
/// data path.
#[derive(Debug, Clone)]
pub enum NodeSignal {
    PositionAdvanced { frame_offset: u64, format: crate::frame::AudioFormat },
    FormatNegotiated(crate::frame::AudioFormat),
}
