//! The single data unit flowing through a pipeline: a chunk of raw PCM plus
//! the format it was decoded at. Deliberately simpler than the DSP-grade
//! `AudioChunk`/`AudioSegment` types this stack uses elsewhere — this
//! pipeline only moves bytes from an external decoder to a sink file, it
//! never mixes or filters samples itself.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
}

impl AudioFormat {
    /// Negotiated default for every zone unless a track requests otherwise.
    pub const DEFAULT: AudioFormat = AudioFormat { sample_rate: 48_000, bit_depth: 16, channels: 2 };

    pub fn bytes_per_frame(&self) -> usize {
        (self.bit_depth as usize / 8) * self.channels as usize
    }
}

/// One chunk of decoded PCM bytes at `format`, tagged with its frame offset
/// within the current track (used to derive `PositionChanged`).
#[derive(Debug, Clone)]
pub struct PcmFrame {
    pub format: AudioFormat,
    pub data: Arc<[u8]>,
    pub frame_offset: u64,
}

impl PcmFrame {
    pub fn duration(&self) -> std::time::Duration {
        let frames = self.data.len() / self.format.bytes_per_frame().max(1);
        std::time::Duration::from_secs_f64(frames as f64 / self.format.sample_rate as f64)
    }
}

/// The single type flowing through every channel in a pipeline. The source
/// node owns an external decoder process and only ever sees undifferentiated
/// bytes off its stdout; the decode/resample node is the one that knows how
/// to turn those bytes into properly framed `PcmFrame`s, so the chain needs
/// one shared payload type rather than a `PcmFrame`-only channel.
#[derive(Debug, Clone)]
pub enum PipelinePayload {
    Raw(Arc<[u8]>),
    Pcm(PcmFrame),
}
