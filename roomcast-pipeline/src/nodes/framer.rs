//! Framer node: re-chunks the source's raw decoder bytes onto frame
//! boundaries and tags each chunk with its running frame offset, which the
//! manager uses to derive `PositionChanged`. This is the node that
//! conceptually owns "decode/resample" in the three-node chain even though
//! the actual sample conversion already happened in the external decoder
//! — it is the seam where a real resampler would plug in.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::frame::{AudioFormat, PcmFrame, PipelinePayload};
use crate::node::{NodeLogic, StopReason};
use crate::nodes::NodeSignal;

pub struct FramerLogic {
    format: AudioFormat,
    signals: mpsc::UnboundedSender<NodeSignal>,
    leftover: Vec<u8>,
    frame_offset: u64,
}

impl FramerLogic {
    pub fn new(format: AudioFormat, signals: mpsc::UnboundedSender<NodeSignal>) -> Self {
        Self { format, signals, leftover: Vec::new(), frame_offset: 0 }
    }
}

#[async_trait::async_trait]
impl NodeLogic for FramerLogic {
    async fn process(
        &mut self,
        input: Option<mpsc::Receiver<PipelinePayload>>,
        output: Vec<mpsc::Sender<PipelinePayload>>,
        stop_token: CancellationToken,
    ) -> Result<(), PipelineError> {
        let _ = self.signals.send(NodeSignal::FormatNegotiated(self.format));
        let mut input = input.ok_or_else(|| {
            PipelineError::DecoderFailed("framer node requires an input channel".into())
        })?;
        let bytes_per_frame = self.format.bytes_per_frame().max(1);

        loop {
            tokio::select! {
                biased;
                _ = stop_token.cancelled() => return Ok(()),
                received = input.recv() => {
                    let Some(payload) = received else { return Ok(()) };
                    let PipelinePayload::Raw(chunk) = payload else { continue };

                    self.leftover.extend_from_slice(&chunk);
                    let aligned_len = (self.leftover.len() / bytes_per_frame) * bytes_per_frame;
                    if aligned_len == 0 {
                        continue;
                    }

                    let frame_bytes: std::sync::Arc<[u8]> =
                        std::sync::Arc::from(&self.leftover[..aligned_len]);
                    self.leftover.drain(..aligned_len);

                    let frame = PcmFrame {
                        format: self.format,
                        data: frame_bytes,
                        frame_offset: self.frame_offset,
                    };
                    self.frame_offset += (aligned_len / bytes_per_frame) as u64;

                    let _ = self.signals.send(NodeSignal::PositionAdvanced {
                        frame_offset: self.frame_offset,
                        format: self.format,
                    });

                    for tx in &output {
                        if tx.send(PipelinePayload::Pcm(frame.clone())).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn cleanup(&mut self, _reason: StopReason) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leftover_bytes_carry_across_chunks() {
        let format = AudioFormat { sample_rate: 48_000, bit_depth: 16, channels: 2 };
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let mut logic = FramerLogic::new(format, signal_tx);

        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let stop_token = CancellationToken::new();

        let handle = tokio::spawn({
            let stop_token = stop_token.clone();
            async move { logic.process(Some(in_rx), vec![out_tx], stop_token).await }
        });

        // 3 bytes is not frame-aligned (bytes_per_frame = 4); nothing should
        // be emitted until the remaining byte arrives.
        in_tx.send(PipelinePayload::Raw(vec![1, 2, 3].into())).await.unwrap();
        in_tx.send(PipelinePayload::Raw(vec![4, 5, 6, 7].into())).await.unwrap();
        drop(in_tx);

        let frame = match out_rx.recv().await.unwrap() {
            PipelinePayload::Pcm(f) => f,
            _ => panic!("expected a pcm frame"),
        };
        assert_eq!(frame.data.len(), 4);
        assert_eq!(frame.frame_offset, 0);

        assert!(matches!(signal_rx.recv().await, Some(NodeSignal::FormatNegotiated(_))));
        stop_token.cancel();
        handle.await.unwrap().unwrap();
    }
}
