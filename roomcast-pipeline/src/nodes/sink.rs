//! Sink node: writes incoming PCM frames to the zone's sink file, flushing on
//! a fixed interval rather than on every frame. Resolves its destination path
//! once up front and keeps the file handle for the node's lifetime.

use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::PipelineError;
use crate::frame::PipelinePayload;
use crate::node::{NodeLogic, StopReason};

pub struct SinkLogic {
    path: PathBuf,
    flush_interval: Duration,
    file: Option<File>,
}

impl SinkLogic {
    pub fn new(path: PathBuf, flush_interval: Duration) -> Self {
        Self { path, flush_interval, file: None }
    }

    async fn open(&mut self) -> Result<(), PipelineError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::SinkIo(format!("failed to create sink directory {parent:?}: {e}"))
            })?;
        }
        let file = File::create(&self.path)
            .await
            .map_err(|e| PipelineError::SinkIo(format!("failed to create sink file {:?}: {e}", self.path)))?;
        self.file = Some(file);
        Ok(())
    }
}

#[async_trait::async_trait]
impl NodeLogic for SinkLogic {
    async fn process(
        &mut self,
        input: Option<mpsc::Receiver<PipelinePayload>>,
        _output: Vec<mpsc::Sender<PipelinePayload>>,
        stop_token: CancellationToken,
    ) -> Result<(), PipelineError> {
        self.open().await?;
        let mut input = input.ok_or_else(|| {
            PipelineError::SinkIo("sink node requires an input channel".into())
        })?;

        let mut flush_ticker = tokio::time::interval(self.flush_interval);
        flush_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut dirty = false;

        loop {
            tokio::select! {
                biased;
                _ = stop_token.cancelled() => break,
                _ = flush_ticker.tick() => {
                    if dirty {
                        self.flush().await?;
                        dirty = false;
                    }
                }
                received = input.recv() => {
                    let Some(payload) = received else { break };
                    let bytes: &[u8] = match &payload {
                        PipelinePayload::Raw(b) => b,
                        PipelinePayload::Pcm(frame) => &frame.data,
                    };
                    let file = self.file.as_mut().expect("sink file opened before processing");
                    file.write_all(bytes)
                        .await
                        .map_err(|e| PipelineError::SinkIo(format!("write to sink failed: {e}")))?;
                    dirty = true;
                }
            }
        }

        if dirty {
            self.flush().await?;
        }
        Ok(())
    }

    async fn cleanup(&mut self, reason: StopReason) -> Result<(), PipelineError> {
        debug!(?reason, path = ?self.path, "closing pipeline sink");
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
            let _ = file.shutdown().await;
        }
        Ok(())
    }
}

impl SinkLogic {
    async fn flush(&mut self) -> Result<(), PipelineError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()
                .await
                .map_err(|e| PipelineError::SinkIo(format!("flush of sink failed: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_flushes_on_graceful_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone-1.pcm");
        let mut logic = SinkLogic::new(path.clone(), Duration::from_secs(60));

        let (in_tx, in_rx) = mpsc::channel(4);
        let stop_token = CancellationToken::new();

        let handle = tokio::spawn({
            let stop_token = stop_token.clone();
            async move { logic.process(Some(in_rx), vec![], stop_token).await }
        });

        in_tx.send(PipelinePayload::Raw(vec![1, 2, 3, 4].into())).await.unwrap();
        drop(in_tx);

        handle.await.unwrap().unwrap();
        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, vec![1, 2, 3, 4]);
    }
}
