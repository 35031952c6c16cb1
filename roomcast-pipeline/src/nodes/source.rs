//! Source node: spawns the external decoder process named in configuration
//! (default `ffmpeg`) and forwards its stdout as undifferentiated
//! `PipelinePayload::Raw` chunks. The core never parses audio itself — the decoder is invoked to already hand back PCM at the
//! zone's negotiated format, which the framer node (re)chunks into frames.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::frame::{AudioFormat, PipelinePayload};
use crate::node::{NodeLogic, StopReason};

const READ_CHUNK_BYTES: usize = 8192;

/// Everything the source needs to build the decoder invocation.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub decoder_bin: String,
    pub url: String,
    pub format: AudioFormat,
    /// `Some` when this start is actually a seek-driven restart.
    pub start_offset_secs: Option<f64>,
}

pub struct DecoderSourceLogic {
    spec: SourceSpec,
    child: Option<Child>,
}

impl DecoderSourceLogic {
    pub fn new(spec: SourceSpec) -> Self {
        Self { spec, child: None }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.spec.decoder_bin);
        if let Some(offset) = self.spec.start_offset_secs {
            cmd.arg("-ss").arg(format!("{:.3}", offset));
        }
        cmd.arg("-i")
            .arg(&self.spec.url)
            .arg("-f")
            .arg("s16le")
            .arg("-ar")
            .arg(self.spec.format.sample_rate.to_string())
            .arg("-ac")
            .arg(self.spec.format.channels.to_string())
            .arg("-loglevel")
            .arg("error")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait::async_trait]
impl NodeLogic for DecoderSourceLogic {
    async fn process(
        &mut self,
        _input: Option<mpsc::Receiver<PipelinePayload>>,
        output: Vec<mpsc::Sender<PipelinePayload>>,
        stop_token: CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| PipelineError::DecoderSpawn(e.to_string()))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::DecoderSpawn("decoder process has no stdout".into()))?;
        let mut stderr = child.stderr.take();

        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        let result = loop {
            tokio::select! {
                biased;
                _ = stop_token.cancelled() => {
                    break Ok(());
                }
                read = stdout.read(&mut buf) => {
                    match read {
                        Ok(0) => break Ok(()),
                        Ok(n) => {
                            let chunk: Arc<[u8]> = Arc::from(&buf[..n]);
                            for tx in &output {
                                if tx.send(PipelinePayload::Raw(chunk.clone())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => break Err(PipelineError::DecoderFailed(e.to_string())),
                    }
                }
            }
        };

        self.child = Some(child);
        drain_stderr_on_failure(&result, &mut stderr).await;
        self.reap().await?;
        result
    }

    async fn cleanup(&mut self, reason: StopReason) -> Result<(), PipelineError> {
        if let Some(mut child) = self.child.take() {
            if matches!(reason, StopReason::Cancelled) {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        Ok(())
    }
}

impl DecoderSourceLogic {
    async fn reap(&mut self) -> Result<(), PipelineError> {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) if !status.success() => {
                    warn!(?status, "decoder process exited with a non-zero status");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "failed to poll decoder process status"),
            }
        }
        Ok(())
    }
}

async fn drain_stderr_on_failure(
    result: &Result<(), PipelineError>,
    stderr: &mut Option<tokio::process::ChildStderr>,
) {
    if result.is_ok() {
        return;
    }
    if let Some(stream) = stderr {
        let mut text = String::new();
        let _ = tokio::io::AsyncReadExt::read_to_string(stream, &mut text).await;
        if !text.trim().is_empty() {
            warn!(decoder_stderr = %text.trim(), "decoder reported an error");
        }
    }
}
