use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("zone {0} has no active pipeline")]
    NoActivePipeline(u32),

    #[error("seek is only valid while streaming, zone {0} pipeline is in state {1}")]
    NotStreaming(u32, &'static str),

    #[error("source is not seekable (live stream)")]
    NotSeekable,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("failed to spawn decoder process: {0}")]
    DecoderSpawn(String),

    #[error("decoder process exited with an error: {0}")]
    DecoderFailed(String),

    #[error("sink I/O error: {0}")]
    SinkIo(String),

    #[error("pipeline control channel closed for zone {0}")]
    ChannelClosed(u32),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::SinkIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
