use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SnapcastError {
    #[error("not connected to snapcast daemon")]
    NotConnected,

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("request was cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed JSON-RPC message: {0}")]
    Protocol(String),

    #[error("daemon returned an error: {0}")]
    Rpc(String),
}

impl From<std::io::Error> for SnapcastError {
    fn from(e: std::io::Error) -> Self {
        SnapcastError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for SnapcastError {
    fn from(e: serde_json::Error) -> Self {
        SnapcastError::Protocol(e.to_string())
    }
}
