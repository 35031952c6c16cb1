//! Newline-delimited JSON-RPC 2.0 wire shapes and the notification → event mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcMessage {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<u64>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    pub result: Option<Value>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorBody {
    #[allow(dead_code)]
    pub code: i64,
    pub message: String,
}

/// Events consumers observe from `SnapcastClient::events()`. `Resynced` means
/// "the connection was re-established; treat your SnapcastView as stale and
/// rerun reconciliation".
#[derive(Debug, Clone)]
pub enum SnapcastEvent {
    ClientConnected { uuid: String },
    ClientDisconnected { uuid: String },
    ClientVolumeChanged { uuid: String, volume: u8, muted: bool },
    GroupStreamChanged { group_id: String, stream_id: String },
    ServerUpdate,
    Resynced,
}

/// Maps a raw server-initiated notification into a typed event. Unknown
/// methods are logged by the caller and dropped — never fatal.
pub(crate) fn notification_to_event(method: &str, params: &Value) -> Option<SnapcastEvent> {
    match method {
        "Client.OnConnect" => Some(SnapcastEvent::ClientConnected {
            uuid: params.get("client")?.get("id")?.as_str()?.to_string(),
        }),
        "Client.OnDisconnect" => Some(SnapcastEvent::ClientDisconnected {
            uuid: params.get("client")?.get("id")?.as_str()?.to_string(),
        }),
        "Client.OnVolumeChanged" => Some(SnapcastEvent::ClientVolumeChanged {
            uuid: params.get("id")?.as_str()?.to_string(),
            volume: params.get("volume")?.get("percent")?.as_u64()? as u8,
            muted: params.get("volume")?.get("muted")?.as_bool().unwrap_or(false),
        }),
        "Group.OnStreamChanged" => Some(SnapcastEvent::GroupStreamChanged {
            group_id: params.get("id")?.as_str()?.to_string(),
            stream_id: params.get("stream_id")?.as_str()?.to_string(),
        }),
        "Server.OnUpdate" => Some(SnapcastEvent::ServerUpdate),
        _ => None,
    }
}
