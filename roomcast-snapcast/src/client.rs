use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::SnapcastError;
use crate::protocol::{RpcMessage, RpcRequest, SnapcastEvent, notification_to_event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Draining,
}

const EVENT_CHANNEL_CAPACITY: usize = 512;
const COMMAND_CHANNEL_CAPACITY: usize = 256;

struct CallCommand {
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, SnapcastError>>,
}

/// Owns the single TCP connection to the Snapcast daemon. All other
/// components reach it through `call`/`events`; the connection itself is
/// never shared.
pub struct SnapcastClient {
    host: String,
    port: u16,
    rpc_timeout: Duration,
    reconnect_backoff_max: Duration,
    command_tx: mpsc::Sender<CallCommand>,
    command_rx: Mutex<Option<mpsc::Receiver<CallCommand>>>,
    event_tx: broadcast::Sender<SnapcastEvent>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown: Arc<AtomicBool>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SnapcastClient {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        rpc_timeout: Duration,
        reconnect_backoff_max: Duration,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            host: host.into(),
            port,
            rpc_timeout,
            reconnect_backoff_max,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            event_tx,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            shutdown: Arc::new(AtomicBool::new(false)),
            supervisor: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Idempotent: a second call while already connecting/connected is a no-op.
    pub async fn connect(self: &Arc<Self>) {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.is_some() {
            return;
        }
        let Some(command_rx) = self.command_rx.lock().await.take() else {
            return;
        };
        self.shutdown.store(false, Ordering::SeqCst);

        let this = self.clone();
        *supervisor = Some(tokio::spawn(async move {
            this.supervisor_loop(command_rx).await;
        }));
    }

    /// Idempotent: disconnecting twice, or disconnecting before ever
    /// connecting, is a no-op.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.lock().await.take() {
            handle.abort();
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub fn events(&self) -> broadcast::Receiver<SnapcastEvent> {
        self.event_tx.subscribe()
    }

    /// At-most-once per invocation; a cancelled future drops its pending
    /// reply slot cleanly (the `oneshot::Sender` is simply dropped and the
    /// reader task's `send` on it becomes a no-op failure it ignores).
    pub async fn call(&self, method: impl Into<String>, params: Value) -> Result<Value, SnapcastError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(SnapcastError::NotConnected);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(CallCommand {
                method: method.into(),
                params,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SnapcastError::NotConnected)?;

        match tokio::time::timeout(self.rpc_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SnapcastError::Cancelled),
            Err(_) => Err(SnapcastError::Timeout(self.rpc_timeout)),
        }
    }

    async fn supervisor_loop(self: Arc<Self>, mut command_rx: mpsc::Receiver<CallCommand>) {
        let mut backoff = Duration::from_millis(200);
        let mut ever_connected = false;

        while !self.shutdown.load(Ordering::SeqCst) {
            *self.state.write().await = ConnectionState::Connecting;
            let addr = format!("{}:{}", self.host, self.port);

            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    info!(%addr, "connected to snapcast daemon");
                    *self.state.write().await = ConnectionState::Connected;
                    backoff = Duration::from_millis(200);

                    if ever_connected {
                        let _ = self.event_tx.send(SnapcastEvent::Resynced);
                    }
                    ever_connected = true;

                    self.clone().run_connection(stream, &mut command_rx).await;

                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    *self.state.write().await = ConnectionState::Reconnecting;
                    warn!("snapcast connection lost, reconnecting");
                }
                Err(e) => {
                    warn!(%addr, error = %e, "failed to connect to snapcast daemon");
                    *self.state.write().await = ConnectionState::Reconnecting;
                }
            }

            sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, self.reconnect_backoff_max);
        }

        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Drives one physical connection until it drops or a command channel
    /// closes. Request ids are multiplexed through `pending`; the reader
    /// side both resolves replies and turns notifications into events.
    async fn run_connection(self: Arc<Self>, stream: TcpStream, command_rx: &mut mpsc::Receiver<CallCommand>) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let next_id = AtomicU64::new(1);
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, SnapcastError>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else { return };
                    let id = next_id.fetch_add(1, Ordering::SeqCst);
                    let request = RpcRequest {
                        jsonrpc: "2.0",
                        id,
                        method: command.method,
                        params: command.params,
                    };
                    let Ok(mut line) = serde_json::to_string(&request) else {
                        let _ = command.reply.send(Err(SnapcastError::Protocol("failed to encode request".into())));
                        continue;
                    };
                    line.push('\n');

                    pending.lock().await.insert(id, command.reply);
                    if let Err(e) = write_half.write_all(line.as_bytes()).await {
                        if let Some(reply) = pending.lock().await.remove(&id) {
                            let _ = reply.send(Err(SnapcastError::Transport(e.to_string())));
                        }
                        return;
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(raw)) => self.handle_incoming(&raw, &pending).await,
                        Ok(None) => {
                            debug!("snapcast daemon closed the connection");
                            return;
                        }
                        Err(e) => {
                            warn!(error = %e, "error reading from snapcast daemon");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_incoming(
        &self,
        raw: &str,
        pending: &Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, SnapcastError>>>>>,
    ) {
        let message: RpcMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "dropping malformed JSON-RPC line");
                return;
            }
        };

        if let Some(id) = message.id {
            if let Some(reply) = pending.lock().await.remove(&id) {
                let outcome = match message.error {
                    Some(err) => Err(SnapcastError::Rpc(err.message)),
                    None => Ok(message.result.unwrap_or(Value::Null)),
                };
                let _ = reply.send(outcome);
            }
            return;
        }

        if let Some(method) = message.method {
            match notification_to_event(&method, &message.params) {
                Some(event) => {
                    let _ = self.event_tx.send(event);
                }
                None => debug!(%method, "unknown snapcast notification, dropped"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_before_connect_fails_fast() {
        let client = SnapcastClient::new("127.0.0.1", 1705, Duration::from_millis(50), Duration::from_secs(1));
        let result = client.call("Server.GetStatus", Value::Null).await;
        assert!(matches!(result, Err(SnapcastError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_a_no_op() {
        let client = Arc::new(SnapcastClient::new(
            "127.0.0.1",
            1705,
            Duration::from_millis(50),
            Duration::from_secs(1),
        ));
        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }
}
