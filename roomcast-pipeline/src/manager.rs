//! Per-zone pipeline lifecycle: one actor task per zone owns that
//! zone's `Option<PipelineHandle>` so start/stop/seek requests against the
//! same zone are always serialized, never racing a Stopping→Idle transition.
//! Modeled on the command/reply actor shape already used for the daemon
//! connection in `roomcast_snapcast::client::SnapcastClient`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use roomcast_core::model::PlaybackState;

use crate::error::PipelineError;
use crate::frame::AudioFormat;
use crate::node::{start_pipeline, Node, PipelineHandle};
use crate::nodes::{DecoderSourceLogic, FramerLogic, NodeSignal, SinkLogic, SourceSpec};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Preparing,
    Streaming,
    Stopping,
    Error(String),
}

impl PipelineState {
    fn as_playback_state(&self) -> PlaybackState {
        match self {
            PipelineState::Idle => PlaybackState::Stopped,
            PipelineState::Preparing => PlaybackState::Buffering,
            PipelineState::Streaming => PlaybackState::Playing,
            PipelineState::Stopping => PlaybackState::Stopped,
            PipelineState::Error(_) => PlaybackState::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub position_ms: u64,
    pub format: Option<AudioFormat>,
    pub started_at: Option<DateTime<Utc>>,
}

impl PipelineStatus {
    fn idle() -> Self {
        Self { state: PipelineState::Idle, position_ms: 0, format: None, started_at: None }
    }
}

/// Everything the manager needs to start a zone's pipeline; populated by the
/// caller from a catalog-resolved stream URL, not looked up here.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    PositionChanged { zone_id: u32, position_ms: u64 },
    PlaybackStateChanged { zone_id: u32, state: PlaybackState },
    TrackInfoChanged { zone_id: u32, format: AudioFormat, metadata: TrackMetadata },
}

enum Command {
    Start { url: String, metadata: TrackMetadata, reply: oneshot::Sender<Result<(), PipelineError>> },
    Stop { reply: oneshot::Sender<Result<(), PipelineError>> },
    Seek { position_secs: f64, reply: oneshot::Sender<Result<(), PipelineError>> },
    Status { reply: oneshot::Sender<PipelineStatus> },
}

/// Handle to a running zone actor plus the shared, cheap-to-clone plumbing
/// (manager-wide settings and the event broadcast).
pub struct PipelineManager {
    decoder_bin: String,
    sink_dir: PathBuf,
    sink_flush_interval: Duration,
    stop_deadline: Duration,
    events: broadcast::Sender<PipelineEvent>,
    zones: Mutex<HashMap<u32, mpsc::Sender<Command>>>,
}

impl PipelineManager {
    pub fn new(
        decoder_bin: impl Into<String>,
        sink_dir: impl Into<PathBuf>,
        sink_flush_interval: Duration,
        stop_deadline: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            decoder_bin: decoder_bin.into(),
            sink_dir: sink_dir.into(),
            sink_flush_interval,
            stop_deadline,
            events,
            zones: Mutex::new(HashMap::new()),
        })
    }

    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Starts (or restarts) playback for `zone_id` from `url`. If a pipeline
    /// is already running for this zone it is stopped first — the actor task
    /// processes commands one at a time so this can never race a concurrent
    /// stop.
    pub async fn start(
        self: &Arc<Self>,
        zone_id: u32,
        url: String,
        metadata: TrackMetadata,
    ) -> Result<(), PipelineError> {
        let tx = self.zone_actor(zone_id).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Start { url, metadata, reply: reply_tx })
            .await
            .map_err(|_| PipelineError::ChannelClosed(zone_id))?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed(zone_id))?
    }

    pub async fn stop(&self, zone_id: u32) -> Result<(), PipelineError> {
        let tx = self.existing_actor(zone_id).await.ok_or(PipelineError::NoActivePipeline(zone_id))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Stop { reply: reply_tx })
            .await
            .map_err(|_| PipelineError::ChannelClosed(zone_id))?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed(zone_id))?
    }

    pub async fn seek(&self, zone_id: u32, position_secs: f64) -> Result<(), PipelineError> {
        let tx = self.existing_actor(zone_id).await.ok_or(PipelineError::NoActivePipeline(zone_id))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Seek { position_secs, reply: reply_tx })
            .await
            .map_err(|_| PipelineError::ChannelClosed(zone_id))?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed(zone_id))?
    }

    /// Stops every zone with an active pipeline, bounded by `stop_deadline`
    /// per zone (the same deadline a single `stop` already enforces).
    /// Called from the composition root during graceful shutdown so
    /// in-flight decoders and sink files get a chance to close cleanly
    /// before the process exits.
    pub async fn shutdown_all(&self) {
        let zone_ids: Vec<u32> = self.zones.lock().await.keys().copied().collect();
        for zone_id in zone_ids {
            if let Err(e) = self.stop(zone_id).await {
                warn!(zone_id, error = %e, "error stopping pipeline during shutdown");
            }
        }
    }

    pub async fn status(&self, zone_id: u32) -> PipelineStatus {
        let Some(tx) = self.existing_actor(zone_id).await else { return PipelineStatus::idle() };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(Command::Status { reply: reply_tx }).await.is_err() {
            return PipelineStatus::idle();
        }
        reply_rx.await.unwrap_or_else(|_| PipelineStatus::idle())
    }

    async fn existing_actor(&self, zone_id: u32) -> Option<mpsc::Sender<Command>> {
        self.zones.lock().await.get(&zone_id).cloned()
    }

    async fn zone_actor(self: &Arc<Self>, zone_id: u32) -> mpsc::Sender<Command> {
        let mut zones = self.zones.lock().await;
        if let Some(tx) = zones.get(&zone_id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }
        let (tx, rx) = mpsc::channel(8);
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_zone_actor(zone_id, rx).await });
        zones.insert(zone_id, tx.clone());
        tx
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    async fn run_zone_actor(self: Arc<Self>, zone_id: u32, mut rx: mpsc::Receiver<Command>) {
        let mut actor = ZoneActor {
            manager: Arc::clone(&self),
            zone_id,
            handle: None,
            format: None,
            current_url: None,
            current_duration_secs: None,
            signal_rx: None,
            position_ms: 0,
            state: PipelineState::Idle,
        };

        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Start { url, metadata, reply } => {
                    let result = actor.start(url, metadata).await;
                    let _ = reply.send(result);
                }
                Command::Stop { reply } => {
                    let result = actor.stop().await;
                    let _ = reply.send(result);
                }
                Command::Seek { position_secs, reply } => {
                    let result = actor.seek(position_secs).await;
                    let _ = reply.send(result);
                }
                Command::Status { reply } => {
                    let _ = reply.send(actor.status());
                }
            }
        }

        let _ = actor.stop().await;
        self.zones.lock().await.remove(&zone_id);
    }
}

struct ZoneActor {
    manager: Arc<PipelineManager>,
    zone_id: u32,
    handle: Option<PipelineHandle>,
    format: Option<AudioFormat>,
    current_url: Option<String>,
    /// `None` means the current track is a live source (no known duration);
    /// preserved across the stop+restart a seek performs so a later seek on
    /// the same track still sees it, rather than being reset to `None` by
    /// the restart's own `TrackMetadata`.
    current_duration_secs: Option<u32>,
    signal_rx: Option<mpsc::UnboundedReceiver<NodeSignal>>,
    position_ms: u64,
    state: PipelineState,
}

impl ZoneActor {
    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            state: self.state.clone(),
            position_ms: self.position_ms,
            format: self.format,
            started_at: None,
        }
    }

    fn set_state(&mut self, state: PipelineState) {
        let emits = matches!(state, PipelineState::Idle | PipelineState::Streaming | PipelineState::Error(_));
        self.state = state;
        if emits {
            self.manager.emit(PipelineEvent::PlaybackStateChanged {
                zone_id: self.zone_id,
                state: self.state.as_playback_state(),
            });
        }
    }

    async fn start(&mut self, url: String, metadata: TrackMetadata) -> Result<(), PipelineError> {
        self.current_duration_secs = metadata.duration_secs;
        self.start_from(url, metadata, None).await
    }

    async fn start_from(
        &mut self,
        url: String,
        metadata: TrackMetadata,
        start_offset_secs: Option<f64>,
    ) -> Result<(), PipelineError> {
        if self.handle.is_some() {
            self.teardown(PipelineState::Stopping).await;
        }

        self.set_state(PipelineState::Preparing);
        let format = AudioFormat::DEFAULT;
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let sink_path = self.manager.sink_dir.join(format!("zone-{}.pcm", self.zone_id));
        let source = DecoderSourceLogic::new(SourceSpec {
            decoder_bin: self.manager.decoder_bin.clone(),
            url: url.clone(),
            format,
            start_offset_secs,
        });
        let framer = FramerLogic::new(format, signal_tx);
        let sink = SinkLogic::new(sink_path, self.manager.sink_flush_interval);

        let mut source_node = Node::source(source);
        let mut framer_node = Node::with_input(framer);
        let sink_node = Node::with_input(sink);

        framer_node.register(Box::new(sink_node));
        source_node.register(Box::new(framer_node));

        let handle = start_pipeline(Box::new(source_node));

        self.handle = Some(handle);
        self.format = Some(format);
        self.current_url = Some(url);
        self.signal_rx = Some(signal_rx);
        self.position_ms = 0;
        self.manager.emit(PipelineEvent::TrackInfoChanged { zone_id: self.zone_id, format, metadata });
        self.drain_signals_until_settled().await;
        self.set_state(PipelineState::Streaming);
        Ok(())
    }

    /// Waits briefly for the framer to negotiate a format before declaring
    /// the zone `Streaming`, draining any early position signals in the
    /// meantime so they are not lost once the manager starts polling.
    async fn drain_signals_until_settled(&mut self) {
        if let Some(rx) = self.signal_rx.as_mut() {
            if let Ok(Some(signal)) = timeout(Duration::from_millis(50), rx.recv()).await {
                self.apply_signal(signal);
            }
        }
    }

    fn apply_signal(&mut self, signal: NodeSignal) {
        match signal {
            NodeSignal::FormatNegotiated(format) => self.format = Some(format),
            NodeSignal::PositionAdvanced { frame_offset, format } => {
                let frames_per_sec = format.sample_rate as u64;
                if frames_per_sec > 0 {
                    self.position_ms = frame_offset * 1000 / frames_per_sec;
                    self.manager.emit(PipelineEvent::PositionChanged {
                        zone_id: self.zone_id,
                        position_ms: self.position_ms,
                    });
                }
            }
        }
    }

    async fn stop(&mut self) -> Result<(), PipelineError> {
        if self.handle.is_none() {
            self.set_state(PipelineState::Idle);
            return Ok(());
        }
        self.teardown(PipelineState::Stopping).await;
        self.set_state(PipelineState::Idle);
        Ok(())
    }

    async fn teardown(&mut self, transient: PipelineState) {
        self.state = transient;
        if let Some(handle) = self.handle.take() {
            handle.cancel();
            match timeout(self.manager.stop_deadline, handle.wait()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(zone_id = self.zone_id, error = %e, "pipeline stopped with an error"),
                Err(_) => warn!(
                    zone_id = self.zone_id,
                    deadline = ?self.manager.stop_deadline,
                    "pipeline did not stop within the graceful deadline"
                ),
            }
        }
        self.signal_rx = None;
        info!(zone_id = self.zone_id, "pipeline stopped");
    }

    async fn seek(&mut self, position_secs: f64) -> Result<(), PipelineError> {
        if self.state != PipelineState::Streaming {
            return Err(PipelineError::NotStreaming(self.zone_id, state_name(&self.state)));
        }
        if self.current_duration_secs.is_none() {
            return Err(PipelineError::NotSeekable);
        }
        let url = self.current_url.clone().ok_or(PipelineError::NoActivePipeline(self.zone_id))?;
        // Real in-stream seeking isn't available through a plain decoder
        // byte pipe; a seek is a stop+restart of the decoder at the new
        // offset, which is transparent to callers since `status()` reports
        // the new position once the restarted framer resumes signalling.
        let duration_secs = self.current_duration_secs;
        self.teardown(PipelineState::Stopping).await;
        self.start_from(url, TrackMetadata { title: None, duration_secs }, Some(position_secs)).await
    }
}

fn state_name(state: &PipelineState) -> &'static str {
    match state {
        PipelineState::Idle => "idle",
        PipelineState::Preparing => "preparing",
        PipelineState::Streaming => "streaming",
        PipelineState::Stopping => "stopping",
        PipelineState::Error(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> Arc<PipelineManager> {
        PipelineManager::new(
            "/bin/cat",
            std::env::temp_dir().join("roomcast-pipeline-tests"),
            Duration::from_millis(20),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn status_of_unknown_zone_is_idle() {
        let manager = test_manager();
        let status = manager.status(99).await;
        assert_eq!(status.state, PipelineState::Idle);
    }

    #[tokio::test]
    async fn stop_without_start_reports_no_active_pipeline() {
        let manager = test_manager();
        let err = manager.stop(7).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoActivePipeline(7)));
    }

    #[tokio::test]
    async fn seek_without_start_reports_no_active_pipeline() {
        let manager = test_manager();
        let err = manager.seek(7, 10.0).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoActivePipeline(7)));
    }

    #[tokio::test]
    async fn seek_on_a_live_source_is_not_seekable() {
        let manager = test_manager();
        let mut actor = ZoneActor {
            manager,
            zone_id: 1,
            handle: None,
            format: None,
            current_url: Some("http://example.invalid/live".to_string()),
            current_duration_secs: None,
            signal_rx: None,
            position_ms: 0,
            state: PipelineState::Streaming,
        };
        let err = actor.seek(5.0).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotSeekable));
    }
}
