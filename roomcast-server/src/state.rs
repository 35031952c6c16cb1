//! Shared state handed to every axum handler: the state store readers need,
//! the coordinator the synchronous command endpoints dispatch through, and
//! the SSE broadcast channel the HTTP [`Egress`](roomcast_coordinator::Egress)
//! feeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use roomcast_coordinator::{Coordinator, StatusEvent};
use roomcast_core::StateStore;

/// Readiness per the C9 route contract: ready once the Snapcast connection
/// is up and at least one reconciliation pass has completed. The composition
/// root flips these flags as the corresponding milestones happen; nothing in
/// this crate mutates them.
#[derive(Default)]
pub struct Readiness {
    snapcast_connected: AtomicBool,
    reconciled_once: AtomicBool,
}

impl Readiness {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_snapcast_connected(&self, connected: bool) {
        self.snapcast_connected.store(connected, Ordering::Relaxed);
    }

    pub fn mark_reconciled(&self) {
        self.reconciled_once.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.snapcast_connected.load(Ordering::Relaxed) && self.reconciled_once.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub coordinator: Arc<Coordinator>,
    pub readiness: Arc<Readiness>,
    pub status_tx: broadcast::Sender<StatusEvent>,
}

impl AppState {
    pub fn new(store: Arc<StateStore>, coordinator: Arc<Coordinator>, readiness: Arc<Readiness>) -> Self {
        let (status_tx, _) = broadcast::channel(512);
        Self { store, coordinator, readiness, status_tx }
    }
}
