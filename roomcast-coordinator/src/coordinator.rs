//! The `Coordinator`: one `InboundQueue` per source protocol, a
//! debounce stage that collapses rapid duplicate commands on the same
//! `(entity, field)` key, per-entity serialization, dispatch into the
//! domain [`handlers`], and echo-suppressed fan-out to every registered
//! [`Egress`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use roomcast_core::ControlPlaneError;

use crate::command::{Command, SourceProtocol, TaggedCommand};
use crate::echo::EchoGuard;
use crate::entity_lock::EntityLocks;
use crate::egress::Egress;
use crate::handlers::{self, Deps};
use crate::queue::InboundQueue;
use crate::status::StatusEvent;

pub struct Coordinator {
    deps: Deps,
    queues: HashMap<SourceProtocol, Arc<InboundQueue>>,
    entity_locks: Arc<EntityLocks>,
    echo: Arc<EchoGuard>,
    egress: Mutex<Vec<Arc<dyn Egress>>>,
    debounce_window: Duration,
    echo_window: Duration,
    pending_debounce: Mutex<HashMap<(crate::command::EntityKind, u32, &'static str), JoinHandle<()>>>,
}

const SOURCES: [SourceProtocol; 4] =
    [SourceProtocol::Api, SourceProtocol::Mqtt, SourceProtocol::Knx, SourceProtocol::Snapcast];

impl Coordinator {
    pub fn new(
        deps: Deps,
        queue_capacity: usize,
        debounce_window: Duration,
        echo_window: Duration,
    ) -> Arc<Self> {
        let queues = SOURCES
            .iter()
            .map(|source| (*source, Arc::new(InboundQueue::new(queue_capacity))))
            .collect();

        Arc::new(Self {
            deps,
            queues,
            entity_locks: Arc::new(EntityLocks::new()),
            echo: Arc::new(EchoGuard::new()),
            egress: Mutex::new(Vec::new()),
            debounce_window,
            echo_window,
            pending_debounce: Mutex::new(HashMap::new()),
        })
    }

    pub async fn register_egress(&self, egress: Arc<dyn Egress>) {
        self.egress.lock().await.push(egress);
    }

    /// Enqueues `command` for asynchronous dispatch. Used by every adapter except the synchronous HTTP
    /// command path, which calls [`Coordinator::dispatch_sync`] instead so it
    /// can return the resulting status to its caller.
    pub async fn submit(&self, source: SourceProtocol, command: Command) {
        let Some(queue) = self.queues.get(&source) else {
            warn!(?source, "no inbound queue registered for this source");
            return;
        };
        queue.push(TaggedCommand { source, command }).await;
    }

    /// Spawns the one worker loop per source protocol; returns immediately.
    /// Call once from the composition root after construction.
    pub fn spawn_workers(self: &Arc<Self>) {
        for source in SOURCES {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.run_worker(source).await });
        }
    }

    async fn run_worker(self: Arc<Self>, source: SourceProtocol) {
        let queue = self.queues.get(&source).expect("every source has a queue").clone();
        loop {
            let tagged = queue.pop().await;
            self.debounced_dispatch(tagged).await;
        }
    }

    /// Coalesces rapid repeats on the same debounce key into one delayed
    /// dispatch: each new submission for a key cancels the previously
    /// scheduled one and reschedules from now.
    async fn debounced_dispatch(&self, tagged: TaggedCommand) {
        let key = tagged.command.debounce_key();
        let window = self.debounce_window;

        let mut pending = self.pending_debounce.lock().await;
        if let Some(handle) = pending.remove(&key) {
            handle.abort();
        }

        // Can't borrow `self` across the spawn; the dispatch path below only
        // needs `Arc`-backed handles, so rebuild the pieces it needs here.
        let deps = self.deps.clone();
        let entity_locks = Arc::clone(&self.entity_locks);
        let echo = Arc::clone(&self.echo);
        let echo_window = self.echo_window;
        let egress: Vec<Arc<dyn Egress>> = self.egress.lock().await.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            dispatch_and_publish(&deps, &entity_locks, &echo, echo_window, &egress, tagged).await;
        });
        pending.insert(key, handle);
    }

    /// Applies `command` immediately, bypassing the debounce window, and
    /// returns its resulting status events. The synchronous HTTP surface
    /// needs this so a `PUT` can answer with the new state instead of
    /// racing its own debounce timer.
    pub async fn dispatch_sync(
        &self,
        source: SourceProtocol,
        command: Command,
    ) -> Result<Vec<StatusEvent>, ControlPlaneError> {
        let entity = command.entity();
        let lock = self.entity_locks.get(entity).await;
        let _guard = lock.lock().await;

        let events = handlers::handle(source, &command, &self.deps).await?;
        self.publish_all(&events).await;
        Ok(events)
    }

    /// Publishes externally-observed facts (the Snapcast-event observer's
    /// reflection into the state store) through the same echo-suppressed
    /// fan-out every command dispatch uses, without going through
    /// [`handlers::handle`] — these are not user commands, just bookkeeping
    /// the composition root already applied to the store directly.
    pub async fn publish_external(&self, events: &[StatusEvent]) {
        self.publish_all(events).await;
    }

    async fn publish_all(&self, events: &[StatusEvent]) {
        let egress = self.egress.lock().await;
        for event in events {
            self.echo.arm(event.entity_kind, event.entity_id, event.field, event.source, self.echo_window).await;
            for handle in egress.iter() {
                if handle.protocol() == event.source {
                    continue;
                }
                if self.echo.is_suppressed(event.entity_kind, event.entity_id, event.field, handle.protocol()).await {
                    debug!(protocol = ?handle.protocol(), field = event.field, "suppressing echoed status event");
                    continue;
                }
                handle.publish(event).await;
            }
        }
    }
}

async fn dispatch_and_publish(
    deps: &Deps,
    entity_locks: &EntityLocks,
    echo: &EchoGuard,
    echo_window: Duration,
    egress: &[Arc<dyn Egress>],
    tagged: TaggedCommand,
) {
    let entity = tagged.command.entity();
    let lock = entity_locks.get(entity).await;
    let _guard = lock.lock().await;

    match handlers::handle(tagged.source, &tagged.command, deps).await {
        Ok(events) => {
            for event in &events {
                echo.arm(event.entity_kind, event.entity_id, event.field, event.source, echo_window).await;
                for handle in egress {
                    if handle.protocol() == event.source {
                        continue;
                    }
                    if echo.is_suppressed(event.entity_kind, event.entity_id, event.field, handle.protocol()).await {
                        debug!(protocol = ?handle.protocol(), field = event.field, "suppressing echoed status event");
                        continue;
                    }
                    handle.publish(event).await;
                }
            }
        }
        Err(e) => warn!(error = %e, source = ?tagged.source, "command dispatch failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::EntityKind;
    use roomcast_catalog::{CatalogProvider, StaticCatalogBackend};
    use roomcast_core::model::{Client, Snapshot, Zone};
    use roomcast_core::StateStore;
    use roomcast_pipeline::PipelineManager;
    use roomcast_reconciler::Reconciler;
    use roomcast_snapcast::SnapcastClient;
    use std::path::PathBuf;
    use tokio::sync::Mutex as AsyncMutex;

    struct RecordingEgress {
        protocol: SourceProtocol,
        events: Arc<AsyncMutex<Vec<StatusEvent>>>,
    }

    #[async_trait::async_trait]
    impl Egress for RecordingEgress {
        fn protocol(&self) -> SourceProtocol {
            self.protocol
        }
        async fn publish(&self, event: &StatusEvent) {
            self.events.lock().await.push(event.clone());
        }
    }

    fn test_deps() -> Deps {
        let mut snapshot = Snapshot::default();
        snapshot.zones.insert(1, Zone::new(1, "living-room", "stream-1"));
        snapshot.clients.insert(1, Client::new(1, "speaker", "aa:bb:cc:dd:ee:ff"));
        let store = Arc::new(StateStore::new(snapshot));
        let snapcast = Arc::new(SnapcastClient::new("127.0.0.1", 1705, Duration::from_millis(50), Duration::from_secs(1)));
        let reconciler = Arc::new(Reconciler::new(snapcast, store.clone(), 4));
        let pipeline = PipelineManager::new(
            "/bin/cat",
            PathBuf::from("/tmp/roomcast-coordinator-tests"),
            Duration::from_millis(20),
            Duration::from_millis(200),
        );
        let catalog = Arc::new(CatalogProvider::new(Arc::new(StaticCatalogBackend::empty()), Duration::from_secs(300)));
        Deps { store, reconciler, pipeline, catalog }
    }

    #[tokio::test]
    async fn dispatch_sync_publishes_to_every_egress_but_the_originator() {
        let coordinator = Coordinator::new(test_deps(), 16, Duration::from_millis(10), Duration::from_millis(200));

        let api_events = Arc::new(AsyncMutex::new(Vec::new()));
        let mqtt_events = Arc::new(AsyncMutex::new(Vec::new()));
        coordinator.register_egress(Arc::new(RecordingEgress { protocol: SourceProtocol::Api, events: api_events.clone() })).await;
        coordinator.register_egress(Arc::new(RecordingEgress { protocol: SourceProtocol::Mqtt, events: mqtt_events.clone() })).await;

        coordinator
            .dispatch_sync(SourceProtocol::Api, Command::SetZoneVolume { zone_id: 1, volume: 42 })
            .await
            .unwrap();

        assert!(api_events.lock().await.is_empty(), "originating protocol must not receive its own echo");
        assert_eq!(mqtt_events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn submitted_commands_are_debounced_to_the_last_value() {
        let coordinator = Coordinator::new(test_deps(), 16, Duration::from_millis(30), Duration::from_millis(200));
        let store = coordinator.deps.store.clone();

        coordinator.spawn_workers();
        coordinator.submit(SourceProtocol::Api, Command::SetZoneVolume { zone_id: 1, volume: 10 }).await;
        coordinator.submit(SourceProtocol::Api, Command::SetZoneVolume { zone_id: 1, volume: 20 }).await;
        coordinator.submit(SourceProtocol::Api, Command::SetZoneVolume { zone_id: 1, volume: 30 }).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.snapshot().zone(1).unwrap().volume, 30);
    }

    #[test]
    fn entity_kind_used_as_map_key() {
        let _ = EntityKind::Zone;
    }
}
