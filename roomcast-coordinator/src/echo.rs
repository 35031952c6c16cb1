//! Echo suppression: after a mutation sourced from protocol `P`
//! publishes a status change, `P` itself must not receive that change echoed
//! back within the debounce window — e.g. the Snapcast observer reflecting
//! the very volume change the API just requested.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::command::{EntityKind, SourceProtocol};

type Key = (EntityKind, u32, &'static str, SourceProtocol);

#[derive(Default)]
pub struct EchoGuard {
    suppressed_until: Mutex<HashMap<Key, Instant>>,
}

impl EchoGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `(entity, field)` as echoing from `source` for `window`: a
    /// publish to `source` for that key before the window elapses is skipped.
    pub async fn arm(&self, entity_kind: EntityKind, entity_id: u32, field: &'static str, source: SourceProtocol, window: Duration) {
        if matches!(source, SourceProtocol::Internal) {
            return;
        }
        let mut guard = self.suppressed_until.lock().await;
        guard.insert((entity_kind, entity_id, field, source), Instant::now() + window);
    }

    pub async fn is_suppressed(&self, entity_kind: EntityKind, entity_id: u32, field: &'static str, protocol: SourceProtocol) -> bool {
        let guard = self.suppressed_until.lock().await;
        matches!(guard.get(&(entity_kind, entity_id, field, protocol)), Some(until) if Instant::now() < *until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn freshly_armed_key_suppresses_its_own_source() {
        let guard = EchoGuard::new();
        guard
            .arm(EntityKind::Zone, 1, "volume", SourceProtocol::Mqtt, Duration::from_millis(200))
            .await;
        assert!(guard.is_suppressed(EntityKind::Zone, 1, "volume", SourceProtocol::Mqtt).await);
        assert!(!guard.is_suppressed(EntityKind::Zone, 1, "volume", SourceProtocol::Api).await);
    }

    #[tokio::test]
    async fn suppression_expires_after_the_window() {
        let guard = EchoGuard::new();
        guard
            .arm(EntityKind::Zone, 1, "volume", SourceProtocol::Mqtt, Duration::from_millis(5))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!guard.is_suppressed(EntityKind::Zone, 1, "volume", SourceProtocol::Mqtt).await);
    }
}
