//! Zone-grouping reconciler: drives the Snapcast daemon's group
//! topology to match the `DesiredTopology` derived from the state store.
//!
//! Runs on demand, on every `SnapcastEvent::Resynced`, and on a periodic
//! ticker (default every 30s, see `roomcast_config::Config::reconcile_interval_secs`).

mod health;
mod plan;

pub use health::{SystemHealth, ZoneHealth};
pub use plan::{pick_group_for_zone, DaemonGroup, DaemonView};

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use roomcast_core::{DesiredTopology, StateStore};
use roomcast_snapcast::{SnapcastClient, SnapcastError};

/// Counters, action log, and error list produced by one reconciliation pass.
/// Partial failure is non-fatal: errors are recorded and the next tick retries.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub zones_reconciled: usize,
    pub clients_moved: usize,
    pub groups_created: usize,
    pub groups_emptied: usize,
    pub actions: Vec<String>,
    pub errors: Vec<String>,
}

impl ReconciliationReport {
    /// True only when the run made no changes and hit no errors — the shape
    /// a second consecutive reconciliation of an already-converged system
    /// must have.
    pub fn is_noop(&self) -> bool {
        self.clients_moved == 0
            && self.groups_created == 0
            && self.groups_emptied == 0
            && self.errors.is_empty()
    }
}

pub struct Reconciler {
    snapcast: Arc<SnapcastClient>,
    store: Arc<StateStore>,
    max_concurrent_groups: usize,
}

impl Reconciler {
    pub fn new(snapcast: Arc<SnapcastClient>, store: Arc<StateStore>, max_concurrent_groups: usize) -> Self {
        Self {
            snapcast,
            store,
            max_concurrent_groups: max_concurrent_groups.max(1),
        }
    }

    /// Runs one reconciliation pass.
    pub async fn reconcile(&self) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        let snapshot = self.store.snapshot();
        let desired = DesiredTopology::derive(&snapshot);

        let daemon = match self.fetch_daemon_view().await {
            Ok(view) => view,
            Err(e) => {
                report.errors.push(format!("failed to fetch snapcast server status: {e}"));
                return report;
            }
        };

        // Step 3: assign a Snapcast group to every desired zone that doesn't
        // yet have one. Assignment picks by overlap among daemon groups not
        // already claimed by another zone; ties break on the lexicographically
        // smallest group id.
        let mut claimed: BTreeSet<String> = snapshot
            .zones
            .values()
            .filter_map(|z| z.snapcast_group_id.clone())
            .collect();

        let mut assignments: Vec<(u32, String)> = Vec::new();
        for (zone_id, desired_zone) in desired.zones.iter() {
            let existing = snapshot.zone(*zone_id).and_then(|z| z.snapcast_group_id.clone());
            if let Some(group_id) = existing {
                assignments.push((*zone_id, group_id));
                continue;
            }

            let available: std::collections::BTreeMap<String, BTreeSet<String>> = daemon
                .groups
                .iter()
                .filter(|(id, _)| !claimed.contains(*id))
                .map(|(id, g)| (id.clone(), g.client_uuids.clone()))
                .collect();

            match pick_group_for_zone(&desired_zone.client_uuids, &available) {
                Some(group_id) => {
                    claimed.insert(group_id.clone());
                    report.groups_created += 1;
                    report.actions.push(format!("zone {} adopts snapcast group {}", zone_id, group_id));
                    assignments.push((*zone_id, group_id));
                }
                None => {
                    // No unassigned daemon group exists yet (Snapcast only
                    // creates groups implicitly when a client connects).
                    // Non-fatal: retried on the next tick once one appears.
                    report.errors.push(format!(
                        "zone {} has no snapcast group available yet; deferring adoption",
                        zone_id
                    ));
                }
            }
        }

        if !assignments.is_empty() {
            let result = self
                .store
                .mutate(|snap| {
                    let mut next = snap.clone();
                    for (zone_id, group_id) in &assignments {
                        if let Some(zone) = next.zones.get_mut(zone_id) {
                            zone.snapcast_group_id = Some(group_id.clone());
                        }
                    }
                    Ok(next)
                })
                .await;
            if let Err(e) = result {
                report.errors.push(format!("failed to persist group assignment: {e}"));
            }
        }

        // Step 4+6: move clients into their desired group and assert the
        // stream id, bounded concurrency per target group (default 4).
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_groups));
        let mut handles = Vec::new();

        for (zone_id, group_id) in &assignments {
            let Some(desired_zone) = desired.zones.get(zone_id) else { continue };
            let current_clients = daemon
                .groups
                .get(group_id)
                .map(|g| g.client_uuids.clone())
                .unwrap_or_default();

            if current_clients == desired_zone.client_uuids
                && daemon.groups.get(group_id).map(|g| g.stream_id.as_str()) == Some(desired_zone.stream_id.as_str())
            {
                report.zones_reconciled += 1;
                continue;
            }

            let snapcast = self.snapcast.clone();
            let permit = semaphore.clone();
            let group_id = group_id.clone();
            let stream_id = desired_zone.stream_id.clone();
            let desired_clients: Vec<String> = desired_zone.client_uuids.iter().cloned().collect();
            let clients_to_move = current_clients.symmetric_difference(&desired_zone.client_uuids).count();

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                let mut local_errors = Vec::new();

                if let Err(e) = snapcast
                    .call("Group.SetClients", json!({"id": group_id, "clients": desired_clients}))
                    .await
                {
                    local_errors.push(format!("Group.SetClients({group_id}) failed: {e}"));
                }
                if let Err(e) = snapcast
                    .call("Group.SetStream", json!({"id": group_id, "stream_id": stream_id}))
                    .await
                {
                    local_errors.push(format!("Group.SetStream({group_id}) failed: {e}"));
                }

                (group_id, clients_to_move, local_errors)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((group_id, clients_moved, errors)) => {
                    if errors.is_empty() {
                        report.clients_moved += clients_moved;
                        report.zones_reconciled += 1;
                        report.actions.push(format!("group {} converged to desired membership", group_id));
                    } else {
                        report.errors.extend(errors);
                    }
                }
                Err(e) => report.errors.push(format!("reconciliation task panicked: {e}")),
            }
        }

        // Step 5: empty any daemon group no longer referenced by a zone.
        for (group_id, group) in daemon.groups.iter() {
            if claimed.contains(group_id) || group.client_uuids.is_empty() {
                continue;
            }
            let snapcast = self.snapcast.clone();
            let group_id_owned = group_id.clone();
            match snapcast.call("Group.SetClients", json!({"id": group_id_owned, "clients": []})).await {
                Ok(_) => {
                    report.groups_emptied += 1;
                    report.actions.push(format!("emptied stray group {}", group_id));
                }
                Err(e) => report.errors.push(format!("failed to empty stray group {}: {e}", group_id)),
            }
        }

        debug!(
            zones_reconciled = report.zones_reconciled,
            clients_moved = report.clients_moved,
            errors = report.errors.len(),
            "reconciliation pass complete"
        );
        if !report.errors.is_empty() {
            warn!(errors = ?report.errors, "reconciliation completed with errors; will retry next tick");
        }

        report
    }

    /// Computes per-zone health against the daemon's current view. A fresh fetch is performed; callers that already have
    /// a `DaemonView` from this tick should prefer composing it themselves.
    pub async fn health(&self) -> Result<SystemHealth, SnapcastError> {
        let snapshot = self.store.snapshot();
        let desired = DesiredTopology::derive(&snapshot);
        let daemon = self.fetch_daemon_view().await?;
        Ok(health::compute(&desired, &daemon))
    }

    async fn fetch_daemon_view(&self) -> Result<DaemonView, SnapcastError> {
        let result = self.snapcast.call("Server.GetStatus", Value::Null).await?;
        plan::parse_server_status(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn report_noop_requires_zero_actions_and_zero_errors() {
        let report = ReconciliationReport::default();
        assert!(report.is_noop());

        let mut moved = ReconciliationReport::default();
        moved.clients_moved = 1;
        assert!(!moved.is_noop());

        let mut errored = ReconciliationReport::default();
        errored.errors.push("boom".into());
        assert!(!errored.is_noop());
    }

    #[test]
    fn parse_server_status_builds_daemon_view() {
        let payload = json!({
            "server": {
                "groups": [
                    {
                        "id": "g1",
                        "stream_id": "zone-1",
                        "clients": [
                            {"id": "uuid-a"},
                            {"id": "uuid-b"}
                        ]
                    },
                    {
                        "id": "g2",
                        "stream_id": "zone-2",
                        "clients": []
                    }
                ]
            }
        });

        let view = plan::parse_server_status(&payload).unwrap();
        assert_eq!(view.groups.len(), 2);
        let g1 = view.groups.get("g1").unwrap();
        assert_eq!(g1.stream_id, "zone-1");
        assert!(g1.client_uuids.contains("uuid-a"));
        assert!(g1.client_uuids.contains("uuid-b"));
        let g2 = view.groups.get("g2").unwrap();
        assert!(g2.client_uuids.is_empty());
    }

    #[test]
    fn pick_group_prefers_max_overlap_then_lexicographic_group_id() {
        let desired: BTreeSet<String> = ["a", "b"].into_iter().map(String::from).collect();

        let mut available = BTreeMap::new();
        available.insert("g-zzz".to_string(), ["a".to_string()].into_iter().collect());
        available.insert("g-aaa".to_string(), ["a".to_string()].into_iter().collect());
        available.insert("g-other".to_string(), BTreeSet::new());

        // g-zzz and g-aaa tie on overlap (1); g-aaa wins lexicographically.
        assert_eq!(pick_group_for_zone(&desired, &available), Some("g-aaa".to_string()));
    }

    #[test]
    fn pick_group_returns_none_when_nothing_available() {
        let desired: BTreeSet<String> = ["a"].into_iter().map(String::from).collect();
        let available = BTreeMap::new();
        assert_eq!(pick_group_for_zone(&desired, &available), None);
    }
}
