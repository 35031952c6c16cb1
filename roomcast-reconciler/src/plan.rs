//! Pure helpers: parsing `Server.GetStatus` into a `DaemonView`, and picking
//! the best-overlap existing group for a zone that doesn't have one yet.
//! Kept free of I/O so they're plain `#[test]`-able.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use roomcast_snapcast::SnapcastError;

/// One Snapcast group as observed via `Server.GetStatus`.
#[derive(Debug, Clone, Default)]
pub struct DaemonGroup {
    pub stream_id: String,
    pub client_uuids: BTreeSet<String>,
}

/// The daemon's reported topology for one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct DaemonView {
    pub groups: BTreeMap<String, DaemonGroup>,
}

pub fn parse_server_status(value: &Value) -> Result<DaemonView, SnapcastError> {
    let groups = value
        .get("server")
        .and_then(|s| s.get("groups"))
        .and_then(|g| g.as_array())
        .ok_or_else(|| SnapcastError::Protocol("Server.GetStatus missing server.groups".into()))?;

    let mut view = DaemonView::default();
    for group in groups {
        let id = group
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SnapcastError::Protocol("group missing id".into()))?
            .to_string();
        let stream_id = group.get("stream_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let client_uuids = group
            .get("clients")
            .and_then(|c| c.as_array())
            .map(|clients| {
                clients
                    .iter()
                    .filter_map(|c| c.get("id").and_then(|v| v.as_str()).map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        view.groups.insert(id, DaemonGroup { stream_id, client_uuids });
    }
    Ok(view)
}

/// Picks the unassigned group whose client set maximally overlaps `desired`;
/// ties break on the lexicographically smallest group id.
/// `None` when `available` is empty — the caller must defer to the next tick.
pub fn pick_group_for_zone(
    desired: &BTreeSet<String>,
    available: &BTreeMap<String, BTreeSet<String>>,
) -> Option<String> {
    available
        .iter()
        .map(|(id, clients)| (clients.intersection(desired).count(), id))
        .max_by(|(overlap_a, id_a), (overlap_b, id_b)| {
            overlap_a.cmp(overlap_b).then_with(|| id_b.cmp(id_a))
        })
        .map(|(_, id)| id.clone())
}
