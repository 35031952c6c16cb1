//! Per-zone and aggregate health model.

use std::collections::BTreeMap;

use roomcast_core::{DesiredTopology, model::ZoneId};

use crate::plan::DaemonView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ZoneHealth {
    /// All desired clients present and in the one expected group.
    Healthy,
    /// Desired clients split across multiple groups, or unexpected extras present.
    Degraded,
    /// Zero desired clients present.
    Unhealthy,
}

#[derive(Debug, Clone, Default)]
pub struct SystemHealth {
    pub zones: BTreeMap<ZoneId, ZoneHealth>,
}

impl SystemHealth {
    /// Aggregate system health is the worst zone's.
    pub fn aggregate(&self) -> ZoneHealth {
        self.zones.values().copied().max().unwrap_or(ZoneHealth::Healthy)
    }
}

pub fn compute(desired: &DesiredTopology, daemon: &DaemonView) -> SystemHealth {
    let mut zones = BTreeMap::new();

    for (zone_id, desired_zone) in desired.zones.iter() {
        if desired_zone.client_uuids.is_empty() {
            zones.insert(*zone_id, ZoneHealth::Healthy);
            continue;
        }

        let groups_containing_any: Vec<&String> = daemon
            .groups
            .iter()
            .filter(|(_, g)| !g.client_uuids.is_disjoint(&desired_zone.client_uuids))
            .map(|(id, _)| id)
            .collect();

        let present: std::collections::BTreeSet<String> = daemon
            .groups
            .values()
            .flat_map(|g| g.client_uuids.iter().cloned())
            .filter(|uuid| desired_zone.client_uuids.contains(uuid))
            .collect();

        let health = if present.is_empty() {
            ZoneHealth::Unhealthy
        } else if present.len() == desired_zone.client_uuids.len() && groups_containing_any.len() == 1 {
            let group_id = groups_containing_any[0];
            let group = &daemon.groups[group_id];
            if group.client_uuids.len() == desired_zone.client_uuids.len() {
                ZoneHealth::Healthy
            } else {
                ZoneHealth::Degraded
            }
        } else {
            ZoneHealth::Degraded
        };

        zones.insert(*zone_id, health);
    }

    SystemHealth { zones }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::DaemonGroup;
    use roomcast_core::model::Snapshot;
    use std::collections::BTreeSet;

    fn topology_for(zone_id: ZoneId, clients: &[&str]) -> DesiredTopology {
        use roomcast_core::model::Zone;
        let mut snapshot = Snapshot::default();
        let mut zone = Zone::new(zone_id, "z", "stream");
        for (i, _) in clients.iter().enumerate() {
            zone.client_ids.insert(i as u32 + 1);
        }
        snapshot.zones.insert(zone_id, zone);
        for (i, uuid) in clients.iter().enumerate() {
            let mut client = roomcast_core::model::Client::new(i as u32 + 1, "c", "aa:aa");
            client.snapcast_uuid = Some(uuid.to_string());
            client.zone_id = Some(zone_id);
            snapshot.clients.insert(i as u32 + 1, client);
        }
        DesiredTopology::derive(&snapshot)
    }

    #[test]
    fn healthy_when_all_clients_in_one_matching_group() {
        let desired = topology_for(1, &["a", "b"]);
        let mut daemon = DaemonView::default();
        daemon.groups.insert(
            "g1".into(),
            DaemonGroup {
                stream_id: "stream".into(),
                client_uuids: ["a", "b"].into_iter().map(String::from).collect(),
            },
        );
        let health = compute(&desired, &daemon);
        assert_eq!(health.zones[&1], ZoneHealth::Healthy);
        assert_eq!(health.aggregate(), ZoneHealth::Healthy);
    }

    #[test]
    fn unhealthy_when_no_desired_clients_present() {
        let desired = topology_for(1, &["a"]);
        let daemon = DaemonView::default();
        let health = compute(&desired, &daemon);
        assert_eq!(health.zones[&1], ZoneHealth::Unhealthy);
    }

    #[test]
    fn degraded_when_clients_split_across_groups() {
        let desired = topology_for(1, &["a", "b"]);
        let mut daemon = DaemonView::default();
        daemon.groups.insert(
            "g1".into(),
            DaemonGroup { stream_id: "s".into(), client_uuids: BTreeSet::from(["a".to_string()]) },
        );
        daemon.groups.insert(
            "g2".into(),
            DaemonGroup { stream_id: "s".into(), client_uuids: BTreeSet::from(["b".to_string()]) },
        );
        let health = compute(&desired, &daemon);
        assert_eq!(health.zones[&1], ZoneHealth::Degraded);
    }

    #[test]
    fn aggregate_is_worst_of_all_zones() {
        let mut health = SystemHealth::default();
        health.zones.insert(1, ZoneHealth::Healthy);
        health.zones.insert(2, ZoneHealth::Unhealthy);
        health.zones.insert(3, ZoneHealth::Degraded);
        assert_eq!(health.aggregate(), ZoneHealth::Unhealthy);
    }
}
