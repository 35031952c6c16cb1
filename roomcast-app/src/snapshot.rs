//! Builds the initial [`Snapshot`] from configuration.

use roomcast_config::Config;
use roomcast_core::model::{Client, Snapshot, Zone};
use tracing::warn;

pub fn build(config: &Config) -> Snapshot {
    let mut snapshot = Snapshot::default();

    for (id, zone_cfg) in config.zones() {
        let stream_id = zone_cfg.stream_id.unwrap_or_else(|| format!("zone-{id}"));
        snapshot.zones.insert(id, Zone::new(id, zone_cfg.name, stream_id));
    }

    for (id, client_cfg) in config.clients() {
        let mut client = Client::new(id, client_cfg.name, client_cfg.mac);
        if let Some(zone_id) = client_cfg.zone_id {
            if snapshot.zones.contains_key(&zone_id) {
                client.zone_id = Some(zone_id);
                snapshot.zones.get_mut(&zone_id).expect("checked above").client_ids.insert(id);
            } else {
                warn!(client_id = id, zone_id, "configured client references an unknown zone; leaving unassigned");
            }
        }
        snapshot.clients.insert(id, client);
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn assigns_clients_into_their_configured_zone() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("config.yaml")).unwrap();
        write!(
            file,
            "zones:\n  1:\n    name: Living Room\nclients:\n  1:\n    name: speaker\n    mac: \"aa:bb:cc:dd:ee:ff\"\n    zone_id: 1\n"
        )
        .unwrap();
        drop(file);

        let config = Config::load(Some(dir.path().to_str().unwrap())).unwrap();
        let snapshot = build(&config);

        assert!(snapshot.zones[&1].client_ids.contains(&1));
        assert_eq!(snapshot.clients[&1].zone_id, Some(1));
    }

    #[test]
    fn leaves_a_client_unassigned_when_its_zone_is_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("config.yaml")).unwrap();
        write!(file, "clients:\n  1:\n    name: speaker\n    mac: \"aa:bb:cc:dd:ee:ff\"\n    zone_id: 9\n").unwrap();
        drop(file);

        let config = Config::load(Some(dir.path().to_str().unwrap())).unwrap();
        let snapshot = build(&config);

        assert_eq!(snapshot.clients[&1].zone_id, None);
    }
}
