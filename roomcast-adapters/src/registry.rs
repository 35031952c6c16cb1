//! Declarative command/status routing table.
//! One entry per `(EntityKind, field)` gives both the MQTT JSON field name
//! and the KNX group-address/DPT pairing; adapters look entries up by key,
//! they never derive them from `Command`/`StatusPayload` variant names.

use roomcast_coordinator::EntityKind;

use crate::dpt::Dpt;
use crate::knx::GroupAddress;

pub struct RouteEntry {
    pub entity_kind: EntityKind,
    pub field: &'static str,
    pub mqtt_field: &'static str,
    pub dpt: Dpt,
    knx_main: u8,
    knx_middle: u8,
    knx_category_base: u16,
}

/// Zone routes live under KNX main group 1, client routes under main group
/// 2, matching the `1/0/1` zone-volume example. Within a main group,
/// each field gets its own middle group; the per-entity command/status pair
/// is `category_base + (entity_id - 1) * 2` / `+ 1`.
pub static ROUTES: &[RouteEntry] = &[
    RouteEntry { entity_kind: EntityKind::Zone, field: "volume", mqtt_field: "Volume", dpt: Dpt::Percent, knx_main: 1, knx_middle: 0, knx_category_base: 1 },
    RouteEntry { entity_kind: EntityKind::Zone, field: "mute", mqtt_field: "Mute", dpt: Dpt::Bool, knx_main: 1, knx_middle: 1, knx_category_base: 1 },
    RouteEntry { entity_kind: EntityKind::Client, field: "volume", mqtt_field: "Volume", dpt: Dpt::Percent, knx_main: 2, knx_middle: 0, knx_category_base: 1 },
    RouteEntry { entity_kind: EntityKind::Client, field: "mute", mqtt_field: "Mute", dpt: Dpt::Bool, knx_main: 2, knx_middle: 1, knx_category_base: 1 },
];

impl RouteEntry {
    pub fn command_ga(&self, entity_id: u32) -> GroupAddress {
        GroupAddress { main: self.knx_main, middle: self.knx_middle, sub: self.sub_for(entity_id) }
    }

    pub fn status_ga(&self, entity_id: u32) -> GroupAddress {
        GroupAddress { main: self.knx_main, middle: self.knx_middle, sub: self.sub_for(entity_id) + 1 }
    }

    fn sub_for(&self, entity_id: u32) -> u16 {
        self.knx_category_base + (entity_id.saturating_sub(1) as u16) * 2
    }
}

pub fn find_by_field(entity_kind: EntityKind, field: &str) -> Option<&'static RouteEntry> {
    ROUTES.iter().find(|r| r.entity_kind == entity_kind && r.field == field)
}

pub fn find_by_command_ga(ga: GroupAddress) -> Option<(&'static RouteEntry, u32)> {
    ROUTES.iter().find_map(|r| entity_id_for(r, ga, false))
}

pub fn find_by_status_ga(ga: GroupAddress) -> Option<(&'static RouteEntry, u32)> {
    ROUTES.iter().find_map(|r| entity_id_for(r, ga, true))
}

fn entity_id_for(route: &'static RouteEntry, ga: GroupAddress, status: bool) -> Option<(&'static RouteEntry, u32)> {
    if ga.main != route.knx_main || ga.middle != route.knx_middle {
        return None;
    }
    let offset = ga.sub.checked_sub(route.knx_category_base)?;
    if status {
        if offset == 0 || offset % 2 != 1 {
            return None;
        }
        Some((route, (offset - 1) / 2 + 1))
    } else {
        if offset % 2 != 0 {
            return None;
        }
        Some((route, offset / 2 + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_volume_command_matches_the_spec_example_address() {
        let route = find_by_field(EntityKind::Zone, "volume").unwrap();
        assert_eq!(route.command_ga(1).to_string(), "1/0/1");
        assert_eq!(route.status_ga(1).to_string(), "1/0/2");
    }

    #[test]
    fn command_ga_resolves_back_to_the_same_entity() {
        let route = find_by_field(EntityKind::Zone, "volume").unwrap();
        let ga = route.command_ga(3);
        let (found, entity_id) = find_by_command_ga(ga).unwrap();
        assert_eq!(found.field, "volume");
        assert_eq!(entity_id, 3);
    }

    #[test]
    fn unregistered_field_is_none() {
        assert!(find_by_field(EntityKind::Zone, "nonexistent_field").is_none());
    }
}
