//! Typed inbound commands and the protocol tag every command carries.

use roomcast_core::model::{ClientId, PlaylistId, TrackId, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceProtocol {
    Api,
    Mqtt,
    Knx,
    Snapcast,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Zone,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekPosition {
    Millis(u64),
    /// 0.0..=1.0 of the track's known duration.
    Fraction(f64),
}

#[derive(Debug, Clone)]
pub enum Command {
    SetClientVolume { client_id: ClientId, volume: u8 },
    SetClientMute { client_id: ClientId, mute: bool },
    SetZoneVolume { zone_id: ZoneId, volume: u8 },
    SetZoneMute { zone_id: ZoneId, mute: bool },
    Play { zone_id: ZoneId },
    Pause { zone_id: ZoneId },
    Stop { zone_id: ZoneId },
    Next { zone_id: ZoneId },
    Previous { zone_id: ZoneId },
    SetPlaylist { zone_id: ZoneId, playlist_id: PlaylistId },
    SetTrackByIndex { zone_id: ZoneId, index: usize },
    Seek { zone_id: ZoneId, position: SeekPosition },
    AssignClientToZone { client_id: ClientId, zone_id: Option<ZoneId> },
}

impl Command {
    /// `(entity_kind, entity_id)` — the granule per-entity serialization
    /// is keyed on.
    pub fn entity(&self) -> (EntityKind, u32) {
        match self {
            Command::SetClientVolume { client_id, .. }
            | Command::SetClientMute { client_id, .. }
            | Command::AssignClientToZone { client_id, .. } => (EntityKind::Client, *client_id),
            Command::SetZoneVolume { zone_id, .. }
            | Command::SetZoneMute { zone_id, .. }
            | Command::Play { zone_id }
            | Command::Pause { zone_id }
            | Command::Stop { zone_id }
            | Command::Next { zone_id }
            | Command::Previous { zone_id }
            | Command::SetPlaylist { zone_id, .. }
            | Command::SetTrackByIndex { zone_id, .. }
            | Command::Seek { zone_id, .. } => (EntityKind::Zone, *zone_id),
        }
    }

    /// `(entity_kind, entity_id, field)` — the debounce key: two
    /// commands on the same field of the same entity collapse to the last.
    pub fn debounce_key(&self) -> (EntityKind, u32, &'static str) {
        let (kind, id) = self.entity();
        let field = match self {
            Command::SetClientVolume { .. } => "volume",
            Command::SetClientMute { .. } => "mute",
            Command::SetZoneVolume { .. } => "volume",
            Command::SetZoneMute { .. } => "mute",
            Command::Play { .. } | Command::Pause { .. } | Command::Stop { .. } => "transport",
            Command::Next { .. } | Command::Previous { .. } => "track_step",
            Command::SetPlaylist { .. } => "playlist",
            Command::SetTrackByIndex { .. } => "track",
            Command::Seek { .. } => "position",
            Command::AssignClientToZone { .. } => "zone",
        };
        (kind, id, field)
    }

    /// Overflow policy: idempotent commands drop the
    /// *oldest* queued entry to make room; non-idempotent commands are
    /// themselves dropped (the newest) rather than displacing history a
    /// relative operation like `Next` can't safely skip over.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Command::SetClientVolume { .. }
                | Command::SetClientMute { .. }
                | Command::SetZoneVolume { .. }
                | Command::SetZoneMute { .. }
                | Command::SetPlaylist { .. }
                | Command::SetTrackByIndex { .. }
                | Command::AssignClientToZone { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct TaggedCommand {
    pub source: SourceProtocol,
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_groups_client_commands_under_client_kind() {
        let cmd = Command::SetClientVolume { client_id: 3, volume: 10 };
        assert_eq!(cmd.entity(), (EntityKind::Client, 3));
    }

    #[test]
    fn transport_commands_share_one_debounce_field() {
        let play = Command::Play { zone_id: 1 };
        let stop = Command::Stop { zone_id: 1 };
        assert_eq!(play.debounce_key(), stop.debounce_key());
    }
}
