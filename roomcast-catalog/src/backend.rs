//! The injected backend a `CatalogProvider` reads through. The core has no
//! compile-time dependency on any particular catalog's wire format — a subsonic-style library, a static file, or a
//! future backend all implement this one trait.

use roomcast_core::model::{Playlist, PlaylistId, Track, TrackId};

use crate::error::CatalogError;

#[async_trait::async_trait]
pub trait CatalogBackend: Send + Sync + 'static {
    async fn fetch_track(&self, id: TrackId) -> Result<Option<Track>, CatalogError>;
    async fn fetch_playlist(&self, id: PlaylistId) -> Result<Option<Playlist>, CatalogError>;
}

/// A backend reading tracks and playlists from an embedded-defaults-style
/// YAML document (path resolved by the composition root, same config
/// directory convention as `roomcast_config::Config`). Stands in for the
/// a read-only subsonic-style library source; nothing here mutates the
/// document.
pub struct StaticCatalogBackend {
    tracks: std::collections::HashMap<TrackId, Track>,
    playlists: std::collections::HashMap<PlaylistId, Playlist>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct CatalogDocument {
    #[serde(default)]
    tracks: Vec<Track>,
    #[serde(default)]
    playlists: Vec<Playlist>,
}

impl StaticCatalogBackend {
    pub fn empty() -> Self {
        Self { tracks: Default::default(), playlists: Default::default() }
    }

    /// Parses a catalog YAML document of the shape `{tracks: [...], playlists: [...]}`.
    pub fn from_yaml(raw: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument =
            serde_yaml::from_str(raw).map_err(|e| CatalogError::Malformed(e.to_string()))?;
        Ok(Self {
            tracks: doc.tracks.into_iter().map(|t| (t.id, t)).collect(),
            playlists: doc.playlists.into_iter().map(|p| (p.id, p)).collect(),
        })
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Unreachable(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }
}

#[async_trait::async_trait]
impl CatalogBackend for StaticCatalogBackend {
    async fn fetch_track(&self, id: TrackId) -> Result<Option<Track>, CatalogError> {
        Ok(self.tracks.get(&id).cloned())
    }

    async fn fetch_playlist(&self, id: PlaylistId) -> Result<Option<Playlist>, CatalogError> {
        Ok(self.playlists.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_a_minimal_catalog_document() {
        let backend = StaticCatalogBackend::from_yaml(
            r#"
tracks:
  - id: 1
    title: "Test Track"
    artist: null
    album: null
    duration_secs: 180
    source_url: "https://example.invalid/track-1.flac"
    cover_url: null
playlists:
  - id: 1
    name: "Favorites"
    track_ids: [1]
"#,
        )
        .unwrap();

        let track = backend.fetch_track(1).await.unwrap().unwrap();
        assert_eq!(track.title, "Test Track");
        let playlist = backend.fetch_playlist(1).await.unwrap().unwrap();
        assert_eq!(playlist.track_ids, vec![1]);
    }

    #[tokio::test]
    async fn unknown_id_is_none_not_an_error() {
        let backend = StaticCatalogBackend::empty();
        assert!(backend.fetch_track(99).await.unwrap().is_none());
    }
}
