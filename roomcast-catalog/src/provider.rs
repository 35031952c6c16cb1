//! Read-through cache over a `CatalogBackend`. Cache entries are
//! keyed by id and hold `(value, fetched_at)`; a miss or TTL expiry calls
//! through to the backend. On backend failure, a still-present (merely
//! expired) entry is served stale with a `warn!` — the same
//! graceful-degradation posture this stack's other caches use rather than
//! propagating the failure to a command handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::warn;
use url::Url;

use roomcast_core::model::{Playlist, PlaylistId, Track, TrackId};

use crate::backend::CatalogBackend;

struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

pub struct CatalogProvider {
    backend: Arc<dyn CatalogBackend>,
    ttl: Duration,
    tracks: RwLock<HashMap<TrackId, CacheEntry<Track>>>,
    playlists: RwLock<HashMap<PlaylistId, CacheEntry<Playlist>>>,
}

impl CatalogProvider {
    pub fn new(backend: Arc<dyn CatalogBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            tracks: RwLock::new(HashMap::new()),
            playlists: RwLock::new(HashMap::new()),
        }
    }

    pub async fn resolve_track(&self, id: TrackId) -> Option<Track> {
        if let Some(entry) = self.tracks.read().await.get(&id) {
            if !entry.is_expired(self.ttl) {
                return Some(entry.value.clone());
            }
        }

        match self.backend.fetch_track(id).await {
            Ok(Some(track)) => {
                self.tracks
                    .write()
                    .await
                    .insert(id, CacheEntry { value: track.clone(), fetched_at: Instant::now() });
                Some(track)
            }
            Ok(None) => {
                self.tracks.write().await.remove(&id);
                None
            }
            Err(e) => self.serve_stale_track_or_warn(id, e).await,
        }
    }

    pub async fn resolve_playlist(&self, id: PlaylistId) -> Option<Playlist> {
        if let Some(entry) = self.playlists.read().await.get(&id) {
            if !entry.is_expired(self.ttl) {
                return Some(entry.value.clone());
            }
        }

        match self.backend.fetch_playlist(id).await {
            Ok(Some(playlist)) => {
                self.playlists
                    .write()
                    .await
                    .insert(id, CacheEntry { value: playlist.clone(), fetched_at: Instant::now() });
                Some(playlist)
            }
            Ok(None) => {
                self.playlists.write().await.remove(&id);
                None
            }
            Err(e) => {
                warn!(playlist_id = id, error = %e, "catalog backend failed resolving playlist");
                let stale = self.playlists.read().await.get(&id).map(|entry| entry.value.clone());
                if stale.is_some() {
                    warn!(playlist_id = id, "serving stale playlist after backend failure");
                }
                stale
            }
        }
    }

    pub async fn stream_url(&self, id: TrackId) -> Option<Url> {
        let track = self.resolve_track(id).await?;
        match Url::parse(&track.source_url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(track_id = id, error = %e, "track has a malformed source_url");
                None
            }
        }
    }

    /// Explicit refresh: drops the cached entry so the next resolve re-fetches.
    pub async fn invalidate_track(&self, id: TrackId) {
        self.tracks.write().await.remove(&id);
    }

    pub async fn invalidate_playlist(&self, id: PlaylistId) {
        self.playlists.write().await.remove(&id);
    }

    async fn serve_stale_track_or_warn(&self, id: TrackId, e: crate::error::CatalogError) -> Option<Track> {
        warn!(track_id = id, error = %e, "catalog backend failed resolving track");
        let stale = self.tracks.read().await.get(&id).map(|entry| entry.value.clone());
        if stale.is_some() {
            warn!(track_id = id, "serving stale track after backend failure");
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CatalogBackend;
    use crate::error::CatalogError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
        track: Option<Track>,
    }

    #[async_trait::async_trait]
    impl CatalogBackend for CountingBackend {
        async fn fetch_track(&self, _id: TrackId) -> Result<Option<Track>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.track.clone())
        }
        async fn fetch_playlist(&self, _id: PlaylistId) -> Result<Option<Playlist>, CatalogError> {
            Ok(None)
        }
    }

    fn track(id: TrackId) -> Track {
        Track {
            id,
            title: "t".into(),
            artist: None,
            album: None,
            duration_secs: Some(10),
            source_url: "https://example.invalid/t.flac".into(),
            cover_url: None,
        }
    }

    #[tokio::test]
    async fn a_second_resolve_within_ttl_does_not_hit_the_backend() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0), track: Some(track(1)) });
        let provider = CatalogProvider::new(backend.clone(), Duration::from_secs(60));

        assert!(provider.resolve_track(1).await.is_some());
        assert!(provider.resolve_track(1).await.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_a_refetch() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0), track: Some(track(1)) });
        let provider = CatalogProvider::new(backend.clone(), Duration::from_millis(1));

        provider.resolve_track(1).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        provider.resolve_track(1).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_track_resolves_to_none() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0), track: None });
        let provider = CatalogProvider::new(backend, Duration::from_secs(60));
        assert!(provider.resolve_track(1).await.is_none());
    }

    #[tokio::test]
    async fn stream_url_parses_the_track_source_url() {
        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0), track: Some(track(1)) });
        let provider = CatalogProvider::new(backend, Duration::from_secs(60));
        let url = provider.stream_url(1).await.unwrap();
        assert_eq!(url.host_str(), Some("example.invalid"));
    }
}
