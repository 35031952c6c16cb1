//! Configuration layer: embedded YAML defaults, deep-merged with an
//! external config file, then overridden by `ROOMCAST_CONFIG__section__key`
//! environment variables. Validated once at startup; a validation failure is
//! a configuration error (exit code 2, per the CLI/ENV contract).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use tracing::warn;

const DEFAULT_CONFIG: &str = include_str!("roomcast.yaml");
const ENV_CONFIG_DIR: &str = "ROOMCAST_CONFIG_DIR";
const ENV_PREFIX: &str = "ROOMCAST_CONFIG__";
const DEFAULT_HTTP_PORT: u16 = 8080;

static CONFIG: OnceCell<std::sync::Arc<Config>> = OnceCell::new();

/// The merged, validated runtime configuration document.
pub struct Config {
    config_dir: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Loads configuration: embedded defaults, merged with an external file
    /// (if resolvable), overridden by environment variables, then validated.
    pub fn load(explicit_dir: Option<&str>) -> Result<Self> {
        let config_dir = Self::find_config_dir(explicit_dir);
        let mut merged: Value = serde_yaml::from_str(DEFAULT_CONFIG)
            .context("embedded default configuration is not valid YAML")?;

        let path = config_dir.join("config.yaml");
        if path.is_file() {
            let external_raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let external: Value = serde_yaml::from_str(&external_raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            merge_yaml(&mut merged, external);
        }

        apply_env_overrides(&mut merged);

        let config = Config {
            config_dir,
            data: Mutex::new(merged),
        };
        config.validate()?;
        Ok(config)
    }

    fn find_config_dir(explicit_dir: Option<&str>) -> PathBuf {
        if let Some(dir) = explicit_dir {
            return PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(dir);
        }
        if let Some(home) = dirs::home_dir() {
            let candidate = home.join(".roomcast");
            if candidate.is_dir() {
                return candidate;
            }
        }
        PathBuf::from("./.roomcast")
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Validates the document well enough to catch the configuration errors
    /// that would otherwise surface confusingly deep in the control plane:
    /// zone ids, volume ranges, and non-negative timing windows.
    fn validate(&self) -> Result<()> {
        let zones = self.get_value(&["zones"]);
        if let Some(Value::Mapping(map)) = zones {
            for (key, value) in map.iter() {
                if yaml_key_to_u32(key).is_none() {
                    return Err(anyhow!("zones key {:?} is not a valid zone id", key));
                }
                if let Value::Mapping(zone_map) = value {
                    if let Some(Value::Number(vol)) = zone_map.get(Value::String("volume".into())) {
                        let vol = vol.as_i64().unwrap_or(0);
                        if !(0..=100).contains(&vol) {
                            return Err(anyhow!("configured zone volume {} out of range", vol));
                        }
                    }
                }
            }
        }

        for key in ["debounce_ms", "echo_suppression_ms"] {
            if let Some(Value::Number(n)) = self.get_value(&["coordinator", key]) {
                if n.as_i64().unwrap_or(0) < 0 {
                    return Err(anyhow!("coordinator.{} must be non-negative", key));
                }
            }
        }

        Ok(())
    }

    fn get_value(&self, path: &[&str]) -> Option<Value> {
        let data = self.data.lock().expect("config lock poisoned");
        let mut current = data.clone();
        for segment in path {
            current = match current {
                Value::Mapping(map) => map.get(Value::String((*segment).to_string()))?.clone(),
                _ => return None,
            };
        }
        Some(current)
    }

    fn get_typed<T: DeserializeOwned>(&self, path: &[&str], default: T) -> T {
        self.get_value(path)
            .and_then(|v| serde_yaml::from_value(v).ok())
            .unwrap_or(default)
    }

    pub fn http_port(&self) -> u16 {
        self.get_typed(&["http", "port"], DEFAULT_HTTP_PORT)
    }

    pub fn base_url(&self) -> String {
        let configured: String = self.get_typed(&["http", "base_url"], String::new());
        if configured.is_empty() {
            let ip = roomcast_utils::guess_local_ip();
            warn!("http.base_url not configured, guessed {}", ip);
            format!("http://{}:{}", ip, self.http_port())
        } else {
            configured
        }
    }

    pub fn snapcast_host(&self) -> String {
        self.get_typed(&["snapcast", "host"], "127.0.0.1".to_string())
    }

    pub fn snapcast_port(&self) -> u16 {
        self.get_typed(&["snapcast", "port"], 1705)
    }

    pub fn snapcast_rpc_timeout_ms(&self) -> u64 {
        self.get_typed(&["snapcast", "rpc_timeout_ms"], 30_000)
    }

    pub fn snapcast_reconnect_backoff_max_ms(&self) -> u64 {
        self.get_typed(&["snapcast", "reconnect_backoff_max_ms"], 30_000)
    }

    pub fn reconcile_interval_secs(&self) -> u64 {
        self.get_typed(&["reconciler", "interval_secs"], 30)
    }

    pub fn reconciler_max_concurrent_groups(&self) -> usize {
        self.get_typed(&["reconciler", "max_concurrent_groups"], 4)
    }

    pub fn debounce_ms(&self) -> u64 {
        self.get_typed(&["coordinator", "debounce_ms"], 50)
    }

    pub fn echo_suppression_ms(&self) -> u64 {
        self.get_typed(&["coordinator", "echo_suppression_ms"], 200)
    }

    pub fn inbound_queue_capacity(&self) -> usize {
        self.get_typed(&["coordinator", "inbound_queue_capacity"], 1024)
    }

    pub fn catalog_cache_ttl_secs(&self) -> u64 {
        self.get_typed(&["catalog", "cache_ttl_secs"], 300)
    }

    /// Path to a static catalog document (`{tracks: [...], playlists: [...]}`),
    /// relative to the config directory unless absolute. Empty means no
    /// catalog is configured yet; the provider falls back to an empty backend.
    pub fn catalog_source_path(&self) -> Option<PathBuf> {
        let configured: String = self.get_typed(&["catalog", "source_path"], String::new());
        if configured.is_empty() {
            return None;
        }
        let path = PathBuf::from(configured);
        Some(if path.is_absolute() { path } else { self.config_dir.join(path) })
    }

    pub fn decoder_bin(&self) -> String {
        self.get_typed(&["pipeline", "decoder_bin"], "ffmpeg".to_string())
    }

    pub fn sink_dir(&self) -> PathBuf {
        let configured: String = self.get_typed(&["pipeline", "sink_dir"], "./sinks".to_string());
        let path = PathBuf::from(configured);
        if path.is_absolute() {
            path
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn sink_flush_interval_ms(&self) -> u64 {
        self.get_typed(&["pipeline", "sink_flush_interval_ms"], 50)
    }

    pub fn pipeline_stop_deadline_ms(&self) -> u64 {
        self.get_typed(&["pipeline", "stop_deadline_ms"], 2000)
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.get_typed(&["mqtt", "enabled"], false)
    }

    pub fn mqtt_broker_url(&self) -> String {
        self.get_typed(&["mqtt", "broker_url"], "tcp://127.0.0.1:1883".to_string())
    }

    pub fn mqtt_topic_root(&self) -> String {
        self.get_typed(&["mqtt", "topic_root"], "snapdog".to_string())
    }

    pub fn knx_enabled(&self) -> bool {
        self.get_typed(&["knx", "enabled"], false)
    }

    pub fn knx_gateway_addr(&self) -> String {
        self.get_typed(&["knx", "gateway_addr"], String::new())
    }

    /// Configured zones, keyed by the mapping key under `zones:`.
    pub fn zones(&self) -> Vec<(u32, ZoneConfig)> {
        let mut out = Vec::new();
        if let Some(Value::Mapping(map)) = self.get_value(&["zones"]) {
            for (key, value) in map {
                let Some(id) = yaml_key_to_u32(&key) else { continue };
                if let Ok(cfg) = serde_yaml::from_value::<ZoneConfig>(value) {
                    out.push((id, cfg));
                }
            }
        }
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Configured clients, keyed by the mapping key under `clients:`.
    pub fn clients(&self) -> Vec<(u32, ClientConfig)> {
        let mut out = Vec::new();
        if let Some(Value::Mapping(map)) = self.get_value(&["clients"]) {
            for (key, value) in map {
                let Some(id) = yaml_key_to_u32(&key) else { continue };
                if let Ok(cfg) = serde_yaml::from_value::<ClientConfig>(value) {
                    out.push((id, cfg));
                }
            }
        }
        out.sort_by_key(|(id, _)| *id);
        out
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClientConfig {
    pub name: String,
    pub mac: String,
    #[serde(default)]
    pub zone_id: Option<u32>,
}

fn yaml_key_to_u32(key: &Value) -> Option<u32> {
    key.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| key.as_str().and_then(|s| s.parse::<u32>().ok()))
}

/// Recursively merges `overlay` into `base`: mapping keys merge, scalars and
/// sequences are replaced outright.
fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_yaml(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

/// Applies `ROOMCAST_CONFIG__section__key` overrides; each is parsed as YAML
/// first (so e.g. `ROOMCAST_CONFIG__http__port=9090` becomes an integer) and
/// falls back to a plain string.
fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(path_str) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<&str> = path_str.split("__").filter(|s| !s.is_empty()).collect();
        if path.is_empty() {
            continue;
        }
        let value: Value = serde_yaml::from_str(&raw_value).unwrap_or(Value::String(raw_value));
        set_path(root, &path, value);
    }
}

fn set_path(root: &mut Value, path: &[&str], value: Value) {
    if !matches!(root, Value::Mapping(_)) {
        *root = Value::Mapping(Default::default());
    }
    let Value::Mapping(map) = root else { unreachable!() };

    if path.len() == 1 {
        map.insert(Value::String(path[0].to_string()), value);
        return;
    }

    let key = Value::String(path[0].to_string());
    let entry = map
        .entry(key)
        .or_insert_with(|| Value::Mapping(Default::default()));
    set_path(entry, &path[1..], value);
}

/// Process-wide accessor for code that cannot easily thread a `Config`
/// through (e.g. a `tracing` layer configured before the component graph
/// exists). Components constructed by the composition root take `Config` by
/// constructor parameter instead.
pub fn init_global(config: std::sync::Arc<Config>) {
    let _ = CONFIG.set(config);
}

pub fn global() -> Option<std::sync::Arc<Config>> {
    CONFIG.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_external_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().to_str().unwrap())).unwrap();
        assert_eq!(config.http_port(), DEFAULT_HTTP_PORT);
        assert_eq!(config.debounce_ms(), 50);
        assert_eq!(config.echo_suppression_ms(), 200);
    }

    #[test]
    fn external_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "http:\n  port: 9191\n").unwrap();
        let config = Config::load(Some(dir.path().to_str().unwrap())).unwrap();
        assert_eq!(config.http_port(), 9191);
        // unrelated defaults survive the merge
        assert_eq!(config.reconcile_interval_secs(), 30);
    }

    #[test]
    fn env_override_wins_over_file_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "http:\n  port: 9191\n").unwrap();
        // SAFETY: test-local env var, no other test in this process reads it concurrently.
        unsafe { std::env::set_var("ROOMCAST_CONFIG__http__port", "7070") };
        let config = Config::load(Some(dir.path().to_str().unwrap())).unwrap();
        assert_eq!(config.http_port(), 7070);
        unsafe { std::env::remove_var("ROOMCAST_CONFIG__http__port") };
    }

    #[test]
    fn rejects_out_of_range_configured_volume() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "zones:\n  1:\n    volume: 999\n").unwrap();
        let result = Config::load(Some(dir.path().to_str().unwrap()));
        assert!(result.is_err());
    }

    #[test]
    fn parses_configured_zones_and_clients() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "zones:\n  1:\n    name: Living Room\n    stream_id: zone-1\nclients:\n  1:\n    name: speaker\n    mac: \"aa:bb:cc:dd:ee:ff\"\n    zone_id: 1\n",
        )
        .unwrap();
        let config = Config::load(Some(dir.path().to_str().unwrap())).unwrap();

        let zones = config.zones();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0], (1, zones[0].1.clone()));
        assert_eq!(zones[0].1.name, "Living Room");
        assert_eq!(zones[0].1.stream_id.as_deref(), Some("zone-1"));

        let clients = config.clients();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].1.mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(clients[0].1.zone_id, Some(1));
    }
}
