//! CLI-facing file layout. The core pipeline (C1-C12) takes no
//! filesystem dependency; this module exists only so the `skillforge`
//! binary has somewhere durable to put the artifacts it produces.
//! Grounded on the teacher's `config::data_dir()` / `ensure_app_dirs()`
//! shape, generalized from a single `.harharhar` app tree to one keyed
//! by service name.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root data directory: `~/.skillforge/`.
pub fn data_dir() -> PathBuf {
    dirs::home_dir().expect("no home directory").join(".skillforge")
}

/// Ensure the base directory structure exists.
pub fn ensure_dirs() {
    let _ = fs::create_dir_all(data_dir().join("services"));
}

/// Per-service directory: `~/.skillforge/services/<service>/`.
pub fn service_dir(service: &str) -> PathBuf {
    data_dir().join("services").join(service)
}

pub fn ensure_service_dirs(service: &str) {
    let _ = fs::create_dir_all(service_dir(service));
}

pub fn api_data_path(service: &str) -> PathBuf {
    service_dir(service).join("api_data.json")
}

pub fn correlation_graph_path(service: &str) -> PathBuf {
    service_dir(service).join("correlation_graph.json")
}

pub fn credential_store_path() -> PathBuf {
    data_dir().join("credentials.json")
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_replay_timeout_secs")]
    pub replay_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_replay_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    8
}

pub fn read_config() -> GlobalConfig {
    let path = data_dir().join("config.json");
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn write_config(config: &GlobalConfig) {
    ensure_dirs();
    let path = data_dir().join("config.json");
    if let Ok(json) = serde_json::to_string_pretty(config) {
        let _ = fs::write(path, json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeouts() {
        let config = GlobalConfig::default();
        assert_eq!(config.replay_timeout_secs, 30);
        assert_eq!(config.probe_timeout_secs, 8);
    }

    #[test]
    fn service_dir_nests_under_data_dir() {
        let dir = service_dir("acme");
        assert!(dir.ends_with("services/acme"));
    }
}
