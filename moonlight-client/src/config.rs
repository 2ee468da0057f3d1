use std::path::{Path, PathBuf};

use moonlight_core::DEVICE_PORT;
use serde::{Deserialize, Serialize};
use url::Url;

pub const MAX_HOST_LEN: usize = 253;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedClientConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEVICE_PORT
}

pub fn validate_saved_config(cfg: &SavedClientConfig) -> Result<(), String> {
    let host = cfg.host.trim();
    if host.is_empty() {
        return Err("lamp host is required".to_owned());
    }
    if host.len() > MAX_HOST_LEN {
        return Err(format!(
            "lamp host is too long ({} > {} chars)",
            host.len(),
            MAX_HOST_LEN
        ));
    }
    // Reject anything that would not survive being embedded in a ws:// URL.
    lamp_url(cfg).map(|_| ())
}

/// The WebSocket URL of the lamp's control endpoint.
pub fn lamp_url(cfg: &SavedClientConfig) -> Result<Url, String> {
    let text = format!("ws://{}:{}/", cfg.host.trim(), cfg.port);
    Url::parse(&text).map_err(|err| format!("invalid lamp address {text:?}: {err}"))
}

pub fn client_config_path() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MOONLIGHT_CONFIG_DIR") {
        let dir = PathBuf::from(override_dir);
        let _ = std::fs::create_dir_all(&dir);
        return dir.join("config.json");
    }

    let base = std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config"))
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = base.join("moonlight");
    let _ = std::fs::create_dir_all(&dir);
    dir.join("config.json")
}

pub fn load_saved_config() -> Result<Option<SavedClientConfig>, String> {
    load_config_from_path(&client_config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<Option<SavedClientConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }

    let data = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config file {}: {err}", path.display()))?;

    let cfg: SavedClientConfig = serde_json::from_str(&data)
        .map_err(|err| format!("failed to parse config file {}: {err}", path.display()))?;

    validate_saved_config(&cfg)?;
    Ok(Some(cfg))
}

pub fn save_saved_config(cfg: &SavedClientConfig) -> Result<(), String> {
    save_config_to_path(&client_config_path(), cfg)
}

/// Atomic save: write a tmp file next to the target, then rename over it.
pub fn save_config_to_path(path: &Path, cfg: &SavedClientConfig) -> Result<(), String> {
    validate_saved_config(cfg)?;

    let tmp_path = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(cfg).map_err(|err| err.to_string())?;

    std::fs::write(&tmp_path, payload.as_bytes())
        .map_err(|err| format!("failed to write {}: {err}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|err| format!("failed to rename {}: {err}", tmp_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lamp_url_uses_fixed_device_port_by_default() {
        let cfg = SavedClientConfig {
            host: "moon.local".to_owned(),
            port: default_port(),
        };
        let url = lamp_url(&cfg).expect("build lamp url");
        assert_eq!(url.as_str(), "ws://moon.local:81/");
    }

    #[test]
    fn empty_host_is_rejected() {
        let cfg = SavedClientConfig {
            host: "  ".to_owned(),
            port: 81,
        };
        assert!(validate_saved_config(&cfg).is_err());
    }

    #[test]
    fn missing_port_falls_back_to_device_port() {
        let cfg: SavedClientConfig =
            serde_json::from_str(r#"{"host": "moon.local"}"#).expect("parse config");
        assert_eq!(cfg.port, DEVICE_PORT);
    }
}
