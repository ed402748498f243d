//! Simulator configuration, read from the JSON file named by `DEVCFG_CONFIG`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use devcfg_core::WifiMode;
use devcfg_portal::PortalConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "DEVCFG_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub portal: PortalConfig,
    pub bind_addr: SocketAddr,
    /// Where settings are stored. In memory when unset.
    pub data_dir: Option<PathBuf>,
    pub wifi_mode: WifiMode,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: None,
            wifi_mode: WifiMode::Auto,
        }
    }
}

impl DeviceConfig {
    /// Load from `DEVCFG_CONFIG`, falling back to defaults when it is unset.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{"bind_addr":"127.0.0.1:9000","wifi_mode":"access_point","portal":{"title":"Bench"}}"#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.wifi_mode, WifiMode::AccessPoint);
        assert_eq!(config.portal.title, "Bench");
        assert_eq!(config.portal.response_max_len, 10240);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = DeviceConfig::load(Path::new("/nonexistent/devcfg.json")).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.wifi_mode, WifiMode::Auto);
    }
}
