//! Portal configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits and labels used while serving portal requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Page title.
    pub title: String,
    /// Longest query string processed, in bytes. Longer queries are cut.
    pub query_max_len: usize,
    /// Longest raw (encoded) value accepted for one entry.
    pub value_max_len: usize,
    /// Largest response body, in bytes.
    pub response_max_len: usize,
    /// Time between answering a reboot request and restarting.
    pub reboot_delay_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            title: "Device setup".to_string(),
            query_max_len: 512,
            value_max_len: 100,
            response_max_len: 10240,
            reboot_delay_ms: 3000,
        }
    }
}

impl PortalConfig {
    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.reboot_delay_ms)
    }
}
