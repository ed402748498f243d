//! Network settings and network state.
//!
//! [`NetworkSettings`] declares the `network` namespace holding the station
//! credentials and hostname. Its codecs validate and normalize what the
//! portal submits. [`NetworkEvent`] and [`select_mode`] describe the link
//! state the portal lifecycle follows.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::entry::{Attributes, Entry, EntryCodec, EntryType, TextSetting};
use crate::error::{RegistryError, Result};
use crate::namespace::Namespace;
use crate::registry::{NamespaceId, Registry};
use crate::writer::{escape_html, BoundedWriter, WriteError};

pub const NETWORK_NAMESPACE: &str = "network";
pub const DEFAULT_HOSTNAME: &str = "esp32-device";
pub const HOSTNAME_MAX_LEN: usize = 32;
pub const SSID_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 63;

/// Credentials of the access point brought up when no station is configured.
pub const AP_SSID: &str = "wifi-manager";
pub const AP_PASSWORD: &str = "12345678";

/// Link state changes reported by the Wi-Fi driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    StationGotIp,
    StationLostIp,
    AccessPointStarted,
    AccessPointStopped,
}

impl NetworkEvent {
    /// Whether the device just became reachable.
    pub fn is_up(self) -> bool {
        matches!(self, NetworkEvent::StationGotIp | NetworkEvent::AccessPointStarted)
    }
}

/// How the Wi-Fi interface is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiMode {
    /// Station when an SSID is configured, access point otherwise.
    #[default]
    Auto,
    Station,
    AccessPoint,
}

/// Resolve `Auto` against the configured SSID.
pub fn select_mode(mode: WifiMode, ssid: &str) -> WifiMode {
    match mode {
        WifiMode::Auto if ssid.is_empty() => WifiMode::AccessPoint,
        WifiMode::Auto => WifiMode::Station,
        explicit => explicit,
    }
}

/// One access point seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub rssi: i8,
}

/// Coarse signal quality label for an RSSI in dBm.
pub fn signal_quality(rssi: i8) -> &'static str {
    if rssi > -60 {
        "Excellent"
    } else if rssi > -70 {
        "Good"
    } else if rssi > -80 {
        "Poor"
    } else {
        "Bad"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("access point scan failed: {0}")]
pub struct ScanError(pub String);

/// Source of nearby access points for the SSID widget.
pub trait ApScanner: Send + Sync {
    fn scan(&self) -> std::result::Result<Vec<AccessPoint>, ScanError>;
}

static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[[:alnum:]][[:alnum:]-]*$").expect("hostname pattern is a valid regex")
});

fn text_backing<'a>(entry: &'a Entry) -> Result<&'a TextSetting> {
    match entry.backing() {
        crate::entry::Backing::Text(text) => Ok(text),
        other => Err(RegistryError::UnknownType {
            key: entry.key().to_string(),
            declared: entry.entry_type(),
            backing: other.kind_name(),
        }),
    }
}

fn store_text(entry: &Entry, text: &str) -> Result<()> {
    text_backing(entry)?.set(text).map_err(|max| {
        RegistryError::InvalidArgument(format!(
            "value for `{}` is longer than {} bytes",
            entry.key(),
            max
        ))
    })
}

/// Hostname: ASCII alphanumerics and `-`, starting alphanumeric, stored
/// lowercase.
#[derive(Debug, Default)]
pub struct HostnameCodec;

impl EntryCodec for HostnameCodec {
    fn from_string(&self, entry: &Entry, source: &str) -> Result<()> {
        if source.is_empty() || source.len() > HOSTNAME_MAX_LEN {
            error!("Hostname length {} out of range", source.len());
            return Err(RegistryError::InvalidArgument(format!(
                "hostname must be 1 to {HOSTNAME_MAX_LEN} characters"
            )));
        }
        let valid = HOSTNAME_PATTERN.is_match(source) && source.is_ascii();
        if !valid {
            error!("Invalid hostname {:?}", source);
            return Err(RegistryError::InvalidArgument(format!(
                "invalid hostname `{source}`"
            )));
        }
        let hostname = source.to_ascii_lowercase();
        store_text(entry, &hostname)?;
        debug!("Hostname updated to {}", hostname);
        Ok(())
    }
}

/// SSID: 1 to 32 bytes, trailing spaces dropped. Renders a table of nearby
/// access points when a scanner is attached.
#[derive(Default)]
pub struct SsidCodec {
    scanner: Option<Arc<dyn ApScanner>>,
}

impl SsidCodec {
    pub fn new(scanner: Option<Arc<dyn ApScanner>>) -> Self {
        Self { scanner }
    }

    fn render_scan(&self, entry: &Entry, out: &mut BoundedWriter) -> std::result::Result<(), WriteError> {
        let Some(scanner) = &self.scanner else {
            return Ok(());
        };
        let aps = match scanner.scan() {
            Ok(aps) => aps,
            Err(e) => {
                error!("{}", e);
                return Ok(());
            }
        };
        out.push_str("<table><thead><tr><th>SSID</th><th>Signal</th></tr></thead><tbody>")?;
        let key = escape_html(entry.key());
        for ap in &aps {
            let ssid = escape_html(&ap.ssid);
            out.push_fmt(format_args!(
                "<tr><td><a href=\"#\" data-ssid=\"{ssid}\" onclick=\"document.getElementById('{key}').value=this.dataset.ssid;return false;\">{ssid}</a></td><td>{}</td></tr>",
                signal_quality(ap.rssi)
            ))?;
        }
        out.push_str("</tbody></table>")
    }
}

impl EntryCodec for SsidCodec {
    fn from_string(&self, entry: &Entry, source: &str) -> Result<()> {
        if source.is_empty() || source.len() > SSID_MAX_LEN {
            error!("SSID length {} out of range", source.len());
            return Err(RegistryError::InvalidArgument(format!(
                "SSID must be 1 to {SSID_MAX_LEN} bytes"
            )));
        }
        let ssid = source.trim_end_matches(' ');
        if ssid.len() != source.len() {
            warn!("Removed trailing spaces from SSID");
        }
        if ssid.is_empty() {
            return Err(RegistryError::InvalidArgument("SSID is blank".into()));
        }
        store_text(entry, ssid)?;
        debug!("SSID updated to {}", ssid);
        Ok(())
    }

    fn render_widget(
        &self,
        entry: &Entry,
        out: &mut BoundedWriter,
    ) -> Option<std::result::Result<(), WriteError>> {
        let render = |out: &mut BoundedWriter| -> std::result::Result<(), WriteError> {
            out.push_str("<div>")?;
            self.render_scan(entry, out)?;
            let key = escape_html(entry.key());
            let value = if entry.is_readable() {
                text_backing(entry).map(TextSetting::get).unwrap_or_default()
            } else {
                String::new()
            };
            out.push_fmt(format_args!(
                "{}<br/><input type=\"text\" id=\"{key}\" name=\"{key}\" value=\"{}\" /></div>",
                escape_html(entry.friendly()),
                escape_html(&value)
            ))
        };
        Some(render(out))
    }
}

/// Password: 8 to 63 bytes.
#[derive(Debug, Default)]
pub struct PasswordCodec;

impl EntryCodec for PasswordCodec {
    fn from_string(&self, entry: &Entry, source: &str) -> Result<()> {
        if source.len() < PASSWORD_MIN_LEN || source.len() > PASSWORD_MAX_LEN {
            error!("Password length {} out of range", source.len());
            return Err(RegistryError::InvalidArgument(format!(
                "password must be {PASSWORD_MIN_LEN} to {PASSWORD_MAX_LEN} bytes"
            )));
        }
        store_text(entry, source)?;
        debug!("Password updated");
        Ok(())
    }
}

/// The station credentials and hostname.
///
/// Clones share the same storage, so the Wi-Fi bring-up code can keep a
/// clone while the registry holds the entries.
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    hostname: TextSetting,
    ssid: TextSetting,
    password: TextSetting,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSettings {
    pub fn new() -> Self {
        Self {
            hostname: TextSetting::new(DEFAULT_HOSTNAME, HOSTNAME_MAX_LEN),
            ssid: TextSetting::new("", SSID_MAX_LEN),
            password: TextSetting::new("", PASSWORD_MAX_LEN),
        }
    }

    /// Register the `network` namespace and load its stored values.
    pub fn register(
        &self,
        registry: &mut Registry,
        scanner: Option<Arc<dyn ApScanner>>,
    ) -> Result<NamespaceId> {
        let id = registry.register_namespace(Namespace::new(NETWORK_NAMESPACE, "Network", 3))?;
        registry.register_entry(
            id,
            Entry::new("hostname", "Hostname", EntryType::Text, self.hostname.clone(), DEFAULT_HOSTNAME)
                .with_codec(Arc::new(HostnameCodec)),
        )?;
        registry.register_entry(
            id,
            Entry::new("ssid", "SSID", EntryType::Text, self.ssid.clone(), "")
                .with_codec(Arc::new(SsidCodec::new(scanner))),
        )?;
        registry.register_entry(
            id,
            Entry::new("password", "Password", EntryType::Password, self.password.clone(), "")
                .with_attributes(Attributes::WRITE)
                .with_codec(Arc::new(PasswordCodec)),
        )?;
        registry.load(id)?;
        Ok(id)
    }

    pub fn hostname(&self) -> String {
        self.hostname.get()
    }

    pub fn ssid(&self) -> String {
        self.ssid.get()
    }

    pub fn password(&self) -> String {
        self.password.get()
    }

    /// The mode to bring the interface up in.
    pub fn mode(&self, configured: WifiMode) -> WifiMode {
        select_mode(configured, &self.ssid())
    }
}
