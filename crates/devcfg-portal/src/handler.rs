//! Request dispatch for the configuration portal.
//!
//! [`Portal::handle`] takes the path and raw query string of a GET request
//! and produces a complete [`PortalResponse`]. HTTP adapters only copy the
//! response onto the wire and carry out any [`PortalAction`] afterwards.

use std::sync::Arc;
use std::time::Duration;

use devcfg_core::registry::lock;
use devcfg_core::{BoundedWriter, NamespaceId, Registry, RegistryError, SharedRegistry};
use tracing::{debug, error, info, warn};

use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::pages::{self, *};
use crate::query::{has_param, query_value, truncate_query, url_decode};

/// Headers sent with every dynamic response.
pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_CSS: &str = "text/css";

/// Something the adapter must do once the response has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalAction {
    /// Wait, then restart the device.
    Reboot { delay: Duration },
}

/// Restarts the device.
pub trait DeviceControl: Send + Sync {
    fn restart(&self);
}

/// A response ready to be written by an HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// Whether [`NO_CACHE_HEADERS`] apply.
    pub no_cache: bool,
    pub action: Option<PortalAction>,
}

impl PortalResponse {
    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: CONTENT_TYPE_HTML,
            body,
            no_cache: true,
            action: None,
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_TEXT,
            body: body.into(),
            no_cache: true,
            action: None,
        }
    }

    fn stylesheet() -> Self {
        Self {
            status: 200,
            content_type: CONTENT_TYPE_CSS,
            body: STYLE_CSS.to_string(),
            no_cache: false,
            action: None,
        }
    }

    fn not_found() -> Self {
        Self::text(404, "Not found")
    }

    fn with_action(mut self, action: PortalAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Headers to send besides `Content-Type`.
    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        if self.no_cache {
            &NO_CACHE_HEADERS
        } else {
            &[]
        }
    }
}

/// The configuration portal over a shared registry.
#[derive(Clone)]
pub struct Portal {
    registry: SharedRegistry,
    config: Arc<PortalConfig>,
}

impl Portal {
    pub fn new(registry: SharedRegistry, config: PortalConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Serve one GET request.
    pub fn handle(&self, path: &str, query: Option<&str>) -> PortalResponse {
        let query = truncate_query(query.unwrap_or(""), self.config.query_max_len);
        debug!("GET {} ?{}", path, query);

        let result = match path {
            "/" => self.root(query),
            "/style.min.css" => return PortalResponse::stylesheet(),
            "/setup" => self.setup(query),
            "/get" => return self.get(query),
            "/factory" => self.factory(query),
            _ => return PortalResponse::not_found(),
        };

        result.unwrap_or_else(|e| {
            error!("Serving {} failed: {}", path, e);
            PortalResponse::text(500, "ERROR: Response does not fit buffer")
        })
    }

    fn writer(&self) -> BoundedWriter {
        BoundedWriter::new(self.config.response_max_len)
    }

    fn reboot(&self) -> PortalAction {
        PortalAction::Reboot {
            delay: self.config.reboot_delay(),
        }
    }

    fn root(&self, query: &str) -> Result<PortalResponse, PortalError> {
        let mut out = self.writer();
        if has_param(query, REBOOT_PARAM) {
            info!("Reboot requested from portal");
            pages::reboot_page(&mut out, &self.config.title)?;
            return Ok(PortalResponse::html(out.into_string()).with_action(self.reboot()));
        }
        pages::root_page(&mut out, &self.config.title)?;
        Ok(PortalResponse::html(out.into_string()))
    }

    fn setup(&self, query: &str) -> Result<PortalResponse, PortalError> {
        let mut registry = lock(&self.registry);
        let mut out = self.writer();

        let Some(id) = requested_namespace(&registry, query) else {
            pages::setup_page(&mut out, &self.config.title, &registry)?;
            return Ok(PortalResponse::html(out.into_string()));
        };

        if has_param(query, RESET_DEFAULTS_PARAM) {
            restore_defaults(&mut registry, id);
        } else {
            self.apply_updates(&mut registry, id, query);
        }

        let namespace = registry
            .namespace(id)
            .ok_or_else(|| RegistryError::NotFound(format!("namespace id {}", id.index())))?;
        pages::namespace_page(&mut out, &self.config.title, namespace)?;
        Ok(PortalResponse::html(out.into_string()))
    }

    /// Apply every submitted value of namespace `id`, committing once if any
    /// was accepted.
    fn apply_updates(&self, registry: &mut Registry, id: NamespaceId, query: &str) {
        let Some(namespace) = registry.namespace(id) else {
            return;
        };

        let mut updated = 0;
        for entry in namespace.entries() {
            let Some(raw) = query_value(query, entry.key()) else {
                continue;
            };
            if !entry.is_writable() {
                warn!("Ignoring value for read-only {}.{}", namespace.key(), entry.key());
                continue;
            }
            // The form never echoes write-only values, so an empty one means
            // the field was left untouched.
            if raw.is_empty() && !entry.is_readable() {
                debug!("{}.{} unchanged", namespace.key(), entry.key());
                continue;
            }
            if raw.len() > self.config.value_max_len {
                warn!(
                    "Ignoring value for {}.{}: {} bytes exceeds {}",
                    namespace.key(),
                    entry.key(),
                    raw.len(),
                    self.config.value_max_len
                );
                continue;
            }
            let value = match url_decode(raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring value for {}.{}: {}", namespace.key(), entry.key(), e);
                    continue;
                }
            };
            match entry.deserialize(&value) {
                Ok(()) => {
                    debug!("Updated {}.{}", namespace.key(), entry.key());
                    updated += 1;
                }
                Err(e) => warn!("Rejected value for {}.{}: {}", namespace.key(), entry.key(), e),
            }
        }

        if updated > 0 {
            if let Err(e) = registry.commit(id) {
                error!("Saving settings failed: {}", e);
            }
        }
    }

    fn get(&self, query: &str) -> PortalResponse {
        let registry = lock(&self.registry);

        let Some(namespace_key) = decoded_param(query, NAMESPACE_PARAM) else {
            return PortalResponse::text(404, "ERROR: No namespace found");
        };
        let Some(namespace) = registry
            .find_namespace(&namespace_key)
            .and_then(|id| registry.namespace(id))
        else {
            return PortalResponse::text(404, "ERROR: Requested namespace does not exist");
        };
        let entry = decoded_param(query, ENTRY_PARAM)
            .and_then(|key| namespace.find_entry(&key));
        let Some(entry) = entry else {
            return PortalResponse::text(404, "ERROR: Requested setting does not exist");
        };
        if !entry.is_readable() {
            warn!("Refusing to show write-only {}.{}", namespace.key(), entry.key());
            return PortalResponse::text(403, "ERROR: Requested setting is not readable");
        }

        match entry.serialize() {
            Ok(value) if value.len() <= self.config.response_max_len => {
                PortalResponse::text(200, value)
            }
            Ok(_) => PortalResponse::text(500, "ERROR: Response does not fit buffer"),
            Err(e) => {
                error!("Serializing {}.{} failed: {}", namespace.key(), entry.key(), e);
                PortalResponse::text(500, "Error: invalid format")
            }
        }
    }

    fn factory(&self, query: &str) -> Result<PortalResponse, PortalError> {
        let mut out = self.writer();
        if has_param(query, FACTORY_RESET_PARAM) && has_param(query, CONFIRM_PARAM) {
            warn!("Factory reset requested from portal");
            if let Err(e) = lock(&self.registry).factory_reset() {
                error!("Factory reset failed: {}", e);
            }
            pages::factory_done_page(&mut out, &self.config.title)?;
            return Ok(PortalResponse::html(out.into_string()).with_action(self.reboot()));
        }
        pages::factory_page(&mut out, &self.config.title)?;
        Ok(PortalResponse::html(out.into_string()))
    }
}

fn decoded_param(query: &str, name: &str) -> Option<String> {
    let raw = query_value(query, name)?;
    url_decode(raw)
        .inspect_err(|e| warn!("Bad `{}` parameter: {}", name, e))
        .ok()
}

fn requested_namespace(registry: &Registry, query: &str) -> Option<NamespaceId> {
    let key = decoded_param(query, NAMESPACE_PARAM)?;
    let id = registry.find_namespace(&key);
    if id.is_none() {
        warn!("Unknown namespace {}", key);
    }
    id
}

fn restore_defaults(registry: &mut Registry, id: NamespaceId) {
    if let Err(e) = registry.reset_to_defaults(id) {
        error!("Restoring defaults failed: {}", e);
    }
    if let Err(e) = registry.erase(id) {
        error!("Erasing stored settings failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcfg_core::{
        Attributes, Entry, EntryType, MemoryBackend, Namespace, Setting, StoredValue, TextSetting,
    };

    struct Fixture {
        portal: Portal,
        backend: MemoryBackend,
        ssid: TextSetting,
        port: Setting<u16>,
        token: TextSetting,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        let mut registry = Registry::init(Arc::new(backend.clone())).unwrap();
        let id = registry
            .register_namespace(Namespace::new("net", "Network", 4))
            .unwrap();
        let ssid = TextSetting::new("", 32);
        let port = Setting::new(80u16);
        let token = TextSetting::new("hunter22", 16);
        registry
            .register_entry(id, Entry::new("ssid", "SSID", EntryType::Text, ssid.clone(), ""))
            .unwrap();
        registry
            .register_entry(id, Entry::new("port", "Port", EntryType::U16, port.clone(), 80u16))
            .unwrap();
        registry
            .register_entry(
                id,
                Entry::new("token", "Token", EntryType::Password, token.clone(), "")
                    .with_attributes(Attributes::WRITE),
            )
            .unwrap();
        Fixture {
            portal: Portal::new(registry.into_shared(), PortalConfig::default()),
            backend,
            ssid,
            port,
            token,
        }
    }

    #[test]
    fn test_setup_updates_and_commits() {
        let f = fixture();
        let resp = f
            .portal
            .handle("/setup", Some("namespace=net&ssid=Home%20Net&port=8080"));
        assert_eq!(resp.status, 200);
        assert_eq!(f.ssid.get(), "Home Net");
        assert_eq!(f.port.get(), 8080);
        assert_eq!(f.backend.flushes("net"), 1);
        assert_eq!(f.backend.value("net", "port"), Some(StoredValue::U16(8080)));
        assert!(resp.body.contains("value=\"Home Net\""));
        assert!(resp.body.contains("value=\"8080\""));
    }

    #[test]
    fn test_get_returns_serialized_value() {
        let f = fixture();
        f.portal
            .handle("/setup", Some("namespace=net&ssid=Home%20Net&port=8080"));
        let resp = f.portal.handle("/get", Some("namespace=net&entry=port"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "8080");
        assert_eq!(resp.content_type, CONTENT_TYPE_TEXT);
        assert_eq!(resp.headers(), &NO_CACHE_HEADERS);
    }

    #[test]
    fn test_get_errors() {
        let f = fixture();
        let resp = f.portal.handle("/get", Some("namespace=nope&entry=port"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, "ERROR: Requested namespace does not exist");

        let resp = f.portal.handle("/get", Some("namespace=net&entry=nope"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, "ERROR: Requested setting does not exist");

        let resp = f.portal.handle("/get", Some("entry=port"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, "ERROR: No namespace found");

        let resp = f.portal.handle("/get", None);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_get_refuses_write_only() {
        let f = fixture();
        let resp = f.portal.handle("/get", Some("namespace=net&entry=token"));
        assert_eq!(resp.status, 403);
        assert!(!resp.body.contains("hunter22"));
    }

    #[test]
    fn test_write_only_value_not_rendered() {
        let f = fixture();
        let resp = f.portal.handle("/setup", Some("namespace=net"));
        assert!(!resp.body.contains("hunter22"));
        assert!(resp.body.contains("name=\"token\""));
    }

    #[test]
    fn test_empty_write_only_value_keeps_secret() {
        let f = fixture();
        f.backend.insert("net", "token", StoredValue::Str("hunter22".into()));
        let resp = f.portal.handle("/setup", Some("namespace=net&port=9090&token="));
        assert_eq!(resp.status, 200);
        assert_eq!(f.port.get(), 9090);
        assert_eq!(f.token.get(), "hunter22");
        assert_eq!(
            f.backend.value("net", "token"),
            Some(StoredValue::Str("hunter22".into()))
        );

        f.portal.handle("/setup", Some("namespace=net&token=s3cret"));
        assert_eq!(f.token.get(), "s3cret");
    }

    #[test]
    fn test_load_then_setup_then_get() {
        let backend = MemoryBackend::new();
        let mut registry = Registry::init(Arc::new(backend.clone())).unwrap();
        let id = registry
            .register_namespace(Namespace::new("net", "Network", 2))
            .unwrap();
        let ssid = TextSetting::new("", 32);
        let port = Setting::new(80u16);
        registry
            .register_entry(id, Entry::new("ssid", "SSID", EntryType::Text, ssid.clone(), ""))
            .unwrap();
        registry
            .register_entry(id, Entry::new("port", "Port", EntryType::U16, port.clone(), 80u16))
            .unwrap();

        let summary = registry.load(id).unwrap();
        assert_eq!(summary.missing, vec!["ssid".to_string(), "port".to_string()]);
        assert_eq!(ssid.get(), "");
        assert_eq!(port.get(), 80);

        let portal = Portal::new(registry.into_shared(), PortalConfig::default());
        let resp = portal.handle("/setup", Some("namespace=net&ssid=MyWiFi&port=8080"));
        assert_eq!(resp.status, 200);
        assert_eq!(backend.flushes("net"), 1);
        assert_eq!(backend.value("net", "ssid"), Some(StoredValue::Str("MyWiFi".into())));

        let resp = portal.handle("/get", Some("namespace=net&entry=ssid"));
        assert_eq!((resp.status, resp.body.as_str()), (200, "MyWiFi"));
        let resp = portal.handle("/get", Some("namespace=bogus&entry=ssid"));
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_no_update_no_commit() {
        let f = fixture();
        f.portal.handle("/setup", Some("namespace=net"));
        assert_eq!(f.backend.flushes("net"), 0);
    }

    #[test]
    fn test_bad_and_oversized_values_are_skipped() {
        let f = fixture();
        let long = "a".repeat(101);
        let query = format!("namespace=net&ssid={long}&port=%zz");
        let resp = f.portal.handle("/setup", Some(&query));
        assert_eq!(resp.status, 200);
        assert_eq!(f.ssid.get(), "");
        assert_eq!(f.port.get(), 80);
        assert_eq!(f.backend.flushes("net"), 0);
    }

    #[test]
    fn test_read_only_entry_not_updated() {
        let backend = MemoryBackend::new();
        let mut registry = Registry::init(Arc::new(backend.clone())).unwrap();
        let id = registry
            .register_namespace(Namespace::new("sys", "System", 1))
            .unwrap();
        let serial = Setting::new(7u32);
        registry
            .register_entry(
                id,
                Entry::new("serial", "Serial", EntryType::U32, serial.clone(), 7u32)
                    .with_attributes(Attributes::READ),
            )
            .unwrap();
        let portal = Portal::new(registry.into_shared(), PortalConfig::default());
        portal.handle("/setup", Some("namespace=sys&serial=9"));
        assert_eq!(serial.get(), 7);
        assert_eq!(backend.flushes("sys"), 0);
    }

    #[test]
    fn test_reset_defaults_erases_namespace() {
        let f = fixture();
        f.portal.handle("/setup", Some("namespace=net&port=8080"));
        assert!(f.backend.value("net", "port").is_some());

        f.portal
            .handle("/setup", Some("namespace=net&reset_defaults=1&port=9999"));
        assert_eq!(f.port.get(), 80);
        assert!(f.backend.keys("net").is_empty());
    }

    #[test]
    fn test_setup_without_namespace_lists_namespaces() {
        let f = fixture();
        for query in [None, Some("namespace=unknown")] {
            let resp = f.portal.handle("/setup", query);
            assert_eq!(resp.status, 200);
            assert!(resp.body.contains("href=\"/setup?namespace=net\">Network</a>"));
            assert!(resp.body.contains("href=\"/?reboot=1\""));
        }
    }

    #[test]
    fn test_root_and_reboot() {
        let f = fixture();
        let resp = f.portal.handle("/", None);
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("href=\"/setup\""));
        assert_eq!(resp.action, None);

        let resp = f.portal.handle("/", Some("reboot=1"));
        assert!(resp.body.contains("Rebooting device"));
        assert_eq!(
            resp.action,
            Some(PortalAction::Reboot {
                delay: Duration::from_millis(3000)
            })
        );
    }

    #[test]
    fn test_stylesheet_is_cacheable() {
        let f = fixture();
        let resp = f.portal.handle("/style.min.css", None);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, CONTENT_TYPE_CSS);
        assert!(resp.headers().is_empty());
    }

    #[test]
    fn test_unknown_path_is_404() {
        let f = fixture();
        assert_eq!(f.portal.handle("/nope", None).status, 404);
    }

    #[test]
    fn test_factory_reset_requires_confirmation() {
        let f = fixture();
        f.portal.handle("/setup", Some("namespace=net&port=8080"));

        let resp = f.portal.handle("/factory", Some("factory_reset=1"));
        assert_eq!(resp.action, None);
        assert_eq!(f.port.get(), 8080);

        let resp = f.portal.handle("/factory", Some("factory_reset=1&confirm=1"));
        assert!(matches!(resp.action, Some(PortalAction::Reboot { .. })));
        assert_eq!(f.port.get(), 80);
        assert!(f.backend.keys("net").is_empty());
    }

    #[test]
    fn test_small_response_buffer_yields_500() {
        let registry = Registry::init(Arc::new(MemoryBackend::new()))
            .unwrap()
            .into_shared();
        let config = PortalConfig {
            response_max_len: 32,
            ..PortalConfig::default()
        };
        let portal = Portal::new(registry, config);
        let resp = portal.handle("/", None);
        assert_eq!(resp.status, 500);
        assert_eq!(resp.headers(), &NO_CACHE_HEADERS);
    }

    #[test]
    fn test_long_query_is_truncated() {
        let f = fixture();
        let padding = "x".repeat(600);
        let query = format!("namespace=net&{padding}&port=8080");
        f.portal.handle("/setup", Some(&query));
        assert_eq!(f.port.get(), 80);
    }
}
