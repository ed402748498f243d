//! Moving entry values between their backing storage and the store.
//!
//! Each entry type maps to one stored representation: integers to the
//! matching integer width, choices to `u8`/`u32`, floats to little-endian
//! blobs of their exact size, text to strings. Blob and image entries are
//! not persisted.

use tracing::{debug, error, info, warn};

use crate::entry::{Backing, Entry, EntryType};
use crate::error::{RegistryError, Result, StoreError};
use crate::namespace::Namespace;
use crate::registry::{NamespaceId, Registry};
use crate::store::{StoredKind, StoredValue};

/// Outcome of a load pass, by entry key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Read from the store into the backing.
    pub loaded: Vec<String>,
    /// Not present in the store; backing untouched.
    pub missing: Vec<String>,
    /// Unreadable twice and erased from the store.
    pub erased: Vec<String>,
    /// Types that are never persisted.
    pub skipped: Vec<String>,
}

/// Stored representation of an entry type, `None` when it is not persisted.
pub fn stored_kind(entry_type: EntryType) -> Option<StoredKind> {
    let kind = match entry_type {
        EntryType::I8 => StoredKind::I8,
        EntryType::U8 | EntryType::SingleChoice => StoredKind::U8,
        EntryType::I16 => StoredKind::I16,
        EntryType::U16 => StoredKind::U16,
        EntryType::I32 => StoredKind::I32,
        EntryType::U32 | EntryType::MultipleChoice => StoredKind::U32,
        EntryType::I64 => StoredKind::I64,
        EntryType::U64 => StoredKind::U64,
        EntryType::Float | EntryType::Double => StoredKind::Blob,
        EntryType::Text | EntryType::Password => StoredKind::Str,
        EntryType::Blob | EntryType::Image => return None,
    };
    Some(kind)
}

fn to_stored(entry: &Entry) -> Result<StoredValue> {
    let value = match (entry.entry_type(), entry.backing()) {
        (EntryType::I8, Backing::I8(s)) => StoredValue::I8(s.get()),
        (EntryType::U8 | EntryType::SingleChoice, Backing::U8(s)) => StoredValue::U8(s.get()),
        (EntryType::I16, Backing::I16(s)) => StoredValue::I16(s.get()),
        (EntryType::U16, Backing::U16(s)) => StoredValue::U16(s.get()),
        (EntryType::I32, Backing::I32(s)) => StoredValue::I32(s.get()),
        (EntryType::U32 | EntryType::MultipleChoice, Backing::U32(s)) => {
            StoredValue::U32(s.get())
        }
        (EntryType::I64, Backing::I64(s)) => StoredValue::I64(s.get()),
        (EntryType::U64, Backing::U64(s)) => StoredValue::U64(s.get()),
        (EntryType::Float, Backing::F32(s)) => StoredValue::Blob(s.get().to_le_bytes().to_vec()),
        (EntryType::Double, Backing::F64(s)) => StoredValue::Blob(s.get().to_le_bytes().to_vec()),
        (EntryType::Text | EntryType::Password, Backing::Text(s)) => StoredValue::Str(s.get()),
        (EntryType::Blob | EntryType::Image, _) => {
            return Err(RegistryError::NotImplemented(entry.entry_type()))
        }
        (declared, backing) => {
            return Err(RegistryError::UnknownType {
                key: entry.key().to_string(),
                declared,
                backing: backing.kind_name(),
            })
        }
    };
    Ok(value)
}

fn fixed_blob<const N: usize>(key: &str, bytes: Vec<u8>) -> Result<[u8; N]> {
    let actual = bytes.len();
    bytes.try_into().map_err(|_| {
        RegistryError::Storage(StoreError::InvalidLength {
            key: key.to_string(),
            expected: N,
            actual,
        })
    })
}

fn apply_stored(entry: &Entry, stored: StoredValue) -> Result<()> {
    let key = entry.key();
    match (entry.backing(), stored) {
        (Backing::I8(s), StoredValue::I8(v)) => s.set(v),
        (Backing::U8(s), StoredValue::U8(v)) => s.set(v),
        (Backing::I16(s), StoredValue::I16(v)) => s.set(v),
        (Backing::U16(s), StoredValue::U16(v)) => s.set(v),
        (Backing::I32(s), StoredValue::I32(v)) => s.set(v),
        (Backing::U32(s), StoredValue::U32(v)) => s.set(v),
        (Backing::I64(s), StoredValue::I64(v)) => s.set(v),
        (Backing::U64(s), StoredValue::U64(v)) => s.set(v),
        (Backing::F32(s), StoredValue::Blob(bytes)) => {
            s.set(f32::from_le_bytes(fixed_blob(key, bytes)?))
        }
        (Backing::F64(s), StoredValue::Blob(bytes)) => {
            s.set(f64::from_le_bytes(fixed_blob(key, bytes)?))
        }
        (Backing::Text(s), StoredValue::Str(text)) => {
            s.set(&text).map_err(|max| {
                RegistryError::Storage(StoreError::InvalidLength {
                    key: key.to_string(),
                    expected: max,
                    actual: text.len(),
                })
            })?
        }
        _ => return Err(RegistryError::Storage(StoreError::TypeMismatch(key.to_string()))),
    }
    Ok(())
}

impl Namespace {
    /// Write every entry's current value to the store and flush once.
    ///
    /// Entries that fail to stage are logged and left out. Nothing is flushed
    /// when no entry was staged. Returns the number of staged entries.
    pub fn commit(&mut self) -> Result<usize> {
        let namespace = self.key().to_string();
        let (entries, store) = self.split_for_io()?;

        let mut staged = 0;
        for entry in entries {
            let value = match to_stored(entry) {
                Ok(value) => value,
                Err(e) => {
                    error!("Not committing {}.{}: {}", namespace, entry.key(), e);
                    continue;
                }
            };
            match store.set(entry.key(), value) {
                Ok(()) => staged += 1,
                Err(e) => error!("Writing {}.{} failed: {}", namespace, entry.key(), e),
            }
        }

        if staged > 0 {
            store.commit().inspect_err(|e| {
                error!("Flushing namespace {} failed: {}", namespace, e)
            })?;
        }
        info!("Committed {} entries of namespace {}", staged, namespace);
        Ok(staged)
    }

    /// Read every entry from the store into its backing.
    ///
    /// A missing key leaves the backing untouched. A failed read is retried
    /// once; a second failure erases the key. Only a failed erase aborts the
    /// pass.
    pub fn load(&mut self) -> Result<LoadSummary> {
        let namespace = self.key().to_string();
        let (entries, store) = self.split_for_io()?;
        let mut summary = LoadSummary::default();

        for entry in entries {
            let key = entry.key();
            let Some(kind) = stored_kind(entry.entry_type()) else {
                warn!(
                    "Not loading {}.{}: {:?} entries are not persisted",
                    namespace,
                    key,
                    entry.entry_type()
                );
                summary.skipped.push(key.to_string());
                continue;
            };

            let mut retried = false;
            loop {
                let read = store
                    .get(key, kind)
                    .map_err(RegistryError::from)
                    .and_then(|stored| apply_stored(entry, stored));
                match read {
                    Ok(()) => {
                        debug!("Loaded {}.{}", namespace, key);
                        summary.loaded.push(key.to_string());
                    }
                    Err(RegistryError::Storage(e)) if e.is_not_found() => {
                        debug!("{}.{} not in store, keeping current value", namespace, key);
                        summary.missing.push(key.to_string());
                    }
                    Err(e) if !retried => {
                        warn!("Reading {}.{} failed, retrying: {}", namespace, key, e);
                        retried = true;
                        continue;
                    }
                    Err(e) => {
                        error!("Reading {}.{} failed again, erasing it: {}", namespace, key, e);
                        match store.erase_key(key) {
                            Ok(()) => {}
                            Err(erase) if erase.is_not_found() => {}
                            Err(erase) => {
                                error!("Erasing {}.{} failed: {}", namespace, key, erase);
                                return Err(erase.into());
                            }
                        }
                        summary.erased.push(key.to_string());
                    }
                }
                break;
            }
        }
        Ok(summary)
    }

    /// Copy every entry's default value into its backing.
    pub fn reset_to_defaults(&self) -> Result<()> {
        for entry in self.entries() {
            entry.reset_to_default()?;
        }
        info!("Reset namespace {} to defaults", self.key());
        Ok(())
    }

    /// Remove every key of this namespace from the store and flush.
    pub fn erase(&mut self) -> Result<()> {
        let namespace = self.key().to_string();
        let store = self.store_mut()?;
        store.erase_all()?;
        store.commit()?;
        info!("Erased namespace {} from storage", namespace);
        Ok(())
    }
}

impl Registry {
    /// Commit the namespace `id`. See [`Namespace::commit`].
    pub fn commit(&mut self, id: NamespaceId) -> Result<usize> {
        self.namespace_or_err(id)?.commit()
    }

    /// Load the namespace `id`. See [`Namespace::load`].
    pub fn load(&mut self, id: NamespaceId) -> Result<LoadSummary> {
        self.namespace_or_err(id)?.load()
    }

    pub fn reset_to_defaults(&mut self, id: NamespaceId) -> Result<()> {
        self.namespace_or_err(id)?.reset_to_defaults()
    }

    pub fn erase(&mut self, id: NamespaceId) -> Result<()> {
        self.namespace_or_err(id)?.erase()
    }

    /// Load every registered namespace, stopping at the first fatal error.
    pub fn load_all(&mut self) -> Result<()> {
        for id in self.namespace_ids() {
            self.load(id)?;
        }
        Ok(())
    }

    /// Reset every namespace to defaults and erase it from the store.
    pub fn factory_reset(&mut self) -> Result<()> {
        for id in self.namespace_ids() {
            self.reset_to_defaults(id)?;
            self.erase(id)?;
        }
        warn!("All settings restored to factory defaults");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Setting, TextSetting};
    use crate::store::MemoryBackend;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Fixture {
        registry: Registry,
        backend: MemoryBackend,
        id: NamespaceId,
        port: Setting<u16>,
        name: TextSetting,
        gain: Setting<f32>,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        let mut registry = Registry::init(Arc::new(backend.clone())).unwrap();
        let id = registry
            .register_namespace(Namespace::new("dev", "Device", 4))
            .unwrap();
        let port = Setting::new(80u16);
        let name = TextSetting::new("node", 16);
        let gain = Setting::new(1.0f32);
        registry
            .register_entry(id, Entry::new("port", "Port", EntryType::U16, port.clone(), 80u16))
            .unwrap();
        registry
            .register_entry(id, Entry::new("name", "Name", EntryType::Text, name.clone(), "node"))
            .unwrap();
        registry
            .register_entry(id, Entry::new("gain", "Gain", EntryType::Float, gain.clone(), 1.0f32))
            .unwrap();
        Fixture {
            registry,
            backend,
            id,
            port,
            name,
            gain,
        }
    }

    #[test]
    fn test_commit_writes_typed_values() {
        let mut f = fixture();
        f.port.set(8080);
        f.gain.set(0.5);
        assert_eq!(f.registry.commit(f.id).unwrap(), 3);
        assert_eq!(f.backend.value("dev", "port"), Some(StoredValue::U16(8080)));
        assert_eq!(
            f.backend.value("dev", "name"),
            Some(StoredValue::Str("node".into()))
        );
        assert_eq!(
            f.backend.value("dev", "gain"),
            Some(StoredValue::Blob(0.5f32.to_le_bytes().to_vec()))
        );
        assert_eq!(f.backend.flushes("dev"), 1);
    }

    #[test]
    fn test_commit_then_load_restores_values() {
        let mut f = fixture();
        f.port.set(8080);
        f.name.set("gateway").unwrap();
        f.registry.commit(f.id).unwrap();

        f.port.set(1);
        f.name.set("x").unwrap();
        let summary = f.registry.load(f.id).unwrap();
        assert_eq!(f.port.get(), 8080);
        assert_eq!(f.name.get(), "gateway");
        assert_eq!(summary.loaded, vec!["port", "name", "gain"]);
    }

    #[test]
    fn test_load_from_empty_store_keeps_values() {
        let mut f = fixture();
        let summary = f.registry.load(f.id).unwrap();
        assert_eq!(f.port.get(), 80);
        assert_eq!(f.name.get(), "node");
        assert_eq!(summary.missing, vec!["port", "name", "gain"]);
        assert!(summary.erased.is_empty());
    }

    #[test]
    fn test_load_retries_once_then_erases() {
        let mut f = fixture();
        f.backend.insert("dev", "port", StoredValue::U16(9));
        f.backend.corrupt_key("dev", "port");

        let summary = f.registry.load(f.id).unwrap();
        assert_eq!(f.backend.reads("dev", "port"), 2);
        assert_eq!(f.backend.value("dev", "port"), None);
        assert_eq!(summary.erased, vec!["port"]);
        assert_eq!(f.port.get(), 80);
    }

    #[test]
    fn test_load_recovers_on_retry() {
        let mut f = fixture();
        f.backend.insert("dev", "port", StoredValue::U16(9));
        f.backend.fail_reads("dev", "port", 1);

        let summary = f.registry.load(f.id).unwrap();
        assert_eq!(f.port.get(), 9);
        assert_eq!(summary.loaded, vec!["port"]);
        assert_eq!(f.backend.reads("dev", "port"), 2);
    }

    #[test]
    fn test_load_aborts_when_erase_fails() {
        let mut f = fixture();
        f.backend.insert("dev", "port", StoredValue::U16(9));
        f.backend.corrupt_key("dev", "port");
        f.backend.fail_erase("dev", "port");
        assert!(matches!(
            f.registry.load(f.id),
            Err(RegistryError::Storage(StoreError::Io(_)))
        ));
    }

    #[test]
    fn test_load_erases_wrong_typed_value() {
        let mut f = fixture();
        f.backend.insert("dev", "gain", StoredValue::Blob(vec![1, 2]));
        let summary = f.registry.load(f.id).unwrap();
        assert_eq!(summary.erased, vec!["gain"]);
        assert_eq!(f.gain.get(), 1.0);
    }

    #[test]
    fn test_commit_skips_failing_entry() {
        let mut f = fixture();
        f.backend.fail_set("dev", "name");
        assert_eq!(f.registry.commit(f.id).unwrap(), 2);
        assert_eq!(f.backend.value("dev", "name"), None);
        assert_eq!(f.backend.flushes("dev"), 1);
    }

    #[test]
    fn test_commit_without_staged_entries_does_not_flush() {
        let backend = MemoryBackend::new();
        let mut registry = Registry::init(Arc::new(backend.clone())).unwrap();
        let id = registry
            .register_namespace(Namespace::new("img", "Images", 2))
            .unwrap();
        registry
            .register_entry(
                id,
                Entry::new("logo", "Logo", EntryType::Image, Setting::new(vec![0u8]), Vec::<u8>::new()),
            )
            .unwrap();
        assert_eq!(registry.commit(id).unwrap(), 0);
        assert_eq!(backend.flushes("img"), 0);

        let summary = registry.load(id).unwrap();
        assert_eq!(summary.skipped, vec!["logo"]);
        assert_eq!(backend.reads("img", "logo"), 0);
    }

    #[test]
    fn test_commit_flush_failure_is_error() {
        let mut f = fixture();
        f.backend.fail_commit("dev");
        assert!(f.registry.commit(f.id).is_err());
    }

    #[test]
    fn test_reset_and_erase() {
        let mut f = fixture();
        f.port.set(1234);
        f.registry.commit(f.id).unwrap();

        f.registry.reset_to_defaults(f.id).unwrap();
        f.registry.erase(f.id).unwrap();
        assert_eq!(f.port.get(), 80);
        assert!(f.backend.keys("dev").is_empty());
    }

    #[test]
    fn test_factory_reset_covers_all_namespaces() {
        let mut f = fixture();
        let other = f
            .registry
            .register_namespace(Namespace::new("aux", "Aux", 1))
            .unwrap();
        let level = Setting::new(5i8);
        f.registry
            .register_entry(other, Entry::new("level", "Level", EntryType::I8, level.clone(), 0i8))
            .unwrap();
        f.port.set(1);
        f.registry.commit(f.id).unwrap();
        f.registry.commit(other).unwrap();

        f.registry.factory_reset().unwrap();
        assert_eq!(f.port.get(), 80);
        assert_eq!(level.get(), 0);
        assert!(f.backend.keys("dev").is_empty());
        assert!(f.backend.keys("aux").is_empty());
    }

    #[test]
    fn test_choices_persist_as_integers() {
        let backend = MemoryBackend::new();
        let mut registry = Registry::init(Arc::new(backend.clone())).unwrap();
        let id = registry
            .register_namespace(Namespace::new("ui", "UI", 2))
            .unwrap();
        registry
            .register_entry(id, Entry::new("theme", "Theme", EntryType::SingleChoice, Setting::new(2u8), 0u8))
            .unwrap();
        registry
            .register_entry(
                id,
                Entry::new("panels", "Panels", EntryType::MultipleChoice, Setting::new(0b101u32), 0u32),
            )
            .unwrap();
        registry.commit(id).unwrap();
        assert_eq!(backend.value("ui", "theme"), Some(StoredValue::U8(2)));
        assert_eq!(backend.value("ui", "panels"), Some(StoredValue::U32(5)));
    }
}
