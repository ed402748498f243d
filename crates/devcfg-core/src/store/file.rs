//! Directory-backed storage.
//!
//! Each namespace is one JSON file, `<dir>/<namespace>.json`, holding a map of
//! key to tagged value. Writes are staged in memory and land on disk on
//! commit.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{expect_kind, NamespaceStore, StorageBackend, StoredKind, StoredValue};
use crate::error::StoreError;

const VERSION_FILE: &str = ".devcfg-version";
const LAYOUT_VERSION: &str = "1";

/// Storage partition in a directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    fn write_version(&self) -> Result<(), StoreError> {
        fs::write(self.dir.join(VERSION_FILE), LAYOUT_VERSION)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn init(&self) -> Result<(), StoreError> {
        if self.dir.is_file() {
            return Err(StoreError::PartitionNotFound);
        }
        fs::create_dir_all(&self.dir)?;

        let version_path = self.dir.join(VERSION_FILE);
        match fs::read_to_string(&version_path) {
            Ok(version) if version.trim() == LAYOUT_VERSION => Ok(()),
            Ok(version) => {
                warn!(
                    "Storage at {} has layout version {:?}, expected {}",
                    self.dir.display(),
                    version.trim(),
                    LAYOUT_VERSION
                );
                Err(StoreError::PartitionFull)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.write_version(),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the namespace files and the version marker. Anything else in
    /// the directory is left alone.
    fn format(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let ours = name == VERSION_FILE
                || name.ends_with(".json")
                || name.ends_with(".json.tmp");
            if ours && path.is_file() {
                debug!("Removing {}", path.display());
                fs::remove_file(&path)?;
            }
        }
        self.write_version()
    }

    fn open(&self, namespace: &str) -> Result<Box<dyn NamespaceStore>, StoreError> {
        let path = self.namespace_path(namespace);
        let entries: BTreeMap<String, StoredValue> = match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Discarding unreadable {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened namespace {} ({} keys)", namespace, entries.len());
        Ok(Box::new(FileNamespaceStore { path, entries }))
    }
}

struct FileNamespaceStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredValue>,
}

impl NamespaceStore for FileNamespaceStore {
    fn set(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str, kind: StoredKind) -> Result<StoredValue, StoreError> {
        let value = self
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        expect_kind(key, value, kind)
    }

    fn erase_key(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn erase_all(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("devcfg-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_values_survive_reopen_after_commit() {
        let dir = temp_dir("reopen");
        let backend = FileBackend::new(&dir);
        backend.init().unwrap();

        let mut store = backend.open("net").unwrap();
        store.set("port", StoredValue::U16(8080)).unwrap();
        store.set("ssid", StoredValue::Str("home".into())).unwrap();
        store.commit().unwrap();

        let reopened = backend.open("net").unwrap();
        assert_eq!(reopened.get("port", StoredKind::U16), Ok(StoredValue::U16(8080)));
        assert_eq!(
            reopened.get("ssid", StoredKind::Str),
            Ok(StoredValue::Str("home".into()))
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_uncommitted_writes_are_not_persisted() {
        let dir = temp_dir("staged");
        let backend = FileBackend::new(&dir);
        backend.init().unwrap();

        let mut store = backend.open("net").unwrap();
        store.set("port", StoredValue::U16(1)).unwrap();
        drop(store);

        let reopened = backend.open("net").unwrap();
        assert!(reopened.get("port", StoredKind::U16).unwrap_err().is_not_found());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_version_mismatch_requires_format() {
        let dir = temp_dir("version");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(VERSION_FILE), "0").unwrap();

        let backend = FileBackend::new(&dir);
        assert_eq!(backend.init(), Err(StoreError::PartitionFull));
        backend.format().unwrap();
        assert!(backend.init().is_ok());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_format_keeps_unrelated_files() {
        let dir = temp_dir("format");
        let backend = FileBackend::new(&dir);
        backend.init().unwrap();
        let mut store = backend.open("net").unwrap();
        store.set("port", StoredValue::U16(8080)).unwrap();
        store.commit().unwrap();
        fs::write(dir.join("notes.txt"), "keep me").unwrap();

        backend.format().unwrap();
        assert!(!dir.join("net.json").exists());
        assert_eq!(fs::read_to_string(dir.join("notes.txt")).unwrap(), "keep me");
        assert_eq!(
            fs::read_to_string(dir.join(VERSION_FILE)).unwrap(),
            LAYOUT_VERSION
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unreadable_namespace_file_starts_empty() {
        let dir = temp_dir("garbage");
        let backend = FileBackend::new(&dir);
        backend.init().unwrap();
        fs::write(dir.join("net.json"), "not json").unwrap();

        let store = backend.open("net").unwrap();
        assert!(store.get("port", StoredKind::U16).unwrap_err().is_not_found());
        fs::remove_dir_all(&dir).unwrap();
    }
}
