//! In-memory storage backend.
//!
//! Used by the Linux simulator when no data directory is configured and by
//! tests, which can inject faults and inspect read and flush counts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{expect_kind, NamespaceStore, StorageBackend, StoredKind, StoredValue};
use crate::error::StoreError;

type Key = (String, String);

fn key(namespace: &str, key: &str) -> Key {
    (namespace.to_string(), key.to_string())
}

#[derive(Debug, Default)]
struct MemoryState {
    partition_missing: bool,
    needs_format: bool,
    data: HashMap<String, BTreeMap<String, StoredValue>>,
    /// Remaining failing reads per key; `usize::MAX` fails until erased.
    corrupt: HashMap<Key, usize>,
    failing_sets: HashSet<Key>,
    failing_erases: HashSet<Key>,
    failing_commits: HashSet<String>,
    reads: HashMap<Key, usize>,
    flushes: HashMap<String, usize>,
    inits: usize,
    formats: usize,
}

/// Storage partition held in memory. Clones share the same partition.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a value directly, bypassing any namespace handle.
    pub fn insert(&self, namespace: &str, key: &str, value: StoredValue) {
        self.state()
            .data
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Current value of `key`, if any.
    pub fn value(&self, namespace: &str, key: &str) -> Option<StoredValue> {
        self.state()
            .data
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// Keys present in `namespace`, sorted.
    pub fn keys(&self, namespace: &str) -> Vec<String> {
        self.state()
            .data
            .get(namespace)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every read of `key` fails until the key is erased.
    pub fn corrupt_key(&self, namespace: &str, k: &str) {
        self.state().corrupt.insert(key(namespace, k), usize::MAX);
    }

    /// The next `count` reads of `key` fail.
    pub fn fail_reads(&self, namespace: &str, k: &str, count: usize) {
        self.state().corrupt.insert(key(namespace, k), count);
    }

    pub fn fail_set(&self, namespace: &str, k: &str) {
        self.state().failing_sets.insert(key(namespace, k));
    }

    pub fn fail_erase(&self, namespace: &str, k: &str) {
        self.state().failing_erases.insert(key(namespace, k));
    }

    pub fn fail_commit(&self, namespace: &str) {
        self.state().failing_commits.insert(namespace.to_string());
    }

    /// The next `init` reports a full partition until it is formatted.
    pub fn require_format(&self) {
        self.state().needs_format = true;
    }

    /// `init` reports a missing partition.
    pub fn remove_partition(&self) {
        self.state().partition_missing = true;
    }

    /// Number of reads of `key`, failed ones included.
    pub fn reads(&self, namespace: &str, k: &str) -> usize {
        self.state()
            .reads
            .get(&key(namespace, k))
            .copied()
            .unwrap_or(0)
    }

    /// Number of successful commits on `namespace`.
    pub fn flushes(&self, namespace: &str) -> usize {
        self.state().flushes.get(namespace).copied().unwrap_or(0)
    }

    pub fn inits(&self) -> usize {
        self.state().inits
    }

    pub fn formats(&self) -> usize {
        self.state().formats
    }
}

impl StorageBackend for MemoryBackend {
    fn init(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.inits += 1;
        if state.partition_missing {
            return Err(StoreError::PartitionNotFound);
        }
        if state.needs_format {
            return Err(StoreError::PartitionFull);
        }
        Ok(())
    }

    fn format(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.partition_missing {
            return Err(StoreError::PartitionNotFound);
        }
        state.data.clear();
        state.corrupt.clear();
        state.needs_format = false;
        state.formats += 1;
        Ok(())
    }

    fn open(&self, namespace: &str) -> Result<Box<dyn NamespaceStore>, StoreError> {
        Ok(Box::new(MemoryNamespaceStore {
            namespace: namespace.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryNamespaceStore {
    namespace: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryNamespaceStore {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NamespaceStore for MemoryNamespaceStore {
    fn set(&mut self, k: &str, value: StoredValue) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing_sets.contains(&key(&self.namespace, k)) {
            return Err(StoreError::Io(format!("injected write failure on `{k}`")));
        }
        state
            .data
            .entry(self.namespace.clone())
            .or_default()
            .insert(k.to_string(), value);
        Ok(())
    }

    fn get(&self, k: &str, kind: StoredKind) -> Result<StoredValue, StoreError> {
        let mut state = self.state();
        let id = key(&self.namespace, k);
        *state.reads.entry(id.clone()).or_default() += 1;

        if let Some(remaining) = state.corrupt.get_mut(&id) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(StoreError::Io(format!("corrupt entry `{k}`")));
            }
        }

        let value = state
            .data
            .get(&self.namespace)
            .and_then(|entries| entries.get(k))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(k.to_string()))?;
        expect_kind(k, value, kind)
    }

    fn erase_key(&mut self, k: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        let id = key(&self.namespace, k);
        if state.failing_erases.contains(&id) {
            return Err(StoreError::Io(format!("injected erase failure on `{k}`")));
        }
        state.corrupt.remove(&id);
        let removed = state
            .data
            .get_mut(&self.namespace)
            .and_then(|entries| entries.remove(k));
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(k.to_string())),
        }
    }

    fn erase_all(&mut self) -> Result<(), StoreError> {
        let mut state = self.state();
        let namespace = self.namespace.clone();
        state.data.remove(&namespace);
        state.corrupt.retain(|(ns, _), _| *ns != namespace);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing_commits.contains(&self.namespace) {
            return Err(StoreError::Io(format!(
                "injected commit failure on `{}`",
                self.namespace
            )));
        }
        *state.flushes.entry(self.namespace.clone()).or_default() += 1;
        Ok(())
    }
}
