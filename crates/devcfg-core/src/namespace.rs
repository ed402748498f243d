//! Namespaces: named, fixed-capacity groups of entries.

use std::fmt;

use crate::entry::Entry;
use crate::error::{RegistryError, Result};
use crate::store::NamespaceStore;

/// Maximum length of a namespace key, in bytes.
pub const NAMESPACE_KEY_MAX_LEN: usize = 15;

/// Index of an entry within its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A group of entries persisted together under one store namespace.
pub struct Namespace {
    key: String,
    friendly: String,
    slots: Vec<Option<Entry>>,
    store: Option<Box<dyn NamespaceStore>>,
}

impl Namespace {
    /// Declare a namespace that can hold up to `capacity` entries.
    pub fn new(key: impl Into<String>, friendly: impl Into<String>, capacity: usize) -> Self {
        Self {
            key: key.into(),
            friendly: friendly.into(),
            slots: (0..capacity).map(|_| None).collect(),
            store: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn friendly(&self) -> &str {
        &self.friendly
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().flatten()
    }

    /// First entry whose key equals `key`.
    pub fn find_entry(&self, key: &str) -> Option<&Entry> {
        self.entries().find(|entry| entry.key() == key)
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Whether the store handle has been opened.
    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    pub(crate) fn attach_store(&mut self, store: Box<dyn NamespaceStore>) {
        self.store = Some(store);
    }

    pub(crate) fn store_mut(&mut self) -> Result<&mut Box<dyn NamespaceStore>> {
        let key = &self.key;
        self.store
            .as_mut()
            .ok_or_else(|| RegistryError::InvalidState(format!("namespace `{key}` has no open store")))
    }

    /// Entries together with the store handle, for persistence passes.
    pub(crate) fn split_for_io(&mut self) -> Result<(Vec<&Entry>, &mut Box<dyn NamespaceStore>)> {
        let Namespace {
            key, slots, store, ..
        } = self;
        let store = store.as_mut().ok_or_else(|| {
            RegistryError::InvalidState(format!("namespace `{key}` has no open store"))
        })?;
        Ok((slots.iter().flatten().collect(), store))
    }

    /// Put `entry` into the first free slot.
    pub(crate) fn insert(&mut self, entry: Entry) -> Result<EntryId> {
        if self.find_entry(entry.key()).is_some() {
            return Err(RegistryError::InvalidState(format!(
                "entry `{}` already registered in namespace `{}`",
                entry.key(),
                self.key
            )));
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                RegistryError::ResourceExhausted(format!(
                    "namespace `{}` is full ({} entries)",
                    self.key,
                    self.slots.len()
                ))
            })?;
        self.slots[index] = Some(entry);
        Ok(EntryId(index))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("key", &self.key)
            .field("friendly", &self.friendly)
            .field("capacity", &self.slots.len())
            .field("entries", &self.entries().map(Entry::key).collect::<Vec<_>>())
            .field("open", &self.store.is_some())
            .finish()
    }
}

/// Check a namespace before it is registered.
pub fn validate_namespace(namespace: &Namespace) -> Result<()> {
    if namespace.key.is_empty() {
        return Err(RegistryError::InvalidArgument("namespace key is empty".into()));
    }
    if namespace.key.len() > NAMESPACE_KEY_MAX_LEN {
        return Err(RegistryError::InvalidArgument(format!(
            "namespace key `{}` is longer than {} bytes",
            namespace.key, NAMESPACE_KEY_MAX_LEN
        )));
    }
    if namespace.friendly.is_empty() {
        return Err(RegistryError::InvalidArgument(format!(
            "namespace `{}` has no friendly name",
            namespace.key
        )));
    }
    if namespace.slots.is_empty() {
        return Err(RegistryError::InvalidArgument(format!(
            "namespace `{}` has no room for entries",
            namespace.key
        )));
    }
    Ok(())
}
