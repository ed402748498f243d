//! The settings registry.
//!
//! The registry owns a fixed table of namespaces and the storage backend they
//! are persisted to. It is an ordinary value: create one at startup and hand
//! it around as a [`SharedRegistry`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::entry::{validate_entry, Entry};
use crate::error::{RegistryError, Result, StoreError};
use crate::namespace::{validate_namespace, EntryId, Namespace};
use crate::store::StorageBackend;

/// Maximum number of namespaces a registry holds.
pub const NAMESPACES_MAX: usize = 10;

/// Index of a namespace in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub(crate) usize);

impl NamespaceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A registry shared between the firmware modules and the portal.
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Lock a shared registry, recovering the guard if a previous holder panicked.
pub fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Table of namespaces bound to one storage backend.
pub struct Registry {
    backend: Arc<dyn StorageBackend>,
    slots: Vec<Option<Namespace>>,
}

impl Registry {
    /// Bring up the storage backend and create an empty registry.
    ///
    /// A partition reported full or incompatible is formatted and brought up
    /// again. Any other failure is returned.
    pub fn init(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        match backend.init() {
            Ok(()) => {}
            Err(StoreError::PartitionFull) => {
                warn!("Storage partition must be formatted, erasing it");
                backend.format()?;
                backend.init()?;
            }
            Err(e) => {
                error!("Storage init failed: {}", e);
                return Err(e.into());
            }
        }
        info!("Settings registry ready ({} namespace slots)", NAMESPACES_MAX);
        Ok(Self {
            backend,
            slots: (0..NAMESPACES_MAX).map(|_| None).collect(),
        })
    }

    /// Wrap the registry for sharing.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Register `namespace`, opening its store.
    pub fn register_namespace(&mut self, mut namespace: Namespace) -> Result<NamespaceId> {
        validate_namespace(&namespace).inspect_err(|e| error!("{}", e))?;

        if self.find_namespace(namespace.key()).is_some() {
            let err = RegistryError::InvalidState(format!(
                "namespace `{}` already registered",
                namespace.key()
            ));
            error!("{}", err);
            return Err(err);
        }

        let index = self.slots.iter().position(Option::is_none).ok_or_else(|| {
            let err = RegistryError::ResourceExhausted(format!(
                "no free slot for namespace `{}`",
                namespace.key()
            ));
            error!("{}", err);
            err
        })?;

        let store = self.backend.open(namespace.key()).inspect_err(|e| {
            error!("Opening store for namespace {} failed: {}", namespace.key(), e)
        })?;
        namespace.attach_store(store);

        debug!("Registered namespace {} in slot {}", namespace.key(), index);
        self.slots[index] = Some(namespace);
        Ok(NamespaceId(index))
    }

    /// Register `entry` in the namespace `id`, binding the default codec if
    /// the entry brings none.
    pub fn register_entry(&mut self, id: NamespaceId, mut entry: Entry) -> Result<EntryId> {
        let namespace = self
            .slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                RegistryError::InvalidArgument(format!("unknown namespace id {}", id.0))
            })?;

        validate_entry(&entry).inspect_err(|e| error!("{}", e))?;
        entry.bind_default_codec();

        let key = entry.key().to_string();
        let entry_id = namespace
            .insert(entry)
            .inspect_err(|e| error!("{}", e))?;
        debug!(
            "Registered entry {}.{} in slot {}",
            namespace.key(),
            key,
            entry_id.0
        );
        Ok(entry_id)
    }

    /// First namespace whose key equals `key`.
    pub fn find_namespace(&self, key: &str) -> Option<NamespaceId> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|namespace| namespace.key() == key)
        })
        .map(NamespaceId)
    }

    pub fn namespace(&self, id: NamespaceId) -> Option<&Namespace> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn namespace_mut(&mut self, id: NamespaceId) -> Option<&mut Namespace> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Registered namespaces in slot order.
    pub fn namespaces(&self) -> impl Iterator<Item = (NamespaceId, &Namespace)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|ns| (NamespaceId(i), ns)))
    }

    /// Ids of all registered namespaces.
    pub fn namespace_ids(&self) -> Vec<NamespaceId> {
        self.namespaces().map(|(id, _)| id).collect()
    }

    /// Look up an entry by namespace and entry key.
    pub fn find_entry(&self, namespace: &str, entry: &str) -> Option<&Entry> {
        self.find_namespace(namespace)
            .and_then(|id| self.namespace(id))
            .and_then(|ns| ns.find_entry(entry))
    }

    pub(crate) fn namespace_or_err(&mut self, id: NamespaceId) -> Result<&mut Namespace> {
        self.namespace_mut(id)
            .ok_or_else(|| RegistryError::InvalidArgument(format!("unknown namespace id {}", id.0)))
    }
}
