//! # devcfg-core
//!
//! Typed settings registry for networked devices.
//!
//! This crate provides:
//! - Typed entries with shared backing storage and string codecs
//! - Fixed-capacity namespaces and the registry that holds them
//! - Commit/load of namespaces to a key-value store, with memory and
//!   file backends
//! - The `network` settings namespace and Wi-Fi mode selection
//!
//! This crate is runtime-agnostic and contains no async code, so the same
//! registry runs under tokio on Linux and under esp-idf on the device.

pub mod codec;
pub mod entry;
pub mod error;
pub mod namespace;
pub mod network;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod writer;

pub use entry::{
    validate_entry, Attributes, Backing, DefaultCodec, Entry, EntryCodec, EntryType, Setting,
    TextSetting, Value, ENTRY_KEY_MAX_LEN,
};
pub use error::{RegistryError, Result, StoreError};
pub use namespace::{validate_namespace, EntryId, Namespace, NAMESPACE_KEY_MAX_LEN};
pub use network::{NetworkEvent, NetworkSettings, WifiMode};
pub use persistence::LoadSummary;
pub use registry::{NamespaceId, Registry, SharedRegistry, NAMESPACES_MAX};
pub use store::{FileBackend, MemoryBackend, NamespaceStore, StorageBackend, StoredKind, StoredValue};
pub use writer::{escape_html, BoundedWriter, WriteError};
