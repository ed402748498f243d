//! Key-value storage behind the registry.
//!
//! A [`StorageBackend`] is the whole partition; it hands out one
//! [`NamespaceStore`] per registered namespace. Values are typed
//! ([`StoredValue`]) and reads name the type they expect ([`StoredKind`]),
//! mirroring the typed getters of flash key-value stores.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A whole storage partition.
pub trait StorageBackend: Send + Sync {
    /// Bring the partition up. Returns [`StoreError::PartitionFull`] when the
    /// partition must be formatted before use.
    fn init(&self) -> Result<(), StoreError>;

    /// Erase the partition entirely.
    fn format(&self) -> Result<(), StoreError>;

    /// Open the namespace-scoped store for `namespace`, read/write.
    fn open(&self, namespace: &str) -> Result<Box<dyn NamespaceStore>, StoreError>;
}

/// Read/write handle on one namespace of a partition.
///
/// Writes may be staged until [`commit`](NamespaceStore::commit) is called.
pub trait NamespaceStore: Send {
    fn set(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError>;

    /// Read `key`, which must hold a value of `kind`.
    fn get(&self, key: &str, kind: StoredKind) -> Result<StoredValue, StoreError>;

    fn erase_key(&mut self, key: &str) -> Result<(), StoreError>;

    fn erase_all(&mut self) -> Result<(), StoreError>;

    /// Flush staged writes.
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// A value as it sits in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Blob(Vec<u8>),
    Str(String),
}

/// The type tag of a [`StoredValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoredKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Blob,
    Str,
}

impl StoredValue {
    pub fn kind(&self) -> StoredKind {
        match self {
            StoredValue::I8(_) => StoredKind::I8,
            StoredValue::U8(_) => StoredKind::U8,
            StoredValue::I16(_) => StoredKind::I16,
            StoredValue::U16(_) => StoredKind::U16,
            StoredValue::I32(_) => StoredKind::I32,
            StoredValue::U32(_) => StoredKind::U32,
            StoredValue::I64(_) => StoredKind::I64,
            StoredValue::U64(_) => StoredKind::U64,
            StoredValue::Blob(_) => StoredKind::Blob,
            StoredValue::Str(_) => StoredKind::Str,
        }
    }
}

/// Return `value` if it has the expected kind, else a type mismatch for `key`.
pub(crate) fn expect_kind(
    key: &str,
    value: StoredValue,
    kind: StoredKind,
) -> Result<StoredValue, StoreError> {
    if value.kind() == kind {
        Ok(value)
    } else {
        Err(StoreError::TypeMismatch(key.to_string()))
    }
}
