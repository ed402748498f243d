//! Error types for the settings registry and its storage backends.

use thiserror::Error;

use crate::entry::EntryType;

/// Errors reported by a key-value storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The requested key has never been written (or was erased).
    #[error("key not found: {0}")]
    NotFound(String),

    /// The key exists but holds a value of a different type.
    #[error("stored value for `{0}` has a different type")]
    TypeMismatch(String),

    /// The key holds a blob whose length does not match the reader.
    #[error("stored value for `{key}` has length {actual}, expected {expected}")]
    InvalidLength {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// The partition has no free pages or was written by an incompatible version.
    #[error("storage partition is full or incompatible")]
    PartitionFull,

    /// No storage partition exists.
    #[error("storage partition not found")]
    PartitionNotFound,

    /// Any other read/write/flush failure.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Encoding or decoding the on-disk representation failed.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether this error only means the key is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors returned by registry, codec and persistence operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Malformed input: empty or over-long key, missing label, mismatched value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The namespace or entry is already registered.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The registry or namespace table is full.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A lookup by key or id found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation has no implementation for this entry type.
    #[error("not implemented for {0:?} entries")]
    NotImplemented(EntryType),

    /// The entry's backing storage does not match its declared type.
    #[error("entry `{key}` is declared {declared:?} but its backing holds {backing}")]
    UnknownType {
        key: String,
        declared: EntryType,
        backing: &'static str,
    },

    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
