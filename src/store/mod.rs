//! Storage Backend
//!
//! The single-writer embedded store behind every storage session. The backend
//! is only ever touched by the storage worker task; everything else reaches it
//! through the worker bridge.

pub mod persistence;
pub mod snapshot;
pub mod statement;

pub use persistence::SledBackend;
pub use snapshot::Snapshot;
pub use statement::Statement;

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Locator that selects a transient, non-persisted store.
pub const MEMORY_LOCATOR: &str = ":memory:";

/// One result row: column name to value.
pub type Row = serde_json::Map<String, Value>;

/// Opaque identifier of one open store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageHandle(u64);

impl StorageHandle {
    pub fn new(id: u64) -> Self {
        StorageHandle(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Storage backend interface
///
/// Synchronous on purpose: the owning worker processes one command at a time,
/// and the backend is never shared across tasks.
pub trait StorageBackend: Send + 'static {
    /// Open a store by locator. [`MEMORY_LOCATOR`] opens a fresh transient store.
    fn open(&mut self, locator: &str) -> Result<StorageHandle, StorageError>;

    fn exec(
        &mut self,
        handle: StorageHandle,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, StorageError>;

    /// Close a handle. The handle is invalid afterwards.
    fn close(&mut self, handle: StorageHandle) -> Result<(), StorageError>;

    /// Serialize the full content of the store behind `handle`.
    fn export(&mut self, handle: StorageHandle) -> Result<Vec<u8>, StorageError>;

    /// Stop servicing persisted stores so another context can own them.
    fn pause(&mut self) -> Result<(), StorageError>;

    fn resume(&mut self) -> Result<(), StorageError>;

    fn is_paused(&self) -> bool;

    /// Replace the content of the named persisted store with a snapshot.
    fn import(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Validate a persisted store name: a single relative path component.
pub fn validate_store_name(name: &str) -> Result<(), StorageError> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
    {
        return Err(StorageError::InvalidLocator(name.to_string()));
    }
    Ok(())
}

/// Normalize a persisted store name (a leading `/` is accepted and dropped).
pub fn normalize_store_name(name: &str) -> Result<String, StorageError> {
    validate_store_name(name)?;
    Ok(name.trim_start_matches('/').to_string())
}
