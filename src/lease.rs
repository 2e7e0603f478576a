//! Cross-context storage leases
//!
//! A lease is an advisory, named, exclusive token. Exactly one execution
//! context may hold a given lease name at a time; acquisition suspends the
//! requester until the previous holder lets go. Providers must release a
//! lease on their own when its holder disappears without releasing it.

pub mod coordinator;
pub mod file;
pub mod local;

pub use coordinator::LeaseCoordinator;
pub use file::FileLeaseProvider;
pub use local::LocalLeaseProvider;

use crate::config::{LeaseBackend, LeaseConfig};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Lease state as seen from one execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    NotHeld,
    Acquiring,
    Held,
    Releasing,
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LeaseState::NotHeld => "not-held",
            LeaseState::Acquiring => "acquiring",
            LeaseState::Held => "held",
            LeaseState::Releasing => "releasing",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of a lease, independent of who asks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseStatus {
    Free,
    Held {
        holder: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },
}

/// A granted lease. Dropping the guard releases the lease.
pub struct LeaseGuard {
    name: String,
    holder: String,
    _release: Box<dyn Send>,
}

impl LeaseGuard {
    pub fn new(name: impl Into<String>, holder: impl Into<String>, release: Box<dyn Send>) -> Self {
        Self {
            name: name.into(),
            holder: holder.into(),
            _release: release,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Release the lease now.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("name", &self.name)
            .field("holder", &self.holder)
            .finish()
    }
}

/// Mutual-exclusion primitive behind the lease coordinator
#[async_trait]
pub trait LeaseProvider: Send + Sync {
    /// Suspend until the named lease is granted.
    async fn acquire(&self, name: &str) -> Result<LeaseGuard, StorageError>;

    fn status(&self, name: &str) -> Result<LeaseStatus, StorageError>;
}

/// Provider selected by configuration. Local leases use the process-wide
/// registry so that every context in this process contends on the same locks.
pub fn provider_from_config(config: &LeaseConfig) -> Arc<dyn LeaseProvider> {
    match config.backend {
        LeaseBackend::Local => Arc::new(LocalLeaseProvider::process_wide()),
        LeaseBackend::File => Arc::new(FileLeaseProvider::from_config(config)),
    }
}
