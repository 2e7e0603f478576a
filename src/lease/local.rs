//! In-process lease provider.
//!
//! Contexts running in one process share a registry of async mutexes. A
//! grant is an owned mutex guard, so a holder that is dropped (task aborted,
//! context torn down) releases the lease with it.

use crate::error::StorageError;
use crate::lease::{LeaseGuard, LeaseProvider, LeaseStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

#[derive(Clone, Default)]
pub struct LocalLeaseProvider {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    grants: Arc<AtomicU64>,
}

impl LocalLeaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by every caller in this process.
    pub fn process_wide() -> Self {
        static SHARED: OnceLock<LocalLeaseProvider> = OnceLock::new();
        SHARED.get_or_init(LocalLeaseProvider::default).clone()
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl LeaseProvider for LocalLeaseProvider {
    async fn acquire(&self, name: &str) -> Result<LeaseGuard, StorageError> {
        let guard = self.lock_for(name).lock_owned().await;
        let grant = self.grants.fetch_add(1, Ordering::Relaxed) + 1;
        let holder = format!("local-{}", grant);
        debug!(lease = %name, holder = %holder, "Granted local lease");
        Ok(LeaseGuard::new(name, holder, Box::new(guard)))
    }

    fn status(&self, name: &str) -> Result<LeaseStatus, StorageError> {
        let lock = self.lock_for(name);
        let status = match lock.try_lock() {
            Ok(_free) => LeaseStatus::Free,
            Err(_) => LeaseStatus::Held {
                holder: None,
                expires_at: None,
            },
        };
        Ok(status)
    }
}
