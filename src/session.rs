//! Storage Session
//!
//! Scoped access to a store: a session's handle lives exactly as long as the
//! unit of work it was opened for and is closed on every exit path. The
//! one-shot migration is owned here rather than in process-wide state.

use crate::bridge::{Marker, WorkerBridge};
use crate::error::{ApiError, StorageError};
use crate::store::{Row, StorageHandle, MEMORY_LOCATOR};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub type Migration = Box<dyn FnOnce(Session) -> BoxFuture<'static, Result<(), ApiError>> + Send>;

/// One-shot migration state.
pub enum MigrationFlag {
    Pending(Migration),
    Done,
}

impl MigrationFlag {
    pub fn pending<F, Fut>(migrate: F) -> Self
    where
        F: FnOnce(Session) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        MigrationFlag::Pending(Box::new(move |session| Box::pin(migrate(session))))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MigrationFlag::Pending(_))
    }
}

impl fmt::Debug for MigrationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationFlag::Pending(_) => f.write_str("Pending"),
            MigrationFlag::Done => f.write_str("Done"),
        }
    }
}

/// An open store, valid for the dynamic extent of one unit of work.
#[derive(Clone)]
pub struct Session {
    bridge: WorkerBridge,
    handle: StorageHandle,
    name: Arc<str>,
}

impl Session {
    pub fn handle(&self) -> StorageHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, ApiError> {
        Ok(self.bridge.exec(self.handle, sql, params).await?)
    }

    /// Snapshot of the whole store behind this session.
    pub async fn export(&self) -> Result<Vec<u8>, ApiError> {
        Ok(self.bridge.export(self.handle).await?)
    }

    pub async fn signal(&self, marker: Marker) -> Result<(), ApiError> {
        Ok(self.bridge.signal(self.handle, marker).await?)
    }

    pub async fn import(&self, name: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        Ok(self.bridge.import(name, bytes).await?)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Closes a session's handle if its unit of work is dropped before it
/// finishes (a timeout, an aborted task, a panicking handler). Bridge sends
/// are eager, so the close is queued from `Drop` without awaiting it.
struct CloseOnDrop {
    bridge: WorkerBridge,
    handle: Option<StorageHandle>,
}

impl CloseOnDrop {
    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!(handle = %handle, "Session abandoned before completion; closing handle");
            let _ = self.bridge.close(handle);
        }
    }
}

pub struct StorageSessions {
    bridge: WorkerBridge,
    migration: Mutex<MigrationFlag>,
}

impl StorageSessions {
    pub fn new(bridge: WorkerBridge, migration: MigrationFlag) -> Self {
        Self {
            bridge,
            migration: Mutex::new(migration),
        }
    }

    pub fn bridge(&self) -> &WorkerBridge {
        &self.bridge
    }

    /// Arm a migration to run on the next session opened with
    /// [`with_session`](Self::with_session). Replaces any pending one.
    pub fn arm_migration<F, Fut>(&self, migrate: F)
    where
        F: FnOnce(Session) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        *self.migration.lock() = MigrationFlag::pending(migrate);
    }

    pub fn migration_pending(&self) -> bool {
        self.migration.lock().is_pending()
    }

    /// Open `name`, run a pending migration, run `unit`, and close the handle
    /// whatever happened.
    ///
    /// The migration flag is cleared before the migration runs, so a failed
    /// migration is not retried by later sessions.
    pub async fn with_session<T, F, Fut>(&self, name: &str, unit: F) -> Result<T, ApiError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.scoped(name, true, unit).await
    }

    /// Emit the activation marker; the worker acquires the storage lease and
    /// resumes its backend.
    pub async fn arriving(&self) -> Result<(), ApiError> {
        self.coordination(|session| async move { session.signal(Marker::Arriving).await })
            .await
    }

    /// Emit the deactivation marker; the worker pauses its backend and
    /// releases the storage lease.
    pub async fn leaving(&self) -> Result<(), ApiError> {
        self.coordination(|session| async move { session.signal(Marker::Leaving).await })
            .await
    }

    /// Replace the content of the persisted store `name` with a snapshot.
    pub async fn import(&self, name: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        let name = name.to_string();
        self.coordination(|session| async move { session.import(&name, bytes).await })
            .await
    }

    /// Snapshot of the persisted store `name`, taken under a session that is
    /// closed before the bytes are returned.
    pub async fn export(&self, name: &str) -> Result<Vec<u8>, ApiError> {
        self.with_session(name, |session| async move { session.export().await })
            .await
    }

    /// Export `name` into a local file. The file is written next to its
    /// destination first and renamed into place, so readers never see a
    /// partial snapshot.
    pub async fn export_to_file(&self, name: &str, path: &Path) -> Result<usize, ApiError> {
        let bytes = self.export(name).await?;
        let tmp = path.with_extension("partial");
        std::fs::write(&tmp, &bytes).map_err(StorageError::from)?;
        std::fs::rename(&tmp, path).map_err(StorageError::from)?;
        info!(store = %name, path = %path.display(), bytes = bytes.len(), "Exported snapshot");
        Ok(bytes.len())
    }

    /// Transient session used only to carry coordination traffic. It never
    /// consumes the migration.
    async fn coordination<F, Fut>(&self, unit: F) -> Result<(), ApiError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<(), ApiError>>,
    {
        self.scoped(MEMORY_LOCATOR, false, unit).await
    }

    async fn scoped<T, F, Fut>(&self, name: &str, migrate: bool, unit: F) -> Result<T, ApiError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let handle = self.bridge.open(name).await?;
        let mut guard = CloseOnDrop {
            bridge: self.bridge.clone(),
            handle: Some(handle),
        };
        let session = Session {
            bridge: self.bridge.clone(),
            handle,
            name: Arc::from(name),
        };
        debug!(store = %name, handle = %handle, "Session opened");

        let result = self.run_unit(session, migrate, unit).await;
        guard.disarm();
        let closed = self.bridge.close(handle).await;
        debug!(store = %name, handle = %handle, "Session closed");

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                error!(store = %name, error = %close_err, "Failed to close session after error");
                Err(e)
            }
        }
    }

    async fn run_unit<T, F, Fut>(&self, session: Session, migrate: bool, unit: F) -> Result<T, ApiError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if migrate {
            let flag = std::mem::replace(&mut *self.migration.lock(), MigrationFlag::Done);
            if let MigrationFlag::Pending(migration) = flag {
                info!(store = %session.name(), "Running pending migration");
                migration(session.clone()).await.map_err(|e| match e {
                    ApiError::MigrationFailed(_) => e,
                    other => ApiError::MigrationFailed(other.to_string()),
                })?;
            }
        }
        unit(session).await
    }
}
