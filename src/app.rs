//! Composition root: route table, storage worker and sessions for one
//! execution context.
//!
//! Handlers usually need the sessions, so storage is started first and the
//! route table is built around it:
//!
//! ```ignore
//! let storage = StorageRuntime::start(&config, MigrationFlag::Done);
//! let db = storage.sessions();
//! let routes = RouteTable::builder()
//!     .get("/items/:id", move |ctx: RequestContext| { /* use db */ })
//!     .build()?;
//! let app = App::new(&config.origin, routes, storage)?;
//! ```

use crate::bridge::{spawn_worker, WorkerHandle, WorkerOptions};
use crate::config::HearthConfig;
use crate::error::ApiError;
use crate::facade::LocalRequest;
use crate::lease::{provider_from_config, LeaseCoordinator, LeaseProvider, LeaseState};
use crate::router::RouteTable;
use crate::session::{MigrationFlag, StorageSessions};
use crate::store::{SledBackend, StorageBackend};
use std::sync::Arc;
use tracing::info;
use url::Url;

/// The storage side of a context: the worker task and the sessions that talk
/// to it.
pub struct StorageRuntime {
    sessions: Arc<StorageSessions>,
    worker: WorkerHandle,
}

impl StorageRuntime {
    /// Start a sled-backed worker with the configured lease provider.
    pub fn start(config: &HearthConfig, migration: MigrationFlag) -> Self {
        Self::start_with(
            SledBackend::new(&config.storage.data_dir),
            &config.lease.name,
            provider_from_config(&config.lease),
            WorkerOptions {
                acquire_on_start: config.lease.acquire_on_start,
            },
            migration,
        )
    }

    pub fn start_with<B: StorageBackend>(
        backend: B,
        lease_name: &str,
        provider: Arc<dyn LeaseProvider>,
        options: WorkerOptions,
        migration: MigrationFlag,
    ) -> Self {
        let coordinator = LeaseCoordinator::new(lease_name, provider);
        let (bridge, worker) = spawn_worker(backend, coordinator, options);
        Self {
            sessions: Arc::new(StorageSessions::new(bridge, migration)),
            worker,
        }
    }

    pub fn sessions(&self) -> Arc<StorageSessions> {
        Arc::clone(&self.sessions)
    }

    pub fn lease_state(&self) -> LeaseState {
        self.worker.lease_state()
    }

    pub async fn wait_for_lease(&mut self, state: LeaseState) -> Result<(), ApiError> {
        self.worker
            .wait_for_lease(state)
            .await
            .map_err(ApiError::from)
    }

    /// Pause the backend, release the lease and stop the worker.
    pub async fn shutdown(self) -> Result<(), ApiError> {
        let result = self.sessions.bridge().shutdown().await;
        self.worker.join().await;
        result.map_err(ApiError::from)
    }
}

pub struct App {
    routes: Arc<RouteTable>,
    origin: Url,
    storage: StorageRuntime,
}

impl App {
    pub fn new(origin: &str, routes: RouteTable, storage: StorageRuntime) -> Result<Self, ApiError> {
        let origin = Url::parse(origin)?;
        info!(origin = %origin, routes = routes.len(), "Application assembled");
        Ok(Self {
            routes: Arc::new(routes),
            origin,
            storage,
        })
    }

    /// A fresh request object, answered by this application's routes.
    pub fn request(&self) -> LocalRequest {
        LocalRequest::new(Arc::clone(&self.routes), self.origin.clone())
    }

    /// Open and send in one step.
    pub async fn fetch(
        &self,
        method: &str,
        url: &str,
        body: Option<&str>,
    ) -> Result<LocalRequest, ApiError> {
        let mut request = self.request();
        request.open(method, url)?;
        request.send(body).await?;
        Ok(request)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn sessions(&self) -> Arc<StorageSessions> {
        self.storage.sessions()
    }

    /// The context became active: take the storage lease.
    pub async fn activate(&self) -> Result<(), ApiError> {
        info!("Context activated");
        self.storage.sessions.arriving().await
    }

    /// The context went to the background: hand the storage lease back.
    pub async fn deactivate(&self) -> Result<(), ApiError> {
        info!("Context deactivated");
        self.storage.sessions.leaving().await
    }

    pub fn lease_state(&self) -> LeaseState {
        self.storage.lease_state()
    }

    pub async fn wait_for_lease(&mut self, state: LeaseState) -> Result<(), ApiError> {
        self.storage.wait_for_lease(state).await
    }

    pub async fn shutdown(self) -> Result<(), ApiError> {
        self.storage.shutdown().await
    }
}
