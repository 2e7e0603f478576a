//! The storage worker: the only task that ever touches the backend.
//!
//! Commands are read one at a time and each is handled to completion before
//! the next is read, lease acquisition included. That is what keeps a pause
//! ordered before any later resume.
//!
//! A deactivation that arrives while persisted stores are still open is not
//! refused. The worker starts draining: new persisted stores and imports are
//! turned away, and the backend is paused and the lease released as soon as
//! the last open store closes. An activation while draining cancels it.

use crate::bridge::command::{Marker, WorkerCommand};
use crate::error::StorageError;
use crate::lease::{LeaseCoordinator, LeaseState};
use crate::store::{StorageBackend, StorageHandle, MEMORY_LOCATOR};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Acquire the storage lease before reading the first command
    pub acquire_on_start: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            acquire_on_start: true,
        }
    }
}

pub(crate) struct StorageWorker<B: StorageBackend> {
    backend: B,
    coordinator: LeaseCoordinator,
    rx: mpsc::UnboundedReceiver<WorkerCommand>,
    options: WorkerOptions,
    /// A deactivation is waiting for open stores to close
    draining: bool,
}

impl<B: StorageBackend> StorageWorker<B> {
    pub(crate) fn new(
        backend: B,
        coordinator: LeaseCoordinator,
        rx: mpsc::UnboundedReceiver<WorkerCommand>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            backend,
            coordinator,
            rx,
            options,
            draining: false,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(lease = %self.coordinator.name(), "Storage worker started");
        if self.options.acquire_on_start {
            if let Err(e) = self.coordinator.activate(&mut self.backend).await {
                error!(error = %e, "Failed to acquire storage lease on start");
            }
        }

        while let Some(command) = self.rx.recv().await {
            if !self.handle(command).await {
                break;
            }
        }

        if let Err(e) = self.coordinator.deactivate(&mut self.backend) {
            warn!(error = %e, "Storage worker stopped without pausing the backend");
        }
        info!(lease = %self.coordinator.name(), "Storage worker stopped");
    }

    /// Handle one command. Returns false once the worker should stop.
    async fn handle(&mut self, command: WorkerCommand) -> bool {
        debug!(command = command.kind(), "Handling storage command");
        match command {
            WorkerCommand::Open { locator, reply } => {
                let result = if self.draining && locator != MEMORY_LOCATOR {
                    Err(StorageError::Releasing)
                } else {
                    self.backend.open(&locator)
                };
                if let Err(Ok(handle)) = reply.send(result) {
                    // nobody is left to close it
                    debug!(handle = %handle, "Open reply dropped; closing handle");
                    let _ = self.backend.close(handle);
                    self.finish_draining();
                }
            }
            WorkerCommand::Exec {
                handle,
                sql,
                params,
                reply,
            } => {
                let _ = reply.send(self.backend.exec(handle, &sql, &params));
            }
            WorkerCommand::Close { handle, reply } => {
                let _ = reply.send(self.backend.close(handle));
                self.finish_draining();
            }
            WorkerCommand::Export { handle, reply } => {
                let _ = reply.send(self.backend.export(handle));
            }
            WorkerCommand::Signal {
                handle,
                marker,
                reply,
            } => {
                let result = self.signal(handle, marker).await;
                let _ = reply.send(result);
            }
            WorkerCommand::Pause { reply } => {
                let _ = reply.send(self.request_deactivation());
            }
            WorkerCommand::Resume { reply } => {
                let _ = reply.send(self.activate().await);
            }
            WorkerCommand::Import { name, bytes, reply } => {
                let result = if self.draining {
                    Err(StorageError::Releasing)
                } else {
                    self.backend.import(&name, &bytes)
                };
                let _ = reply.send(result);
            }
            WorkerCommand::Shutdown { reply } => {
                let _ = reply.send(self.coordinator.deactivate(&mut self.backend));
                return false;
            }
        }
        true
    }

    async fn signal(&mut self, handle: StorageHandle, marker: Marker) -> Result<(), StorageError> {
        // the marker travels on an open session; an invalid handle fails here
        self.backend.exec(handle, marker.as_statement(), &[])?;
        match marker {
            Marker::Arriving => self.activate().await,
            Marker::Leaving => self.request_deactivation(),
        }
    }

    async fn activate(&mut self) -> Result<(), StorageError> {
        if self.draining {
            info!(lease = %self.coordinator.name(), "Reactivated while draining; keeping lease");
            self.draining = false;
        }
        self.coordinator.activate(&mut self.backend).await
    }

    /// Deactivate now, or once the stores still open have closed.
    fn request_deactivation(&mut self) -> Result<(), StorageError> {
        match self.coordinator.deactivate(&mut self.backend) {
            Err(StorageError::Busy(reason)) => {
                info!(
                    lease = %self.coordinator.name(),
                    reason = %reason,
                    "Deactivation deferred until open stores close"
                );
                self.draining = true;
                Ok(())
            }
            other => {
                self.draining = false;
                other
            }
        }
    }

    fn finish_draining(&mut self) {
        if !self.draining {
            return;
        }
        match self.coordinator.deactivate(&mut self.backend) {
            Ok(()) => {
                self.draining = false;
                info!(lease = %self.coordinator.name(), "Deferred deactivation completed");
            }
            Err(StorageError::Busy(_)) => {}
            Err(e) => {
                self.draining = false;
                warn!(error = %e, "Deferred deactivation failed");
            }
        }
    }
}

/// Owner-side handle on a spawned storage worker
pub struct WorkerHandle {
    lease: watch::Receiver<LeaseState>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(lease: watch::Receiver<LeaseState>, join: JoinHandle<()>) -> Self {
        Self { lease, join }
    }

    pub fn lease_state(&self) -> LeaseState {
        *self.lease.borrow()
    }

    pub fn lease_changes(&self) -> watch::Receiver<LeaseState> {
        self.lease.clone()
    }

    /// Wait until the worker's lease reaches `state`.
    pub async fn wait_for_lease(&mut self, state: LeaseState) -> Result<(), StorageError> {
        self.lease
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| StorageError::WorkerUnavailable)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Kill the worker without a graceful pause. The lease is released with
    /// the worker's state.
    pub fn abort(&self) {
        self.join.abort();
    }

    pub async fn join(self) {
        if let Err(e) = self.join.await {
            if !e.is_cancelled() {
                error!(error = %e, "Storage worker panicked");
            }
        }
    }
}
