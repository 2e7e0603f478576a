//! Lease coordinator: ties lease ownership to backend pause/resume.
//!
//! ```text
//! NotHeld --activate--> Acquiring --granted--> Held      (then resume)
//! Held --deactivate--> Releasing --paused--> NotHeld     (pause, then release)
//! ```
//!
//! The backend is paused before the lease is released, so there is never a
//! window in which two contexts both see a live backend.

use crate::error::StorageError;
use crate::lease::{LeaseGuard, LeaseProvider, LeaseState};
use crate::store::StorageBackend;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct LeaseCoordinator {
    name: String,
    provider: Arc<dyn LeaseProvider>,
    guard: Option<LeaseGuard>,
    state: watch::Sender<LeaseState>,
}

impl LeaseCoordinator {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LeaseProvider>) -> Self {
        let (state, _) = watch::channel(LeaseState::NotHeld);
        Self {
            name: name.into(),
            provider,
            guard: None,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LeaseState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
        self.state.subscribe()
    }

    fn transition(&self, next: LeaseState) {
        let previous = self.state.send_replace(next);
        debug!(lease = %self.name, from = %previous, to = %next, "Lease transition");
    }

    /// Acquire the lease (suspending until granted) and resume the backend.
    ///
    /// A no-op when the lease is already held.
    pub async fn activate<B>(&mut self, backend: &mut B) -> Result<(), StorageError>
    where
        B: StorageBackend + ?Sized,
    {
        if self.guard.is_some() {
            debug!(lease = %self.name, "Activation while holding lease; nothing to do");
            return Ok(());
        }

        self.transition(LeaseState::Acquiring);
        let guard = match self.provider.acquire(&self.name).await {
            Ok(guard) => guard,
            Err(e) => {
                self.transition(LeaseState::NotHeld);
                return Err(e);
            }
        };

        if let Err(e) = backend.resume() {
            warn!(lease = %self.name, error = %e, "Backend refused to resume; releasing lease");
            drop(guard);
            self.transition(LeaseState::NotHeld);
            return Err(e);
        }

        info!(lease = %self.name, holder = %guard.holder(), "Lease held; backend resumed");
        self.guard = Some(guard);
        self.transition(LeaseState::Held);
        Ok(())
    }

    /// Pause the backend, then release the lease.
    ///
    /// A no-op when the lease is not held. If the backend refuses to pause the
    /// lease is kept and the error returned.
    pub fn deactivate<B>(&mut self, backend: &mut B) -> Result<(), StorageError>
    where
        B: StorageBackend + ?Sized,
    {
        let guard = match self.guard.take() {
            Some(guard) => guard,
            None => {
                debug!(lease = %self.name, "Deactivation without lease; nothing to do");
                return Ok(());
            }
        };

        self.transition(LeaseState::Releasing);
        if let Err(e) = backend.pause() {
            match &e {
                StorageError::Busy(_) => {
                    debug!(lease = %self.name, error = %e, "Backend busy; keeping lease")
                }
                _ => warn!(lease = %self.name, error = %e, "Backend refused to pause; keeping lease"),
            }
            self.guard = Some(guard);
            self.transition(LeaseState::Held);
            return Err(e);
        }

        guard.release();
        self.transition(LeaseState::NotHeld);
        info!(lease = %self.name, "Backend paused; lease released");
        Ok(())
    }
}
