//! Worker Bridge
//!
//! One-directional, ordered message channel from the contexts that issue
//! storage commands to the storage worker that owns the backend. Every command
//! is sent as soon as the bridge method is called (not when the returned reply
//! is first polled), so calls from one sender are delivered in call order.

pub mod command;
pub mod worker;

pub use command::{Marker, WorkerCommand};
pub use worker::{WorkerHandle, WorkerOptions};

use crate::error::StorageError;
use crate::lease::LeaseCoordinator;
use crate::store::{Row, StorageBackend, StorageHandle};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use worker::StorageWorker;

/// Reply to a command already sent to the storage worker
#[must_use = "the command is sent; await the reply to observe its result"]
pub enum PendingReply<T> {
    Sent(oneshot::Receiver<Result<T, StorageError>>),
    Undeliverable,
}

impl<T> Future for PendingReply<T> {
    type Output = Result<T, StorageError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            PendingReply::Sent(rx) => Pin::new(rx)
                .poll(cx)
                .map(|reply| reply.unwrap_or(Err(StorageError::WorkerUnavailable))),
            PendingReply::Undeliverable => Poll::Ready(Err(StorageError::WorkerUnavailable)),
        }
    }
}

#[derive(Clone)]
pub struct WorkerBridge {
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerBridge {
    fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StorageError>>) -> WorkerCommand,
    ) -> PendingReply<T> {
        let (reply, rx) = oneshot::channel();
        match self.tx.send(build(reply)) {
            Ok(()) => PendingReply::Sent(rx),
            Err(_) => PendingReply::Undeliverable,
        }
    }

    pub fn open(&self, locator: impl Into<String>) -> PendingReply<StorageHandle> {
        let locator = locator.into();
        self.send(|reply| WorkerCommand::Open { locator, reply })
    }

    pub fn exec(
        &self,
        handle: StorageHandle,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> PendingReply<Vec<Row>> {
        let sql = sql.into();
        self.send(|reply| WorkerCommand::Exec {
            handle,
            sql,
            params,
            reply,
        })
    }

    pub fn close(&self, handle: StorageHandle) -> PendingReply<()> {
        self.send(|reply| WorkerCommand::Close { handle, reply })
    }

    pub fn export(&self, handle: StorageHandle) -> PendingReply<Vec<u8>> {
        self.send(|reply| WorkerCommand::Export { handle, reply })
    }

    /// Emit a coordination marker through an open session.
    pub fn signal(&self, handle: StorageHandle, marker: Marker) -> PendingReply<()> {
        self.send(|reply| WorkerCommand::Signal {
            handle,
            marker,
            reply,
        })
    }

    /// Pause the backend and release the storage lease.
    pub fn pause(&self) -> PendingReply<()> {
        self.send(|reply| WorkerCommand::Pause { reply })
    }

    /// Acquire the storage lease and resume the backend.
    pub fn resume(&self) -> PendingReply<()> {
        self.send(|reply| WorkerCommand::Resume { reply })
    }

    pub fn import(&self, name: impl Into<String>, bytes: Vec<u8>) -> PendingReply<()> {
        let name = name.into();
        self.send(|reply| WorkerCommand::Import { name, bytes, reply })
    }

    /// Pause, release the lease and stop the worker after earlier commands.
    pub fn shutdown(&self) -> PendingReply<()> {
        self.send(|reply| WorkerCommand::Shutdown { reply })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn a storage worker owning `backend` and return the bridge to it.
pub fn spawn_worker<B: StorageBackend>(
    backend: B,
    coordinator: LeaseCoordinator,
    options: WorkerOptions,
) -> (WorkerBridge, WorkerHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let lease = coordinator.subscribe();
    let worker = StorageWorker::new(backend, coordinator, rx, options);
    let join = tokio::spawn(worker.run());
    (WorkerBridge { tx }, WorkerHandle::new(lease, join))
}
