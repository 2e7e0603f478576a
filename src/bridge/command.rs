//! Commands carried from issuing contexts to the storage worker.

use crate::error::StorageError;
use crate::store::{Row, StorageHandle};
use serde_json::Value;
use tokio::sync::oneshot;

pub type ReplyTx<T> = oneshot::Sender<Result<T, StorageError>>;

/// Coordination marker emitted through a transient session on host
/// activation and deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Arriving,
    Leaving,
}

impl Marker {
    /// Statement form of the marker, executed on the session that carries it.
    pub fn as_statement(self) -> &'static str {
        match self {
            Marker::Arriving => "-- ARRIVING",
            Marker::Leaving => "-- LEAVING",
        }
    }
}

#[derive(Debug)]
pub enum WorkerCommand {
    Open {
        locator: String,
        reply: ReplyTx<StorageHandle>,
    },
    Exec {
        handle: StorageHandle,
        sql: String,
        params: Vec<Value>,
        reply: ReplyTx<Vec<Row>>,
    },
    Close {
        handle: StorageHandle,
        reply: ReplyTx<()>,
    },
    Export {
        handle: StorageHandle,
        reply: ReplyTx<Vec<u8>>,
    },
    Signal {
        handle: StorageHandle,
        marker: Marker,
        reply: ReplyTx<()>,
    },
    Pause {
        reply: ReplyTx<()>,
    },
    Resume {
        reply: ReplyTx<()>,
    },
    Import {
        name: String,
        bytes: Vec<u8>,
        reply: ReplyTx<()>,
    },
    Shutdown {
        reply: ReplyTx<()>,
    },
}

impl WorkerCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerCommand::Open { .. } => "open",
            WorkerCommand::Exec { .. } => "exec",
            WorkerCommand::Close { .. } => "close",
            WorkerCommand::Export { .. } => "export",
            WorkerCommand::Signal { .. } => "signal",
            WorkerCommand::Pause { .. } => "pause",
            WorkerCommand::Resume { .. } => "resume",
            WorkerCommand::Import { .. } => "import",
            WorkerCommand::Shutdown { .. } => "shutdown",
        }
    }
}
