//! CLI route: run context and command dispatch.
//!
//! Every command runs as its own short-lived context: it starts a storage
//! worker, takes the lease, does its work in a session and hands the lease
//! back. The CLI always contends through lease files, since the process it
//! shares stores with is never this one.

use crate::app::StorageRuntime;
use crate::bridge::WorkerOptions;
use crate::cli::output::{format_lease_status, format_rows};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, HearthConfig};
use crate::error::{ApiError, StorageError};
use crate::lease::{FileLeaseProvider, LeaseProvider};
use crate::session::{MigrationFlag, StorageSessions};
use crate::store::{SledBackend, Snapshot};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runtime context for CLI execution. Built from workspace path and optional
/// config path using ConfigLoader only.
pub struct RunContext {
    config: HearthConfig,
    workspace_root: PathBuf,
    provider: Arc<FileLeaseProvider>,
}

impl RunContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self::with_config(workspace_root, config))
    }

    pub fn with_config(workspace_root: PathBuf, config: HearthConfig) -> Self {
        let provider = Arc::new(FileLeaseProvider::from_config(&config.lease));
        Self {
            config,
            workspace_root,
            provider,
        }
    }

    pub fn config(&self) -> &HearthConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = match command {
            Commands::Exec {
                store,
                statement,
                params,
            } => {
                let params: Vec<Value> = params.iter().map(String::as_str).map(parse_param).collect();
                let statement = statement.clone();
                let store = store.clone();
                self.with_lease(|sessions| async move {
                    let rows = sessions
                        .with_session(&store, |session| async move {
                            session.exec(&statement, params).await
                        })
                        .await?;
                    Ok(format_rows(&rows))
                })
                .await
            }
            Commands::Export { store, out } => {
                let store = store.clone();
                let out = out.clone();
                self.with_lease(|sessions| async move {
                    let written = sessions.export_to_file(&store, &out).await?;
                    Ok(format!(
                        "Exported '{}' to {} ({} bytes)",
                        store,
                        out.display(),
                        written
                    ))
                })
                .await
            }
            Commands::Import { store, file } => {
                let bytes = std::fs::read(file).map_err(StorageError::from)?;
                let store = store.clone();
                let file = file.clone();
                let checksum = Snapshot::checksum_hex(&bytes).ok_or_else(|| {
                    StorageError::Snapshot(format!("{} is not a hearth snapshot", file.display()))
                })?;
                self.with_lease(|sessions| async move {
                    let size = bytes.len();
                    sessions.import(&store, bytes).await?;
                    Ok(format!(
                        "Imported {} ({} bytes, blake3 {}) into '{}'",
                        file.display(),
                        size,
                        &checksum[..12],
                        store
                    ))
                })
                .await
            }
            Commands::LeaseStatus => {
                let name = &self.config.lease.name;
                let status = self.provider.status(name)?;
                Ok(format_lease_status(name, &status))
            }
        };

        info!(
            command = command.name(),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    /// Run `work` while this process holds the storage lease.
    async fn with_lease<F, Fut>(&self, work: F) -> Result<String, ApiError>
    where
        F: FnOnce(Arc<StorageSessions>) -> Fut,
        Fut: Future<Output = Result<String, ApiError>>,
    {
        let storage = StorageRuntime::start_with(
            SledBackend::new(&self.config.storage.data_dir),
            &self.config.lease.name,
            Arc::clone(&self.provider) as Arc<dyn LeaseProvider>,
            WorkerOptions {
                acquire_on_start: false,
            },
            MigrationFlag::Done,
        );
        let sessions = storage.sessions();

        debug!(lease = %self.config.lease.name, "Waiting for storage lease");
        let result = match sessions.arriving().await {
            Ok(()) => work(Arc::clone(&sessions)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sessions.leaving().await {
            warn!(error = %e, "Failed to hand back the storage lease");
        }
        drop(sessions);
        storage.shutdown().await?;
        result
    }
}

fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
