//! File-backed lease provider for contexts living in separate processes.
//!
//! A lease is the file `<dir>/<name>.lease`, created with `create_new` and
//! holding the holder id plus an expiry. The holder renews the expiry from a
//! heartbeat task; a holder that dies stops renewing and its lease becomes
//! stale once the expiry passes. Stale leases are taken over under a
//! `<name>.takeover` marker so that only one contender removes a given stale
//! file. Acquisition retries with exponential backoff.

use crate::config::LeaseConfig;
use crate::error::StorageError;
use crate::lease::{LeaseGuard, LeaseProvider, LeaseStatus};
use crate::store::validate_store_name;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    expires_at_ms: i64,
}

impl LeaseRecord {
    fn new(holder: &str, ttl: Duration) -> Self {
        Self {
            holder: holder.to_string(),
            expires_at_ms: Utc::now().timestamp_millis() + ttl.as_millis() as i64,
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() > self.expires_at_ms
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires_at_ms).single()
    }
}

enum Claim {
    Claimed,
    /// Someone holds the file; `None` when its content is not readable yet
    Held(Option<LeaseRecord>),
}

#[derive(Debug, Clone)]
pub struct FileLeaseProvider {
    dir: PathBuf,
    holder_id: String,
    ttl: Duration,
    heartbeat: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl FileLeaseProvider {
    pub fn new<P: AsRef<Path>>(dir: P, ttl: Duration, heartbeat: Duration) -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self {
            dir: dir.as_ref().to_path_buf(),
            holder_id: format!("{}-{:x}", std::process::id(), nanos),
            ttl,
            heartbeat,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(1_000),
        }
    }

    pub fn from_config(config: &LeaseConfig) -> Self {
        let mut provider = Self::new(
            &config.dir,
            Duration::from_millis(config.ttl_ms),
            Duration::from_millis(config.heartbeat_ms),
        );
        provider.initial_backoff = Duration::from_millis(config.initial_backoff_ms);
        provider.max_backoff = Duration::from_millis(config.max_backoff_ms);
        provider
    }

    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    fn lease_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_store_name(name).map_err(|_| {
            StorageError::Lease(format!("invalid lease name '{}'", name))
        })?;
        Ok(self.dir.join(format!("{}.lease", name)))
    }

    fn try_claim(&self, path: &Path) -> Result<Claim, StorageError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let record = LeaseRecord::new(&self.holder_id, self.ttl);
                file.write_all(&encode(&record)?)?;
                file.sync_all()?;
                Ok(Claim::Claimed)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(Claim::Held(read_record(path))),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a stale lease file. `stale` is the record seen when the lease
    /// was judged stale, `None` for a file whose content never became
    /// readable. Returns true when the caller should retry claiming
    /// immediately.
    fn take_over_stale(
        &self,
        path: &Path,
        stale: Option<&LeaseRecord>,
    ) -> Result<bool, StorageError> {
        let marker = path.with_extension("takeover");
        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // a contender that died mid-takeover leaves its marker behind
                if file_is_stale(&marker, self.ttl) {
                    warn!(marker = %marker.display(), "Removing abandoned takeover marker");
                    let _ = std::fs::remove_file(&marker);
                }
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        let unchanged = match (read_record(path), stale) {
            (Some(current), Some(stale)) => current == *stale,
            // a holder that died between creating the file and writing it
            (None, None) => file_is_stale(path, self.ttl),
            _ => false,
        };
        let result = if unchanged {
            warn!(
                lease = %path.display(),
                stale_holder = stale.map(|r| r.holder.as_str()).unwrap_or("<unreadable>"),
                "Taking over expired lease"
            );
            match std::fs::remove_file(path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
                Err(e) => Err(e.into()),
            }
        } else {
            // renewed or replaced since we looked, unless it is gone
            Ok(!path.exists())
        };
        let _ = std::fs::remove_file(&marker);
        result
    }

    fn spawn_heartbeat(&self, path: PathBuf) -> JoinHandle<()> {
        let holder = self.holder_id.clone();
        let ttl = self.ttl;
        let interval = self.heartbeat;
        tokio::spawn(async move {
            let mut deadline = LeaseRecord::new(&holder, ttl);
            loop {
                tokio::time::sleep(interval).await;
                if deadline.is_expired() {
                    error!(lease = %path.display(), "Lease expired before it could be renewed");
                    break;
                }
                match renew(&path, &holder, ttl) {
                    Ok(Some(record)) => deadline = record,
                    Ok(None) => {
                        error!(lease = %path.display(), holder = %holder, "Lease lost to another holder");
                        break;
                    }
                    Err(e) => warn!(lease = %path.display(), error = %e, "Failed to renew lease"),
                }
            }
        })
    }
}

#[async_trait]
impl LeaseProvider for FileLeaseProvider {
    async fn acquire(&self, name: &str) -> Result<LeaseGuard, StorageError> {
        let path = self.lease_path(name)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut backoff = self.initial_backoff;
        loop {
            match self.try_claim(&path)? {
                Claim::Claimed => break,
                Claim::Held(Some(record)) if record.is_expired() => {
                    if self.take_over_stale(&path, Some(&record))? {
                        continue;
                    }
                }
                Claim::Held(None) if file_is_stale(&path, self.ttl) => {
                    if self.take_over_stale(&path, None)? {
                        continue;
                    }
                }
                Claim::Held(_) => {}
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }

        debug!(lease = %name, holder = %self.holder_id, "Granted file lease");
        let heartbeat = self.spawn_heartbeat(path.clone());
        let release = FileLeaseRelease {
            path,
            holder: self.holder_id.clone(),
            heartbeat,
        };
        Ok(LeaseGuard::new(name, self.holder_id.clone(), Box::new(release)))
    }

    fn status(&self, name: &str) -> Result<LeaseStatus, StorageError> {
        let path = self.lease_path(name)?;
        if !path.exists() {
            return Ok(LeaseStatus::Free);
        }
        Ok(match read_record(&path) {
            Some(record) if record.is_expired() => LeaseStatus::Free,
            Some(record) => LeaseStatus::Held {
                expires_at: record.expires_at(),
                holder: Some(record.holder),
            },
            None if file_is_stale(&path, self.ttl) => LeaseStatus::Free,
            None => LeaseStatus::Held {
                holder: None,
                expires_at: None,
            },
        })
    }
}

struct FileLeaseRelease {
    path: PathBuf,
    holder: String,
    heartbeat: JoinHandle<()>,
}

impl Drop for FileLeaseRelease {
    fn drop(&mut self) {
        self.heartbeat.abort();
        match read_record(&self.path) {
            Some(record) if record.holder == self.holder => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!(lease = %self.path.display(), error = %e, "Failed to remove lease file");
                }
            }
            _ => debug!(lease = %self.path.display(), "Lease file no longer ours; nothing to remove"),
        }
    }
}

fn encode(record: &LeaseRecord) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(record)
        .map_err(|e| StorageError::Lease(format!("Failed to encode lease record: {}", e)))
}

fn read_record(path: &Path) -> Option<LeaseRecord> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Rewrite the lease with a fresh expiry if it still belongs to `holder`.
fn renew(path: &Path, holder: &str, ttl: Duration) -> Result<Option<LeaseRecord>, StorageError> {
    match read_record(path) {
        Some(current) if current.holder == holder => {}
        _ => return Ok(None),
    }
    let record = LeaseRecord::new(holder, ttl);
    let tmp = path.with_extension(format!("renew-{}", holder));
    std::fs::write(&tmp, encode(&record)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(Some(record))
}

/// True when `path` exists and was last written more than `ttl` ago.
fn file_is_stale(path: &Path, ttl: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > ttl)
        .unwrap_or(false)
}
