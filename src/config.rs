//! Configuration System
//!
//! Layered configuration: built-in defaults, a global user file, workspace
//! files and `HEARTH__*` environment overrides, validated after merging.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearthConfig {
    /// Origin that relative request URLs resolve against
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub lease: LeaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one sled database per named store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseBackend {
    /// In-process registry; contexts must share one provider instance
    Local,
    /// Lease files on disk; works across processes
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    #[serde(default = "default_lease_name")]
    pub name: String,

    #[serde(default = "default_lease_backend")]
    pub backend: LeaseBackend,

    /// Lease file directory (file backend)
    #[serde(default = "default_lease_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Acquire the lease as soon as the storage worker starts
    #[serde(default = "default_true")]
    pub acquire_on_start: bool,
}

pub(crate) fn default_origin() -> String {
    "http://localhost/".to_string()
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "hearth")
}

pub(crate) fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("stores"))
        .unwrap_or_else(|| PathBuf::from(".hearth/stores"))
}

pub(crate) fn default_lease_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("leases"))
        .unwrap_or_else(|| PathBuf::from(".hearth/leases"))
}

pub(crate) fn default_lease_name() -> String {
    "tab".to_string()
}

fn default_lease_backend() -> LeaseBackend {
    LeaseBackend::Local
}

pub(crate) const DEFAULT_TTL_MS: u64 = 5_000;
pub(crate) const DEFAULT_HEARTBEAT_MS: u64 = 1_000;
pub(crate) const DEFAULT_INITIAL_BACKOFF_MS: u64 = 10;
pub(crate) const DEFAULT_MAX_BACKOFF_MS: u64 = 1_000;

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

fn default_heartbeat_ms() -> u64 {
    DEFAULT_HEARTBEAT_MS
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_true() -> bool {
    true
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            storage: StorageConfig::default(),
            lease: LeaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            name: default_lease_name(),
            backend: default_lease_backend(),
            dir: default_lease_dir(),
            ttl_ms: DEFAULT_TTL_MS,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            acquire_on_start: true,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Origin(String),
    Storage(String),
    Lease(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Origin(msg) => write!(f, "Origin: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Lease(msg) => write!(f, "Lease: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl LeaseConfig {
    pub fn validate(&self) -> Result<(), String> {
        if crate::store::validate_store_name(&self.name).is_err() {
            return Err(format!("invalid lease name '{}'", self.name));
        }
        if self.heartbeat_ms == 0 || self.heartbeat_ms >= self.ttl_ms {
            return Err(format!(
                "heartbeat_ms ({}) must be non-zero and shorter than ttl_ms ({})",
                self.heartbeat_ms, self.ttl_ms
            ));
        }
        if self.initial_backoff_ms == 0 || self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "initial_backoff_ms ({}) must be non-zero and at most max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        if self.backend == LeaseBackend::File && self.dir.as_os_str().is_empty() {
            return Err("file leases need a directory".to_string());
        }
        Ok(())
    }
}

impl HearthConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.origin) {
            Ok(url) if url.cannot_be_a_base() => errors.push(ValidationError::Origin(format!(
                "'{}' cannot be used as a base URL",
                self.origin
            ))),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::Origin(format!("'{}': {}", self.origin, e))),
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "data_dir cannot be empty".to_string(),
            ));
        }

        if let Err(e) = self.lease.validate() {
            errors.push(ValidationError::Lease(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HearthConfig::default();
        assert_eq!(config.origin, "http://localhost/");
        assert_eq!(config.lease.name, "tab");
        assert_eq!(config.lease.backend, LeaseBackend::Local);
        assert!(config.lease.acquire_on_start);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = HearthConfig::default();
        config.origin = "mailto:someone@example.com".to_string();
        config.storage.data_dir = PathBuf::new();
        config.lease.heartbeat_ms = config.lease.ttl_ms;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::Origin(_)));
        assert!(matches!(errors[1], ValidationError::Storage(_)));
        assert!(matches!(errors[2], ValidationError::Lease(_)));
    }

    #[test]
    fn test_lease_backoff_bounds() {
        let mut lease = LeaseConfig::default();
        lease.initial_backoff_ms = 2_000;
        assert!(lease.validate().is_err());

        lease.initial_backoff_ms = 5;
        lease.name = "../escape".to_string();
        assert!(lease.validate().is_err());
    }

    #[test]
    fn test_backend_deserializes_lowercase() {
        let lease: LeaseConfig = toml::from_str("backend = \"file\"\nttl_ms = 900").unwrap();
        assert_eq!(lease.backend, LeaseBackend::File);
        assert_eq!(lease.ttl_ms, 900);
        assert_eq!(lease.heartbeat_ms, DEFAULT_HEARTBEAT_MS);
    }
}
