//! Merge rules: defaults first, every later source overrides earlier keys.

use crate::config::{
    default_data_dir, default_lease_dir, default_lease_name, default_origin, DEFAULT_HEARTBEAT_MS,
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_TTL_MS,
};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("origin", default_origin())?
        .set_default(
            "storage.data_dir",
            default_data_dir().to_string_lossy().into_owned(),
        )?
        .set_default("lease.name", default_lease_name())?
        .set_default("lease.backend", "local")?
        .set_default("lease.dir", default_lease_dir().to_string_lossy().into_owned())?
        .set_default("lease.ttl_ms", DEFAULT_TTL_MS)?
        .set_default("lease.heartbeat_ms", DEFAULT_HEARTBEAT_MS)?
        .set_default("lease.initial_backoff_ms", DEFAULT_INITIAL_BACKOFF_MS)?
        .set_default("lease.max_backoff_ms", DEFAULT_MAX_BACKOFF_MS)?
        .set_default("lease.acquire_on_start", true)
}

/// `HEARTH__LEASE__TTL_MS=900` overrides `lease.ttl_ms`.
pub fn environment() -> Environment {
    Environment::with_prefix("HEARTH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
