//! Config loading: merges every source and deserializes the result.

use crate::config::merge::merge_policy;
use crate::config::sources::global_file;
use crate::config::HearthConfig;
use crate::error::ApiError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence, lowest first: defaults, global file, `config/config.toml`,
    /// `config/{HEARTH_ENV}.toml`, `HEARTH__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<HearthConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let mut builder = global_file::add_to_builder(builder)?;
        for path in workspace_files(workspace_root) {
            debug!(config_path = %path.display(), "Adding workspace configuration");
            builder = builder.add_source(File::from(path).required(false));
        }
        let builder = builder.add_source(merge_policy::environment());

        let config: HearthConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Self::checked(config)
    }

    /// Load an explicit file on top of the defaults. Environment overrides
    /// still apply.
    pub fn load_from_file(path: &Path) -> Result<HearthConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config: HearthConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(merge_policy::environment())
            .build()?
            .try_deserialize()?;
        Self::checked(config)
    }

    /// Built-in defaults only.
    pub fn default() -> HearthConfig {
        HearthConfig::default()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn checked(config: HearthConfig) -> Result<HearthConfig, ApiError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }
}

/// Existing workspace files, base first: `config/config.toml`, then the
/// file named after `HEARTH_ENV` (`development` when unset).
fn workspace_files(workspace_root: &Path) -> Vec<PathBuf> {
    let env_name = std::env::var("HEARTH_ENV")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "development".to_string());
    let dir = workspace_root.join("config");
    [dir.join("config.toml"), dir.join(format!("{}.toml", env_name))]
        .into_iter()
        .filter(|path| path.is_file())
        .collect()
}
