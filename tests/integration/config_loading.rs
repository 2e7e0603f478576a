//! Layered configuration loading.

use hearth::config::{ConfigLoader, LeaseBackend};
use hearth::ApiError;
use parking_lot::Mutex;
use std::path::PathBuf;
use tempfile::TempDir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn workspace_with(files: &[(&str, &str)]) -> TempDir {
    let workspace = TempDir::new().unwrap();
    let config_dir = workspace.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    for (name, content) in files {
        std::fs::write(config_dir.join(name), content).unwrap();
    }
    workspace
}

#[test]
fn test_environment_file_overrides_base_file() {
    let _guard = ENV_MUTEX.lock();
    let workspace = workspace_with(&[
        ("config.toml", "[lease]\nname = \"base\"\nttl_ms = 8000\n"),
        ("staging.toml", "[lease]\nname = \"staging\"\n"),
    ]);

    std::env::set_var("HEARTH_ENV", "staging");
    let config = ConfigLoader::load(workspace.path());
    std::env::remove_var("HEARTH_ENV");

    let config = config.unwrap();
    assert_eq!(config.lease.name, "staging");
    assert_eq!(config.lease.ttl_ms, 8000);
}

#[test]
fn test_environment_variables_override_files() {
    let _guard = ENV_MUTEX.lock();
    let workspace = workspace_with(&[(
        "config.toml",
        "[lease]\nbackend = \"local\"\n[storage]\ndata_dir = \"/from/file\"\n",
    )]);

    std::env::set_var("HEARTH__LEASE__BACKEND", "file");
    std::env::set_var("HEARTH__STORAGE__DATA_DIR", "/from/env");
    let config = ConfigLoader::load(workspace.path());
    std::env::remove_var("HEARTH__LEASE__BACKEND");
    std::env::remove_var("HEARTH__STORAGE__DATA_DIR");

    let config = config.unwrap();
    assert_eq!(config.lease.backend, LeaseBackend::File);
    assert_eq!(config.storage.data_dir, PathBuf::from("/from/env"));
}

#[test]
fn test_invalid_workspace_config_reported() {
    let _guard = ENV_MUTEX.lock();
    let workspace = workspace_with(&[("config.toml", "origin = \"not a url\"\n")]);

    match ConfigLoader::load(workspace.path()) {
        Err(ApiError::ConfigError(message)) => assert!(message.contains("Origin")),
        other => panic!("expected a validation error, got {:?}", other.map(|c| c.origin)),
    }
}
