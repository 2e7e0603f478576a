//! Export and import of persisted stores through storage sessions.

use hearth::bridge::WorkerOptions;
use hearth::error::{ApiError, StorageError};
use hearth::lease::{LeaseProvider, LeaseState, LocalLeaseProvider};
use hearth::store::SledBackend;
use hearth::{MigrationFlag, StorageRuntime};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

async fn active_runtime(dir: &TempDir) -> StorageRuntime {
    let mut runtime = StorageRuntime::start_with(
        SledBackend::new(dir.path()),
        "tab",
        Arc::new(LocalLeaseProvider::new()) as Arc<dyn LeaseProvider>,
        WorkerOptions::default(),
        MigrationFlag::Done,
    );
    runtime.wait_for_lease(LeaseState::Held).await.unwrap();
    runtime
}

#[tokio::test]
async fn test_export_import_round_trip() {
    let dir = TempDir::new().unwrap();
    let runtime = active_runtime(&dir).await;
    let sessions = runtime.sessions();

    sessions
        .with_session("app.db", |s| async move {
            s.exec("PUT items ? ?", vec![json!("a"), json!({"n": 1})]).await?;
            s.exec("PUT items ? ?", vec![json!("b"), json!({"n": 2})]).await?;
            s.exec("PUT tags ? ?", vec![json!("t"), json!(true)]).await
        })
        .await
        .unwrap();

    let bytes = sessions.export("app.db").await.unwrap();
    assert_eq!(&bytes[..4], b"HRTH");

    sessions.import("copy.db", bytes).await.unwrap();
    let rows = sessions
        .with_session("copy.db", |s| async move {
            let mut rows = s.exec("SCAN items", Vec::new()).await?;
            rows.extend(s.exec("SCAN tags", Vec::new()).await?);
            Ok(rows)
        })
        .await
        .unwrap();

    let keys: Vec<_> = rows.iter().map(|r| r["key"].clone()).collect();
    assert_eq!(keys, vec![json!("a"), json!("b"), json!("t")]);
    assert_eq!(rows[1]["value"], json!({"n": 2}));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_import_replaces_existing_content() {
    let dir = TempDir::new().unwrap();
    let runtime = active_runtime(&dir).await;
    let sessions = runtime.sessions();

    sessions
        .with_session("source.db", |s| async move {
            s.exec("PUT items ? ?", vec![json!("kept"), json!(1)]).await
        })
        .await
        .unwrap();
    sessions
        .with_session("target.db", |s| async move {
            s.exec("PUT items ? ?", vec![json!("stale"), json!(0)]).await
        })
        .await
        .unwrap();

    let snapshot = dir.path().join("source.snapshot");
    let written = sessions.export_to_file("source.db", &snapshot).await.unwrap();
    let bytes = std::fs::read(&snapshot).unwrap();
    assert_eq!(bytes.len(), written);

    sessions.import("target.db", bytes).await.unwrap();
    let rows = sessions
        .with_session("target.db", |s| async move {
            s.exec("SCAN items", Vec::new()).await
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["key"], json!("kept"));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupted_snapshot_rejected() {
    let dir = TempDir::new().unwrap();
    let runtime = active_runtime(&dir).await;
    let sessions = runtime.sessions();

    sessions
        .with_session("app.db", |s| async move {
            s.exec("PUT items ? ?", vec![json!("a"), json!(1)]).await
        })
        .await
        .unwrap();
    let mut bytes = sessions.export("app.db").await.unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let result = sessions.import("copy.db", bytes).await;
    assert!(matches!(
        result,
        Err(ApiError::StorageError(StorageError::Snapshot(_)))
    ));

    runtime.shutdown().await.unwrap();
}
