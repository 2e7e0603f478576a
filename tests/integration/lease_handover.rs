//! Lease handover between contexts sharing one lease provider.

use crate::integration::test_utils::{RecordingBackend, ResumeTracker};
use hearth::bridge::{spawn_worker, WorkerOptions};
use hearth::error::{ApiError, StorageError};
use hearth::lease::{LeaseCoordinator, LeaseProvider, LeaseState, LocalLeaseProvider};
use hearth::session::MigrationFlag;
use hearth::StorageRuntime;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

fn context(
    dir: &TempDir,
    label: &'static str,
    tracker: &Arc<ResumeTracker>,
    provider: &Arc<LocalLeaseProvider>,
    acquire_on_start: bool,
    pause_delay: Duration,
) -> StorageRuntime {
    StorageRuntime::start_with(
        RecordingBackend::new(&dir.path().join(label), label, Arc::clone(tracker))
            .with_pause_delay(pause_delay),
        "tab",
        Arc::clone(provider) as Arc<dyn LeaseProvider>,
        WorkerOptions { acquire_on_start },
        MigrationFlag::Done,
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn test_second_context_waits_until_first_leaves() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());

    let mut a = context(&dir, "a", &tracker, &provider, true, Duration::ZERO);
    let mut b = context(&dir, "b", &tracker, &provider, false, Duration::ZERO);
    a.wait_for_lease(LeaseState::Held).await.unwrap();

    let b_sessions = b.sessions();
    let arriving = tokio::spawn(async move { b_sessions.arriving().await });
    settle().await;
    assert_eq!(b.lease_state(), LeaseState::Acquiring);
    assert!(!arriving.is_finished());

    a.sessions().leaving().await.unwrap();
    arriving.await.unwrap().unwrap();
    b.wait_for_lease(LeaseState::Held).await.unwrap();
    assert_eq!(a.lease_state(), LeaseState::NotHeld);

    assert_eq!(tracker.events(), vec!["a resume", "a pause", "b resume"]);
    assert_eq!(tracker.max_active(), 1);

    b.shutdown().await.unwrap();
    a.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_contexts_never_resumed_concurrently() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());
    let contexts: Vec<StorageRuntime> = ["a", "b", "c"]
        .into_iter()
        .map(|label| context(&dir, label, &tracker, &provider, false, Duration::from_millis(2)))
        .collect();

    let mut tasks = Vec::new();
    for runtime in &contexts {
        let sessions = runtime.sessions();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                sessions.arriving().await.unwrap();
                sessions
                    .with_session("shared.db", |s| async move {
                        s.exec("PUT counters ? ?", vec!["n".into(), 1.into()]).await
                    })
                    .await
                    .unwrap();
                sessions.leaving().await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(tracker.max_active(), 1);
    assert_eq!(tracker.events().len(), 30);
    for runtime in contexts {
        runtime.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_pause_before_resume_from_one_sender() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());
    let mut a = context(&dir, "a", &tracker, &provider, true, Duration::from_millis(50));
    a.wait_for_lease(LeaseState::Held).await.unwrap();

    let sessions = a.sessions();
    let bridge = sessions.bridge();
    // both commands are on the channel before either reply is awaited
    let pause = bridge.pause();
    let resume = bridge.resume();
    resume.await.unwrap();
    pause.await.unwrap();

    assert_eq!(tracker.events(), vec!["a resume", "a pause", "a resume"]);
    assert_eq!(a.lease_state(), LeaseState::Held);
    a.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handover_waits_for_slow_pause() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());
    let mut a = context(&dir, "a", &tracker, &provider, true, Duration::from_millis(80));
    let mut b = context(&dir, "b", &tracker, &provider, false, Duration::ZERO);
    a.wait_for_lease(LeaseState::Held).await.unwrap();

    let b_sessions = b.sessions();
    let arriving = tokio::spawn(async move { b_sessions.arriving().await });
    settle().await;

    a.sessions().leaving().await.unwrap();
    arriving.await.unwrap().unwrap();
    b.wait_for_lease(LeaseState::Held).await.unwrap();

    assert_eq!(tracker.events(), vec!["a resume", "a pause", "b resume"]);
    assert_eq!(tracker.max_active(), 1);
}

#[tokio::test]
async fn test_leaving_during_open_session_hands_over_once_it_closes() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());
    let mut a = context(&dir, "a", &tracker, &provider, true, Duration::ZERO);
    let mut b = context(&dir, "b", &tracker, &provider, false, Duration::ZERO);
    a.wait_for_lease(LeaseState::Held).await.unwrap();

    let (opened_tx, opened_rx) = oneshot::channel();
    let (finish_tx, finish_rx) = oneshot::channel::<()>();
    let a_sessions = a.sessions();
    let request = tokio::spawn(async move {
        a_sessions
            .with_session("app.db", |db| async move {
                db.exec("PUT items ? ?", vec!["k".into(), 1.into()]).await?;
                let _ = opened_tx.send(());
                let _ = finish_rx.await;
                Ok(())
            })
            .await
    });
    opened_rx.await.unwrap();

    let b_sessions = b.sessions();
    let arriving = tokio::spawn(async move { b_sessions.arriving().await });
    settle().await;

    a.sessions().leaving().await.unwrap();
    settle().await;
    assert!(!arriving.is_finished());
    // no new persisted stores while the lease is on its way out
    let refused = a
        .sessions()
        .with_session("app.db", |_| async { Ok(()) })
        .await;
    assert!(matches!(
        refused,
        Err(ApiError::StorageError(StorageError::Releasing))
    ));

    finish_tx.send(()).unwrap();
    request.await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(2), arriving)
        .await
        .expect("lease handed over once the session closed")
        .unwrap()
        .unwrap();
    b.wait_for_lease(LeaseState::Held).await.unwrap();
    a.wait_for_lease(LeaseState::NotHeld).await.unwrap();

    assert_eq!(tracker.events(), vec!["a resume", "a pause", "b resume"]);
    assert_eq!(tracker.max_active(), 1);
}

#[tokio::test]
async fn test_reactivation_cancels_deferred_leaving() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());
    let mut a = context(&dir, "a", &tracker, &provider, true, Duration::ZERO);
    a.wait_for_lease(LeaseState::Held).await.unwrap();

    let sessions = a.sessions();
    let bridge = sessions.bridge();
    let handle = bridge.open("app.db").await.unwrap();
    sessions.leaving().await.unwrap();
    sessions.arriving().await.unwrap();
    bridge.close(handle).await.unwrap();

    // the lease stays with the context that became active again
    settle().await;
    assert_eq!(a.lease_state(), LeaseState::Held);
    assert_eq!(tracker.events(), vec!["a resume"]);
    a.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_signals_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());
    let mut a = context(&dir, "a", &tracker, &provider, false, Duration::ZERO);

    let sessions = a.sessions();
    sessions.leaving().await.unwrap();
    sessions.arriving().await.unwrap();
    sessions.arriving().await.unwrap();
    a.wait_for_lease(LeaseState::Held).await.unwrap();
    sessions.leaving().await.unwrap();
    sessions.leaving().await.unwrap();

    assert_eq!(tracker.events(), vec!["a resume", "a pause"]);
    assert_eq!(a.lease_state(), LeaseState::NotHeld);
}

#[tokio::test]
async fn test_aborted_holder_releases_lease() {
    let dir = TempDir::new().unwrap();
    let tracker = ResumeTracker::new();
    let provider = Arc::new(LocalLeaseProvider::new());

    let (_a_bridge, mut a_worker) = spawn_worker(
        RecordingBackend::new(&dir.path().join("a"), "a", Arc::clone(&tracker)),
        LeaseCoordinator::new("tab", Arc::clone(&provider) as Arc<dyn LeaseProvider>),
        WorkerOptions::default(),
    );
    a_worker.wait_for_lease(LeaseState::Held).await.unwrap();

    let mut b = context(&dir, "b", &tracker, &provider, false, Duration::ZERO);
    let b_sessions = b.sessions();
    let arriving = tokio::spawn(async move { b_sessions.arriving().await });
    settle().await;
    assert!(!arriving.is_finished());

    a_worker.abort();
    tokio::time::timeout(Duration::from_secs(2), arriving)
        .await
        .expect("lease handed over after abort")
        .unwrap()
        .unwrap();
    b.wait_for_lease(LeaseState::Held).await.unwrap();
}
