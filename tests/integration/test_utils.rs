//! Shared test helpers: a backend that records every pause and resume.

use hearth::error::StorageError;
use hearth::store::{Row, SledBackend, StorageBackend, StorageHandle};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared view over several contexts' backends.
#[derive(Default)]
pub struct ResumeTracker {
    active: AtomicUsize,
    max_active: AtomicUsize,
    events: Mutex<Vec<String>>,
}

impl ResumeTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Highest number of backends ever resumed at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// Sled backend that reports pause/resume to a [`ResumeTracker`] and can be
/// slowed down on pause.
pub struct RecordingBackend {
    inner: SledBackend,
    label: &'static str,
    tracker: Arc<ResumeTracker>,
    pause_delay: Duration,
}

impl RecordingBackend {
    pub fn new(dir: &Path, label: &'static str, tracker: Arc<ResumeTracker>) -> Self {
        Self {
            inner: SledBackend::new(dir),
            label,
            tracker,
            pause_delay: Duration::ZERO,
        }
    }

    pub fn with_pause_delay(mut self, delay: Duration) -> Self {
        self.pause_delay = delay;
        self
    }
}

impl StorageBackend for RecordingBackend {
    fn open(&mut self, locator: &str) -> Result<StorageHandle, StorageError> {
        self.inner.open(locator)
    }

    fn exec(
        &mut self,
        handle: StorageHandle,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, StorageError> {
        self.inner.exec(handle, sql, params)
    }

    fn close(&mut self, handle: StorageHandle) -> Result<(), StorageError> {
        self.inner.close(handle)
    }

    fn export(&mut self, handle: StorageHandle) -> Result<Vec<u8>, StorageError> {
        self.inner.export(handle)
    }

    fn pause(&mut self) -> Result<(), StorageError> {
        if !self.pause_delay.is_zero() {
            std::thread::sleep(self.pause_delay);
        }
        let was_resumed = !self.inner.is_paused();
        self.inner.pause()?;
        if was_resumed {
            self.tracker.active.fetch_sub(1, Ordering::SeqCst);
            self.tracker.events.lock().push(format!("{} pause", self.label));
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), StorageError> {
        let was_paused = self.inner.is_paused();
        self.inner.resume()?;
        if was_paused {
            let now = self.tracker.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.tracker.max_active.fetch_max(now, Ordering::SeqCst);
            self.tracker.events.lock().push(format!("{} resume", self.label));
        }
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    fn import(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.inner.import(name, bytes)
    }
}
