//! Sled-based storage backend

use crate::error::StorageError;
use crate::store::snapshot::Snapshot;
use crate::store::statement::Statement;
use crate::store::{normalize_store_name, Row, StorageBackend, StorageHandle, MEMORY_LOCATOR};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

enum Locator {
    Memory,
    Named(String),
}

struct OpenHandle {
    locator: Locator,
    db: sled::Db,
}

/// Sled-based implementation of [`StorageBackend`]
///
/// Named stores live in `<data_dir>/<name>`. Sled holds an exclusive file
/// lock on an open database, so a named store is opened once and shared by
/// every handle on it; the database is dropped when its last handle closes.
pub struct SledBackend {
    data_dir: PathBuf,
    paused: bool,
    next_handle: u64,
    handles: HashMap<StorageHandle, OpenHandle>,
    /// Open named databases with their handle count
    named: HashMap<String, (sled::Db, usize)>,
}

impl SledBackend {
    /// Create a backend rooted at `data_dir`.
    ///
    /// The backend starts paused: persisted stores only become available once
    /// the owning context holds the storage lease and resumes it.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            paused: true,
            next_handle: 1,
            handles: HashMap::new(),
            named: HashMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Number of currently open handles (transient ones included)
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn open_named(&mut self, name: &str) -> Result<sled::Db, StorageError> {
        if let Some((db, count)) = self.named.get_mut(name) {
            *count += 1;
            return Ok(db.clone());
        }

        std::fs::create_dir_all(&self.data_dir)?;
        let db = sled::open(self.data_dir.join(name))?;
        self.named.insert(name.to_string(), (db.clone(), 1));
        Ok(db)
    }

    fn release_named(&mut self, name: &str) -> Result<(), StorageError> {
        let last = match self.named.get_mut(name) {
            Some((_, count)) => {
                *count -= 1;
                *count == 0
            }
            None => false,
        };
        if last {
            if let Some((db, _)) = self.named.remove(name) {
                db.flush()?;
            }
        }
        Ok(())
    }

    fn db(&self, handle: StorageHandle) -> Result<&sled::Db, StorageError> {
        self.handles
            .get(&handle)
            .map(|h| &h.db)
            .ok_or(StorageError::UnknownHandle(handle))
    }
}

fn decode_row(key: &[u8], value: &[u8]) -> Result<Row, StorageError> {
    let value: Value = serde_json::from_slice(value).map_err(|e| {
        StorageError::Backend(format!("Failed to deserialize stored value: {}", e))
    })?;
    let mut row = Row::new();
    row.insert(
        "key".to_string(),
        Value::String(String::from_utf8_lossy(key).into_owned()),
    );
    row.insert("value".to_string(), value);
    Ok(row)
}

impl StorageBackend for SledBackend {
    fn open(&mut self, locator: &str) -> Result<StorageHandle, StorageError> {
        let (locator, db) = if locator == MEMORY_LOCATOR {
            let db = sled::Config::new().temporary(true).open()?;
            (Locator::Memory, db)
        } else {
            let name = normalize_store_name(locator)?;
            if self.paused {
                return Err(StorageError::Paused);
            }
            let db = self.open_named(&name)?;
            (Locator::Named(name), db)
        };

        let handle = StorageHandle::new(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(handle, OpenHandle { locator, db });
        debug!(handle = %handle, "Opened store handle");
        Ok(handle)
    }

    fn exec(
        &mut self,
        handle: StorageHandle,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, StorageError> {
        let db = self.db(handle)?;
        match Statement::parse(sql, params)? {
            Statement::Comment(_) => Ok(Vec::new()),
            Statement::Get { tree, key } => {
                let tree = db.open_tree(tree)?;
                match tree.get(key.as_bytes())? {
                    Some(value) => Ok(vec![decode_row(key.as_bytes(), &value)?]),
                    None => Ok(Vec::new()),
                }
            }
            Statement::Put { tree, key, value } => {
                let encoded = serde_json::to_vec(&value).map_err(|e| {
                    StorageError::Backend(format!("Failed to serialize value: {}", e))
                })?;
                db.open_tree(tree)?.insert(key.as_bytes(), encoded)?;
                Ok(Vec::new())
            }
            Statement::Delete { tree, key } => {
                let tree = db.open_tree(tree)?;
                match tree.remove(key.as_bytes())? {
                    Some(value) => Ok(vec![decode_row(key.as_bytes(), &value)?]),
                    None => Ok(Vec::new()),
                }
            }
            Statement::Scan { tree, prefix } => {
                let tree = db.open_tree(tree)?;
                let prefix = prefix.unwrap_or_default();
                let mut rows = Vec::new();
                for item in tree.scan_prefix(prefix.as_bytes()) {
                    let (key, value) = item?;
                    rows.push(decode_row(&key, &value)?);
                }
                Ok(rows)
            }
        }
    }

    fn close(&mut self, handle: StorageHandle) -> Result<(), StorageError> {
        let entry = self
            .handles
            .remove(&handle)
            .ok_or(StorageError::UnknownHandle(handle))?;
        debug!(handle = %handle, "Closed store handle");
        match entry.locator {
            Locator::Memory => Ok(()),
            Locator::Named(name) => {
                drop(entry.db);
                self.release_named(&name)
            }
        }
    }

    fn export(&mut self, handle: StorageHandle) -> Result<Vec<u8>, StorageError> {
        let db = self.db(handle)?;
        db.flush()?;
        Snapshot::capture(db)?.to_bytes()
    }

    fn pause(&mut self) -> Result<(), StorageError> {
        if !self.named.is_empty() {
            let names: Vec<&str> = self.named.keys().map(String::as_str).collect();
            return Err(StorageError::Busy(format!(
                "persisted stores still open: {}",
                names.join(", ")
            )));
        }
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), StorageError> {
        self.paused = false;
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn import(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let name = normalize_store_name(name)?;
        if self.paused {
            return Err(StorageError::Paused);
        }
        if self.named.contains_key(&name) {
            return Err(StorageError::Busy(format!("store '{}' is open", name)));
        }

        let snapshot = Snapshot::from_bytes(bytes)?;
        std::fs::create_dir_all(&self.data_dir)?;
        let db = sled::open(self.data_dir.join(&name))?;
        snapshot.restore_into(&db)?;
        debug!(
            store = %name,
            entries = snapshot.entry_count(),
            "Imported snapshot"
        );
        Ok(())
    }
}
