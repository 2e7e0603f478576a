//! Snapshot encoding
//!
//! A snapshot is the complete content of one store:
//!
//! ```text
//! "HRTH" | format version (u16 LE) | blake3(body) (32 bytes) | bincode(body)
//! ```

use crate::error::StorageError;
use serde::{Deserialize, Serialize};

const MAGIC: &[u8; 4] = b"HRTH";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 32;

/// Key/value pairs of one sled tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDump {
    pub name: Vec<u8>,
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub trees: Vec<TreeDump>,
}

impl Snapshot {
    /// Capture every tree of a database, the default tree included.
    pub fn capture(db: &sled::Db) -> Result<Self, StorageError> {
        let mut trees = Vec::new();
        for name in db.tree_names() {
            let tree = db.open_tree(&name)?;
            let mut entries = Vec::new();
            for item in tree.iter() {
                let (key, value) = item?;
                entries.push((key.to_vec(), value.to_vec()));
            }
            trees.push(TreeDump {
                name: name.to_vec(),
                entries,
            });
        }
        trees.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Snapshot { trees })
    }

    /// Replace the content of `db` with this snapshot.
    pub fn restore_into(&self, db: &sled::Db) -> Result<(), StorageError> {
        let default_name = db.name();
        for name in db.tree_names() {
            if name == default_name {
                db.clear()?;
            } else {
                db.drop_tree(&name)?;
            }
        }

        for dump in &self.trees {
            let tree = db.open_tree(&dump.name)?;
            let mut batch = sled::Batch::default();
            for (key, value) in &dump.entries {
                batch.insert(key.as_slice(), value.as_slice());
            }
            tree.apply_batch(batch)?;
        }

        db.flush()?;
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.trees.iter().map(|t| t.entries.len()).sum()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let body = bincode::serialize(self)
            .map_err(|e| StorageError::Snapshot(format!("Failed to serialize snapshot: {}", e)))?;
        let checksum = blake3::hash(&body);

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(checksum.as_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(StorageError::Snapshot("not a hearth snapshot".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(StorageError::Snapshot(format!(
                "unsupported snapshot version {}",
                version
            )));
        }

        let (expected, body) = bytes[6..].split_at(32);
        let actual = blake3::hash(body);
        if actual.as_bytes() != expected {
            return Err(StorageError::Snapshot(format!(
                "checksum mismatch: expected {}, got {}",
                hex::encode(expected),
                actual.to_hex()
            )));
        }

        bincode::deserialize(body)
            .map_err(|e| StorageError::Snapshot(format!("Failed to deserialize snapshot: {}", e)))
    }

    /// Hex checksum of an encoded snapshot, without decoding the body.
    pub fn checksum_hex(bytes: &[u8]) -> Option<String> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return None;
        }
        Some(hex::encode(&bytes[6..HEADER_LEN]))
    }
}
