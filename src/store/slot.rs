//! Local durable slots — narrow key/value I/O trait with memory and file
//! implementations.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::StorageError;

/// A durable key/value slot holding whole serialized documents.
///
/// Implementors must be `Send + Sync` so the store can be shared with the
/// async sync layer.
pub trait LocalSlot: Send + Sync {
    /// Read the value for `key`, or `None` if absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Persist `value` under `key`, replacing any prior value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key` if present.
    fn remove(&self, key: &str);
}

// ============================================================================
// MemorySlot
// ============================================================================

/// In-memory slot for tests and ephemeral use.
#[derive(Default)]
pub struct MemorySlot {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalSlot for MemorySlot {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

// ============================================================================
// FileSlot
// ============================================================================

/// File-backed slot: one `<key>.json` file per key under a base directory.
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are fixed internal constants, but sanitize anyway so a key
        // can never escape the base directory.
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl LocalSlot for FileSlot {
    fn get(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Some(value),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    tracing::warn!(key, error = %err, "failed to read local slot");
                }
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let wrap = |source: std::io::Error| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(wrap)?;
        std::fs::write(self.path_for(key), value).map_err(wrap)
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}
