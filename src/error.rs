use thiserror::Error;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Local durable-slot failures.
///
/// These never escape `ProgressStore::load` (which degrades to defaults) and
/// surface from `save` only as a boolean; the variants exist so slot
/// implementations can report what actually went wrong.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Slot I/O error for key \"{key}\": {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

/// Remote sync failures.
///
/// A missing remote file is *not* an error — `RemoteStore::fetch` returns
/// `Ok(None)` for a first-time user. `Conflict` drives the orchestrator's
/// single bounded retry; everything else ends the cycle in an error state.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Remote sync is not configured (no token set)")]
    NotConfigured,

    #[error("Remote file changed since last fetch")]
    Conflict,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl SyncError {
    /// Wrap an arbitrary transport failure, truncating the message so it
    /// stays displayable in a status line.
    pub fn transport(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > 200 {
            let mut cut = 200;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
            message.push('…');
        }
        SyncError::Transport(message)
    }
}

// ---------------------------------------------------------------------------
// QuestError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QuestError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type Result<T, E = QuestError> = std::result::Result<T, E>;
