//! Remote sync client — a thin contract over a versioned blob store holding
//! the whole snapshot at a fixed path.

mod github;

pub use github::{GitHubClient, GitHubConfig};

use async_trait::async_trait;

use crate::error::SyncError;
use crate::model::{ProgressSnapshot, RemoteMeta};

/// A remote read result: snapshot content, its push-time metadata envelope
/// (absent for blobs written by clients that predate it), and the store's
/// opaque version token for optimistic-concurrency writes.
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
    pub content: ProgressSnapshot,
    pub meta: Option<RemoteMeta>,
    pub version: String,
}

impl RemoteSnapshot {
    /// Remote revision stamp for last-write-wins comparison; a missing
    /// envelope counts as epoch zero (always older than any local edit).
    pub fn last_modified(&self) -> i64 {
        self.meta.as_ref().map(|m| m.last_modified).unwrap_or(0)
    }
}

/// Versioned whole-snapshot blob store.
///
/// Absence of the remote object is an expected outcome (first-time user),
/// so `fetch` returns `Ok(None)` rather than an error. A `push` with a
/// stale `expected_version` fails with [`SyncError::Conflict`],
/// distinguishable from transport failures.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, token: &str) -> Result<Option<RemoteSnapshot>, SyncError>;

    /// Write the snapshot, returning the store's new version token.
    async fn push(
        &self,
        token: &str,
        snapshot: &ProgressSnapshot,
        expected_version: Option<&str>,
    ) -> Result<String, SyncError>;
}
