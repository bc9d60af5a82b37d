//! Sync-layer types consumed by the presentation layer.

use serde::Serialize;

use crate::model::ProgressSnapshot;

/// Orchestrator state machine. Created as `Disconnected`; transitions are
/// driven exclusively by the [`SyncOrchestrator`](super::SyncOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "message")]
pub enum SyncState {
    Disconnected,
    Synced,
    Pending,
    Syncing,
    Error(String),
}

/// What a pull-then-decide cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Local snapshot became the new remote state.
    Pushed,
    /// Remote was newer; the merged result replaced the local snapshot.
    Pulled,
    /// Revision stamps were equal; no transfer.
    Unchanged,
}

/// Result of a completed sync cycle.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub snapshot: ProgressSnapshot,
}

/// Point-in-time status projection for UI layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub has_token: bool,
    /// Opaque remote version token from the last fetch/push.
    pub remote_version: Option<String>,
    /// Epoch millis of the last successful sync.
    pub last_sync_time: Option<i64>,
    pub last_error: Option<String>,
}
