//! Progress snapshot data model.
//!
//! Field names are pinned to the established on-disk JSON format (camelCase,
//! `_localTimestamp`, `_meta`) so blobs written by older clients load
//! unchanged. The `ProgressStore` is the only writer of a live snapshot;
//! the sync layer only ever replaces it wholesale after a merge.

mod defaults;

pub use defaults::default_snapshot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Snapshot
// ============================================================================

/// The entire persisted state for one player/device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub player: Player,
    pub phases: Vec<Phase>,
    /// Newest first, capped at [`HISTORY_CAP`] entries after merge.
    pub history: Vec<HistoryEntry>,
    pub settings: Settings,
    /// Epoch millis of the last local mutation — the sole basis for
    /// last-write-wins comparison against the remote copy.
    #[serde(rename = "_localTimestamp")]
    pub local_timestamp: i64,
}

/// Maximum history entries retained after a merge.
pub const HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub xp: u64,
    /// Consecutive-day activity counter.
    pub streak: u32,
    pub last_active: Option<DateTime<Utc>>,
    pub achievements: Vec<String>,
    /// The one-time +500 all-complete bonus has been granted.
    #[serde(rename = "allCompleteBonus")]
    pub all_complete_bonus: bool,
}

/// A fixed group of tasks. Phase ids, task ids and ordering are defined by
/// the static default table and never change after creation; only task
/// completion state is mutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub tasks: Vec<Task>,
}

impl Phase {
    /// True once every task in this phase is completed.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Base XP awarded on completion, before the streak multiplier.
    #[serde(rename = "xp")]
    pub base_xp: u64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Immutable completion record. Identity for merge dedup is
/// `(task_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub task_name: String,
    pub xp_earned: u64,
    pub phase_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub sound_enabled: bool,
    pub confetti_enabled: bool,
    #[serde(rename = "recoveryKitchenSync")]
    pub recovery_kitchen_sync: bool,
    /// Remote sync opt-in (named for the backing service in stored JSON).
    #[serde(rename = "githubSync")]
    pub remote_sync: bool,
    pub theme: Theme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

// ============================================================================
// Remote envelope
// ============================================================================

/// Metadata written alongside the snapshot on every remote push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeta {
    /// Epoch millis at push time; compared against `local_timestamp` to
    /// decide pull-vs-push.
    pub last_modified: i64,
    pub device: String,
    pub version: String,
}

impl RemoteMeta {
    pub const FORMAT_VERSION: &'static str = "1.0";

    pub fn new(last_modified: i64, device: impl Into<String>) -> Self {
        Self {
            last_modified,
            device: device.into(),
            version: Self::FORMAT_VERSION.to_string(),
        }
    }
}

// ============================================================================
// Load-time structural merge
// ============================================================================

impl ProgressSnapshot {
    /// Bump the local revision stamp to `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.local_timestamp = now.timestamp_millis();
    }

    /// Locate a task and its owning phase by task id.
    pub fn find_task(&self, task_id: &str) -> Option<(&Phase, &Task)> {
        self.phases
            .iter()
            .find_map(|p| p.tasks.iter().find(|t| t.id == task_id).map(|t| (p, t)))
    }

    /// True once every task in every phase is completed.
    pub fn all_complete(&self) -> bool {
        self.phases.iter().all(Phase::is_complete)
    }

    /// Overlay loosely-typed stored JSON onto the default template.
    ///
    /// Forward-compatibility rule: the default table defines which phases
    /// and tasks exist; for each default task at a given position, any
    /// stored fields of the task at that position are overlaid, so tasks
    /// introduced after the blob was written appear with defaults and user
    /// progress on existing tasks is preserved. Unknown or malformed
    /// sections fall back to defaults wholesale.
    pub fn merge_with_defaults(stored: &Value) -> ProgressSnapshot {
        let mut snapshot = default_snapshot();

        if let Some(player) = stored.get("player") {
            overlay(&mut snapshot.player, player);
        }
        if let Some(stored_phases) = stored.get("phases").and_then(Value::as_array) {
            for (phase, stored_phase) in snapshot.phases.iter_mut().zip(stored_phases) {
                let stored_tasks = stored_phase.get("tasks").and_then(Value::as_array);
                for (task, stored_task) in phase
                    .tasks
                    .iter_mut()
                    .zip(stored_tasks.into_iter().flatten())
                {
                    overlay(task, stored_task);
                }
            }
        }
        if let Some(history) = stored.get("history").and_then(Value::as_array) {
            snapshot.history = history
                .iter()
                .filter_map(|h| serde_json::from_value(h.clone()).ok())
                .collect();
        }
        if let Some(settings) = stored.get("settings") {
            overlay(&mut snapshot.settings, settings);
        }
        if let Some(ts) = stored.get("_localTimestamp").and_then(Value::as_i64) {
            snapshot.local_timestamp = ts;
        }

        snapshot
    }
}

/// Per-field overlay: deserialize the target to JSON, copy over every stored
/// field that the target's schema accepts, and keep defaults for the rest.
/// A stored field that fails to deserialize leaves the default untouched.
fn overlay<T: Serialize + for<'de> Deserialize<'de>>(target: &mut T, stored: &Value) {
    let Value::Object(stored_map) = stored else {
        return;
    };
    let Ok(Value::Object(mut base)) = serde_json::to_value(&*target) else {
        return;
    };
    for (key, value) in stored_map {
        if !base.contains_key(key) {
            continue;
        }
        let previous = base.insert(key.clone(), value.clone());
        match serde_json::from_value::<T>(Value::Object(base.clone())) {
            Ok(merged) => *target = merged,
            Err(_) => {
                // Wrong-typed stored field: keep the default for this key.
                if let Some(previous) = previous {
                    base.insert(key.clone(), previous);
                }
            }
        }
    }
}
