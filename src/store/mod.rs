//! Progress store — owns the canonical in-memory snapshot and the local
//! durable slot.
//!
//! All operations are synchronous. The store is the only writer of snapshot
//! fields; the sync layer replaces the snapshot wholesale via
//! [`ProgressStore::replace_snapshot`] after a merge and never reaches into
//! it directly.

mod slot;

pub use slot::{FileSlot, LocalSlot, MemorySlot};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::game::{self, Action, StreakTransition};
use crate::model::{default_snapshot, HistoryEntry, ProgressSnapshot};

/// Slot key holding the serialized snapshot.
pub const STORAGE_KEY: &str = "plantpro-quest-data";

/// Result of a successful task completion.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub snapshot: ProgressSnapshot,
    pub xp_earned: u64,
    pub new_achievements: Vec<String>,
    pub phase_completed: bool,
    pub all_completed: bool,
}

/// Callback invoked after every persisted local mutation (marks the sync
/// orchestrator dirty).
pub type MutationCallback = dyn Fn() + Send + Sync;

// ============================================================================
// JournalSink — optional external journal port
// ============================================================================

/// Entry pushed to an external journal when a task completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub kind: &'static str,
    pub name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub xp_earned: u64,
}

/// Injected capability for mirroring completions into an external journal.
/// Absence of the capability is a normal, silent no-op; a failing sink must
/// handle its own errors — the store fires and forgets.
pub trait JournalSink: Send + Sync {
    fn record(&self, entry: &JournalEntry);
}

// ============================================================================
// ProgressStore
// ============================================================================

pub struct ProgressStore {
    slot: Arc<dyn LocalSlot>,
    snapshot: Mutex<ProgressSnapshot>,
    on_mutate: Mutex<Option<Arc<MutationCallback>>>,
    journal: Mutex<Option<Arc<dyn JournalSink>>>,
}

impl ProgressStore {
    /// Open the store, loading the persisted snapshot (or creating and
    /// persisting a fresh default if the slot is empty or malformed).
    pub fn open(slot: Arc<dyn LocalSlot>) -> Self {
        let store = Self {
            slot,
            snapshot: Mutex::new(default_snapshot()),
            on_mutate: Mutex::new(None),
            journal: Mutex::new(None),
        };
        store.load();
        store
    }

    /// Register the dirty-notification callback.
    pub fn set_on_mutate(&self, callback: Arc<MutationCallback>) {
        *self.on_mutate.lock() = Some(callback);
    }

    /// Inject the optional journal capability.
    pub fn set_journal(&self, sink: Arc<dyn JournalSink>) {
        *self.journal.lock() = Some(sink);
    }

    /// Current snapshot (cloned read projection).
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.lock().clone()
    }

    /// Reload from the local slot.
    ///
    /// Never fails: an absent or malformed blob degrades to the default
    /// table (persisting it), and a present blob is structurally merged
    /// over the defaults so fields introduced after it was written appear
    /// without discarding progress.
    pub fn load(&self) -> ProgressSnapshot {
        let loaded = match self.slot.get(STORAGE_KEY) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => ProgressSnapshot::merge_with_defaults(&value),
                Err(err) => {
                    tracing::warn!(error = %err, "stored snapshot is malformed, using defaults");
                    let fresh = default_snapshot();
                    self.persist(&fresh);
                    fresh
                }
            },
            None => {
                let fresh = default_snapshot();
                self.persist(&fresh);
                fresh
            }
        };
        *self.snapshot.lock() = loaded.clone();
        loaded
    }

    /// Complete a task now. See [`ProgressStore::complete_task_at`].
    pub fn complete_task(&self, task_id: &str) -> Option<CompletionResult> {
        self.complete_task_at(task_id, Utc::now())
    }

    /// Complete a task at an explicit instant (the deterministic core).
    ///
    /// Returns `None` if the id is unknown or the task is already completed
    /// — completion is idempotent per task. The XP multiplier uses the
    /// *pre-update* streak; the streak itself then advances per the daily
    /// transition rule (a broken streak restarts at 1 with this completion).
    pub fn complete_task_at(&self, task_id: &str, now: DateTime<Utc>) -> Option<CompletionResult> {
        let today = now.date_naive();
        let result = {
            let mut snap = self.snapshot.lock();

            let (phase_index, task_index) = find_task_position(&snap, task_id)?;
            {
                let task = &mut snap.phases[phase_index].tasks[task_index];
                if task.completed {
                    return None;
                }
                task.completed = true;
                task.completed_at = Some(now);
            }

            let base_xp = snap.phases[phase_index].tasks[task_index].base_xp;
            let xp_earned = game::xp_for_base(base_xp, snap.player.streak);
            snap.player.xp += xp_earned;

            match game::streak_transition(snap.player.last_active.map(|d| d.date_naive()), today) {
                StreakTransition::SameDay => {}
                StreakTransition::Increment => {
                    snap.player.streak += 1;
                    snap.player.last_active = Some(now);
                }
                StreakTransition::Reset => {
                    snap.player.streak = 1;
                    snap.player.last_active = Some(now);
                }
            }

            let entry = HistoryEntry {
                timestamp: now,
                task_id: task_id.to_string(),
                task_name: snap.phases[phase_index].tasks[task_index].name.clone(),
                xp_earned,
                phase_id: snap.phases[phase_index].id.clone(),
            };
            snap.history.insert(0, entry);

            let new_achievements = game::check_achievements(&snap, today);
            snap.player
                .achievements
                .extend(new_achievements.iter().cloned());

            let phase_completed = snap.phases[phase_index].is_complete();
            if phase_completed {
                snap.player.xp += Action::PhaseComplete.base_xp();
            }

            let all_completed = snap.all_complete();
            if all_completed && !snap.player.all_complete_bonus {
                snap.player.xp += Action::AllComplete.base_xp();
                snap.player.all_complete_bonus = true;
            }

            snap.touch(now);
            self.persist(&snap);

            CompletionResult {
                snapshot: snap.clone(),
                xp_earned,
                new_achievements,
                phase_completed,
                all_completed,
            }
        };

        self.notify_mutation();
        self.journal_completion(task_id, &result, now);
        Some(result)
    }

    /// Clear a task's completion (undo). No-op if already incomplete.
    ///
    /// Matching history entries are removed, but XP, streak and achievement
    /// grants are *not* reversed — completion effects are one-way.
    pub fn uncomplete_task(&self, task_id: &str) -> ProgressSnapshot {
        self.uncomplete_task_at(task_id, Utc::now())
    }

    pub fn uncomplete_task_at(&self, task_id: &str, now: DateTime<Utc>) -> ProgressSnapshot {
        let (snapshot, changed) = {
            let mut snap = self.snapshot.lock();
            let mut changed = false;
            if let Some((phase_index, task_index)) = find_task_position(&snap, task_id) {
                let task = &mut snap.phases[phase_index].tasks[task_index];
                if task.completed {
                    task.completed = false;
                    task.completed_at = None;
                    changed = true;
                }
            }
            if changed {
                snap.history.retain(|h| h.task_id != task_id);
                snap.touch(now);
                self.persist(&snap);
            }
            (snap.clone(), changed)
        };
        if changed {
            self.notify_mutation();
        }
        snapshot
    }

    /// Update user-facing settings in place and persist.
    pub fn update_settings(&self, apply: impl FnOnce(&mut crate::model::Settings)) -> ProgressSnapshot {
        let snapshot = {
            let mut snap = self.snapshot.lock();
            apply(&mut snap.settings);
            snap.touch(Utc::now());
            self.persist(&snap);
            snap.clone()
        };
        self.notify_mutation();
        snapshot
    }

    /// Replace the snapshot wholesale (sync pull-merge path).
    ///
    /// Persists without bumping `local_timestamp` and without firing the
    /// mutation callback: a pulled merge is not a local edit and must not
    /// schedule another push.
    pub fn replace_snapshot(&self, snapshot: ProgressSnapshot) {
        let mut snap = self.snapshot.lock();
        *snap = snapshot;
        self.persist(&snap);
    }

    /// Erase local persistence and start from a fresh default snapshot.
    ///
    /// Local-only: reseeding the remote copy is the orchestrator's job.
    pub fn reset(&self) -> ProgressSnapshot {
        self.slot.remove(STORAGE_KEY);
        let fresh = default_snapshot();
        self.persist(&fresh);
        *self.snapshot.lock() = fresh.clone();
        self.notify_mutation();
        fresh
    }

    /// Serialize the current snapshot for user-initiated backup, returning
    /// the date-stamped filename and pretty-printed JSON bytes.
    pub fn export(&self) -> (String, Vec<u8>) {
        self.export_at(Utc::now())
    }

    pub fn export_at(&self, now: DateTime<Utc>) -> (String, Vec<u8>) {
        let snap = self.snapshot.lock();
        let filename = format!("plantpro-quest-backup-{}.json", now.format("%Y-%m-%d"));
        let bytes = serde_json::to_vec_pretty(&*snap).unwrap_or_default();
        (filename, bytes)
    }

    /// Persist the given snapshot to the local slot. Failures are logged and
    /// reported as `false`; local state stays authoritative either way.
    fn persist(&self, snapshot: &ProgressSnapshot) -> bool {
        let serialized = match serde_json::to_string(snapshot) {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize snapshot");
                return false;
            }
        };
        match self.slot.set(STORAGE_KEY, &serialized) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist snapshot");
                false
            }
        }
    }

    fn notify_mutation(&self) {
        let callback = self.on_mutate.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn journal_completion(&self, task_id: &str, result: &CompletionResult, now: DateTime<Utc>) {
        if !result.snapshot.settings.recovery_kitchen_sync {
            return;
        }
        let sink = self.journal.lock().clone();
        let Some(sink) = sink else {
            return;
        };
        if let Some((_, task)) = result.snapshot.find_task(task_id) {
            sink.record(&JournalEntry {
                kind: "main-course",
                name: format!("🌱 PlantPro: {}", task.name),
                description: format!("Completed task {}", task.id),
                timestamp: now,
                task_id: task.id.clone(),
                xp_earned: result.xp_earned,
            });
        }
    }
}

fn find_task_position(snapshot: &ProgressSnapshot, task_id: &str) -> Option<(usize, usize)> {
    snapshot.phases.iter().enumerate().find_map(|(pi, phase)| {
        phase
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .map(|ti| (pi, ti))
    })
}
