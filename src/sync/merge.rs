//! Field-level merge of a newer remote snapshot into the local one.
//!
//! Applied by the orchestrator on pull so the store stays ignorant of the
//! remote format. The rules never lose progress: max XP, max streak,
//! achievement union, and per-task completion OR (a merge never
//! un-completes a task).

use std::collections::HashSet;

use crate::model::{ProgressSnapshot, HISTORY_CAP};

/// Merge `remote` into `local`, producing the snapshot that replaces the
/// local one. `remote_modified` is the remote envelope's revision stamp and
/// becomes the merged snapshot's `local_timestamp`, so an immediately
/// following pull-then-decide sees the two sides as equal.
pub fn merge_snapshots(
    local: &ProgressSnapshot,
    remote: &ProgressSnapshot,
    remote_modified: i64,
) -> ProgressSnapshot {
    let mut merged = local.clone();

    // Player: keep the best of both sides.
    merged.player.xp = local.player.xp.max(remote.player.xp);
    merged.player.streak = local.player.streak.max(remote.player.streak);
    merged.player.last_active = local.player.last_active.max(remote.player.last_active);
    merged.player.all_complete_bonus =
        local.player.all_complete_bonus || remote.player.all_complete_bonus;
    for achievement in &remote.player.achievements {
        if !merged.player.achievements.contains(achievement) {
            merged.player.achievements.push(achievement.clone());
        }
    }

    // Tasks: positional overlay, completion ORed.
    for (phase, remote_phase) in merged.phases.iter_mut().zip(&remote.phases) {
        for (task, remote_task) in phase.tasks.iter_mut().zip(&remote_phase.tasks) {
            task.completed = task.completed || remote_task.completed;
            task.completed_at = remote_task.completed_at.or(task.completed_at);
        }
    }

    // History: union deduplicated by (task_id, timestamp), newest first,
    // capped.
    let mut seen = HashSet::new();
    let mut history: Vec<_> = local
        .history
        .iter()
        .chain(&remote.history)
        .filter(|h| seen.insert((h.task_id.clone(), h.timestamp)))
        .cloned()
        .collect();
    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    history.truncate(HISTORY_CAP);
    merged.history = history;

    // Settings: local preference wins for user-facing toggles (already the
    // base of `merged`).

    merged.local_timestamp = remote_modified;
    merged
}
