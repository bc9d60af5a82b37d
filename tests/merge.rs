//! Merge rule tests — field-level reconciliation of local and remote
//! snapshots.

use chrono::{TimeZone, Utc};

use plantpro_quest::model::{default_snapshot, HistoryEntry, ProgressSnapshot, Theme, HISTORY_CAP};
use plantpro_quest::sync::merge_snapshots;

fn entry(task_id: &str, minute: u32) -> HistoryEntry {
    HistoryEntry {
        timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 9, minute, 0).unwrap(),
        task_id: task_id.to_string(),
        task_name: format!("task {task_id}"),
        xp_earned: 50,
        phase_id: "p0".to_string(),
    }
}

fn snapshot_a() -> ProgressSnapshot {
    let mut snap = default_snapshot();
    snap.player.xp = 300;
    snap.player.streak = 2;
    snap.player.achievements = vec!["first-steps".to_string(), "lab-rat".to_string()];
    snap.phases[0].tasks[0].completed = true;
    snap.history = vec![entry("0.1", 5)];
    snap
}

fn snapshot_b() -> ProgressSnapshot {
    let mut snap = default_snapshot();
    snap.player.xp = 150;
    snap.player.streak = 5;
    snap.player.achievements = vec!["first-steps".to_string(), "on-fire".to_string()];
    snap.phases[1].tasks[2].completed = true;
    snap.history = vec![entry("1.1.2", 7)];
    snap
}

#[test]
fn player_fields_take_the_best_of_both_sides() {
    let merged = merge_snapshots(&snapshot_a(), &snapshot_b(), 99);
    assert_eq!(merged.player.xp, 300);
    assert_eq!(merged.player.streak, 5);
    let mut achievements = merged.player.achievements.clone();
    achievements.sort();
    assert_eq!(achievements, vec!["first-steps", "lab-rat", "on-fire"]);
    assert_eq!(merged.local_timestamp, 99);
}

#[test]
fn merge_is_commutative_on_player_fields() {
    let ab = merge_snapshots(&snapshot_a(), &snapshot_b(), 99);
    let ba = merge_snapshots(&snapshot_b(), &snapshot_a(), 99);

    assert_eq!(ab.player.xp, ba.player.xp);
    assert_eq!(ab.player.streak, ba.player.streak);
    let mut left = ab.player.achievements.clone();
    let mut right = ba.player.achievements.clone();
    left.sort();
    right.sort();
    assert_eq!(left, right);
}

#[test]
fn task_completion_is_ored_and_never_undone() {
    let merged = merge_snapshots(&snapshot_a(), &snapshot_b(), 99);
    assert!(merged.find_task("0.1").unwrap().1.completed);
    assert!(merged.find_task("1.1.2").unwrap().1.completed);

    // A remote side with the task incomplete cannot un-complete it.
    let reversed = merge_snapshots(&snapshot_a(), &default_snapshot(), 99);
    assert!(reversed.find_task("0.1").unwrap().1.completed);
}

#[test]
fn history_union_dedups_by_task_and_timestamp() {
    let mut local = snapshot_a();
    let mut remote = snapshot_b();
    // Shared entry on both sides plus one distinct entry each.
    let shared = entry("0.2", 6);
    local.history.push(shared.clone());
    remote.history.push(shared);

    let merged = merge_snapshots(&local, &remote, 99);
    assert_eq!(merged.history.len(), 3);

    // Newest first.
    for pair in merged.history.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }
}

#[test]
fn history_is_capped_after_merge() {
    let mut local = default_snapshot();
    let mut remote = default_snapshot();
    for minute in 0..40 {
        local.history.push(entry("0.1", minute));
        remote.history.push(entry("0.2", minute));
    }

    let merged = merge_snapshots(&local, &remote, 99);
    assert_eq!(merged.history.len(), HISTORY_CAP);
    // The cap keeps the newest entries.
    assert_eq!(merged.history[0].timestamp, entry("0.1", 39).timestamp);
}

#[test]
fn local_settings_win() {
    let mut local = default_snapshot();
    local.settings.theme = Theme::Light;
    local.settings.confetti_enabled = false;
    let mut remote = default_snapshot();
    remote.settings.theme = Theme::Dark;
    remote.settings.sound_enabled = true;

    let merged = merge_snapshots(&local, &remote, 99);
    assert_eq!(merged.settings, local.settings);
}

#[test]
fn all_complete_bonus_survives_from_either_side() {
    let mut remote = default_snapshot();
    remote.player.all_complete_bonus = true;
    let merged = merge_snapshots(&default_snapshot(), &remote, 99);
    assert!(merged.player.all_complete_bonus);
}
