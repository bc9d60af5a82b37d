//! Game rules engine — pure functions over a progress snapshot.
//!
//! Levels, XP multipliers, streak transitions and achievement predicates all
//! live here; nothing in this module performs I/O or mutates a snapshot.
//! The [`ProgressStore`](crate::store::ProgressStore) applies the results.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::model::ProgressSnapshot;

// ============================================================================
// Levels
// ============================================================================

/// Strictly increasing XP thresholds. Level `i+1` is reached at
/// `LEVELS[i].1` XP.
pub const LEVELS: [(&str, u64); 8] = [
    ("Seed", 0),
    ("Sprout", 200),
    ("Seedling", 500),
    ("Young Plant", 1000),
    ("Growing Plant", 2000),
    ("Mature Plant", 3500),
    ("Flowering", 5000),
    ("Harvest Ready", 7500),
];

/// Level projection for a given XP total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelInfo {
    /// 1-indexed level number.
    pub level: u32,
    pub name: &'static str,
    pub current_xp: u64,
    /// Threshold of the current level.
    pub xp_for_this_level: u64,
    /// Percent progress toward the next level, capped at 100 at max level.
    pub progress: f64,
    /// XP still needed for the next level; `None` at max level.
    pub xp_to_next: Option<u64>,
}

/// Level = highest index whose threshold is `<= xp`, 1-indexed.
pub fn level_for(xp: u64) -> LevelInfo {
    let index = LEVELS
        .iter()
        .rposition(|&(_, needed)| xp >= needed)
        .unwrap_or(0);
    let (name, floor) = LEVELS[index];

    let (progress, xp_to_next) = match LEVELS.get(index + 1) {
        Some(&(_, ceiling)) => {
            let span = (ceiling - floor) as f64;
            (((xp - floor) as f64 / span) * 100.0, Some(ceiling - xp))
        }
        None => (100.0, None),
    };

    LevelInfo {
        level: index as u32 + 1,
        name,
        current_xp: xp,
        xp_for_this_level: floor,
        progress,
        xp_to_next,
    }
}

// ============================================================================
// XP
// ============================================================================

/// XP-awarding action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TaskComplete,
    PhaseComplete,
    AllComplete,
    DailyCheckin,
}

impl Action {
    pub fn base_xp(self) -> u64 {
        match self {
            Action::TaskComplete => 50,
            Action::PhaseComplete => 100,
            Action::AllComplete => 500,
            Action::DailyCheckin => 10,
        }
    }
}

/// Streak multiplier: +5% per consecutive day, capped at +50% (10 days).
fn streak_multiplier(streak: u32) -> f64 {
    1.0 + (streak as f64 * 0.05).min(0.5)
}

/// XP for an action at the given streak, floored to an integer.
pub fn xp_for_action(action: Action, streak: u32) -> u64 {
    xp_for_base(action.base_xp(), streak)
}

/// XP for an arbitrary base value (tasks carry their own `base_xp`).
pub fn xp_for_base(base_xp: u64, streak: u32) -> u64 {
    (base_xp as f64 * streak_multiplier(streak)).floor() as u64
}

// ============================================================================
// Streaks
// ============================================================================

/// Outcome of comparing the last-active date against today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// Already active today; streak unchanged.
    SameDay,
    /// Active exactly yesterday; streak increments.
    Increment,
    /// Gap of more than one day (or no prior activity); the next action
    /// starts a new streak at 1.
    Reset,
}

pub fn streak_transition(last_active: Option<NaiveDate>, today: NaiveDate) -> StreakTransition {
    match last_active {
        Some(last) if last == today => StreakTransition::SameDay,
        Some(last) if last.checked_add_days(Days::new(1)) == Some(today) => {
            StreakTransition::Increment
        }
        _ => StreakTransition::Reset,
    }
}

// ============================================================================
// Achievements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AchievementDef {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

pub const ACHIEVEMENTS: [AchievementDef; 8] = [
    AchievementDef {
        id: "first-steps",
        name: "First Steps",
        description: "Complete your first task",
        icon: "🌱",
    },
    AchievementDef {
        id: "lab-rat",
        name: "Lab Rat",
        description: "Complete Phase 0",
        icon: "🔬",
    },
    AchievementDef {
        id: "builder",
        name: "Builder",
        description: "Complete Phase 1",
        icon: "🔧",
    },
    AchievementDef {
        id: "coder",
        name: "Coder",
        description: "Complete Phase 2",
        icon: "💻",
    },
    AchievementDef {
        id: "speed-demon",
        name: "Speed Demon",
        description: "Complete 3 tasks in one day",
        icon: "⚡",
    },
    AchievementDef {
        id: "on-fire",
        name: "On Fire",
        description: "3-day streak",
        icon: "🔥",
    },
    AchievementDef {
        id: "unstoppable",
        name: "Unstoppable",
        description: "7-day streak",
        icon: "💪",
    },
    AchievementDef {
        id: "plantpro-master",
        name: "PlantPro Master",
        description: "Complete all tasks",
        icon: "🏆",
    },
];

/// Evaluate all achievement predicates against the snapshot, returning ids
/// not already held. Idempotent: a second call on an unchanged snapshot
/// (after the ids have been recorded) returns nothing.
pub fn check_achievements(snapshot: &ProgressSnapshot, today: NaiveDate) -> Vec<String> {
    let held = |id: &str| snapshot.player.achievements.iter().any(|a| a == id);
    let mut unlocked = Vec::new();
    let mut unlock = |id: &str| {
        if !held(id) {
            unlocked.push(id.to_string());
        }
    };

    let tasks_completed = snapshot
        .phases
        .iter()
        .flat_map(|p| &p.tasks)
        .filter(|t| t.completed)
        .count();
    let today_tasks = snapshot
        .history
        .iter()
        .filter(|h| h.timestamp.date_naive() == today)
        .count();

    if tasks_completed >= 1 {
        unlock("first-steps");
    }
    for (phase_index, id) in [(0, "lab-rat"), (1, "builder"), (2, "coder")] {
        if snapshot.phases.get(phase_index).is_some_and(|p| p.is_complete()) {
            unlock(id);
        }
    }
    if today_tasks >= 3 {
        unlock("speed-demon");
    }
    if snapshot.player.streak >= 3 {
        unlock("on-fire");
    }
    if snapshot.player.streak >= 7 {
        unlock("unstoppable");
    }
    if snapshot.all_complete() {
        unlock("plantpro-master");
    }

    unlocked
}

// ============================================================================
// Stats
// ============================================================================

/// Overall-progress projection for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub tasks_completed: usize,
    pub tasks_total: usize,
    /// Whole-number percent of tasks completed.
    pub percentage: u32,
    pub phases_completed: usize,
    pub phases_total: usize,
}

pub fn stats(snapshot: &ProgressSnapshot) -> Stats {
    let tasks_total = snapshot.phases.iter().map(|p| p.tasks.len()).sum::<usize>();
    let tasks_completed = snapshot
        .phases
        .iter()
        .flat_map(|p| &p.tasks)
        .filter(|t| t.completed)
        .count();
    let percentage = if tasks_total == 0 {
        0
    } else {
        ((tasks_completed as f64 / tasks_total as f64) * 100.0).round() as u32
    };

    Stats {
        tasks_completed,
        tasks_total,
        percentage,
        phases_completed: snapshot.phases.iter().filter(|p| p.is_complete()).count(),
        phases_total: snapshot.phases.len(),
    }
}
