//! Static default snapshot: the fixed phase/task table every fresh install
//! (and every load-time structural merge) starts from.

use chrono::Utc;

use super::{Phase, Player, ProgressSnapshot, Settings, Task, Theme};

/// Base XP for a single task completion, before the streak multiplier.
pub const TASK_BASE_XP: u64 = 50;

fn task(id: &str, name: &str) -> Task {
    Task {
        id: id.to_string(),
        name: name.to_string(),
        base_xp: TASK_BASE_XP,
        completed: false,
        completed_at: None,
    }
}

fn phase(id: &str, name: &str, icon: &str, tasks: Vec<Task>) -> Phase {
    Phase {
        id: id.to_string(),
        name: name.to_string(),
        icon: icon.to_string(),
        tasks,
    }
}

/// Build a fresh default snapshot: all 18 tasks incomplete, zeroed player,
/// empty history, default settings.
pub fn default_snapshot() -> ProgressSnapshot {
    ProgressSnapshot {
        player: Player {
            xp: 0,
            streak: 0,
            last_active: None,
            achievements: Vec::new(),
            all_complete_bonus: false,
        },
        phases: vec![
            phase(
                "p0",
                "Test Device #1",
                "🔬",
                vec![
                    task("0.1", "Run device for 1 hour, verify pump & sleep mode"),
                    task("0.2", "Place at plant site, verify watering works"),
                    task("0.3", "(Optional) Build water detection/testing unit"),
                ],
            ),
            phase(
                "p1",
                "Build Device #2",
                "🔧",
                vec![
                    task("1.1", "Verify pump operation"),
                    task("1.1.1", "Cut wires & reverse pump polarity"),
                    task("1.1.2", "Fill with water, test with battery"),
                    task("1.2.1", "Glue programmed ESP to battery"),
                    task("1.2.2", "Glue cover to second device"),
                    task("1.2.3", "Glue ESP & battery to device"),
                    task("1.3.1", "Run device through network"),
                    task("1.3.2", "Leave for ~1 day, measure water output"),
                    task("1.3.3", "Place at plant, verify correct watering"),
                ],
            ),
            phase(
                "p2",
                "Code & Integration",
                "💻",
                vec![
                    task("2.1", "Upload provided code to typical ESP"),
                    task("2.2", "Connect ESP to website"),
                    task("2.3", "Verify website interactiveness with device"),
                    task("2.4", "Verify timer accuracy"),
                    task("2.5", "Upload code to actual device"),
                    task("2.6", "Verify same as 2.3 & 2.4"),
                ],
            ),
        ],
        history: Vec::new(),
        settings: Settings {
            sound_enabled: false,
            confetti_enabled: true,
            recovery_kitchen_sync: false,
            remote_sync: false,
            theme: Theme::Dark,
        },
        local_timestamp: Utc::now().timestamp_millis(),
    }
}
