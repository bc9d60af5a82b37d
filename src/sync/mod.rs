pub mod merge;
pub mod orchestrator;
pub mod types;

pub use merge::merge_snapshots;
pub use orchestrator::{
    SyncOrchestrator, SyncOrchestratorOptions, DEFAULT_DEBOUNCE_MS, TOKEN_KEY,
};
pub use types::{SyncAction, SyncOutcome, SyncState, SyncStatus};
