//! PlantPro Quest core — progress tracking with local persistence and
//! cloud sync.
//!
//! # Modules
//!
//! - `game`: pure rules engine (levels, XP, streaks, achievements)
//! - `model`: snapshot data model and default task table
//! - `store`: progress store over a local durable slot
//! - `remote`: versioned remote blob store client (GitHub contents API)
//! - `sync`: orchestrator — debounced push, pull-then-decide, merge
//!
//! The presentation layer consumes `CompletionResult`, `SyncStatus` and the
//! `game` projections, and calls into `ProgressStore`/`SyncOrchestrator`
//! operations and nothing else.

pub mod error;
pub mod game;
pub mod model;
pub mod remote;
pub mod store;
pub mod sync;

pub use error::{QuestError, Result, StorageError, SyncError};
pub use model::{default_snapshot, ProgressSnapshot};
pub use remote::{GitHubClient, GitHubConfig, RemoteSnapshot, RemoteStore};
pub use store::{CompletionResult, FileSlot, LocalSlot, MemorySlot, ProgressStore};
pub use sync::{SyncOrchestrator, SyncOrchestratorOptions, SyncState, SyncStatus};
