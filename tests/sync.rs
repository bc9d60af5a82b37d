//! Sync orchestrator tests — pull-then-decide, bounded conflict retry,
//! debounce coalescing, credential lifecycle. Uses a closure-programmable
//! mock remote recording every fetch/push.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use plantpro_quest::error::SyncError;
use plantpro_quest::model::{default_snapshot, ProgressSnapshot, RemoteMeta};
use plantpro_quest::remote::{RemoteSnapshot, RemoteStore};
use plantpro_quest::store::{MemorySlot, ProgressStore};
use plantpro_quest::sync::{
    SyncAction, SyncOrchestrator, SyncOrchestratorOptions, SyncState,
};

// ============================================================================
// Mock remote
// ============================================================================

type FetchFn = dyn Fn(usize) -> Result<Option<RemoteSnapshot>, SyncError> + Send + Sync;
type PushFn = dyn Fn(&ProgressSnapshot, Option<&str>, usize) -> Result<String, SyncError>
    + Send
    + Sync;

#[derive(Default)]
struct MockRemoteInner {
    fetch_calls: usize,
    /// Expected version passed to each push.
    push_calls: Vec<Option<String>>,
    last_pushed: Option<ProgressSnapshot>,
    fetch_response: Option<Box<FetchFn>>,
    push_response: Option<Box<PushFn>>,
    /// Simulated network latency before each push lands.
    push_delay: Option<Duration>,
}

#[derive(Default)]
struct MockRemote {
    inner: Mutex<MockRemoteInner>,
}

impl MockRemote {
    fn on_fetch(
        &self,
        f: impl Fn(usize) -> Result<Option<RemoteSnapshot>, SyncError> + Send + Sync + 'static,
    ) {
        self.inner.lock().fetch_response = Some(Box::new(f));
    }

    fn on_push(
        &self,
        f: impl Fn(&ProgressSnapshot, Option<&str>, usize) -> Result<String, SyncError>
            + Send
            + Sync
            + 'static,
    ) {
        self.inner.lock().push_response = Some(Box::new(f));
    }

    fn set_push_delay(&self, delay: Duration) {
        self.inner.lock().push_delay = Some(delay);
    }

    fn fetch_calls(&self) -> usize {
        self.inner.lock().fetch_calls
    }

    fn push_calls(&self) -> Vec<Option<String>> {
        self.inner.lock().push_calls.clone()
    }

    fn last_pushed(&self) -> Option<ProgressSnapshot> {
        self.inner.lock().last_pushed.clone()
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn fetch(&self, _token: &str) -> Result<Option<RemoteSnapshot>, SyncError> {
        let mut inner = self.inner.lock();
        let call = inner.fetch_calls;
        inner.fetch_calls += 1;
        match &inner.fetch_response {
            Some(f) => f(call),
            None => Ok(None),
        }
    }

    async fn push(
        &self,
        _token: &str,
        snapshot: &ProgressSnapshot,
        expected_version: Option<&str>,
    ) -> Result<String, SyncError> {
        let delay = self.inner.lock().push_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock();
        let call = inner.push_calls.len();
        inner.push_calls.push(expected_version.map(str::to_string));
        inner.last_pushed = Some(snapshot.clone());
        match &inner.push_response {
            Some(f) => f(snapshot, expected_version, call),
            None => Ok(format!("sha-{call}")),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    slot: Arc<MemorySlot>,
    store: Arc<ProgressStore>,
    remote: Arc<MockRemote>,
    orchestrator: Arc<SyncOrchestrator>,
}

fn setup(debounce_ms: u64) -> Fixture {
    let slot = Arc::new(MemorySlot::new());
    let store = Arc::new(ProgressStore::open(slot.clone()));
    let remote = Arc::new(MockRemote::default());
    let orchestrator = SyncOrchestrator::new(SyncOrchestratorOptions {
        store: store.clone(),
        remote: remote.clone(),
        slot: slot.clone(),
        debounce_ms: Some(debounce_ms),
    });
    Fixture {
        slot,
        store,
        remote,
        orchestrator,
    }
}

fn remote_snapshot(
    version: &str,
    last_modified: i64,
    build: impl FnOnce(&mut ProgressSnapshot),
) -> RemoteSnapshot {
    let mut content = default_snapshot();
    build(&mut content);
    RemoteSnapshot {
        content,
        meta: Some(RemoteMeta::new(last_modified, "other-device")),
        version: version.to_string(),
    }
}

// ============================================================================
// Credential lifecycle
// ============================================================================

#[tokio::test]
async fn sync_without_a_token_refuses_immediately() {
    let fx = setup(3000);
    let err = fx.orchestrator.sync_now().await.unwrap_err();
    assert!(matches!(err, SyncError::NotConfigured));
    assert_eq!(fx.remote.fetch_calls(), 0);
    assert_eq!(fx.orchestrator.status().state, SyncState::Disconnected);
}

#[tokio::test]
async fn token_is_persisted_and_reloaded() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    assert!(fx.orchestrator.is_configured());

    // A new orchestrator over the same slot picks the credential up.
    let again = SyncOrchestrator::new(SyncOrchestratorOptions {
        store: fx.store.clone(),
        remote: fx.remote.clone(),
        slot: fx.slot.clone(),
        debounce_ms: None,
    });
    assert!(again.is_configured());
    assert_eq!(again.status().state, SyncState::Synced);
}

#[tokio::test]
async fn query_credential_is_consumed_once() {
    let fx = setup(3000);
    assert!(fx.orchestrator.apply_query_credential("?token=abc&theme=dark"));
    assert!(fx.orchestrator.is_configured());

    // Present-but-empty clears the credential.
    assert!(fx.orchestrator.apply_query_credential("token="));
    assert!(!fx.orchestrator.is_configured());

    // Absent parameter changes nothing.
    assert!(!fx.orchestrator.apply_query_credential("?theme=dark"));
}

#[tokio::test]
async fn disconnect_clears_remote_state_but_not_local_data() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    fx.store.complete_task("0.1").unwrap();
    fx.orchestrator.sync_now().await.unwrap();

    fx.orchestrator.disconnect();
    let status = fx.orchestrator.status();
    assert_eq!(status.state, SyncState::Disconnected);
    assert!(status.remote_version.is_none());
    assert!(status.last_sync_time.is_none());
    // Local snapshot contents untouched.
    assert_eq!(fx.store.snapshot().player.xp, 50);
}

// ============================================================================
// Pull-then-decide
// ============================================================================

#[tokio::test]
async fn missing_remote_triggers_the_initial_push() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");

    let outcome = fx.orchestrator.sync_now().await.unwrap();
    assert_eq!(outcome.action, SyncAction::Pushed);
    assert_eq!(fx.remote.push_calls(), vec![None]);

    let status = fx.orchestrator.status();
    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(status.remote_version.as_deref(), Some("sha-0"));
    assert!(status.last_sync_time.is_some());
}

#[tokio::test]
async fn local_newer_than_remote_pushes() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    let local_time = fx.store.snapshot().local_timestamp;

    fx.remote
        .on_fetch(move |_| Ok(Some(remote_snapshot("v1", local_time - 1000, |_| {}))));

    let outcome = fx.orchestrator.sync_now().await.unwrap();
    assert_eq!(outcome.action, SyncAction::Pushed);
    // The push carried the fetched version for optimistic concurrency.
    assert_eq!(fx.remote.push_calls(), vec![Some("v1".to_string())]);
}

#[tokio::test]
async fn remote_newer_than_local_pulls_and_merges() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    let local_time = fx.store.snapshot().local_timestamp;
    let remote_time = local_time + 5000;

    fx.remote.on_fetch(move |_| {
        Ok(Some(remote_snapshot("v1", remote_time, |snap| {
            snap.player.xp = 500;
            snap.phases[0].tasks[0].completed = true;
        })))
    });

    let outcome = fx.orchestrator.sync_now().await.unwrap();
    assert_eq!(outcome.action, SyncAction::Pulled);
    assert!(fx.remote.push_calls().is_empty());

    // The merged result replaced the local snapshot and adopted the remote
    // revision stamp.
    let snapshot = fx.store.snapshot();
    assert_eq!(snapshot.player.xp, 500);
    assert!(snapshot.find_task("0.1").unwrap().1.completed);
    assert_eq!(snapshot.local_timestamp, remote_time);
}

#[tokio::test]
async fn equal_timestamps_transfer_nothing() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    let local_time = fx.store.snapshot().local_timestamp;

    fx.remote
        .on_fetch(move |_| Ok(Some(remote_snapshot("v1", local_time, |_| {}))));

    let outcome = fx.orchestrator.sync_now().await.unwrap();
    assert_eq!(outcome.action, SyncAction::Unchanged);
    assert!(fx.remote.push_calls().is_empty());
    assert_eq!(fx.orchestrator.status().state, SyncState::Synced);
}

// ============================================================================
// Conflicts
// ============================================================================

#[tokio::test]
async fn stale_version_retries_exactly_once_then_errors() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    let local_time = fx.store.snapshot().local_timestamp;

    // Remote is always older, and every push reports a stale version.
    fx.remote.on_fetch(move |call| {
        Ok(Some(remote_snapshot(
            &format!("v{call}"),
            local_time - 1000,
            |_| {},
        )))
    });
    fx.remote.on_push(|_, _, _| Err(SyncError::Conflict));

    let err = fx.orchestrator.sync_now().await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict));
    // One initial cycle plus exactly one re-fetch/retry, no storm.
    assert_eq!(fx.remote.fetch_calls(), 2);
    assert_eq!(fx.remote.push_calls().len(), 2);
    assert!(matches!(fx.orchestrator.status().state, SyncState::Error(_)));
}

#[tokio::test]
async fn conflict_resolved_on_the_retry_succeeds() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    let local_time = fx.store.snapshot().local_timestamp;

    fx.remote.on_fetch(move |call| {
        Ok(Some(remote_snapshot(
            &format!("v{call}"),
            local_time - 1000,
            |_| {},
        )))
    });
    fx.remote.on_push(|_, _, call| {
        if call == 0 {
            Err(SyncError::Conflict)
        } else {
            Ok("sha-final".to_string())
        }
    });

    let outcome = fx.orchestrator.sync_now().await.unwrap();
    assert_eq!(outcome.action, SyncAction::Pushed);
    assert_eq!(fx.remote.fetch_calls(), 2);
    assert_eq!(
        fx.orchestrator.status().remote_version.as_deref(),
        Some("sha-final")
    );
}

#[tokio::test]
async fn transport_failure_leaves_local_data_intact() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    fx.store.complete_task("0.1").unwrap();
    fx.remote.on_push(|_, _, _| Err(SyncError::transport("boom")));

    let err = fx.orchestrator.sync_now().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));

    let status = fx.orchestrator.status();
    assert!(matches!(status.state, SyncState::Error(_)));
    assert!(status.last_error.unwrap().contains("boom"));
    assert_eq!(fx.store.snapshot().player.xp, 50);
}

// ============================================================================
// Debounce and flush
// ============================================================================

#[tokio::test]
async fn mutation_burst_coalesces_into_one_push() {
    let fx = setup(50);
    fx.orchestrator.set_token("tok");

    fx.store.complete_task("0.1").unwrap();
    fx.store.complete_task("0.2").unwrap();
    assert_eq!(fx.orchestrator.status().state, SyncState::Pending);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(fx.remote.push_calls().len(), 1);
    assert_eq!(fx.orchestrator.status().state, SyncState::Synced);
    // The pushed snapshot contains both completions.
    let pushed = fx.remote.last_pushed().unwrap();
    assert!(pushed.find_task("0.1").unwrap().1.completed);
    assert!(pushed.find_task("0.2").unwrap().1.completed);
}

#[tokio::test]
async fn flush_runs_the_pending_push_without_waiting() {
    let fx = setup(60_000);
    fx.orchestrator.set_token("tok");

    fx.store.complete_task("0.1").unwrap();
    let outcome = fx.orchestrator.flush().await.unwrap().unwrap();
    assert_eq!(outcome.action, SyncAction::Pushed);
    assert_eq!(fx.remote.push_calls().len(), 1);

    // Nothing pending afterwards.
    assert!(fx.orchestrator.flush().await.unwrap().is_none());
    assert_eq!(fx.orchestrator.status().state, SyncState::Synced);
}

#[tokio::test]
async fn mutation_during_an_inflight_push_is_pushed_by_the_follow_up() {
    let fx = setup(50);
    fx.orchestrator.set_token("tok");
    fx.remote.set_push_delay(Duration::from_millis(200));

    fx.store.complete_task("0.1").unwrap();
    // Let the debounce fire and the first push get in flight, then mutate
    // while it is still on the wire.
    tokio::time::sleep(Duration::from_millis(100)).await;
    fx.store.complete_task("0.2").unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;

    // The first push predates the second mutation, so a follow-up push must
    // have delivered it.
    assert_eq!(fx.remote.push_calls().len(), 2);
    let pushed = fx.remote.last_pushed().unwrap();
    assert!(pushed.find_task("0.1").unwrap().1.completed);
    assert!(pushed.find_task("0.2").unwrap().1.completed);
    assert_eq!(fx.orchestrator.status().state, SyncState::Synced);
}

#[tokio::test]
async fn local_mutation_after_a_failed_sync_reports_pending() {
    let fx = setup(60_000);
    fx.orchestrator.set_token("tok");
    fx.store.complete_task("0.1").unwrap();
    fx.remote.on_push(|_, _, _| Err(SyncError::transport("boom")));

    let err = fx.orchestrator.flush().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
    assert!(matches!(fx.orchestrator.status().state, SyncState::Error(_)));

    // A new mutation outranks the stale error, but the message remains
    // available for display.
    fx.store.complete_task("0.2").unwrap();
    let status = fx.orchestrator.status();
    assert_eq!(status.state, SyncState::Pending);
    assert!(status.last_error.unwrap().contains("boom"));
}

#[tokio::test]
async fn mutations_without_a_token_never_schedule_pushes() {
    let fx = setup(20);
    fx.store.complete_task("0.1").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fx.remote.push_calls().is_empty());
    assert_eq!(fx.orchestrator.status().state, SyncState::Disconnected);
}

// ============================================================================
// Reset
// ============================================================================

#[tokio::test]
async fn reset_pushes_the_fresh_default_as_authoritative() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    fx.store.complete_task("0.1").unwrap();
    fx.orchestrator.sync_now().await.unwrap();

    let fresh = fx.orchestrator.reset_all().await.unwrap();
    assert_eq!(fresh.player.xp, 0);

    let pushed = fx.remote.last_pushed().unwrap();
    assert_eq!(pushed.player.xp, 0);
    assert!(!pushed.find_task("0.1").unwrap().1.completed);
}

#[tokio::test]
async fn reset_overwrites_remote_even_on_a_version_conflict() {
    let fx = setup(3000);
    fx.orchestrator.set_token("tok");
    fx.orchestrator.sync_now().await.unwrap();

    let local_time = fx.store.snapshot().local_timestamp;
    fx.remote
        .on_fetch(move |_| Ok(Some(remote_snapshot("v-current", local_time + 10, |_| {}))));
    fx.remote.on_push(|_, expected, _| match expected {
        Some("v-current") => Ok("sha-after-reset".to_string()),
        _ => Err(SyncError::Conflict),
    });

    fx.orchestrator.reset_all().await.unwrap();
    assert_eq!(
        fx.orchestrator.status().remote_version.as_deref(),
        Some("sha-after-reset")
    );
}

#[tokio::test]
async fn reset_without_a_token_stays_local() {
    let fx = setup(3000);
    fx.store.complete_task("0.1").unwrap();
    let fresh = fx.orchestrator.reset_all().await.unwrap();
    assert_eq!(fresh.player.xp, 0);
    assert!(fx.remote.push_calls().is_empty());
}
