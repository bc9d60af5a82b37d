//! Sync orchestrator — coordinates the progress store and the remote client.
//!
//! Owns the credential, the status state machine, the remote version token
//! and the debounce timer. Cycles are serialized behind an async lock so at
//! most one pull/push sequence touches the snapshot and version token at a
//! time; a debounce firing while a cycle is in flight waits behind it and
//! then no-ops if the dirtiness was already flushed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;

use crate::error::SyncError;
use crate::model::ProgressSnapshot;
use crate::remote::RemoteStore;
use crate::store::{LocalSlot, ProgressStore};

use super::merge::merge_snapshots;
use super::types::{SyncAction, SyncOutcome, SyncState, SyncStatus};

/// Slot key holding the persisted bearer token.
pub const TOKEN_KEY: &str = "plantpro_github_token";

/// Delay between the last local mutation and the outbound push.
pub const DEFAULT_DEBOUNCE_MS: u64 = 3000;

pub struct SyncOrchestratorOptions {
    pub store: Arc<ProgressStore>,
    pub remote: Arc<dyn RemoteStore>,
    /// Slot for credential persistence (usually the same one backing the
    /// store).
    pub slot: Arc<dyn LocalSlot>,
    /// Debounce interval override, mainly for tests.
    pub debounce_ms: Option<u64>,
}

struct Inner {
    token: Option<String>,
    syncing: bool,
    pending: bool,
    last_error: Option<String>,
    remote_version: Option<String>,
    last_sync_time: Option<i64>,
    /// Cancel-and-reschedule generation for the debounce timer: a timer
    /// only fires if its generation is still current.
    debounce_gen: u64,
}

pub struct SyncOrchestrator {
    store: Arc<ProgressStore>,
    remote: Arc<dyn RemoteStore>,
    slot: Arc<dyn LocalSlot>,
    debounce_ms: u64,
    inner: Mutex<Inner>,
    /// Serializes sync cycles (one logical cycle in flight at a time).
    cycle: TokioMutex<()>,
}

impl SyncOrchestrator {
    /// Create the orchestrator, loading any persisted credential and wiring
    /// the store's mutation callback to the debounce scheduler.
    pub fn new(options: SyncOrchestratorOptions) -> Arc<Self> {
        let token = options.slot.get(TOKEN_KEY);
        let orchestrator = Arc::new(Self {
            store: options.store,
            remote: options.remote,
            slot: options.slot,
            debounce_ms: options.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            inner: Mutex::new(Inner {
                token,
                syncing: false,
                pending: false,
                last_error: None,
                remote_version: None,
                last_sync_time: None,
                debounce_gen: 0,
            }),
            cycle: TokioMutex::new(()),
        });

        let weak = Arc::downgrade(&orchestrator);
        orchestrator.store.set_on_mutate(Arc::new(move || {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.mark_dirty();
            }
        }));

        orchestrator
    }

    // -----------------------------------------------------------------------
    // Credential
    // -----------------------------------------------------------------------

    /// Consume a one-time `token` query parameter.
    ///
    /// A present non-empty value sets (and persists) the credential; a
    /// present empty value disconnects; an absent parameter changes nothing.
    /// Returns whether the parameter was present, so the caller knows to
    /// strip it from the visible address.
    pub fn apply_query_credential(&self, query: &str) -> bool {
        let query = query.strip_prefix('?').unwrap_or(query);
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key != "token" {
                continue;
            }
            if value.is_empty() {
                self.disconnect();
            } else {
                self.set_token(value);
            }
            return true;
        }
        false
    }

    /// Set the bearer token, persisting it and clearing any prior error.
    pub fn set_token(&self, token: &str) {
        if let Err(err) = self.slot.set(TOKEN_KEY, token) {
            tracing::warn!(error = %err, "failed to persist sync token");
        }
        let mut inner = self.inner.lock();
        inner.token = Some(token.to_string());
        inner.last_error = None;
    }

    pub fn is_configured(&self) -> bool {
        self.inner.lock().token.is_some()
    }

    /// Clear the credential and all remote bookkeeping. Local snapshot
    /// contents are untouched.
    pub fn disconnect(&self) {
        self.slot.remove(TOKEN_KEY);
        let mut inner = self.inner.lock();
        inner.token = None;
        inner.remote_version = None;
        inner.last_sync_time = None;
        inner.last_error = None;
        inner.pending = false;
        inner.debounce_gen += 1;
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn status(&self) -> SyncStatus {
        let inner = self.inner.lock();
        let state = if inner.syncing {
            SyncState::Syncing
        } else if inner.pending {
            // A fresh local mutation outranks a stale error; the message
            // stays in `last_error` for display.
            SyncState::Pending
        } else if let Some(message) = &inner.last_error {
            SyncState::Error(message.clone())
        } else if inner.token.is_some() {
            SyncState::Synced
        } else {
            SyncState::Disconnected
        };
        SyncStatus {
            state,
            has_token: inner.token.is_some(),
            remote_version: inner.remote_version.clone(),
            last_sync_time: inner.last_sync_time,
            last_error: inner.last_error.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Dirtiness and debounce
    // -----------------------------------------------------------------------

    /// Note a local mutation: mark pending and (re)schedule the debounced
    /// push. Each call resets the timer, so only the last mutation in a
    /// burst triggers a network call. No-op without a configured token.
    pub fn mark_dirty(self: Arc<Self>) {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.token.is_none() {
                return;
            }
            inner.pending = true;
            inner.debounce_gen += 1;
            inner.debounce_gen
        };

        // Outside a runtime (synchronous callers), stay Pending until an
        // explicit sync_now/flush.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let this = self;
        handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(this.debounce_ms)).await;
            if this.inner.lock().debounce_gen != generation {
                return;
            }
            match this.push_pending().await {
                // Credential cleared while the timer was pending.
                Err(SyncError::NotConfigured) => {}
                Err(err) => tracing::warn!(error = %err, "debounced push failed"),
                Ok(_) => {}
            }
        });
    }

    /// Run any pending push immediately (cancelling the debounce timer).
    /// Returns `Ok(None)` when there was nothing to flush.
    pub async fn flush(&self) -> Result<Option<SyncOutcome>, SyncError> {
        {
            let mut inner = self.inner.lock();
            inner.debounce_gen += 1;
            if !inner.pending {
                return Ok(None);
            }
        }
        self.push_pending().await.map(Some)
    }

    // -----------------------------------------------------------------------
    // Sync cycles
    // -----------------------------------------------------------------------

    /// Manual/startup sync: cancel any pending debounce and run a full
    /// pull-then-decide cycle.
    pub async fn sync_now(&self) -> Result<SyncOutcome, SyncError> {
        let token = self.require_token()?;
        let started_gen = {
            let mut inner = self.inner.lock();
            inner.debounce_gen += 1;
            inner.debounce_gen
        };
        let _guard = self.cycle.lock().await;
        self.inner.lock().syncing = true;
        let result = self.run_cycle(&token, 1).await;
        self.conclude(started_gen, result)
    }

    /// Debounce/flush path: push the local snapshot against the last known
    /// remote version. A version conflict falls back to one full
    /// pull-then-decide cycle; a second conflict there surfaces as an error.
    async fn push_pending(&self) -> Result<SyncOutcome, SyncError> {
        let token = self.require_token()?;
        let _guard = self.cycle.lock().await;
        let started_gen = {
            let mut inner = self.inner.lock();
            if !inner.pending {
                // An earlier cycle already flushed this dirtiness.
                drop(inner);
                return Ok(SyncOutcome {
                    action: SyncAction::Unchanged,
                    snapshot: self.store.snapshot(),
                });
            }
            inner.syncing = true;
            inner.debounce_gen
        };
        let result = self.push_once(&token).await;
        self.conclude(started_gen, result)
    }

    async fn push_once(&self, token: &str) -> Result<SyncOutcome, SyncError> {
        let snapshot = self.store.snapshot();
        let expected = self.inner.lock().remote_version.clone();
        match self.remote.push(token, &snapshot, expected.as_deref()).await {
            Ok(version) => {
                self.inner.lock().remote_version = Some(version);
                Ok(SyncOutcome {
                    action: SyncAction::Pushed,
                    snapshot,
                })
            }
            Err(SyncError::Conflict) => {
                tracing::debug!("push conflict, re-running pull-then-decide");
                self.run_cycle(token, 0).await
            }
            Err(err) => Err(err),
        }
    }

    /// Pull-then-decide. `conflict_retries` bounds how many times a stale
    /// push version restarts the cycle; the retry budget is spent exactly
    /// once per trigger, never replenished.
    async fn run_cycle(
        &self,
        token: &str,
        mut conflict_retries: u32,
    ) -> Result<SyncOutcome, SyncError> {
        loop {
            let Some(remote) = self.remote.fetch(token).await? else {
                // First-time user: local becomes the initial remote state.
                let snapshot = self.store.snapshot();
                let version = self.remote.push(token, &snapshot, None).await?;
                self.inner.lock().remote_version = Some(version);
                return Ok(SyncOutcome {
                    action: SyncAction::Pushed,
                    snapshot,
                });
            };

            self.inner.lock().remote_version = Some(remote.version.clone());
            let local = self.store.snapshot();
            let remote_time = remote.last_modified();
            let local_time = local.local_timestamp;

            if remote_time > local_time {
                let merged = merge_snapshots(&local, &remote.content, remote_time);
                self.store.replace_snapshot(merged.clone());
                tracing::debug!(remote_time, local_time, "pulled newer remote snapshot");
                return Ok(SyncOutcome {
                    action: SyncAction::Pulled,
                    snapshot: merged,
                });
            }

            if local_time > remote_time {
                match self.remote.push(token, &local, Some(&remote.version)).await {
                    Ok(version) => {
                        self.inner.lock().remote_version = Some(version);
                        return Ok(SyncOutcome {
                            action: SyncAction::Pushed,
                            snapshot: local,
                        });
                    }
                    Err(SyncError::Conflict) if conflict_retries > 0 => {
                        conflict_retries -= 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            return Ok(SyncOutcome {
                action: SyncAction::Unchanged,
                snapshot: local,
            });
        }
    }

    /// Reset local progress and, when configured, overwrite the remote copy
    /// with the fresh default as the new authoritative state.
    pub async fn reset_all(&self) -> Result<ProgressSnapshot, SyncError> {
        let fresh = self.store.reset();
        let (token, started_gen) = {
            let mut inner = self.inner.lock();
            // The reset mutation scheduled a debounce; supersede it.
            inner.debounce_gen += 1;
            inner.pending = false;
            (inner.token.clone(), inner.debounce_gen)
        };
        let Some(token) = token else {
            return Ok(fresh);
        };

        let _guard = self.cycle.lock().await;
        self.inner.lock().syncing = true;
        let result = self.overwrite_remote(&token, &fresh).await;
        self.conclude(started_gen, result)?;
        Ok(self.store.snapshot())
    }

    /// Push unconditionally: on a version conflict, re-fetch only to learn
    /// the current version and push again. A reset is authoritative, so no
    /// merge happens here.
    async fn overwrite_remote(
        &self,
        token: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<SyncOutcome, SyncError> {
        let expected = self.inner.lock().remote_version.clone();
        let version = match self.remote.push(token, snapshot, expected.as_deref()).await {
            Ok(version) => version,
            Err(SyncError::Conflict) => {
                let current = self.remote.fetch(token).await?.map(|r| r.version);
                self.remote.push(token, snapshot, current.as_deref()).await?
            }
            Err(err) => return Err(err),
        };
        self.inner.lock().remote_version = Some(version);
        Ok(SyncOutcome {
            action: SyncAction::Pushed,
            snapshot: snapshot.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn require_token(&self) -> Result<String, SyncError> {
        self.inner.lock().token.clone().ok_or(SyncError::NotConfigured)
    }

    /// Close out a cycle: clear the syncing flag, then either mark the
    /// state synced or retain the error message for display.
    ///
    /// Dirtiness is cleared only if `started_gen` is still current: a local
    /// mutation that landed while the cycle was in flight was not captured
    /// by the snapshot it pushed, so it must stay pending for the follow-up
    /// debounce to deliver.
    fn conclude(
        &self,
        started_gen: u64,
        result: Result<SyncOutcome, SyncError>,
    ) -> Result<SyncOutcome, SyncError> {
        let mut inner = self.inner.lock();
        inner.syncing = false;
        if inner.debounce_gen == started_gen {
            inner.pending = false;
        }
        match &result {
            Ok(_) => {
                inner.last_sync_time = Some(Utc::now().timestamp_millis());
                inner.last_error = None;
            }
            Err(err) => {
                inner.last_error = Some(err.to_string());
                tracing::warn!(error = %err, "sync cycle failed");
            }
        }
        result
    }
}
