//! Sync scheduler — decides whether a remote re-fetch may run right now.
//!
//! Triggers live in the daemon (startup, visibility messages, the idle
//! ticker); this module owns the guard-condition chain and the fetch/apply
//! sequencing. The engine lock is dropped across the network fetch and the
//! fetched snapshot goes through the guard-checked write path, so a fetch
//! that resolves after a save landed gets its write suppressed — the fetch
//! itself is never cancelled.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;

use prompter_core::types::{ContentSnapshot, SnapshotOrigin};

use crate::engine::ContentEngine;
use crate::error::EngineError;
use crate::remote::ContentSource;

/// Why a sync attempt did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSkip {
    /// The grace window after a confirmed save is still open.
    GraceActive,
    /// Unconfirmed edits exist; syncing would race the save.
    PendingEdits,
    /// Still inside the post-save cooldown.
    Cooldown,
    /// Another sync holds the single in-flight slot; this one is a no-op.
    InFlight,
}

/// Result of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped(SyncSkip),
    Completed {
        applied: usize,
        suppressed: usize,
        refreshed_cache: bool,
    },
}

impl SyncOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, SyncOutcome::Completed { .. })
    }
}

/// Fetch remote content and apply it, unless a guard condition says no.
///
/// `force` bypasses every precondition; the write-time grace check in the
/// engine remains the safety net. A network failure leaves every tier
/// untouched, records `connected = false`, and is returned to the caller —
/// the next trigger simply retries (no backoff).
pub fn maybe_sync(
    engine: &Mutex<ContentEngine>,
    source: &dyn ContentSource,
    force: bool,
) -> Result<SyncOutcome, EngineError> {
    {
        let mut engine = lock(engine);
        let now = Utc::now();

        if !force {
            if engine.guard().is_active_at(now) {
                tracing::debug!("sync skipped: grace window active");
                return Ok(SyncOutcome::Skipped(SyncSkip::GraceActive));
            }
            if engine.has_pending() {
                tracing::debug!("sync skipped: pending edits");
                return Ok(SyncOutcome::Skipped(SyncSkip::PendingEdits));
            }
            if engine.within_save_cooldown_at(now) {
                tracing::debug!("sync skipped: inside save cooldown");
                return Ok(SyncOutcome::Skipped(SyncSkip::Cooldown));
            }
            if !engine.begin_sync() {
                tracing::debug!("sync skipped: already in flight");
                return Ok(SyncOutcome::Skipped(SyncSkip::InFlight));
            }
        } else {
            // Forced syncs do not wait on an in-flight attempt.
            let _ = engine.begin_sync();
        }
    }

    // Network I/O happens without the engine lock; this is the window the
    // grace guard exists for.
    let fetched = source.fetch_content();

    let mut engine = lock(engine);
    let now = Utc::now();
    match fetched {
        Ok(fetched) => {
            let snapshot = ContentSnapshot::new(fetched, SnapshotOrigin::RemoteFetch, now);
            let summary = engine.apply_remote_fetch_at(now, snapshot);
            engine.finish_sync_at(now, true);
            tracing::info!(
                "sync completed: {} applied, {} suppressed",
                summary.applied,
                summary.suppressed,
            );
            Ok(SyncOutcome::Completed {
                applied: summary.applied,
                suppressed: summary.suppressed,
                refreshed_cache: summary.refreshed_cache,
            })
        }
        Err(err) => {
            engine.finish_sync_at(now, false);
            tracing::warn!("sync failed: {err}");
            Err(err)
        }
    }
}

fn lock(engine: &Mutex<ContentEngine>) -> MutexGuard<'_, ContentEngine> {
    engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
