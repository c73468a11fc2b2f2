//! The content engine handle.
//!
//! `ContentEngine` owns the tiered field store, the three reconciler
//! layers, the grace guard, and the sync state. Collaborators receive the
//! handle explicitly instead of reaching for process-wide globals, so tests
//! can build as many isolated engines as they need.
//!
//! Single-writer precondition: one human editor driving one message channel.
//! Nothing here defends against two editors staging edits concurrently.
//!
//! ## Save application — digest-gated
//!
//! 1. Canonically digest the save payload (SHA-256 over sorted pairs).
//! 2. Compare with the last applied digest → re-delivery only clears pending
//!    entries and re-arms the guard; tiers are already current.
//! 3. Otherwise write each pair into the remote and local layers, clear its
//!    pending entry, persist the local layer to every tier, arm the guard,
//!    and notify observers of changed resolutions.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use prompter_core::config::EngineConfig;
use prompter_core::types::{ContentSnapshot, Field, FieldChange, FieldName, SnapshotOrigin};
use prompter_core::validate::ValueLimits;

use crate::error::EngineError;
use crate::guard::GraceGuard;
use crate::layers::{FieldObserver, Layers, Notifier};
use crate::store::FieldStore;

// ---------------------------------------------------------------------------
// Sync state
// ---------------------------------------------------------------------------

/// Engine-wide sync bookkeeping. Created zeroed, lives as long as the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_save_at: Option<DateTime<Utc>>,
    pub sync_in_flight: bool,
    /// False until the first successful fetch, and again after any failed one.
    pub connected: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_sync_at: None,
            last_save_at: None,
            sync_in_flight: false,
            connected: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation summaries
// ---------------------------------------------------------------------------

/// Outcome of applying a confirmed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    /// Fields whose stored value actually changed.
    pub written: usize,
    /// Fields that already held the saved value.
    pub unchanged: usize,
}

/// Outcome of applying a remote fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    /// Fields written into the remote layer.
    pub applied: usize,
    /// Fields rejected because the grace window protected a local value.
    pub suppressed: usize,
    /// Whether the local cache tier was refreshed from this fetch.
    pub refreshed_cache: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ContentEngine {
    config: EngineConfig,
    limits: ValueLimits,
    store: FieldStore,
    layers: Layers,
    guard: GraceGuard,
    sync: SyncState,
    notifier: Notifier,
    editing: bool,
    touched: BTreeMap<FieldName, DateTime<Utc>>,
    opened_at: DateTime<Utc>,
    last_applied_digest: Option<String>,
}

impl ContentEngine {
    /// Open an engine rooted at `state_dir`, warming the local layer from
    /// the first tier that holds a decodable record.
    pub fn open_at(
        now: DateTime<Utc>,
        config: EngineConfig,
        state_dir: &Path,
    ) -> Result<Self, EngineError> {
        let store = FieldStore::open(state_dir, config.defaults.clone());
        let (cached, source) = store.load_cached();

        let mut layers = Layers::new();
        if !matches!(source, crate::store::CacheSource::Defaults) {
            tracing::info!(
                "warmed local layer with {} field(s) from {:?}",
                cached.len(),
                source,
            );
            layers.local = cached;
        }

        Ok(Self {
            limits: ValueLimits::new(config.max_field_bytes),
            config,
            store,
            layers,
            guard: GraceGuard::new(),
            sync: SyncState::default(),
            notifier: Notifier::new(),
            editing: false,
            touched: BTreeMap::new(),
            opened_at: now,
            last_applied_digest: None,
        })
    }

    /// `open_at` with the current instant.
    pub fn open(config: EngineConfig, state_dir: &Path) -> Result<Self, EngineError> {
        Self::open_at(Utc::now(), config, state_dir)
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn guard(&self) -> &GraceGuard {
        &self.guard
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.sync
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn editing(&self) -> bool {
        self.editing
    }

    pub fn has_pending(&self) -> bool {
        !self.layers.pending.is_empty()
    }

    /// Pending edits as a save payload, in field order.
    pub fn pending_changes(&self) -> Vec<FieldChange> {
        self.layers
            .pending
            .iter()
            .map(|(name, value)| FieldChange::new(name.clone(), value.clone()))
            .collect()
    }

    /// Register a field observer, fired with the newly resolved value
    /// whenever any layer changes a field's resolution.
    pub fn subscribe(&mut self, observer: FieldObserver) {
        self.notifier.subscribe(observer);
    }

    // -- resolution ---------------------------------------------------------

    /// Resolve one field: pending > local > remote > `fallback`.
    pub fn resolve(&self, field: &FieldName, fallback: &str) -> String {
        self.layers.resolve(field, fallback)
    }

    /// Resolve one field with the configured default as the fallback.
    pub fn resolve_or_default(&self, field: &FieldName) -> String {
        let fallback = self
            .store
            .defaults()
            .get(field)
            .map(String::as_str)
            .unwrap_or("");
        self.layers.resolve(field, fallback)
    }

    /// Resolved view of every known field, skipping fields no layer holds a
    /// non-empty value for.
    pub fn resolved_fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        for name in self.layers.field_names() {
            let (value, source) = self.layers.resolve_with_source(&name, "");
            let Some(source) = source else { continue };
            let updated_at = self.touched.get(&name).copied().unwrap_or(self.opened_at);
            fields.push(Field {
                name,
                value,
                source,
                updated_at,
            });
        }
        fields
    }

    // -- editing mode -------------------------------------------------------

    /// Toggle editing mode. Disabling clears the pending layer without
    /// committing anything.
    pub fn set_editing_at(&mut self, now: DateTime<Utc>, enabled: bool) {
        self.editing = enabled;
        if enabled || self.layers.pending.is_empty() {
            return;
        }
        let names: Vec<FieldName> = self.layers.pending.keys().cloned().collect();
        let before = self.snapshot_resolved(names.iter());
        self.layers.pending.clear();
        tracing::info!("editing disabled; discarded {} pending edit(s)", names.len());
        self.notify_changed_at(now, &before);
    }

    pub fn set_editing(&mut self, enabled: bool) {
        self.set_editing_at(Utc::now(), enabled);
    }

    /// Stage an edit into the pending layer. Validation runs first; a
    /// rejected value mutates nothing.
    pub fn stage_edit_at(
        &mut self,
        now: DateTime<Utc>,
        field: FieldName,
        value: String,
    ) -> Result<(), EngineError> {
        if !self.editing {
            return Err(EngineError::EditingDisabled);
        }
        self.limits.check(&field, &value)?;

        let before = self.snapshot_resolved([&field]);
        self.layers.pending.insert(field, value);
        self.notify_changed_at(now, &before);
        Ok(())
    }

    pub fn stage_edit(&mut self, field: FieldName, value: String) -> Result<(), EngineError> {
        self.stage_edit_at(Utc::now(), field, value)
    }

    // -- confirmed saves ----------------------------------------------------

    /// Apply a confirmed save: write remote + local layers, clear the
    /// matching pending entries, persist, arm the grace guard, notify.
    ///
    /// Re-delivery of an identical payload is detected by digest and skips
    /// the tier writes; the guard is still re-armed.
    pub fn apply_saved_changes_at(
        &mut self,
        now: DateTime<Utc>,
        changes: &[FieldChange],
    ) -> ApplySummary {
        let digest = digest_changes(changes);

        if self.last_applied_digest.as_deref() == Some(digest.as_str()) {
            tracing::debug!("repeated save payload ({digest}); tiers already current");
            let before = self.snapshot_resolved(changes.iter().map(|c| &c.field_name));
            for change in changes {
                self.layers.pending.remove(&change.field_name);
            }
            self.guard.arm_at(now, self.config.grace_ms);
            self.sync.last_save_at = Some(now);
            self.notify_changed_at(now, &before);
            return ApplySummary {
                written: 0,
                unchanged: changes.len(),
            };
        }

        let before = self.snapshot_resolved(changes.iter().map(|c| &c.field_name));
        let mut written = 0usize;
        let mut unchanged = 0usize;

        for change in changes {
            let current = self.layers.local.get(&change.field_name);
            if current == Some(&change.field_value)
                && self.layers.remote.get(&change.field_name) == Some(&change.field_value)
            {
                unchanged += 1;
            } else {
                self.layers
                    .remote
                    .insert(change.field_name.clone(), change.field_value.clone());
                self.layers
                    .local
                    .insert(change.field_name.clone(), change.field_value.clone());
                written += 1;
            }
            self.layers.pending.remove(&change.field_name);
        }

        if written > 0 {
            let local = self.layers.local.clone();
            let tiers = self.store.store_all(&local);
            tracing::info!(
                "applied save: {written} field(s) written to {tiers} tier(s), {unchanged} unchanged",
            );
        }

        self.guard.arm_at(now, self.config.grace_ms);
        self.sync.last_save_at = Some(now);
        self.last_applied_digest = Some(digest);
        self.notify_changed_at(now, &before);

        ApplySummary { written, unchanged }
    }

    pub fn apply_saved_changes(&mut self, changes: &[FieldChange]) -> ApplySummary {
        self.apply_saved_changes_at(Utc::now(), changes)
    }

    // -- remote fetches -----------------------------------------------------

    /// Apply a fetched content snapshot.
    ///
    /// The guard check happens here, at write time, not at fetch time: a
    /// fetch that raced a save may complete, but any field the local layer
    /// holds (non-empty) during an active grace window keeps its local value
    /// and the fetched one is dropped. Outside the window the fetch refreshes
    /// both the remote layer and the local cache tier.
    pub fn apply_remote_fetch_at(
        &mut self,
        now: DateTime<Utc>,
        snapshot: ContentSnapshot,
    ) -> FetchSummary {
        tracing::debug!(
            "applying {:?} snapshot of {} field(s) taken at {}",
            snapshot.origin,
            snapshot.fields.len(),
            snapshot.taken_at,
        );
        let fetched = snapshot.fields;
        let affected: BTreeSet<FieldName> = fetched
            .keys()
            .chain(self.layers.remote.keys())
            .chain(self.layers.local.keys())
            .cloned()
            .collect();
        let before = self.snapshot_resolved(affected.iter());

        let summary = if self.guard.is_active_at(now) {
            let mut applied = 0usize;
            let mut suppressed = 0usize;
            for (field, value) in fetched {
                let protected = self
                    .layers
                    .local
                    .get(&field)
                    .is_some_and(|v| !v.is_empty());
                if protected {
                    suppressed += 1;
                    tracing::info!("grace window active; keeping local value for '{field}'");
                } else {
                    self.layers.remote.insert(field, value);
                    applied += 1;
                }
            }
            FetchSummary {
                applied,
                suppressed,
                refreshed_cache: false,
            }
        } else {
            let applied = fetched.len();
            self.layers.remote = fetched.clone();
            self.layers.local = fetched;
            let local = self.layers.local.clone();
            self.store.store_all(&local);
            FetchSummary {
                applied,
                suppressed: 0,
                refreshed_cache: true,
            }
        };

        self.notify_changed_at(now, &before);
        summary
    }

    /// `apply_remote_fetch_at` with a fresh [`SnapshotOrigin::RemoteFetch`]
    /// snapshot taken now.
    pub fn apply_remote_fetch(&mut self, fetched: BTreeMap<FieldName, String>) -> FetchSummary {
        let now = Utc::now();
        self.apply_remote_fetch_at(
            now,
            ContentSnapshot::new(fetched, SnapshotOrigin::RemoteFetch, now),
        )
    }

    // -- sync bookkeeping ---------------------------------------------------

    /// Claim the single in-flight slot. Returns false if a sync is already
    /// running (the caller becomes a no-op, not a queue entry).
    pub fn begin_sync(&mut self) -> bool {
        if self.sync.sync_in_flight {
            return false;
        }
        self.sync.sync_in_flight = true;
        true
    }

    /// Release the in-flight slot and record the outcome.
    pub fn finish_sync_at(&mut self, now: DateTime<Utc>, success: bool) {
        self.sync.sync_in_flight = false;
        if success {
            self.sync.last_sync_at = Some(now);
            self.sync.connected = true;
        } else {
            self.sync.connected = false;
        }
    }

    pub fn finish_sync(&mut self, success: bool) {
        self.finish_sync_at(Utc::now(), success);
    }

    /// Whether `now` still falls inside the post-save cooldown.
    pub fn within_save_cooldown_at(&self, now: DateTime<Utc>) -> bool {
        match self.sync.last_save_at {
            Some(saved_at) => {
                now - saved_at < Duration::milliseconds(self.config.sync_cooldown_ms as i64)
            }
            None => false,
        }
    }

    // -- internals ----------------------------------------------------------

    fn snapshot_resolved<'a>(
        &self,
        fields: impl IntoIterator<Item = &'a FieldName>,
    ) -> BTreeMap<FieldName, String> {
        fields
            .into_iter()
            .map(|field| (field.clone(), self.layers.resolve(field, "")))
            .collect()
    }

    fn notify_changed_at(&mut self, now: DateTime<Utc>, before: &BTreeMap<FieldName, String>) {
        for (field, old) in before {
            let new = self.layers.resolve(field, "");
            if &new != old {
                self.touched.insert(field.clone(), now);
                self.notifier.notify(field, &new);
            }
        }
    }
}

impl std::fmt::Debug for ContentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentEngine")
            .field("editing", &self.editing)
            .field("pending", &self.layers.pending.len())
            .field("guard_armed", &self.guard.window().is_some())
            .field("sync", &self.sync)
            .finish()
    }
}

/// Canonical SHA-256 digest of a save payload (pairs sorted by field name).
pub fn digest_changes(changes: &[FieldChange]) -> String {
    let mut sorted: Vec<&FieldChange> = changes.iter().collect();
    sorted.sort_by(|a, b| a.field_name.cmp(&b.field_name));

    let mut hasher = Sha256::new();
    for change in sorted {
        hasher.update(change.field_name.0.as_bytes());
        hasher.update([0u8]);
        hasher.update(change.field_value.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
