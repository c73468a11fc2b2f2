//! End-to-end reconciliation properties: resolution order, the grace
//! window's anti-clobber behavior, idempotent save application, and
//! corrupt-tier resilience.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use prompter_core::config::EngineConfig;
use prompter_core::types::{ContentSnapshot, FieldChange, FieldName, SnapshotOrigin};
use prompter_engine::scheduler::{maybe_sync, SyncOutcome};
use prompter_engine::{ContentEngine, ContentSource, EngineError};

fn field(name: &str) -> FieldName {
    FieldName::from(name)
}

fn remote_snapshot(
    at: DateTime<Utc>,
    fetched: BTreeMap<FieldName, String>,
) -> ContentSnapshot {
    ContentSnapshot::new(fetched, SnapshotOrigin::RemoteFetch, at)
}

fn open_engine(dir: &TempDir, config: EngineConfig) -> ContentEngine {
    ContentEngine::open_at(Utc::now(), config, dir.path()).expect("open engine")
}

struct StaticSource(BTreeMap<FieldName, String>);

impl StaticSource {
    fn of(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (field(k), v.to_string()))
                .collect(),
        )
    }
}

impl ContentSource for StaticSource {
    fn fetch_content(&self) -> Result<BTreeMap<FieldName, String>, EngineError> {
        Ok(self.0.clone())
    }

    fn push_save(&self, _changes: &[FieldChange]) -> Result<(), EngineError> {
        Ok(())
    }
}

#[test]
fn pending_beats_local_beats_remote() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(&dir, EngineConfig::default());
    let t0 = Utc::now();

    // remote: fetched value
    let mut fetched = BTreeMap::new();
    fetched.insert(field("hero_title"), "fetched".to_string());
    engine.apply_remote_fetch_at(t0, remote_snapshot(t0, fetched));

    // local: confirmed save (also arms the guard, irrelevant here)
    engine.apply_saved_changes_at(t0, &[FieldChange::new("hero_title", "saved")]);

    // pending: staged edit
    engine.set_editing_at(t0, true);
    engine
        .stage_edit_at(t0, field("hero_title"), "draft".to_string())
        .unwrap();

    assert_eq!(engine.resolve(&field("hero_title"), "x"), "draft");

    // Remove pending → local wins; clear local via a post-grace fetch → remote.
    engine.set_editing_at(t0, false);
    assert_eq!(engine.resolve(&field("hero_title"), "x"), "saved");
}

#[test]
fn grace_suppresses_overwrite_then_expiry_permits_it() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(&dir, EngineConfig::default());
    let t0 = Utc::now();

    engine.apply_saved_changes_at(t0, &[FieldChange::new("hero_title", "A")]);
    assert!(engine.guard().is_active_at(t0));

    // A fetch that was in flight when the save landed resolves 5 s later.
    let mut fetched = BTreeMap::new();
    fetched.insert(field("hero_title"), "B".to_string());
    let raced = t0 + Duration::seconds(5);
    engine.apply_remote_fetch_at(raced, remote_snapshot(raced, fetched.clone()));
    assert_eq!(engine.resolve(&field("hero_title"), "x"), "A");

    // Past the 30 s window the same fetch result is accepted.
    let expired = t0 + Duration::seconds(31);
    engine.apply_remote_fetch_at(expired, remote_snapshot(expired, fetched));
    assert_eq!(engine.resolve(&field("hero_title"), "x"), "B");
}

#[test]
fn applying_the_same_save_twice_equals_applying_it_once() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(&dir, EngineConfig::default());
    let t0 = Utc::now();
    let changes = [
        FieldChange::new("hero_title", "Edited"),
        FieldChange::new("hero_subtitle", "Also edited"),
    ];

    engine.apply_saved_changes_at(t0, &changes);
    let first: Vec<_> = engine.resolved_fields();

    engine.apply_saved_changes_at(t0 + Duration::seconds(1), &changes);
    let second: Vec<_> = engine.resolved_fields();

    let values = |fields: &[prompter_core::types::Field]| {
        fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(values(&first), values(&second));
}

#[test]
fn corrupt_durable_tier_never_breaks_resolution() {
    let dir = TempDir::new().unwrap();
    {
        let mut engine = open_engine(&dir, EngineConfig::default());
        engine.apply_saved_changes(&[FieldChange::new("hero_title", "Persisted")]);
    }

    // Trash the durable tier behind the engine's back.
    std::fs::write(dir.path().join("content.json"), "\u{0}garbage\u{0}not json").unwrap();

    let mut config = EngineConfig::default();
    config
        .defaults
        .insert(field("hero_title"), "Built-in".to_string());
    let engine = open_engine(&dir, config);

    // The archive tier still holds the record, so the value survives; at
    // worst resolution would fall back to the default — never panic.
    let value = engine.resolve_or_default(&field("hero_title"));
    assert!(value == "Persisted" || value == "Built-in");
    assert!(
        !dir.path().join("content.json").exists(),
        "corrupt record should be discarded"
    );
}

#[test]
fn corrupt_everything_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    {
        let mut engine = open_engine(&dir, EngineConfig::default());
        engine.apply_saved_changes(&[FieldChange::new("hero_title", "Persisted")]);
    }
    std::fs::write(dir.path().join("content.json"), "{broken").unwrap();
    std::fs::write(dir.path().join("archive").join("latest.json"), "[]").unwrap();

    let mut config = EngineConfig::default();
    config
        .defaults
        .insert(field("hero_title"), "Built-in".to_string());
    let engine = open_engine(&dir, config);

    assert_eq!(engine.resolve_or_default(&field("hero_title")), "Built-in");
    assert_eq!(engine.resolve(&field("hero_title"), "fb"), "fb");
}

// The full walkthrough: fetch → edit+save → raced fetch suppressed →
// post-grace fetch accepted.
#[test]
fn save_then_raced_fetch_then_expiry_scenario() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(&dir, EngineConfig::default());
    let t0 = Utc::now();

    let mut initial = BTreeMap::new();
    initial.insert(field("hero_title"), "Welcome".to_string());
    engine.apply_remote_fetch_at(t0, remote_snapshot(t0, initial));
    assert_eq!(engine.resolve(&field("hero_title"), "x"), "Welcome");

    engine.apply_saved_changes_at(t0 + Duration::seconds(1), &[FieldChange::new(
        "hero_title",
        "Edited",
    )]);
    assert_eq!(engine.resolve(&field("hero_title"), "x"), "Edited");
    assert!(engine.guard().is_active_at(t0 + Duration::seconds(1)));

    // A re-fetch still returning the old value lands inside the window.
    let mut stale = BTreeMap::new();
    stale.insert(field("hero_title"), "Welcome".to_string());
    let raced = t0 + Duration::seconds(6);
    engine.apply_remote_fetch_at(raced, remote_snapshot(raced, stale.clone()));
    assert_eq!(engine.resolve(&field("hero_title"), "x"), "Edited");

    // After expiry the remote store is authoritative again.
    let expired = t0 + Duration::seconds(40);
    engine.apply_remote_fetch_at(expired, remote_snapshot(expired, stale));
    assert_eq!(engine.resolve(&field("hero_title"), "x"), "Welcome");
}

// Same race, driven through the real scheduler with a short grace window.
#[test]
fn scheduler_honors_grace_expiry_in_real_time() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        grace_ms: 100,
        sync_cooldown_ms: 0,
        ..EngineConfig::default()
    };
    let engine = Mutex::new(open_engine(&dir, config));
    let source = StaticSource::of(&[("hero_title", "Welcome")]);

    engine
        .lock()
        .unwrap()
        .apply_saved_changes(&[FieldChange::new("hero_title", "Edited")]);

    // Inside the window a forced sync fetches but cannot overwrite.
    let outcome = maybe_sync(&engine, &source, true).expect("forced sync");
    match outcome {
        SyncOutcome::Completed { suppressed, .. } => assert_eq!(suppressed, 1),
        other => panic!("expected completed outcome, got {other:?}"),
    }
    assert_eq!(
        engine.lock().unwrap().resolve(&field("hero_title"), "x"),
        "Edited"
    );

    std::thread::sleep(std::time::Duration::from_millis(150));

    let outcome = maybe_sync(&engine, &source, false).expect("scheduled sync");
    assert!(outcome.ran(), "expired window must permit the sync");
    assert_eq!(
        engine.lock().unwrap().resolve(&field("hero_title"), "x"),
        "Welcome"
    );
}
