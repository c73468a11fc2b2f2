//! Layer reconciler — the single code path that turns the three competing
//! snapshots into one observable value per field.
//!
//! Resolution precedence, strict and total:
//! 1. `pending[field]`, if defined and non-empty
//! 2. `local[field]`, if defined and non-empty
//! 3. `remote[field]`, if defined and non-empty
//! 4. the caller's fallback
//!
//! The empty string counts as absent at every level: an edit that clears a
//! field does not suppress a lower-priority non-empty value. This is a
//! deliberate, load-bearing convention (see DESIGN.md).

use std::collections::{BTreeMap, BTreeSet};

use prompter_core::types::{FieldName, FieldSource};

/// The three in-memory snapshots the reconciler arbitrates between.
#[derive(Debug, Default, Clone)]
pub struct Layers {
    pub remote: BTreeMap<FieldName, String>,
    pub local: BTreeMap<FieldName, String>,
    pub pending: BTreeMap<FieldName, String>,
}

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one field to its user-visible value.
    pub fn resolve(&self, field: &FieldName, fallback: &str) -> String {
        self.resolve_with_source(field, fallback).0
    }

    /// Resolve one field, also reporting which layer won (`None` when the
    /// fallback was used).
    pub fn resolve_with_source(
        &self,
        field: &FieldName,
        fallback: &str,
    ) -> (String, Option<FieldSource>) {
        if let Some(value) = non_empty(&self.pending, field) {
            return (value.clone(), Some(FieldSource::Pending));
        }
        if let Some(value) = non_empty(&self.local, field) {
            return (value.clone(), Some(FieldSource::Local));
        }
        if let Some(value) = non_empty(&self.remote, field) {
            return (value.clone(), Some(FieldSource::Remote));
        }
        (fallback.to_string(), None)
    }

    /// Resolve one field as if no edit were pending: local > remote >
    /// `fallback`. Used to show what a pending edit would replace.
    pub fn resolve_confirmed(&self, field: &FieldName, fallback: &str) -> String {
        if let Some(value) = non_empty(&self.local, field) {
            return value.clone();
        }
        if let Some(value) = non_empty(&self.remote, field) {
            return value.clone();
        }
        fallback.to_string()
    }

    /// Every field name any layer knows about.
    pub fn field_names(&self) -> BTreeSet<FieldName> {
        self.pending
            .keys()
            .chain(self.local.keys())
            .chain(self.remote.keys())
            .cloned()
            .collect()
    }
}

fn non_empty<'a>(map: &'a BTreeMap<FieldName, String>, field: &FieldName) -> Option<&'a String> {
    map.get(field).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Change notification
// ---------------------------------------------------------------------------

/// Callback invoked with a field name and its newly resolved value.
pub type FieldObserver = Box<dyn Fn(&FieldName, &str) + Send>;

/// Registered observers, fired whenever a field's resolution changes.
#[derive(Default)]
pub struct Notifier {
    observers: Vec<FieldObserver>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: FieldObserver) {
        self.observers.push(observer);
    }

    pub fn notify(&self, field: &FieldName, value: &str) {
        for observer in &self.observers {
            observer(field, value);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}
