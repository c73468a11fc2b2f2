//! Unified diff of pending edits against confirmed values.
//!
//! Used by `prompter status`/`prompter save` to show what a save would
//! change before it is sent. No state is mutated.

use similar::TextDiff;

use prompter_core::types::FieldName;

use crate::engine::ContentEngine;

/// The diff for a single pending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: FieldName,
    pub unified_diff: String,
}

/// Diff every pending edit against the value it would replace
/// (local > remote). Fields whose pending value matches the confirmed one
/// are skipped.
pub fn diff_pending(engine: &ContentEngine) -> Vec<FieldDiff> {
    let layers = engine.layers();
    let mut diffs = Vec::new();

    for (field, proposed) in &layers.pending {
        let confirmed = layers.resolve_confirmed(field, "");
        if &confirmed == proposed {
            continue;
        }

        let unified = TextDiff::from_lines(confirmed.as_str(), proposed.as_str())
            .unified_diff()
            .header("confirmed", "pending")
            .context_radius(3)
            .to_string();

        diffs.push(FieldDiff {
            field: field.clone(),
            unified_diff: unified,
        });
    }

    diffs
}
