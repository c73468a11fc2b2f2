//! Domain types for prompter content fields.
//!
//! Field values are always `String`; field names are strongly typed.
//! All persisted types are serializable/deserializable via serde, and the
//! wire shapes (`ContentRecord`, `FieldChange`) match the remote content API
//! contract exactly.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version tag written into every persisted content record.
pub const RECORD_VERSION: &str = "v1";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a content field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldName(pub String);

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for FieldName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FieldName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which layer a resolved field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Remote,
    Local,
    Pending,
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Remote => write!(f, "remote"),
            FieldSource::Local => write!(f, "local"),
            FieldSource::Pending => write!(f, "pending"),
        }
    }
}

/// What produced a content snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    RemoteFetch,
    UserEdit,
    MessageApplied,
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// The resolved view of a single field handed to presentation callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: FieldName,
    pub value: String,
    pub source: FieldSource,
    pub updated_at: DateTime<Utc>,
}

/// An immutable mapping from field name to value, tagged with its origin and
/// the instant it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub fields: BTreeMap<FieldName, String>,
    pub origin: SnapshotOrigin,
    pub taken_at: DateTime<Utc>,
}

impl ContentSnapshot {
    pub fn new(
        fields: BTreeMap<FieldName, String>,
        origin: SnapshotOrigin,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fields,
            origin,
            taken_at,
        }
    }
}

/// The persisted content record, duplicated across storage tiers.
///
/// Wire layout: `{ "version": "v1", "timestamp": <unix millis>, "content":
/// { "<field>": "<value>", ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub version: String,
    pub timestamp: i64,
    pub content: BTreeMap<FieldName, String>,
}

impl ContentRecord {
    /// Build a current-version record stamped at `now`.
    pub fn new_at(now: DateTime<Utc>, content: BTreeMap<FieldName, String>) -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            timestamp: now.timestamp_millis(),
            content,
        }
    }

    /// Whether this record carries the version tag this build understands.
    pub fn is_current_version(&self) -> bool {
        self.version == RECORD_VERSION
    }
}

/// One entry in a save payload; field names match the remote save API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: FieldName,
    pub field_value: String,
}

impl FieldChange {
    pub fn new(field_name: impl Into<FieldName>, field_value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            field_value: field_value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(FieldName::from("hero_title").to_string(), "hero_title");
    }

    #[test]
    fn newtype_equality() {
        let a = FieldName::from("x");
        let b = FieldName::from(String::from("x"));
        assert_eq!(a, b);
    }

    #[test]
    fn field_source_display() {
        assert_eq!(FieldSource::Pending.to_string(), "pending");
        assert_eq!(FieldSource::Remote.to_string(), "remote");
    }

    #[test]
    fn record_serde_roundtrip() {
        let now = Utc::now();
        let mut content = BTreeMap::new();
        content.insert(FieldName::from("hero_title"), "Welcome".to_string());
        let record = ContentRecord::new_at(now, content);

        let json = serde_json::to_string(&record).expect("serialize");
        let deserialized: ContentRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(record, deserialized);
        assert!(deserialized.is_current_version());
    }

    #[test]
    fn record_wire_layout_uses_plain_string_keys() {
        let mut content = BTreeMap::new();
        content.insert(FieldName::from("hero_title"), "Welcome".to_string());
        let record = ContentRecord::new_at(Utc::now(), content);

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["version"], "v1");
        assert_eq!(json["content"]["hero_title"], "Welcome");
    }

    #[test]
    fn field_change_matches_save_api_names() {
        let change = FieldChange::new("hero_title", "Edited");
        let json = serde_json::to_value(&change).expect("serialize");
        assert_eq!(json["field_name"], "hero_title");
        assert_eq!(json["field_value"], "Edited");
    }
}
