//! Field store — one logical key→value map over three physical tiers.
//!
//! Tiers, in read-fallback order:
//! 1. **Memory** — fast volatile in-process map; empty at startup.
//! 2. **Durable** — `<state_dir>/content.json` record file.
//! 3. **Archive** — `<state_dir>/archive/latest.json`, the large-capacity
//!    copy stored under the fixed key `latest`.
//! 4. Built-in defaults from the engine config.
//!
//! Writes fan out to every tier best-effort: a tier that fails is logged and
//! skipped, the others still land. Corrupt serialized data in a file tier is
//! discarded on read and the tier treated as empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;

use prompter_core::types::{ContentRecord, FieldName};

use crate::error::{io_err, EngineError};

/// Fixed identifier the archive tier stores its record under.
pub const ARCHIVE_KEY: &str = "latest";

/// One physical persistence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Durable,
    Archive,
}

impl Tier {
    /// All tiers in read-fallback order.
    pub fn all() -> &'static [Tier] {
        &[Tier::Memory, Tier::Durable, Tier::Archive]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Durable => "durable",
            Tier::Archive => "archive",
        }
    }
}

/// Which source satisfied a fallback read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Tier(Tier),
    Defaults,
}

/// The tiered field store.
#[derive(Debug)]
pub struct FieldStore {
    memory: BTreeMap<FieldName, String>,
    durable_path: PathBuf,
    archive_path: PathBuf,
    defaults: BTreeMap<FieldName, String>,
}

impl FieldStore {
    /// Open a store rooted at `state_dir`. No I/O happens until the first
    /// read or write.
    pub fn open(state_dir: &Path, defaults: BTreeMap<FieldName, String>) -> Self {
        Self {
            memory: BTreeMap::new(),
            durable_path: state_dir.join("content.json"),
            archive_path: state_dir.join("archive").join(format!("{ARCHIVE_KEY}.json")),
            defaults,
        }
    }

    /// Path of the durable tier record file.
    pub fn durable_path(&self) -> &Path {
        &self.durable_path
    }

    /// Path of the archive tier record file.
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Read a single field from one tier. Missing or unreadable tiers
    /// produce `None`, never an error.
    pub fn get(&self, tier: Tier, field: &FieldName) -> Option<String> {
        match tier {
            Tier::Memory => self.memory.get(field).cloned(),
            Tier::Durable => self
                .read_record(&self.durable_path)
                .and_then(|mut r| r.content.remove(field)),
            Tier::Archive => self
                .read_record(&self.archive_path)
                .and_then(|mut r| r.content.remove(field)),
        }
    }

    /// All fields held by one tier.
    pub fn fields(&self, tier: Tier) -> BTreeMap<FieldName, String> {
        match tier {
            Tier::Memory => self.memory.clone(),
            Tier::Durable => self
                .read_record(&self.durable_path)
                .map(|r| r.content)
                .unwrap_or_default(),
            Tier::Archive => self
                .read_record(&self.archive_path)
                .map(|r| r.content)
                .unwrap_or_default(),
        }
    }

    /// Write a single field to one tier.
    ///
    /// File tiers are read-modify-written atomically; the memory tier is a
    /// plain insert.
    pub fn set(&mut self, tier: Tier, field: FieldName, value: String) -> Result<(), EngineError> {
        match tier {
            Tier::Memory => {
                self.memory.insert(field, value);
                Ok(())
            }
            Tier::Durable => {
                let path = self.durable_path.clone();
                self.update_record(&path, field, value)
            }
            Tier::Archive => {
                let path = self.archive_path.clone();
                self.update_record(&path, field, value)
            }
        }
    }

    /// Load the cached content by trying each tier in fallback order and
    /// returning the first one holding a decodable record, or the built-in
    /// defaults when every tier comes up empty.
    pub fn load_cached(&self) -> (BTreeMap<FieldName, String>, CacheSource) {
        if !self.memory.is_empty() {
            return (self.memory.clone(), CacheSource::Tier(Tier::Memory));
        }
        if let Some(record) = self.read_record(&self.durable_path) {
            return (record.content, CacheSource::Tier(Tier::Durable));
        }
        if let Some(record) = self.read_record(&self.archive_path) {
            return (record.content, CacheSource::Tier(Tier::Archive));
        }
        (self.defaults.clone(), CacheSource::Defaults)
    }

    /// Built-in defaults handed to the store at construction.
    pub fn defaults(&self) -> &BTreeMap<FieldName, String> {
        &self.defaults
    }

    /// Write `content` to every tier, best-effort.
    ///
    /// Returns how many tiers accepted the write; a tier failure is logged
    /// and does not abort the rest.
    pub fn store_all(&mut self, content: &BTreeMap<FieldName, String>) -> usize {
        let record = ContentRecord::new_at(Utc::now(), content.clone());
        let mut written = 1; // memory cannot fail
        self.memory = content.clone();

        for path in [self.durable_path.clone(), self.archive_path.clone()] {
            match write_record(&path, &record) {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::warn!("tier write failed at {}: {err}", path.display());
                }
            }
        }
        written
    }

    fn update_record(
        &mut self,
        path: &Path,
        field: FieldName,
        value: String,
    ) -> Result<(), EngineError> {
        let mut content = self
            .read_record(path)
            .map(|r| r.content)
            .unwrap_or_default();
        content.insert(field, value);
        write_record(path, &ContentRecord::new_at(Utc::now(), content))
    }

    /// Decode-validate a tier record file.
    ///
    /// Missing file → `None`. Unreadable file → logged, `None`. Corrupt or
    /// wrong-version contents → the file is discarded and `None` returned, so
    /// the fallback chain continues past it.
    fn read_record(&self, path: &Path) -> Option<ContentRecord> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("tier read failed at {}: {err}", path.display());
                return None;
            }
        };

        match serde_json::from_str::<ContentRecord>(&contents) {
            Ok(record) if record.is_current_version() => Some(record),
            Ok(record) => {
                tracing::warn!(
                    "discarding tier record at {} with unknown version '{}'",
                    path.display(),
                    record.version,
                );
                discard(path);
                None
            }
            Err(err) => {
                tracing::warn!(
                    "discarding corrupt tier record at {}: {err}",
                    path.display(),
                );
                discard(path);
                None
            }
        }
    }
}

/// Atomically write a record: `.json.tmp` sibling, then rename.
fn write_record(path: &Path, record: &ContentRecord) -> Result<(), EngineError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid tier path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn discard(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("failed to discard corrupt record {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn field(name: &str) -> FieldName {
        FieldName::from(name)
    }

    fn defaults() -> BTreeMap<FieldName, String> {
        let mut map = BTreeMap::new();
        map.insert(field("hero_title"), "Welcome".to_string());
        map
    }

    #[test]
    fn empty_store_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let store = FieldStore::open(dir.path(), defaults());
        let (content, source) = store.load_cached();
        assert_eq!(source, CacheSource::Defaults);
        assert_eq!(content.get(&field("hero_title")).unwrap(), "Welcome");
    }

    #[test]
    fn store_all_writes_every_tier() {
        let dir = TempDir::new().unwrap();
        let mut store = FieldStore::open(dir.path(), BTreeMap::new());

        let mut content = BTreeMap::new();
        content.insert(field("hero_title"), "Edited".to_string());
        let written = store.store_all(&content);

        assert_eq!(written, 3, "memory + durable + archive");
        for tier in Tier::all() {
            assert_eq!(
                store.get(*tier, &field("hero_title")).as_deref(),
                Some("Edited"),
                "tier {} should hold the value",
                tier.label(),
            );
        }
    }

    #[test]
    fn fallback_order_prefers_memory_then_durable() {
        let dir = TempDir::new().unwrap();
        let mut store = FieldStore::open(dir.path(), defaults());

        store
            .set(Tier::Durable, field("hero_title"), "durable".to_string())
            .unwrap();
        let (content, source) = store.load_cached();
        assert_eq!(source, CacheSource::Tier(Tier::Durable));
        assert_eq!(content.get(&field("hero_title")).unwrap(), "durable");

        store
            .set(Tier::Memory, field("hero_title"), "memory".to_string())
            .unwrap();
        let (content, source) = store.load_cached();
        assert_eq!(source, CacheSource::Tier(Tier::Memory));
        assert_eq!(content.get(&field("hero_title")).unwrap(), "memory");
    }

    #[test]
    fn archive_serves_reads_when_durable_missing() {
        let dir = TempDir::new().unwrap();
        let mut store = FieldStore::open(dir.path(), defaults());
        store
            .set(Tier::Archive, field("hero_title"), "archived".to_string())
            .unwrap();

        let (content, source) = store.load_cached();
        assert_eq!(source, CacheSource::Tier(Tier::Archive));
        assert_eq!(content.get(&field("hero_title")).unwrap(), "archived");
    }

    #[test]
    fn corrupt_durable_record_is_discarded_and_skipped() {
        let dir = TempDir::new().unwrap();
        let mut store = FieldStore::open(dir.path(), defaults());
        store
            .set(Tier::Archive, field("hero_title"), "archived".to_string())
            .unwrap();
        std::fs::write(store.durable_path(), "{not json at all").unwrap();

        let (content, source) = store.load_cached();
        assert_eq!(source, CacheSource::Tier(Tier::Archive));
        assert_eq!(content.get(&field("hero_title")).unwrap(), "archived");
        assert!(
            !store.durable_path().exists(),
            "corrupt record file should be discarded"
        );
    }

    #[test]
    fn unknown_version_record_is_treated_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FieldStore::open(dir.path(), defaults());
        std::fs::create_dir_all(store.durable_path().parent().unwrap()).unwrap();
        std::fs::write(
            store.durable_path(),
            r#"{"version":"v9","timestamp":0,"content":{"hero_title":"future"}}"#,
        )
        .unwrap();

        let (content, source) = store.load_cached();
        assert_eq!(source, CacheSource::Defaults);
        assert_eq!(content.get(&field("hero_title")).unwrap(), "Welcome");
    }

    #[test]
    fn set_on_file_tier_preserves_other_fields() {
        let dir = TempDir::new().unwrap();
        let mut store = FieldStore::open(dir.path(), BTreeMap::new());
        store
            .set(Tier::Durable, field("hero_title"), "A".to_string())
            .unwrap();
        store
            .set(Tier::Durable, field("hero_subtitle"), "B".to_string())
            .unwrap();

        let fields = store.fields(Tier::Durable);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get(&field("hero_title")).unwrap(), "A");
        assert_eq!(fields.get(&field("hero_subtitle")).unwrap(), "B");
    }

    #[test]
    fn tmp_file_cleaned_up_after_write() {
        let dir = TempDir::new().unwrap();
        let mut store = FieldStore::open(dir.path(), BTreeMap::new());
        store
            .set(Tier::Durable, field("hero_title"), "A".to_string())
            .unwrap();
        let tmp = store.durable_path().with_extension("json.tmp");
        assert!(!tmp.exists(), "tmp file should be removed after rename");
    }

    #[test]
    fn archive_record_lives_under_fixed_latest_key() {
        let dir = TempDir::new().unwrap();
        let mut store = FieldStore::open(dir.path(), BTreeMap::new());
        store
            .set(Tier::Archive, field("hero_title"), "A".to_string())
            .unwrap();
        assert!(dir.path().join("archive").join("latest.json").exists());
    }
}
