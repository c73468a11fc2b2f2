//! Engine configuration, persisted as YAML.
//!
//! # Storage layout
//!
//! ```text
//! ~/.prompter/
//!   config.yaml     (mode 0600; directory mode 0700)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::FieldName;

/// Default grace window after a confirmed save (30 s).
pub const DEFAULT_GRACE_MS: u64 = 30_000;
/// Default cooldown between a confirmed save and the next scheduled sync.
pub const DEFAULT_SYNC_COOLDOWN_MS: u64 = 30_000;
/// Default idle re-sync interval.
pub const DEFAULT_IDLE_SYNC_INTERVAL_MS: u64 = 120_000;
/// Default deadline for the save-content RPC round trip.
pub const DEFAULT_SAVE_TIMEOUT_MS: u64 = 10_000;
/// Default upper bound on a single field value.
pub const DEFAULT_MAX_FIELD_BYTES: usize = 65_536;

// ---------------------------------------------------------------------------
// Config type
// ---------------------------------------------------------------------------

/// Everything the engine, scheduler, and messenger need to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `GET` endpoint returning the flat field → value JSON object.
    pub content_endpoint: String,

    /// `POST` endpoint accepting `{ "changes": [...] }` save payloads.
    pub save_endpoint: String,

    /// Origins whose editor messages are accepted; everything else is
    /// silently dropped.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Grace window duration after a confirmed save.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Minimum quiet period after a save before a scheduled sync may run.
    #[serde(default = "default_sync_cooldown_ms")]
    pub sync_cooldown_ms: u64,

    /// Idle timer period for background re-sync.
    #[serde(default = "default_idle_sync_interval_ms")]
    pub idle_sync_interval_ms: u64,

    /// Hard deadline on the save-content RPC.
    #[serde(default = "default_save_timeout_ms")]
    pub save_timeout_ms: u64,

    /// Largest accepted field value, in bytes.
    #[serde(default = "default_max_field_bytes")]
    pub max_field_bytes: usize,

    /// Built-in field defaults, used when every storage tier comes up empty.
    #[serde(default)]
    pub defaults: BTreeMap<FieldName, String>,
}

fn default_grace_ms() -> u64 {
    DEFAULT_GRACE_MS
}
fn default_sync_cooldown_ms() -> u64 {
    DEFAULT_SYNC_COOLDOWN_MS
}
fn default_idle_sync_interval_ms() -> u64 {
    DEFAULT_IDLE_SYNC_INTERVAL_MS
}
fn default_save_timeout_ms() -> u64 {
    DEFAULT_SAVE_TIMEOUT_MS
}
fn default_max_field_bytes() -> usize {
    DEFAULT_MAX_FIELD_BYTES
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_endpoint: String::new(),
            save_endpoint: String::new(),
            allowed_origins: Vec::new(),
            grace_ms: DEFAULT_GRACE_MS,
            sync_cooldown_ms: DEFAULT_SYNC_COOLDOWN_MS,
            idle_sync_interval_ms: DEFAULT_IDLE_SYNC_INTERVAL_MS,
            save_timeout_ms: DEFAULT_SAVE_TIMEOUT_MS,
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
            defaults: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Whether `origin` may deliver editor messages.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.prompter/` — pure, no I/O.
pub fn prompter_root_at(home: &Path) -> PathBuf {
    home.join(".prompter")
}

/// `<home>/.prompter/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    prompter_root_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.prompter/config.yaml`.
///
/// Returns the built-in defaults if the file does not exist yet;
/// `ConfigError::Parse` (with path context) if it exists but is malformed.
pub fn load_at(home: &Path) -> Result<EngineConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<EngineConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the config to `<home>/.prompter/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    let root = prompter_root_at(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }

    let path = config_path_at(home);
    let tmp = path.with_file_name("config.yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml)?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &EngineConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
