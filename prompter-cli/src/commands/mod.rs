pub mod diff;
pub mod edit;
pub mod editing;
pub mod fields;
pub mod resolve;
pub mod save;
pub mod serve;
pub mod status;
pub mod stop;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use prompter_core::config;
use prompter_engine::ContentEngine;

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Build a read-only engine view straight from disk — used when the daemon
/// socket is absent so `status`/`fields`/`resolve` still work on cached
/// content.
pub(crate) fn open_offline_engine(home: &Path) -> Result<ContentEngine> {
    let config = config::load_at(home).context("failed to load ~/.prompter/config.yaml")?;
    let engine = ContentEngine::open(config, &prompter_daemon::paths::state_dir(home))
        .context("failed to open cached content")?;
    Ok(engine)
}

/// Compact age ("42s", "5m", "3h", "2d") from an RFC 3339 timestamp.
pub(crate) fn format_age(rfc3339: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(rfc3339) {
        Ok(timestamp) => {
            let age = chrono::Utc::now().signed_duration_since(timestamp.with_timezone(&chrono::Utc));
            format_seconds(age.num_seconds().max(0) as u64)
        }
        Err(_) => rfc3339.to_string(),
    }
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

/// Single-line preview of a field value for table cells.
pub(crate) fn preview(value: &str, max_chars: usize) -> String {
    let flat = value.replace('\n', "⏎");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let truncated: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}…")
}
