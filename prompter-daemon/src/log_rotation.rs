//! Size-based log rotation for daemon log files.
//!
//! Rotates `daemon.log` and `daemon-err.log` when they exceed 10 MiB,
//! keeping at most 5 rotated copies:
//!   daemon.log → daemon.log.1 → daemon.log.2 → … → daemon.log.5

use std::fs;
use std::io;
use std::path::Path;

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size exceeds `max_bytes`.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold or did not exist yet. Missing files are silently skipped;
/// only unexpected filesystem failures surface as errors.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        let dst = numbered_path(log_path, n + 1);
        if src.exists() {
            fs::rename(&src, &dst)?;
        }
    }

    fs::rename(log_path, numbered_path(log_path, 1))?;

    // Recreate the live file so the daemon always has a writable path.
    let _ = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Rotate both daemon log files under `home`. Errors for one file are logged
/// and do not block the other.
pub fn rotate_logs(home: &Path) {
    let stdout_log = crate::paths::stdout_log_path(home);
    let stderr_log = crate::paths::stderr_log_path(home);

    for log_path in [&stdout_log, &stderr_log] {
        match rotate_if_needed(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

fn numbered_path(base: &Path, n: usize) -> std::path::PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(crate::paths::DAEMON_STDOUT_LOG);
    base.with_file_name(format!("{name}.{n}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_log(dir: &TempDir, name: &str, size_bytes: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        let chunk = vec![b'x'; 64 * 1024];
        let mut written = 0usize;
        while written < size_bytes {
            let to_write = (size_bytes - written).min(chunk.len());
            f.write_all(&chunk[..to_write]).unwrap();
            written += to_write;
        }
        path
    }

    #[test]
    fn rotation_noop_when_file_under_threshold() {
        let dir = TempDir::new().unwrap();
        let log = make_log(&dir, "daemon.log", 1024);
        let rotated = rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap();
        assert!(!rotated);
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn rotation_triggers_when_file_exceeds_max_bytes() {
        let dir = TempDir::new().unwrap();
        let log = make_log(&dir, "daemon.log", MAX_LOG_BYTES as usize + 1);
        let rotated = rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap();
        assert!(rotated);

        assert_eq!(fs::metadata(&log).unwrap().len(), 0, "live log now empty");
        let backup = numbered_path(&log, 1);
        assert!(backup.exists());
        assert!(fs::metadata(&backup).unwrap().len() > 0);
    }

    #[test]
    fn max_rotated_files_are_capped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");

        for n in 1..=MAX_ROTATED_FILES {
            fs::write(numbered_path(&log, n), format!("rotated-{n}")).unwrap();
        }
        make_log(&dir, "daemon.log", MAX_LOG_BYTES as usize + 1);

        let rotated = rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap();
        assert!(rotated);
        assert!(numbered_path(&log, MAX_ROTATED_FILES).exists());
        assert!(!numbered_path(&log, MAX_ROTATED_FILES + 1).exists());
    }

    #[test]
    fn rotation_skips_missing_file_gracefully() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("nonexistent.log");
        let rotated = rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap();
        assert!(!rotated);
    }
}
