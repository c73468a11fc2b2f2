use std::path::{Path, PathBuf};

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "editor.sock";

pub fn prompter_root(home: &Path) -> PathBuf {
    home.join(".prompter")
}

/// The engine's tier files (`content.json`, `archive/`) live directly under
/// the prompter root.
pub fn state_dir(home: &Path) -> PathBuf {
    prompter_root(home)
}

pub fn run_dir(home: &Path) -> PathBuf {
    prompter_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    prompter_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
