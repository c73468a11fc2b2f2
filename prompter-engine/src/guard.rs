//! Grace-period guard — the time-windowed lock armed by a confirmed save.
//!
//! While the window is active, scheduled re-syncs are suppressed and a remote
//! fetch's write may not overwrite fields the local layer already holds. The
//! guard is purely time-based: there is no acknowledgment channel that could
//! tell us when the remote store has actually caught up, so the duration must
//! be chosen conservatively (default 30 s, `grace_ms` in the config).
//!
//! State machine: Idle → Armed (confirmed save) → Idle (expiry or explicit
//! clear). Re-arming replaces the single window; windows never stack.

use chrono::{DateTime, Duration, Utc};

/// The single grace window. At most one exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceWindow {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl GraceWindow {
    /// Whether the window still covers `now`.
    pub fn active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.started_at + self.duration
    }

    /// Milliseconds of protection left at `now` (0 once expired).
    pub fn remaining_ms_at(&self, now: DateTime<Utc>) -> u64 {
        let end = self.started_at + self.duration;
        (end - now).num_milliseconds().max(0) as u64
    }
}

/// Guard over the single [`GraceWindow`].
#[derive(Debug, Default)]
pub struct GraceGuard {
    window: Option<GraceWindow>,
}

impl GraceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or refresh) the window starting at `now`.
    pub fn arm_at(&mut self, now: DateTime<Utc>, duration_ms: u64) {
        self.window = Some(GraceWindow {
            started_at: now,
            duration: Duration::milliseconds(duration_ms as i64),
        });
    }

    /// `arm_at` with the current instant.
    pub fn arm(&mut self, duration_ms: u64) {
        self.arm_at(Utc::now(), duration_ms);
    }

    /// Explicitly return to Idle.
    pub fn clear(&mut self) {
        self.window = None;
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.window.map(|w| w.active_at(now)).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn remaining_ms_at(&self, now: DateTime<Utc>) -> u64 {
        self.window.map(|w| w.remaining_ms_at(now)).unwrap_or(0)
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms_at(Utc::now())
    }

    /// The current window, if any (expired windows are still reported until
    /// re-armed or cleared; callers use the `_at` predicates for liveness).
    pub fn window(&self) -> Option<&GraceWindow> {
        self.window.as_ref()
    }
}
