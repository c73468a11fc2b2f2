//! `prompter sync` — trigger a remote content sync.

use anyhow::{Context, Result};
use clap::Args;

use prompter_daemon::request_sync;

use crate::commands::home_dir;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Bypass the scheduler's guard conditions (the write-time grace check
    /// still applies).
    #[arg(long)]
    pub force: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let outcome = request_sync(&home, self.force).context("sync request failed")?;

        if let Some(skip) = outcome.get("skipped").and_then(|v| v.as_str()) {
            println!("sync skipped: {}", skip_reason(skip));
        } else if let Some(completed) = outcome.get("completed") {
            println!(
                "sync completed: {} field(s) applied, {} suppressed by the grace window",
                completed["applied"].as_u64().unwrap_or(0),
                completed["suppressed"].as_u64().unwrap_or(0),
            );
        } else {
            println!("sync finished: {outcome}");
        }
        Ok(())
    }
}

fn skip_reason(skip: &str) -> &str {
    match skip {
        "grace_active" => "grace window active after a recent save",
        "pending_edits" => "unconfirmed edits pending",
        "cooldown" => "inside the post-save cooldown",
        "in_flight" => "another sync is already running",
        other => other,
    }
}
