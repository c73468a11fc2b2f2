//! `prompter save` — push pending edits through the save flow.

use anyhow::{Context, Result};
use clap::Args;

use prompter_daemon::request_save;

use crate::commands::home_dir;

#[derive(Args, Debug)]
pub struct SaveArgs {
    /// POST straight to the save endpoint instead of the editor RPC.
    #[arg(long)]
    pub direct: bool,
}

impl SaveArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let payload = request_save(&home, self.direct)
            .context("save failed; pending edits are preserved")?;

        if payload["saved"].as_bool().unwrap_or(false) {
            if self.direct {
                println!("saved directly to the remote store");
            } else {
                println!(
                    "save confirmed by editor (request {})",
                    payload["request_id"].as_str().unwrap_or("?"),
                );
            }
        } else {
            println!(
                "{}",
                payload["detail"].as_str().unwrap_or("nothing to save"),
            );
        }
        Ok(())
    }
}
