//! `prompter editing on|off` — toggle editing mode.

use anyhow::{anyhow, Context, Result};
use clap::Args;

use prompter_daemon::request_set_editing;

use crate::commands::home_dir;

#[derive(Args, Debug)]
pub struct EditingArgs {
    /// `on` or `off`.
    pub state: String,
}

impl EditingArgs {
    pub fn run(self) -> Result<()> {
        let enabled = match self.state.to_ascii_lowercase().as_str() {
            "on" => true,
            "off" => false,
            other => return Err(anyhow!("expected 'on' or 'off', got '{other}'")),
        };

        let home = home_dir()?;
        request_set_editing(&home, enabled).context("failed to toggle editing mode")?;
        println!(
            "editing {}{}",
            if enabled { "enabled" } else { "disabled" },
            if enabled {
                ""
            } else {
                " (pending edits discarded)"
            },
        );
        Ok(())
    }
}
