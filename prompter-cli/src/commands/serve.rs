//! `prompter serve` — run the sync daemon in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use crate::commands::home_dir;

#[derive(Args, Debug)]
pub struct ServeArgs {}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        prompter_daemon::start_blocking(&home).context("daemon exited with an error")
    }
}
