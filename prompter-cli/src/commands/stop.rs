//! `prompter stop` — stop the running daemon.

use anyhow::{Context, Result};
use clap::Args;

use prompter_daemon::request_stop;

use crate::commands::home_dir;

#[derive(Args, Debug)]
pub struct StopArgs {}

impl StopArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        request_stop(&home).context("failed to stop daemon")?;
        println!("daemon stopping");
        Ok(())
    }
}
