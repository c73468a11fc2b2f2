//! `prompter diff` — unified diffs of pending edits.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use prompter_daemon::request_diff;

use crate::commands::home_dir;

#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let diffs = request_diff(&home).context("diff request failed")?;
        let diffs = diffs.as_array().cloned().unwrap_or_default();

        if diffs.is_empty() {
            println!("No pending edits.");
            return Ok(());
        }

        for diff in diffs {
            let field = diff["field"].as_str().unwrap_or_default();
            println!("{}", format!("── {field} ──").bold());
            for line in diff["unified_diff"].as_str().unwrap_or_default().lines() {
                if line.starts_with('+') && !line.starts_with("+++") {
                    println!("{}", line.green());
                } else if line.starts_with('-') && !line.starts_with("---") {
                    println!("{}", line.red());
                } else {
                    println!("{line}");
                }
            }
        }
        Ok(())
    }
}
