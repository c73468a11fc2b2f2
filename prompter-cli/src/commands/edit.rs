//! `prompter edit` — stage a pending edit for one field.

use anyhow::{Context, Result};
use clap::Args;

use prompter_core::types::FieldName;
use prompter_daemon::request_stage_edit;

use crate::commands::home_dir;

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Field name to edit.
    pub field: String,

    /// New value for the field.
    pub value: String,
}

impl EditArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let payload = request_stage_edit(&home, FieldName::from(self.field.as_str()), self.value)
            .context("failed to stage edit (is editing mode on?)")?;
        println!(
            "staged '{}' ({} pending edit(s))",
            self.field,
            payload["pending"].as_u64().unwrap_or(0),
        );
        Ok(())
    }
}
