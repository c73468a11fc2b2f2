//! `prompter resolve` — resolve one field to its user-visible value.

use anyhow::{Context, Result};
use clap::Args;

use prompter_core::types::FieldName;
use prompter_daemon::{request_resolve, DaemonError};

use crate::commands::{home_dir, open_offline_engine};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Field name to resolve.
    pub field: String,

    /// Value to return when no layer holds the field.
    #[arg(long)]
    pub fallback: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let field = FieldName::from(self.field.as_str());

        let payload = match request_resolve(&home, field.clone(), self.fallback.clone()) {
            Ok(payload) => payload,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let engine = open_offline_engine(&home)?;
                let value = match &self.fallback {
                    Some(fallback) => engine.resolve(&field, fallback),
                    None => engine.resolve_or_default(&field),
                };
                let (_, source) = engine.layers().resolve_with_source(&field, "");
                serde_json::json!({ "field": field, "value": value, "source": source })
            }
            Err(err) => return Err(err).context("resolve request failed"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize value")?
            );
        } else {
            println!("{}", payload["value"].as_str().unwrap_or_default());
        }
        Ok(())
    }
}
