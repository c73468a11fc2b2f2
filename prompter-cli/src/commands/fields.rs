//! `prompter fields` — list resolved content fields.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use prompter_daemon::{request_fields, DaemonError};

use crate::commands::{format_age, home_dir, open_offline_engine, preview};

#[derive(Args, Debug)]
pub struct FieldsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "field")]
    field: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "value")]
    value: String,
    #[tabled(rename = "updated")]
    updated: String,
}

impl FieldsArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;

        let fields: Vec<serde_json::Value> = match request_fields(&home) {
            Ok(payload) => serde_json::from_value(payload).context("malformed fields payload")?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let engine = open_offline_engine(&home)?;
                serde_json::to_value(engine.resolved_fields())
                    .ok()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default()
            }
            Err(err) => return Err(err).context("fields request failed"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&fields).context("failed to serialize fields")?
            );
            return Ok(());
        }

        if fields.is_empty() {
            println!("No content fields resolved yet.");
            return Ok(());
        }

        let rows: Vec<FieldRow> = fields
            .iter()
            .map(|f| FieldRow {
                field: f["name"].as_str().unwrap_or_default().to_string(),
                source: f["source"].as_str().unwrap_or_default().to_string(),
                value: preview(f["value"].as_str().unwrap_or_default(), 48),
                updated: f["updated_at"]
                    .as_str()
                    .map(format_age)
                    .unwrap_or_default(),
            })
            .collect();

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
