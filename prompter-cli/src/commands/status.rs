//! `prompter status` — daemon and engine visibility.
//!
//! With a running daemon, asks it over the socket; otherwise falls back to
//! the cached content on disk so the command always answers.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use prompter_daemon::{request_status, DaemonError};

use crate::commands::{home_dir, open_offline_engine, preview};

/// Arguments for `prompter status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct OfflineStatusJson {
    running: bool,
    field_count: usize,
    fields: Vec<prompter_core::types::Field>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "item")]
    item: String,
    #[tabled(rename = "value")]
    value: String,
}

#[derive(Tabled)]
struct FieldTableRow {
    #[tabled(rename = "field")]
    field: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "value")]
    value: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;

        match request_status(&home) {
            Ok(payload) => {
                if self.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&payload)
                            .context("failed to serialize status JSON")?
                    );
                } else {
                    print_online(&payload);
                }
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => self.print_offline(&home),
            Err(err) => Err(err).context("status request failed"),
        }
    }

    fn print_offline(&self, home: &std::path::Path) -> Result<()> {
        let engine = open_offline_engine(home)?;
        let fields = engine.resolved_fields();

        if self.json {
            let payload = OfflineStatusJson {
                running: false,
                field_count: fields.len(),
                fields,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        println!(
            "{} {}",
            "●".bright_black().bold(),
            "daemon not running — showing cached content".bright_black(),
        );
        if fields.is_empty() {
            println!("No cached content. Run `prompter serve` to start syncing.");
            return Ok(());
        }

        let rows: Vec<FieldTableRow> = fields
            .iter()
            .map(|f| FieldTableRow {
                field: f.name.to_string(),
                source: f.source.to_string(),
                value: preview(&f.value, 48),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn print_online(payload: &Value) {
    let connected = payload["connected"].as_bool().unwrap_or(false);
    let grace_active = payload["grace_active"].as_bool().unwrap_or(false);
    let editing = payload["editing"].as_bool().unwrap_or(false);

    let indicator = if connected {
        "●".green().bold()
    } else {
        "●".yellow().bold()
    };
    println!(
        "{indicator} Prompter v{} | daemon running | {}",
        env!("CARGO_PKG_VERSION"),
        if connected {
            "remote reachable".green().to_string()
        } else {
            "remote unreachable".yellow().to_string()
        },
    );

    let rows = vec![
        StatusTableRow {
            item: "editing".to_string(),
            value: if editing {
                "on".green().to_string()
            } else {
                "off".to_string()
            },
        },
        StatusTableRow {
            item: "pending edits".to_string(),
            value: payload["pending"].as_u64().unwrap_or(0).to_string(),
        },
        StatusTableRow {
            item: "grace window".to_string(),
            value: if grace_active {
                format!(
                    "{} ({} ms left)",
                    "active".yellow().bold(),
                    payload["grace_remaining_ms"].as_u64().unwrap_or(0),
                )
            } else {
                "idle".to_string()
            },
        },
        StatusTableRow {
            item: "last sync".to_string(),
            value: text_or_never(&payload["last_sync_at"]),
        },
        StatusTableRow {
            item: "last save".to_string(),
            value: text_or_never(&payload["last_save_at"]),
        },
        StatusTableRow {
            item: "fields".to_string(),
            value: payload["field_count"].as_u64().unwrap_or(0).to_string(),
        },
        StatusTableRow {
            item: "editor attached".to_string(),
            value: payload["editor_attached"]
                .as_bool()
                .unwrap_or(false)
                .to_string(),
        },
    ];

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if grace_active {
        println!("Remote re-sync is suppressed until the grace window expires.");
    }
}

fn text_or_never(value: &Value) -> String {
    value
        .as_str()
        .map(|s| format!("{} ago", crate::commands::format_age(s)))
        .unwrap_or_else(|| "never".to_string())
}
