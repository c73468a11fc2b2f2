//! Prompter — live content field synchronization CLI.
//!
//! # Usage
//!
//! ```text
//! prompter serve
//! prompter status [--json]
//! prompter fields [--json]
//! prompter resolve <field> [--fallback <value>] [--json]
//! prompter editing on|off
//! prompter edit <field> <value>
//! prompter diff
//! prompter save [--direct]
//! prompter sync [--force]
//! prompter stop
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    diff::DiffArgs, edit::EditArgs, editing::EditingArgs, fields::FieldsArgs,
    resolve::ResolveArgs, save::SaveArgs, serve::ServeArgs, status::StatusArgs, stop::StopArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "prompter",
    version,
    about = "Synchronize live-edited content fields against a remote store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync daemon in the foreground.
    Serve(ServeArgs),

    /// Show daemon and engine state (falls back to cached content offline).
    Status(StatusArgs),

    /// List resolved content fields.
    Fields(FieldsArgs),

    /// Resolve a single field to its user-visible value.
    Resolve(ResolveArgs),

    /// Toggle editing mode on the running daemon.
    Editing(EditingArgs),

    /// Stage a pending edit for one field.
    Edit(EditArgs),

    /// Show unified diffs of pending edits against confirmed values.
    Diff(DiffArgs),

    /// Save pending edits (RPC through the attached editor, or --direct).
    Save(SaveArgs),

    /// Trigger a remote content sync.
    Sync(SyncArgs),

    /// Stop the running daemon.
    Stop(StopArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Fields(args) => args.run(),
        Commands::Resolve(args) => args.run(),
        Commands::Editing(args) => args.run(),
        Commands::Edit(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Save(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Stop(args) => args.run(),
    }
}
