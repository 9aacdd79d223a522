//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::blocks::BlocksArgs;
use crate::commands::entries::EntriesArgs;
use crate::commands::sync::SyncArgs;

/// Sync calendar events into Harvest time entries.
///
/// Reads a calendar feed, splits overlapping events, and creates or updates
/// one Harvest entry per billable block.
#[derive(Debug, Parser)]
#[command(name = "hs", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create and update Harvest entries from calendar events.
    Sync(SyncArgs),

    /// Print Harvest time entries in a date range as JSON.
    Entries(EntriesArgs),

    /// Print the calendar blocks a sync would reconcile.
    Blocks(BlocksArgs),
}
