//! Entries command: dump Harvest time entries as JSON.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use hs_core::{LedgerClient, LedgerEntry};
use hs_harvest::HarvestClient;

use crate::Settings;
use crate::commands::util::DateRange;

#[derive(Debug, Args)]
pub struct EntriesArgs {
    #[command(flatten)]
    pub range: DateRange,
}

pub fn run<W: Write>(writer: &mut W, args: &EntriesArgs, settings: &Settings) -> Result<()> {
    let window = args.range.window(settings.zone, Utc::now())?;
    let client = HarvestClient::new(settings.harvest_token.clone(), settings.harvest_account)
        .context("failed to create Harvest client")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let entries = runtime
        .block_on(async {
            client.verify_mode().await?;
            client
                .list_entries(window.start_date(), window.end_date())
                .await
        })
        .context("failed to list Harvest entries")?;

    tracing::info!(count = entries.len(), "listed entries");
    writeln!(writer, "{}", format_entries(&entries)?)?;
    Ok(())
}

/// Pretty JSON array with one object per entry.
pub fn format_entries(entries: &[LedgerEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}
