//! Sync command: reconcile calendar blocks into Harvest.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use hs_calendar::IcsCalendar;
use hs_core::{Outcome, Reconciler, SyncError, SyncOptions, SyncReport};
use hs_harvest::HarvestClient;

use crate::Settings;
use crate::commands::util::DateRange;

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub range: DateRange,

    /// Log intended changes without writing to Harvest.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

/// Runs a sync and writes the summary table to `writer`.
///
/// When some create/patch calls failed, the summary is still written and the
/// command then fails so the exit status reflects it.
pub fn run<W: Write>(writer: &mut W, args: &SyncArgs, settings: &Settings) -> Result<()> {
    let window = args.range.window(settings.zone, Utc::now())?;

    let calendar = IcsCalendar::new(settings.ics_url.clone(), settings.feed.clone())
        .context("failed to create calendar client")?;
    let ledger = HarvestClient::new(settings.harvest_token.clone(), settings.harvest_account)
        .context("failed to create Harvest client")?;
    let reconciler = Reconciler::new(&calendar, &ledger, &settings.engine);

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let result = runtime.block_on(reconciler.run(
        &window,
        SyncOptions {
            dry_run: args.dry_run,
        },
    ));
    if let Err(SyncError::Write { report }) = &result {
        write!(writer, "{}", format_summary(report))?;
    }
    let report = result.context("sync failed; re-run to retry")?;

    write!(writer, "{}", format_summary(&report))?;
    Ok(())
}

/// Formats the human-readable run summary.
pub fn format_summary(report: &SyncReport) -> String {
    let mut output = String::new();
    let zone = report.window.zone();

    let mode = if report.dry_run {
        " (dry run, nothing written)"
    } else {
        ""
    };
    writeln!(
        output,
        "SYNC {} to {}{mode}",
        report.window.start_date(),
        report.window.end_date()
    )
    .unwrap();
    writeln!(output).unwrap();

    if report.blocks.is_empty() {
        writeln!(output, "No calendar events in range.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<10}  {:<5}  {:<5}  {:<20}  TITLE",
        "DATE", "START", "END", "RESULT"
    )
    .unwrap();
    for block in &report.blocks {
        let begin = block.begin.with_timezone(&zone);
        let end = block.end.with_timezone(&zone);
        writeln!(
            output,
            "{}  {}  {}  {:<20}  {}",
            begin.format("%Y-%m-%d"),
            begin.format("%H:%M"),
            end.format("%H:%M"),
            describe(&block.outcome),
            block.title
        )
        .unwrap();
    }

    let counts = report.counts();
    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(
        output,
        "  created: {}  patched: {}  unchanged: {}  failed: {}",
        counts.created, counts.patched, counts.unchanged, counts.failed
    )
    .unwrap();
    writeln!(
        output,
        "  skipped approved: {}  skipped non-billable: {}  skipped duplicate: {}",
        counts.skipped_approved, counts.skipped_non_billable, counts.skipped_duplicate
    )
    .unwrap();

    output
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::SkippedNonBillable => "skip (non-billable)".to_string(),
        Outcome::SkippedApproved => "skip (approved)".to_string(),
        Outcome::SkippedDuplicate => "skip (duplicate)".to_string(),
        Outcome::Failed { .. } => "FAILED".to_string(),
        Outcome::Created { hours } => format!("create {hours:.2}h"),
        Outcome::Patched { from, to, .. } => format!("patch {from:.2}h -> {to:.2}h"),
        Outcome::Unchanged { hours } => format!("unchanged {hours:.2}h"),
    }
}
