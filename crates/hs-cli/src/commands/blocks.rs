//! Blocks command: show what a sync would reconcile, without touching Harvest.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use hs_calendar::IcsCalendar;
use hs_core::{EventBlock, NoteFormat, collect_blocks};

use crate::Settings;
use crate::commands::util::DateRange;

#[derive(Debug, Args)]
pub struct BlocksArgs {
    #[command(flatten)]
    pub range: DateRange,
}

pub fn run<W: Write>(writer: &mut W, args: &BlocksArgs, settings: &Settings) -> Result<()> {
    let window = args.range.window(settings.zone, Utc::now())?;
    let calendar = IcsCalendar::new(settings.ics_url.clone(), settings.feed.clone())
        .context("failed to create calendar client")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let blocks = runtime
        .block_on(collect_blocks(&calendar, &window))
        .context("failed to load calendar blocks")?;

    write!(writer, "{}", format_blocks(&blocks, &settings.engine.notes))?;
    Ok(())
}

/// One line per block: times, hours, billable flag and identity key.
///
/// Non-billable blocks never get a key, so their title is shown instead.
pub fn format_blocks(blocks: &[EventBlock], notes: &NoteFormat) -> String {
    let mut output = String::new();
    if blocks.is_empty() {
        writeln!(output, "No calendar events in range.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<10}  {:<5}  {:<5}  {:>5}  {:<4}  KEY",
        "DATE", "START", "END", "HOURS", "BILL"
    )
    .unwrap();
    for block in blocks {
        let (start, end) = notes.time_span(block);
        let key = if block.is_billable() {
            format!("{:?}", notes.key(&notes.render(block)))
        } else {
            format!("({})", block.title())
        };
        writeln!(
            output,
            "{}  {start}  {end}  {:>5.2}  {:<4}  {key}",
            block.spent_date().format("%Y-%m-%d"),
            block.hours(),
            if block.is_billable() { "yes" } else { "no" },
        )
        .unwrap();
    }
    output
}
