//! Shared utilities for CLI commands.

use anyhow::Context;
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use clap::Args;
use hs_core::SyncWindow;

/// Date range flags shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct DateRange {
    /// First day to sync (YYYY-MM-DD or ISO 8601). Defaults to the most recent Monday.
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last day to sync, inclusive (YYYY-MM-DD or ISO 8601). Defaults to today.
    #[arg(long)]
    pub end_date: Option<String>,
}

impl DateRange {
    /// Resolves the flags into a window, filling defaults relative to `now`.
    pub fn window(&self, zone: Tz, now: DateTime<Utc>) -> anyhow::Result<SyncWindow> {
        let today = now.with_timezone(&zone).date_naive();
        let start = match &self.start_date {
            Some(s) => parse_date(s).context("invalid --start-date")?,
            None => most_recent_monday(today),
        };
        let end = match &self.end_date {
            Some(s) => parse_date(s).context("invalid --end-date")?,
            None => today,
        };
        Ok(SyncWindow::from_dates(start, end, zone)?)
    }
}

/// Parse a date string, keeping only the date part of datetimes.
///
/// Supports:
/// - Plain dates: "2025-01-27"
/// - RFC 3339: "2025-01-27T10:30:00-05:00"
/// - Local ISO 8601: "2025-01-27T10:30:00"
pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = s.parse::<NaiveDateTime>() {
        return Ok(dt.date());
    }
    anyhow::bail!("Invalid date: {s}. Use YYYY-MM-DD (e.g., 2025-01-27) or ISO 8601")
}

/// The Monday of the week containing `today` (which may be `today` itself).
pub fn most_recent_monday(today: NaiveDate) -> NaiveDate {
    today - Days::new(u64::from(today.weekday().num_days_from_monday()))
}
