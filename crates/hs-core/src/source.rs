//! Interfaces to the two remote systems the engine reconciles.
//!
//! Both traits describe network-facing adapters; the engine awaits every call
//! and never retries.

use std::future::Future;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::block::EventBlock;
use crate::ledger::{EntryPayload, LedgerEntry};

/// A source of classified calendar blocks.
pub trait CalendarSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns blocks overlapping `[window_start, window_end)`.
    ///
    /// Implementations drop skip-keyword events, classify the rest and
    /// collapse clones before returning.
    fn fetch_events(
        &self,
        window_start: DateTime<Tz>,
        window_end: DateTime<Tz>,
    ) -> impl Future<Output = Result<Vec<EventBlock>, Self::Error>> + Send;
}

/// A remote time-tracking ledger.
pub trait LedgerClient {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fails unless the account books durations rather than start/stop timers.
    fn verify_mode(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Lists every entry in `[start, end]`, following pagination to the end.
    fn list_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, Self::Error>> + Send;

    fn create_entry(
        &self,
        payload: &EntryPayload,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Updates only the hours of an existing entry.
    fn patch_hours(
        &self,
        entry_id: u64,
        hours: f64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
