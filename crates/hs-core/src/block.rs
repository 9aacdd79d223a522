//! Calendar time blocks.

use chrono::{DateTime, NaiveDate, TimeDelta};
use chrono_tz::Tz;
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A block ended before it began.
    #[error("block '{title}' ends at {end} before it begins at {begin}")]
    EndsBeforeBegin {
        title: String,
        begin: String,
        end: String,
    },
}

/// A contiguous calendar interval with classification metadata.
///
/// Blocks are immutable values. Splitting and trimming produce new blocks via
/// [`EventBlock::with_span`]; the `begin <= end` invariant holds for every
/// instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBlock {
    begin: DateTime<Tz>,
    end: DateTime<Tz>,
    title: String,
    jira_key: String,
    billable: bool,
}

impl EventBlock {
    /// Creates a block after checking that it does not end before it begins.
    pub fn new(
        begin: DateTime<Tz>,
        end: DateTime<Tz>,
        title: impl Into<String>,
        jira_key: impl Into<String>,
        billable: bool,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        if end < begin {
            return Err(ValidationError::EndsBeforeBegin {
                title,
                begin: begin.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self {
            begin,
            end,
            title,
            jira_key: jira_key.into(),
            billable,
        })
    }

    pub const fn begin(&self) -> DateTime<Tz> {
        self.begin
    }

    pub const fn end(&self) -> DateTime<Tz> {
        self.end
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn jira_key(&self) -> &str {
        &self.jira_key
    }

    pub const fn is_billable(&self) -> bool {
        self.billable
    }

    /// Calendar date the block starts on, in the block's own zone.
    pub fn spent_date(&self) -> NaiveDate {
        self.begin.date_naive()
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.begin
    }

    /// Duration in hours, rounded to two decimal places.
    #[expect(
        clippy::cast_precision_loss,
        reason = "calendar durations are far below f64's exact integer range"
    )]
    pub fn hours(&self) -> f64 {
        let hours = self.duration().num_seconds() as f64 / 3600.0;
        (hours * 100.0).round() / 100.0
    }

    /// Returns a copy of this block covering `[begin, end)` instead.
    ///
    /// Callers must keep `begin <= end`; the de-overlapper only ever cuts at
    /// points inside the original span.
    pub(crate) fn with_span(&self, begin: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        debug_assert!(begin <= end, "span must not be inverted");
        Self {
            begin,
            end,
            ..self.clone()
        }
    }
}
