//! ICS calendar feed source for harvest-sync.
//!
//! Downloads a subscribed calendar, expands recurrences, and turns every
//! timed event that overlaps the sync window into a classified
//! [`EventBlock`].

mod parse;
mod recurrence;

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use hs_core::{CalendarSource, EventBlock, KeywordRules, dedupe_clones};
use regex::Regex;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use parse::{EventTime, RawEvent, parse_calendar};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Matches Jira issue keys like `ACME-123`.
static JIRA_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z]{2,}-\d+\b").unwrap());

/// Calendar feed errors.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Download failed. The feed URL is stripped since it usually embeds a secret.
    #[error("calendar download failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("calendar feed returned {0}")]
    Status(StatusCode),
    #[error("failed to parse calendar feed: {0}")]
    Parse(String),
}

/// How raw events become blocks.
#[derive(Debug, Clone)]
pub struct FeedRules {
    pub keywords: KeywordRules,
    /// Title marker for cloned events; empty disables clone handling.
    pub clone_marker: String,
    /// Key used when a title carries no Jira key.
    pub default_jira: String,
    /// Display zone. Blocks are expressed in it and floating times are read in it.
    pub zone: Tz,
}

impl FeedRules {
    fn resolve(&self, time: &EventTime) -> Option<DateTime<Tz>> {
        match time {
            EventTime::Date(_) => None,
            EventTime::Utc(dt) => Some(dt.with_timezone(&self.zone)),
            EventTime::Floating(naive) => localize(self.zone, naive),
            EventTime::Zoned { datetime, tzid } => {
                let tz = tzid.parse::<Tz>().unwrap_or_else(|_| {
                    warn!(tzid = %tzid, zone = %self.zone, "unknown TZID; reading as display zone");
                    self.zone
                });
                localize(tz, datetime).map(|dt| dt.with_timezone(&self.zone))
            }
        }
    }

    /// Classifies one occurrence, or returns `None` when it is skipped.
    fn block(&self, summary: &str, begin: DateTime<Tz>, end: DateTime<Tz>) -> Option<EventBlock> {
        let title = summary.trim();
        let lower = title.to_lowercase();
        if self.keywords.is_skipped(&lower) {
            debug!(title, "skipping event by keyword");
            return None;
        }

        let jira_key = JIRA_KEY
            .find(title)
            .map_or_else(|| self.default_jira.clone(), |m| m.as_str().to_string());
        let billable = self.keywords.is_billable(&lower);

        match EventBlock::new(begin, end, title, jira_key, billable) {
            Ok(block) => Some(block),
            Err(err) => {
                warn!(error = %err, "dropping invalid calendar event");
                None
            }
        }
    }
}

/// Reads a wall time in `tz`. Times skipped by a DST jump move forward an hour.
fn localize(tz: Tz, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(*naive + TimeDelta::hours(1))).earliest())
}

/// Builds classified, clone-free blocks for every timed occurrence that
/// overlaps `[window_start, window_end)`.
///
/// All-day events are ignored. An event without DTEND lasts for its
/// DURATION, or zero time without one. Overrides (`RECURRENCE-ID`) replace
/// the generated instance they name.
pub fn blocks_from_ics(
    content: &str,
    window_start: DateTime<Tz>,
    window_end: DateTime<Tz>,
    rules: &FeedRules,
) -> Result<Vec<EventBlock>, CalendarError> {
    let events = parse_calendar(content)?;

    let overridden: HashSet<(&str, DateTime<Utc>)> = events
        .iter()
        .filter_map(|event| {
            let uid = event.uid.as_deref()?;
            let instant = rules.resolve(event.recurrence_id.as_ref()?)?;
            Some((uid, instant.with_timezone(&Utc)))
        })
        .collect();

    let mut blocks = Vec::new();
    for event in &events {
        let Some(start) = rules.resolve(&event.start) else {
            debug!(summary = %event.summary, "skipping all-day event");
            continue;
        };
        let end = match &event.end {
            Some(end) => rules.resolve(end),
            None => Some(start + event.duration.unwrap_or_default()),
        };
        let Some(end) = end else {
            debug!(summary = %event.summary, "skipping event with a date-only end");
            continue;
        };
        let length = end - start;

        let starts = match (&event.rrule, &event.recurrence_id) {
            (Some(rule), None) => {
                let expanded = recurrence::expand(
                    &event.start,
                    rule,
                    &event.exdates,
                    rules.zone,
                    (window_start - length).with_timezone(&Utc),
                    window_end.with_timezone(&Utc),
                );
                match expanded {
                    Ok(starts) => starts
                        .into_iter()
                        .filter(|instant| match event.uid.as_deref() {
                            Some(uid) => !overridden.contains(&(uid, *instant)),
                            None => true,
                        })
                        .map(|instant| instant.with_timezone(&rules.zone))
                        .collect(),
                    Err(err) => {
                        warn!(
                            summary = %event.summary,
                            error = %err,
                            "invalid RRULE; treating event as a single occurrence"
                        );
                        vec![start]
                    }
                }
            }
            _ => vec![start],
        };

        for begin in starts {
            let end = begin + length;
            if overlaps(begin, end, window_start, window_end) {
                blocks.extend(rules.block(&event.summary, begin, end));
            }
        }
    }

    Ok(dedupe_clones(blocks, &rules.clone_marker))
}

/// Zero-length events count when they sit inside the window.
fn overlaps(
    begin: DateTime<Tz>,
    end: DateTime<Tz>,
    window_start: DateTime<Tz>,
    window_end: DateTime<Tz>,
) -> bool {
    begin < window_end && (end > window_start || begin >= window_start)
}

/// A calendar published as an ICS URL.
pub struct IcsCalendar {
    http: reqwest::Client,
    url: String,
    rules: FeedRules,
}

impl fmt::Debug for IcsCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IcsCalendar")
            .field("url", &"[REDACTED]")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl IcsCalendar {
    /// Creates a feed source for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(url: impl Into<String>, rules: FeedRules) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(CalendarError::ClientBuild)?;
        Ok(Self {
            http,
            url: url.into(),
            rules,
        })
    }

    async fn download(&self) -> Result<String, CalendarError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|err| CalendarError::Request(err.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CalendarError::Status(status));
        }
        response
            .text()
            .await
            .map_err(|err| CalendarError::Request(err.without_url()))
    }
}

impl CalendarSource for IcsCalendar {
    type Error = CalendarError;

    async fn fetch_events(
        &self,
        window_start: DateTime<Tz>,
        window_end: DateTime<Tz>,
    ) -> Result<Vec<EventBlock>, CalendarError> {
        let content = self.download().await?;
        let blocks = blocks_from_ics(&content, window_start, window_end, &self.rules)?;
        info!(
            bytes = content.len(),
            blocks = blocks.len(),
            "loaded calendar feed"
        );
        Ok(blocks)
    }
}
