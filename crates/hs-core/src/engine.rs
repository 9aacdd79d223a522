//! Reconciliation of calendar blocks against ledger rows.
//!
//! # Run Summary
//!
//! 1. Verify the ledger books durations (abort otherwise, before any fetch)
//! 2. List ledger rows and fetch calendar blocks concurrently
//! 3. De-overlap the blocks
//! 4. Decide and apply skip/create/patch for each block, in order
//! 5. Fail the run if any create/patch call failed
//!
//! Every decision is a pure function of the block, the remote snapshot and
//! the configuration (see [`decide`]), which is what makes repeated runs safe:
//! a second run over an unchanged window finds every block either approved or
//! within tolerance of its row.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

use crate::block::EventBlock;
use crate::ledger::{EntryPayload, IdentityKey, LedgerEntry, Mapping};
use crate::notes::NoteFormat;
use crate::overlap::split_overlaps;
use crate::source::{CalendarSource, LedgerClient};

/// Hour differences below this many hundredths are rounding noise, not edits.
const TOLERANCE_HUNDREDTHS: f64 = 5.0;

/// Type-erased collaborator error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The requested window is empty.
    #[error("invalid sync window: start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
    /// The ledger account cannot be synced (e.g. it uses start/stop timers).
    #[error("ledger precondition failed: {0}")]
    Precondition(#[source] BoxError),
    /// Listing existing ledger rows failed.
    #[error("failed to list ledger entries: {0}")]
    Ledger(#[source] BoxError),
    /// Fetching calendar events failed.
    #[error("failed to fetch calendar events: {0}")]
    Calendar(#[source] BoxError),
    /// One or more create/patch calls failed. Every other block was still
    /// reconciled; the report records which ones failed.
    #[error("{} of {} ledger writes failed", .report.counts().failed, .report.writes_attempted())]
    Write { report: Box<SyncReport> },
}

/// Settings the engine needs beyond the two collaborators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Project/task for billable work.
    pub default_mapping: Mapping,
    /// Project/task for non-billable work.
    pub non_billable_mapping: Mapping,
    pub notes: NoteFormat,
}

impl EngineConfig {
    pub const fn mapping_for(&self, billable: bool) -> Mapping {
        if billable {
            self.default_mapping
        } else {
            self.non_billable_mapping
        }
    }
}

/// Inclusive range of calendar dates to sync, anchored in the display zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    start: NaiveDate,
    end: NaiveDate,
    zone: Tz,
}

impl SyncWindow {
    pub fn from_dates(start: NaiveDate, end: NaiveDate, zone: Tz) -> Result<Self, SyncError> {
        if start > end {
            return Err(SyncError::InvalidWindow { start, end });
        }
        Ok(Self { start, end, zone })
    }

    pub const fn start_date(&self) -> NaiveDate {
        self.start
    }

    pub const fn end_date(&self) -> NaiveDate {
        self.end
    }

    pub const fn zone(&self) -> Tz {
        self.zone
    }

    /// Half-open instant range: start-date midnight to the midnight after
    /// end-date.
    pub fn bounds(&self) -> (DateTime<Tz>, DateTime<Tz>) {
        let after_end = self.end.succ_opt().unwrap_or(NaiveDate::MAX);
        (
            local_midnight(self.zone, self.start),
            local_midnight(self.zone, after_end),
        )
    }
}

/// Midnight in `zone`. Ambiguous midnights resolve to the earlier instant; a
/// midnight skipped by a DST jump falls back to the same wall time in UTC.
fn local_midnight(zone: Tz, date: NaiveDate) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);
    zone.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| zone.from_utc_datetime(&midnight))
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Log intended mutations without issuing them.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EditableRow {
    id: u64,
    hours: f64,
}

/// Snapshot of remote rows keyed by identity key.
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    approved: HashSet<IdentityKey>,
    editable: HashMap<IdentityKey, EditableRow>,
}

impl RemoteIndex {
    /// Indexes rows by `(spent_date, note_key(notes))`.
    ///
    /// Approved rows only mark their key as locked. Among editable rows that
    /// share a key, the last one listed wins.
    pub fn from_entries(entries: &[LedgerEntry], notes: &NoteFormat) -> Self {
        let mut index = Self::default();
        for entry in entries {
            let key = IdentityKey::new(entry.spent_date, notes.key(&entry.notes));
            if entry.approval_status.is_approved() {
                index.approved.insert(key);
            } else if let Some(id) = entry.id {
                index.editable.insert(
                    key,
                    EditableRow {
                        id,
                        hours: entry.hours,
                    },
                );
            } else {
                tracing::warn!(%key, "ignoring ledger row without id");
            }
        }
        tracing::info!(
            rows = entries.len(),
            approved = index.approved.len(),
            editable = index.editable.len(),
            "indexed ledger rows"
        );
        index
    }

    pub fn is_approved(&self, key: &IdentityKey) -> bool {
        self.approved.contains(key)
    }

    /// Id and hours of the editable row owning `key`.
    pub fn editable(&self, key: &IdentityKey) -> Option<(u64, f64)> {
        self.editable.get(key).map(|row| (row.id, row.hours))
    }
}

/// What the engine intends to do with one block.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    SkipNonBillable,
    SkipApproved {
        key: IdentityKey,
    },
    Create {
        key: IdentityKey,
        payload: EntryPayload,
    },
    Patch {
        key: IdentityKey,
        entry_id: u64,
        from: f64,
        to: f64,
    },
    Unchanged {
        key: IdentityKey,
        hours: f64,
    },
    /// An earlier block in the same run already claimed this key.
    SkipDuplicate {
        key: IdentityKey,
    },
}

impl Decision {
    pub const fn key(&self) -> Option<&IdentityKey> {
        match self {
            Self::SkipNonBillable => None,
            Self::SkipApproved { key }
            | Self::SkipDuplicate { key }
            | Self::Create { key, .. }
            | Self::Patch { key, .. }
            | Self::Unchanged { key, .. } => Some(key),
        }
    }
}

/// Decides the fate of one block against the remote snapshot.
pub fn decide(block: &EventBlock, index: &RemoteIndex, config: &EngineConfig) -> Decision {
    if !block.is_billable() {
        return Decision::SkipNonBillable;
    }

    let note = config.notes.render(block);
    let spent_date = block
        .begin()
        .with_timezone(&config.notes.zone())
        .date_naive();
    let key = IdentityKey::new(spent_date, config.notes.key(&note));
    if index.is_approved(&key) {
        return Decision::SkipApproved { key };
    }

    let hours = block.hours();
    match index.editable(&key) {
        None => {
            let mapping = config.mapping_for(block.is_billable());
            Decision::Create {
                key,
                payload: EntryPayload {
                    project_id: mapping.project_id,
                    task_id: mapping.task_id,
                    spent_date,
                    hours,
                    notes: note,
                },
            }
        }
        Some((_, existing)) if within_tolerance(existing, hours) => Decision::Unchanged {
            key,
            hours: existing,
        },
        Some((entry_id, existing)) => Decision::Patch {
            key,
            entry_id,
            from: existing,
            to: hours,
        },
    }
}

/// Compares hours as whole hundredths so float noise cannot move the
/// tolerance boundary.
fn within_tolerance(existing: f64, proposed: f64) -> bool {
    ((existing * 100.0).round() - (proposed * 100.0).round()).abs() < TOLERANCE_HUNDREDTHS
}

/// Terminal state of one block.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    SkippedNonBillable,
    SkippedApproved,
    SkippedDuplicate,
    Created { hours: f64 },
    Patched { entry_id: u64, from: f64, to: f64 },
    Unchanged { hours: f64 },
    /// The create/patch call failed with this error.
    Failed { error: String },
}

/// Outcome of one block, with enough context to audit it.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockReport {
    pub title: String,
    pub begin: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub key: Option<IdentityKey>,
    pub outcome: Outcome,
}

/// Number of blocks per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub skipped_non_billable: usize,
    pub skipped_approved: usize,
    pub skipped_duplicate: usize,
    pub created: usize,
    pub patched: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Result of a sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub window: SyncWindow,
    pub dry_run: bool,
    pub blocks: Vec<BlockReport>,
}

impl SyncReport {
    pub const fn new(window: SyncWindow, dry_run: bool) -> Self {
        Self {
            window,
            dry_run,
            blocks: Vec::new(),
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for block in &self.blocks {
            match block.outcome {
                Outcome::SkippedNonBillable => counts.skipped_non_billable += 1,
                Outcome::SkippedApproved => counts.skipped_approved += 1,
                Outcome::SkippedDuplicate => counts.skipped_duplicate += 1,
                Outcome::Created { .. } => counts.created += 1,
                Outcome::Patched { .. } => counts.patched += 1,
                Outcome::Unchanged { .. } => counts.unchanged += 1,
                Outcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    /// Number of create/patch calls the run issued (or would have issued).
    pub fn writes_attempted(&self) -> usize {
        let counts = self.counts();
        counts.created + counts.patched + counts.failed
    }
}

/// Fetches calendar blocks for a window and de-overlaps them.
pub async fn collect_blocks<C: CalendarSource>(
    calendar: &C,
    window: &SyncWindow,
) -> Result<Vec<EventBlock>, SyncError> {
    let (start, end) = window.bounds();
    let raw = calendar
        .fetch_events(start, end)
        .await
        .map_err(|err| SyncError::Calendar(Box::new(err)))?;
    let blocks = split_overlaps(raw);
    tracing::info!(count = blocks.len(), "calendar blocks after de-overlap");
    Ok(blocks)
}

/// Drives one sync run against a calendar and a ledger.
pub struct Reconciler<'a, C, L> {
    calendar: &'a C,
    ledger: &'a L,
    config: &'a EngineConfig,
}

impl<'a, C: CalendarSource, L: LedgerClient> Reconciler<'a, C, L> {
    pub const fn new(calendar: &'a C, ledger: &'a L, config: &'a EngineConfig) -> Self {
        Self {
            calendar,
            ledger,
            config,
        }
    }

    /// Runs a full sync over `window`.
    ///
    /// Verification, listing and fetching failures abort the run before any
    /// write. A failed create/patch only fails its own block: the remaining
    /// blocks are still reconciled, and the run then returns
    /// [`SyncError::Write`] carrying the full report. Re-running retries only
    /// the rows that are still missing or drifted.
    pub async fn run(
        &self,
        window: &SyncWindow,
        options: SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        tracing::info!(
            start = %window.start_date(),
            end = %window.end_date(),
            dry_run = options.dry_run,
            "sync started"
        );

        self.ledger
            .verify_mode()
            .await
            .map_err(|err| SyncError::Precondition(Box::new(err)))?;

        let (entries, blocks) = tokio::try_join!(
            self.list_entries(window),
            collect_blocks(self.calendar, window)
        )?;
        let index = RemoteIndex::from_entries(&entries, &self.config.notes);

        let mut report = SyncReport::new(*window, options.dry_run);
        let mut claimed = HashSet::new();
        for block in blocks {
            let mut decision = decide(&block, &index, self.config);
            // De-overlap can emit the same span twice; book it once.
            let repeated = decision
                .key()
                .filter(|key| !claimed.insert((*key).clone()))
                .cloned();
            if let Some(key) = repeated {
                decision = Decision::SkipDuplicate { key };
            }
            let outcome = self.apply(&block, &decision, options).await;
            report.blocks.push(BlockReport {
                title: block.title().to_string(),
                begin: block.begin(),
                end: block.end(),
                key: decision.key().cloned(),
                outcome,
            });
        }

        let counts = report.counts();
        tracing::info!(
            created = counts.created,
            patched = counts.patched,
            unchanged = counts.unchanged,
            skipped_approved = counts.skipped_approved,
            skipped_non_billable = counts.skipped_non_billable,
            skipped_duplicate = counts.skipped_duplicate,
            failed = counts.failed,
            "sync complete"
        );
        if counts.failed > 0 {
            return Err(SyncError::Write {
                report: Box::new(report),
            });
        }
        Ok(report)
    }

    async fn list_entries(&self, window: &SyncWindow) -> Result<Vec<LedgerEntry>, SyncError> {
        self.ledger
            .list_entries(window.start_date(), window.end_date())
            .await
            .map_err(|err| SyncError::Ledger(Box::new(err)))
    }

    async fn apply(
        &self,
        block: &EventBlock,
        decision: &Decision,
        options: SyncOptions,
    ) -> Outcome {
        let Some(key) = decision.key() else {
            tracing::info!(title = block.title(), "skipping non-billable event");
            return Outcome::SkippedNonBillable;
        };

        let (start, end) = self.config.notes.time_span(block);
        tracing::info!(
            title = block.title(),
            %start,
            %end,
            jira = block.jira_key(),
            %key,
            "event"
        );

        match decision {
            Decision::SkipNonBillable => Outcome::SkippedNonBillable,
            Decision::SkipApproved { .. } => {
                tracing::info!(%key, "already approved; skipping");
                Outcome::SkippedApproved
            }
            Decision::SkipDuplicate { .. } => {
                tracing::warn!(%key, "key already handled earlier in this run; skipping");
                Outcome::SkippedDuplicate
            }
            Decision::Unchanged { hours, .. } => {
                tracing::info!(hours, "no change");
                Outcome::Unchanged { hours: *hours }
            }
            Decision::Create { payload, .. } => {
                if options.dry_run {
                    tracing::info!(?payload, "dry-run: would create entry");
                } else if let Err(err) = self.ledger.create_entry(payload).await {
                    tracing::error!(%key, error = %err, "failed to create entry");
                    return Outcome::Failed {
                        error: err.to_string(),
                    };
                } else {
                    tracing::info!(hours = payload.hours, "created entry");
                }
                Outcome::Created {
                    hours: payload.hours,
                }
            }
            Decision::Patch {
                entry_id, from, to, ..
            } => {
                let (entry_id, from, to) = (*entry_id, *from, *to);
                if options.dry_run {
                    tracing::info!(entry_id, from, to, "dry-run: would patch hours");
                } else if let Err(err) = self.ledger.patch_hours(entry_id, to).await {
                    tracing::error!(entry_id, error = %err, "failed to patch hours");
                    return Outcome::Failed {
                        error: err.to_string(),
                    };
                } else {
                    tracing::info!(entry_id, from, to, "patched hours");
                }
                Outcome::Patched { entry_id, from, to }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeDelta;
    use chrono_tz::America::New_York;

    use super::*;
    use crate::ledger::ApprovalStatus;

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct FakeError(String);

    /// In-memory ledger that records every call.
    #[derive(Default)]
    struct FakeLedger {
        timer_mode: bool,
        /// Creates whose notes contain this substring fail.
        fail_notes_containing: Option<&'static str>,
        entries: Mutex<Vec<LedgerEntry>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeLedger {
        fn with_entries(entries: Vec<LedgerEntry>) -> Self {
            Self {
                entries: Mutex::new(entries),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn mutations(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|call| call.starts_with("create") || call.starts_with("patch"))
                .collect()
        }
    }

    impl LedgerClient for FakeLedger {
        type Error = FakeError;

        async fn verify_mode(&self) -> Result<(), FakeError> {
            self.calls.lock().unwrap().push("verify".to_string());
            if self.timer_mode {
                return Err(FakeError("account uses timers".to_string()));
            }
            Ok(())
        }

        async fn list_entries(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<LedgerEntry>, FakeError> {
            self.calls.lock().unwrap().push("list".to_string());
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn create_entry(&self, payload: &EntryPayload) -> Result<(), FakeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {}", payload.notes));
            if let Some(needle) = self.fail_notes_containing {
                if payload.notes.contains(needle) {
                    return Err(FakeError("422 Unprocessable Entity".to_string()));
                }
            }
            let mut entries = self.entries.lock().unwrap();
            let id = entries.len() as u64 + 1;
            entries.push(LedgerEntry {
                id: Some(id),
                spent_date: payload.spent_date,
                hours: payload.hours,
                notes: payload.notes.clone(),
                approval_status: ApprovalStatus::Absent,
            });
            Ok(())
        }

        async fn patch_hours(&self, entry_id: u64, hours: f64) -> Result<(), FakeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("patch {entry_id} {hours:.2}"));
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.iter_mut().find(|e| e.id == Some(entry_id)) {
                entry.hours = hours;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCalendar {
        blocks: Vec<EventBlock>,
        fail: bool,
        fetches: Mutex<usize>,
    }

    impl CalendarSource for FakeCalendar {
        type Error = FakeError;

        async fn fetch_events(
            &self,
            _window_start: DateTime<Tz>,
            _window_end: DateTime<Tz>,
        ) -> Result<Vec<EventBlock>, FakeError> {
            *self.fetches.lock().unwrap() += 1;
            if self.fail {
                return Err(FakeError("connection refused".to_string()));
            }
            Ok(self.blocks.clone())
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            default_mapping: Mapping {
                project_id: 100,
                task_id: 200,
            },
            non_billable_mapping: Mapping {
                project_id: 300,
                task_id: 400,
            },
            notes: NoteFormat::new(
                "{jira} {title} [{date} {start}] | {end}",
                "%Y-%m-%d",
                "%H:%M",
                "|",
                New_York,
            )
            .unwrap(),
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn window() -> SyncWindow {
        SyncWindow::from_dates(date(27), date(31), New_York).unwrap()
    }

    /// Billable block on 2025-01-27 starting at `hour` and lasting `seconds`.
    fn block(hour: u32, seconds: i64, title: &str) -> EventBlock {
        let begin = New_York.with_ymd_and_hms(2025, 1, 27, hour, 0, 0).unwrap();
        EventBlock::new(
            begin,
            begin + TimeDelta::seconds(seconds),
            title,
            "ACME-7",
            true,
        )
        .unwrap()
    }

    fn non_billable(hour: u32, title: &str) -> EventBlock {
        let begin = New_York.with_ymd_and_hms(2025, 1, 27, hour, 0, 0).unwrap();
        EventBlock::new(begin, begin + TimeDelta::hours(1), title, "NOJIRA", false).unwrap()
    }

    /// A remote row whose note was rendered for the same start but a
    /// different end, so it shares the block's identity key.
    fn row_for(block: &EventBlock, id: u64, hours: f64, status: ApprovalStatus) -> LedgerEntry {
        let stale = block.with_span(block.begin(), block.begin() + TimeDelta::hours(2));
        LedgerEntry {
            id: Some(id),
            spent_date: block.spent_date(),
            hours,
            notes: config().notes.render(&stale),
            approval_status: status,
        }
    }

    #[test]
    fn unchanged_within_tolerance() {
        let b = block(9, 7308, "Acme sync"); // 2.03h
        let index = RemoteIndex::from_entries(
            &[row_for(&b, 11, 2.0, ApprovalStatus::Editable("unsubmitted".into()))],
            &config().notes,
        );
        let decision = decide(&b, &index, &config());
        assert!(matches!(decision, Decision::Unchanged { hours, .. } if (hours - 2.0).abs() < f64::EPSILON));
    }

    #[test]
    fn tolerance_boundary_patches_at_any_magnitude() {
        // 123 and 63 minutes round to 2.05h and 1.05h: exactly 0.05 away.
        for (existing, seconds, to) in [(2.0, 7380, 2.05), (1.0, 3780, 1.05), (10.0, 36180, 10.05)] {
            let b = block(9, seconds, "Acme sync");
            let index = RemoteIndex::from_entries(
                &[row_for(&b, 11, existing, ApprovalStatus::Absent)],
                &config().notes,
            );
            match decide(&b, &index, &config()) {
                Decision::Patch { to: patched, .. } => assert!((patched - to).abs() < f64::EPSILON),
                other => panic!("expected patch from {existing}, got {other:?}"),
            }
        }
    }

    #[test]
    fn just_below_tolerance_is_unchanged() {
        let b = block(9, 7344, "Acme sync"); // 2.04h
        let index = RemoteIndex::from_entries(
            &[row_for(&b, 11, 2.0, ApprovalStatus::Absent)],
            &config().notes,
        );
        assert!(matches!(
            decide(&b, &index, &config()),
            Decision::Unchanged { .. }
        ));
    }

    #[test]
    fn patches_when_delta_exceeds_tolerance() {
        let b = block(9, 7560, "Acme sync"); // 2.10h
        let index = RemoteIndex::from_entries(
            &[row_for(&b, 11, 2.0, ApprovalStatus::Absent)],
            &config().notes,
        );
        match decide(&b, &index, &config()) {
            Decision::Patch {
                entry_id, from, to, ..
            } => {
                assert_eq!(entry_id, 11);
                assert!((from - 2.0).abs() < f64::EPSILON);
                assert!((to - 2.1).abs() < f64::EPSILON);
            }
            other => panic!("expected patch, got {other:?}"),
        }
    }

    #[test]
    fn creates_with_default_mapping_and_display_date() {
        let b = block(23, 5400, "Late acme call");
        let decision = decide(&b, &RemoteIndex::default(), &config());
        let Decision::Create { key, payload } = decision else {
            panic!("expected create, got {decision:?}");
        };
        assert_eq!(key.spent_date, date(27));
        assert_eq!(key.note_key, "ACME-7 Late acme call [2025-01-27 23:00] ");
        assert_eq!(payload.project_id, 100);
        assert_eq!(payload.task_id, 200);
        assert_eq!(payload.spent_date, date(27));
        assert!((payload.hours - 1.5).abs() < f64::EPSILON);
        assert_eq!(payload.notes, "ACME-7 Late acme call [2025-01-27 23:00] | 00:30");
    }

    #[test]
    fn approved_row_wins_over_editable_duplicate() {
        let b = block(9, 3600, "Acme sync");
        let index = RemoteIndex::from_entries(
            &[
                row_for(&b, 1, 0.5, ApprovalStatus::Absent),
                row_for(&b, 2, 2.0, ApprovalStatus::Approved),
            ],
            &config().notes,
        );
        assert!(matches!(
            decide(&b, &index, &config()),
            Decision::SkipApproved { .. }
        ));
    }

    #[test]
    fn last_editable_row_wins_key() {
        let b = block(9, 3600, "Acme sync");
        let index = RemoteIndex::from_entries(
            &[
                row_for(&b, 1, 0.5, ApprovalStatus::Absent),
                row_for(&b, 2, 3.0, ApprovalStatus::Absent),
            ],
            &config().notes,
        );
        assert!(matches!(
            decide(&b, &index, &config()),
            Decision::Patch { entry_id: 2, .. }
        ));
    }

    #[test]
    fn mapping_for_non_billable_uses_non_billable_pair() {
        let config = config();
        assert_eq!(config.mapping_for(false).project_id, 300);
        assert_eq!(config.mapping_for(true).project_id, 100);
    }

    #[test]
    fn window_rejects_inverted_dates() {
        let err = SyncWindow::from_dates(date(28), date(27), New_York).unwrap_err();
        assert!(matches!(err, SyncError::InvalidWindow { .. }));
    }

    #[test]
    fn window_bounds_cover_whole_end_day() {
        let (start, end) = window().bounds();
        assert_eq!(start, New_York.with_ymd_and_hms(2025, 1, 27, 0, 0, 0).unwrap());
        assert_eq!(end, New_York.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn approved_block_issues_no_mutation() {
        let b = block(9, 3600, "Acme sync");
        let ledger = FakeLedger::with_entries(vec![row_for(&b, 5, 1.0, ApprovalStatus::Approved)]);
        let calendar = FakeCalendar {
            blocks: vec![b],
            ..FakeCalendar::default()
        };
        let config = config();
        let report = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.blocks[0].outcome, Outcome::SkippedApproved);
        assert!(ledger.mutations().is_empty());
    }

    #[tokio::test]
    async fn non_billable_block_is_skipped_without_calls() {
        let ledger = FakeLedger::default();
        let calendar = FakeCalendar {
            blocks: vec![non_billable(12, "Lunch")],
            ..FakeCalendar::default()
        };
        let config = config();
        let report = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.blocks[0].outcome, Outcome::SkippedNonBillable);
        assert_eq!(report.blocks[0].key, None);
        assert_eq!(ledger.calls(), vec!["verify", "list"]);
    }

    #[tokio::test]
    async fn patch_scenario_updates_hours_only() {
        let b = block(9, 7560, "Acme sync");
        let ledger = FakeLedger::with_entries(vec![row_for(&b, 11, 2.0, ApprovalStatus::Absent)]);
        let calendar = FakeCalendar {
            blocks: vec![b],
            ..FakeCalendar::default()
        };
        let config = config();
        let report = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(ledger.mutations(), vec!["patch 11 2.10"]);
        assert!(matches!(
            report.blocks[0].outcome,
            Outcome::Patched { entry_id: 11, .. }
        ));
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let calendar = FakeCalendar {
            blocks: vec![
                block(9, 3600, "Acme standup"),
                block(9, 5400, "Acme planning"),
                block(14, 2700, "Acme review"),
                non_billable(12, "Lunch"),
            ],
            ..FakeCalendar::default()
        };
        let ledger = FakeLedger::default();
        let config = config();
        let reconciler = Reconciler::new(&calendar, &ledger, &config);

        let first = reconciler
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();
        let first_counts = first.counts();
        assert_eq!(first_counts.created, 4);
        assert_eq!(first_counts.skipped_non_billable, 1);

        let second = reconciler
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();
        let counts = second.counts();
        assert_eq!(counts.created, 0);
        assert_eq!(counts.patched, 0);
        assert_eq!(counts.unchanged, 4);
        assert_eq!(counts.skipped_non_billable, 1);
    }

    #[tokio::test]
    async fn dry_run_issues_no_mutations() {
        let b = block(9, 7560, "Acme sync");
        let ledger = FakeLedger::with_entries(vec![row_for(&b, 11, 2.0, ApprovalStatus::Absent)]);
        let calendar = FakeCalendar {
            blocks: vec![b, block(15, 1800, "Acme demo")],
            ..FakeCalendar::default()
        };
        let config = config();
        let report = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions { dry_run: true })
            .await
            .unwrap();

        assert!(report.dry_run);
        assert!(ledger.mutations().is_empty());
        let counts = report.counts();
        assert_eq!(counts.patched, 1);
        assert_eq!(counts.created, 1);
    }

    #[tokio::test]
    async fn timer_mode_aborts_before_fetching() {
        let ledger = FakeLedger {
            timer_mode: true,
            ..FakeLedger::default()
        };
        let calendar = FakeCalendar {
            blocks: vec![block(9, 3600, "Acme sync")],
            ..FakeCalendar::default()
        };
        let config = config();
        let err = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Precondition(_)));
        assert_eq!(ledger.calls(), vec!["verify"]);
        assert_eq!(*calendar.fetches.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn calendar_failure_is_fatal() {
        let ledger = FakeLedger::default();
        let calendar = FakeCalendar {
            fail: true,
            ..FakeCalendar::default()
        };
        let config = config();
        let err = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Calendar(_)));
        assert!(ledger.mutations().is_empty());
    }

    #[tokio::test]
    async fn failed_create_does_not_stop_later_blocks() {
        let ledger = FakeLedger {
            fail_notes_containing: Some("broken"),
            ..FakeLedger::default()
        };
        let calendar = FakeCalendar {
            blocks: vec![
                block(8, 3600, "Acme first"),
                block(9, 3600, "Acme broken"),
                block(11, 3600, "Acme later"),
            ],
            ..FakeCalendar::default()
        };
        let config = config();
        let err = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap_err();

        let mutations = ledger.mutations();
        assert_eq!(mutations.len(), 3);
        assert!(mutations[2].contains("Acme later"));

        assert_eq!(err.to_string(), "1 of 3 ledger writes failed");
        let SyncError::Write { report } = err else {
            panic!("expected write error, got {err:?}");
        };
        let counts = report.counts();
        assert_eq!(counts.created, 2);
        assert_eq!(counts.failed, 1);
        let failed = &report.blocks[1];
        assert_eq!(
            failed.key.as_ref().unwrap().note_key,
            "ACME-7 Acme broken [2025-01-27 09:00] "
        );
        assert_eq!(
            failed.outcome,
            Outcome::Failed {
                error: "422 Unprocessable Entity".to_string()
            }
        );
    }

    #[tokio::test]
    async fn rerun_after_failure_only_creates_missing_rows() {
        let calendar = FakeCalendar {
            blocks: vec![block(8, 3600, "Acme first"), block(9, 3600, "Acme broken")],
            ..FakeCalendar::default()
        };
        let mut ledger = FakeLedger {
            fail_notes_containing: Some("broken"),
            ..FakeLedger::default()
        };
        let config = config();
        assert!(
            Reconciler::new(&calendar, &ledger, &config)
                .run(&window(), SyncOptions::default())
                .await
                .is_err()
        );

        ledger.fail_notes_containing = None;
        let report = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();
        let counts = report.counts();
        assert_eq!(counts.unchanged, 1);
        assert_eq!(counts.created, 1);
    }

    #[tokio::test]
    async fn overlapping_blocks_are_split_before_matching() {
        let calendar = FakeCalendar {
            blocks: vec![
                block(10, 5400, "Acme planning"), // 10:00-11:30
                block(9, 5400, "Acme standup"),   // 09:00-10:30
            ],
            ..FakeCalendar::default()
        };
        let ledger = FakeLedger::default();
        let config = config();
        let report = Reconciler::new(&calendar, &ledger, &config)
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();

        let created: Vec<_> = report
            .blocks
            .iter()
            .map(|b| match b.outcome {
                Outcome::Created { hours } => (b.title.as_str(), hours),
                ref other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(
            created,
            vec![
                ("Acme standup", 1.5),
                ("Acme planning", 0.5),
                ("Acme planning", 1.0),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_piece_is_booked_once() {
        // [09:00,10:00) and [09:00,10:30) share their first hour after de-overlap.
        let calendar = FakeCalendar {
            blocks: vec![block(9, 3600, "Acme sync"), block(9, 5400, "Acme sync")],
            ..FakeCalendar::default()
        };
        let ledger = FakeLedger::default();
        let config = config();
        let reconciler = Reconciler::new(&calendar, &ledger, &config);

        let first = reconciler
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();
        let outcomes: Vec<_> = first.blocks.iter().map(|b| b.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Created { hours: 1.0 },
                Outcome::SkippedDuplicate,
                Outcome::Created { hours: 0.5 },
            ]
        );
        assert_eq!(ledger.mutations().len(), 2);

        let second = reconciler
            .run(&window(), SyncOptions::default())
            .await
            .unwrap();
        let counts = second.counts();
        assert_eq!(counts.created, 0);
        assert_eq!(counts.unchanged, 2);
        assert_eq!(counts.skipped_duplicate, 1);
    }
}
