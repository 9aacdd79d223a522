//! Core domain logic for harvest-sync.
//!
//! This crate contains the fundamental types and logic for:
//! - Classification: deciding whether a calendar event is billable
//! - Timeline cleanup: clone de-duplication and interval de-overlap
//! - Notes: rendering ledger notes and deriving their identity keys
//! - Reconciliation: matching calendar blocks against ledger rows

mod block;
pub mod classify;
mod clones;
mod engine;
mod ledger;
pub mod notes;
mod overlap;
mod source;

pub use block::{EventBlock, ValidationError};
pub use classify::{KeywordRules, is_billable};
pub use clones::dedupe_clones;
pub use engine::{
    BlockReport, BoxError, Decision, EngineConfig, Outcome, OutcomeCounts, Reconciler,
    RemoteIndex, SyncError, SyncOptions, SyncReport, SyncWindow, collect_blocks, decide,
};
pub use ledger::{ApprovalStatus, EntryPayload, IdentityKey, LedgerEntry, Mapping};
pub use notes::{MAX_NOTE_LEN, NoteFormat, NoteTemplate, TemplateError, build_note, note_key};
pub use overlap::split_overlaps;
pub use source::{CalendarSource, LedgerClient};
