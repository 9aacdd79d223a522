//! Ledger rows, proposed payloads and identity keys.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Approval state of a remote ledger row.
///
/// Only [`ApprovalStatus::Approved`] rows are locked. Any other reported
/// status is kept verbatim in [`ApprovalStatus::Editable`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ApprovalStatus {
    Approved,
    Editable(String),
    #[default]
    Absent,
}

impl ApprovalStatus {
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl From<Option<String>> for ApprovalStatus {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(status) if status == "approved" => Self::Approved,
            Some(status) => Self::Editable(status),
            None => Self::Absent,
        }
    }
}

impl From<ApprovalStatus> for Option<String> {
    fn from(status: ApprovalStatus) -> Self {
        match status {
            ApprovalStatus::Approved => Some("approved".to_string()),
            ApprovalStatus::Editable(status) => Some(status),
            ApprovalStatus::Absent => None,
        }
    }
}

/// A time entry as stored by the remote ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Remote identifier; `None` until the row has been created.
    #[serde(default)]
    pub id: Option<u64>,
    pub spent_date: NaiveDate,
    #[serde(default)]
    pub hours: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Project/task pair a new entry is booked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub project_id: u64,
    pub task_id: u64,
}

/// Body of a create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPayload {
    pub project_id: u64,
    pub task_id: u64,
    pub spent_date: NaiveDate,
    pub hours: f64,
    pub notes: String,
}

/// Join key between computed blocks and remote rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub spent_date: NaiveDate,
    pub note_key: String,
}

impl IdentityKey {
    pub fn new(spent_date: NaiveDate, note_key: impl Into<String>) -> Self {
        Self {
            spent_date,
            note_key: note_key.into(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.spent_date, self.note_key)
    }
}
