//! Publication policy model.
//!
//! A policy attaches a time window to an entry. A `PUB` policy makes the
//! entry public while its window is open; a `PIN` policy floats it to the top
//! of listings. An entry carries at most one policy of each kind.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of publication policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyKind {
    #[serde(rename = "PUB", alias = "publish")]
    Publish,
    #[serde(rename = "PIN", alias = "pin")]
    Pin,
}

impl PolicyKind {
    /// Stored and wire code.
    pub fn code(self) -> &'static str {
        match self {
            PolicyKind::Publish => "PUB",
            PolicyKind::Pin => "PIN",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUB" | "publish" => Ok(PolicyKind::Publish),
            "PIN" | "pin" => Ok(PolicyKind::Pin),
            other => Err(format!("\"{other}\" is not a valid choice.")),
        }
    }
}

/// Policy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,

    /// Entry this policy belongs to.
    pub entry: i64,

    /// Policy kind.
    #[serde(rename = "policy")]
    pub kind: PolicyKind,

    /// Window start. A policy without a start is never in effect.
    pub start: Option<DateTime<Utc>>,

    /// Window end (exclusive). Open-ended when None.
    pub end: Option<DateTime<Utc>>,
}

/// Row shape as stored; `kind` is kept as its text code.
#[derive(Debug, sqlx::FromRow)]
pub struct PolicyRow {
    pub id: i64,
    pub entry_id: i64,
    pub kind: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl TryFrom<PolicyRow> for Policy {
    type Error = anyhow::Error;

    fn try_from(row: PolicyRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse()
            .map_err(|e: String| anyhow::anyhow!("policy {}: {e}", row.id))?;
        Ok(Policy {
            id: row.id,
            entry: row.entry_id,
            kind,
            start: row.start_at,
            end: row.end_at,
        })
    }
}

/// Requested policy state for create or update.
///
/// `start` and `end` distinguish "not supplied" (outer `None`, keep the stored
/// value) from "cleared" (`Some(None)`).
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyInput {
    pub kind: PolicyKind,
    pub start: Option<Option<DateTime<Utc>>>,
    pub end: Option<Option<DateTime<Utc>>>,
}

impl PolicyInput {
    /// A policy whose window opens at `start` and never closes.
    pub fn open_from(kind: PolicyKind, start: DateTime<Utc>) -> Self {
        Self {
            kind,
            start: Some(Some(start)),
            end: Some(None),
        }
    }

    /// A policy with no window: present but never in effect.
    pub fn closed(kind: PolicyKind) -> Self {
        Self {
            kind,
            start: Some(None),
            end: Some(None),
        }
    }

    /// Resolve against an existing policy (or nothing, on create).
    pub fn resolve(
        &self,
        existing: Option<&Policy>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start = match self.start {
            Some(v) => v,
            None => existing.and_then(|p| p.start),
        };
        let end = match self.end {
            Some(v) => v,
            None => existing.and_then(|p| p.end),
        };
        (start, end)
    }
}

/// Check a resolved window.
pub fn validate_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), String> {
    match (start, end) {
        (Some(s), Some(e)) if s >= e => Err("End must be later than start.".to_string()),
        _ => Ok(()),
    }
}
