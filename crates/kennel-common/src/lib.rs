//! Shared domain types for the kennel care tracker.
//!
//! These types mirror the two store tables (`cells` and
//! `cage_configurations`) and the change notifications published for the
//! `cells` table. Their serde shapes are the wire shapes used by the hosted
//! store, so they can be decoded straight from REST and realtime payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a cell's notes, in characters.
pub const MAX_NOTES_LEN: usize = 500;

/// Trim note text; whitespace-only or empty text becomes absent.
pub fn normalize_notes(notes: &str) -> Option<String> {
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Clamp note text to [`MAX_NOTES_LEN`] characters.
pub fn clamp_notes(notes: &str) -> String {
    notes.chars().take(MAX_NOTES_LEN).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellSide {
    Inner,
    Outer,
    Both,
}

impl CellSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "Inner",
            Self::Outer => "Outer",
            Self::Both => "Both",
        }
    }
}

impl fmt::Display for CellSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Inner" => Ok(Self::Inner),
            "Outer" => Ok(Self::Outer),
            "Both" => Ok(Self::Both),
            _ => Err(format!("Invalid cell side: {}", s)),
        }
    }
}

/// Walking status of a cell. Stored as the integers 0, 1 and 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WalkState {
    #[default]
    NotYet,
    Walked,
    DoNotWalk,
}

impl WalkState {
    /// Next state in the fixed cycle `NotYet -> Walked -> DoNotWalk -> NotYet`.
    pub fn next(self) -> Self {
        match self {
            Self::NotYet => Self::Walked,
            Self::Walked => Self::DoNotWalk,
            Self::DoNotWalk => Self::NotYet,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::NotYet => 0,
            Self::Walked => 1,
            Self::DoNotWalk => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotYet => "Not yet",
            Self::Walked => "Walked",
            Self::DoNotWalk => "Do not walk",
        }
    }
}

impl fmt::Display for WalkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<u8> for WalkState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NotYet),
            1 => Ok(Self::Walked),
            2 => Ok(Self::DoNotWalk),
            _ => Err(format!("Invalid walk state: {}", value)),
        }
    }
}

impl From<WalkState> for u8 {
    fn from(state: WalkState) -> Self {
        state.as_u8()
    }
}

/// One row of the `cells` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: i64,
    pub cage_num: i32,
    pub cell_side: CellSide,
    pub state: WalkState,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a cell; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCell {
    pub cage_num: i32,
    pub cell_side: CellSide,
    pub state: WalkState,
    pub notes: Option<String>,
}

impl NewCell {
    /// A fresh cell: `NotYet`, no notes.
    pub fn fresh(cage_num: i32, cell_side: CellSide) -> Self {
        Self {
            cage_num,
            cell_side,
            state: WalkState::NotYet,
            notes: None,
        }
    }
}

/// One row of the `cage_configurations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CageConfiguration {
    pub cage_num: i32,
    /// `true` = Inner/Outer, `false` = one combined cell.
    pub is_split: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Upsert payload for a cage configuration, keyed by `cage_num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationUpdate {
    pub cage_num: i32,
    pub is_split: bool,
}

/// Primary key of a row carried by update/delete notifications.
///
/// Delete notifications usually carry only the key columns, so every other
/// field is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowKey {
    pub id: i64,
}

/// A change notification for the `cells` table.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(CellRecord),
    Update { new: CellRecord, old: Option<RowKey> },
    Delete(RowKey),
    /// Anything that could not be mapped to the three kinds above.
    Other { kind: String },
}

impl ChangeEvent {
    /// Build an event from the raw parts of a change payload.
    ///
    /// Rows that fail to decode turn the event into [`ChangeEvent::Other`],
    /// which consumers treat as "resynchronize".
    pub fn from_parts(
        kind: &str,
        record: Option<serde_json::Value>,
        old_record: Option<serde_json::Value>,
    ) -> Self {
        let decode_new = || {
            record
                .clone()
                .and_then(|v| serde_json::from_value::<CellRecord>(v).ok())
        };
        let decode_old = || {
            old_record
                .clone()
                .and_then(|v| serde_json::from_value::<RowKey>(v).ok())
        };

        let event = match kind {
            "INSERT" => decode_new().map(ChangeEvent::Insert),
            "UPDATE" => decode_new().map(|new| ChangeEvent::Update {
                new,
                old: decode_old(),
            }),
            "DELETE" => decode_old().map(ChangeEvent::Delete),
            _ => None,
        };
        event.unwrap_or_else(|| ChangeEvent::Other {
            kind: kind.to_string(),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Insert(_) => "INSERT",
            Self::Update { .. } => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::Other { kind } => kind,
        }
    }
}
