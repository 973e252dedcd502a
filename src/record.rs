//! Version records and the keys that group them into series

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::value::{CellValue, FieldKind, FieldValue, Lane};

/// Logical entity kinds whose fields are versioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A budget planning row
    PlanningRecord,
    /// A per-year sub-record of a planning row
    YearRecord,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [EntityType::PlanningRecord, EntityType::YearRecord];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::PlanningRecord => "planning_record",
            EntityType::YearRecord => "year_record",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::UnknownEntityType(s.to_string()))
    }
}

/// Opaque identifier of the acting user, kept for audit only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

/// Identifies a history series: every record sharing this key and lane
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub field_name: String,
}

impl SeriesKey {
    pub fn new(entity_type: EntityType, entity_id: i64, field_name: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id,
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.entity_type, self.entity_id, self.field_name)
    }
}

/// One immutable version of a field.
///
/// `timestamp`, `seq` and `version` are assigned by the store at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(flatten)]
    pub key: SeriesKey,
    pub value: FieldValue,
    pub timestamp: DateTime<Utc>,
    /// Position of the record in the store's global append order
    pub seq: u64,
    /// 1-based position of the record within its series
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
}

impl VersionRecord {
    pub fn lane(&self) -> Lane {
        self.value.lane()
    }

    /// The record's value as seen through `kind`
    pub fn cell(&self, kind: FieldKind) -> CellValue {
        self.value.project(kind)
    }

    /// Ordering key within a series; greater is newer
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.seq)
    }

    pub fn entry(&self, kind: FieldKind) -> HistoryEntry {
        HistoryEntry {
            value: self.cell(kind),
            timestamp: self.timestamp,
            version: self.version,
            created_by: self.created_by,
        }
    }
}

/// A record reduced to what clients are shown: value, time and author
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub value: CellValue,
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
}
