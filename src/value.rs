//! Field kinds and the typed values stored in each lane

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Value kind of a field, fixed for the life of the field name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text, nullable
    String,
    /// Fixed-point decimal with two fractional digits
    Numeric,
    /// Foreign key addressed by a string code (e.g. a budget section "750")
    FkString,
    /// Foreign key addressed by an integer id
    FkInt,
}

impl FieldKind {
    pub const ALL: [FieldKind; 4] = [
        FieldKind::String,
        FieldKind::Numeric,
        FieldKind::FkString,
        FieldKind::FkInt,
    ];

    /// Storage lane this kind lives in
    pub fn lane(&self) -> Lane {
        match self {
            FieldKind::String => Lane::Text,
            FieldKind::Numeric => Lane::Numeric,
            FieldKind::FkString | FieldKind::FkInt => Lane::ForeignKey,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Numeric => "numeric",
            FieldKind::FkString => "fk_string",
            FieldKind::FkInt => "fk_int",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StoreError::UnknownFieldKind(s.to_string()))
    }
}

/// Physical lane a record is stored in.
///
/// Both foreign-key kinds share one lane, so a series is identified by its
/// key plus lane, never by the finer-grained kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Text,
    Numeric,
    ForeignKey,
}

/// A value as stored in a [`VersionRecord`](crate::record::VersionRecord)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "lane", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(Option<String>),
    Numeric(Decimal),
    ForeignKey {
        code: Option<String>,
        id: Option<i64>,
    },
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(Some(value.into()))
    }

    pub fn fk_code(code: impl Into<String>) -> Self {
        FieldValue::ForeignKey {
            code: Some(code.into()),
            id: None,
        }
    }

    pub fn fk_id(id: i64) -> Self {
        FieldValue::ForeignKey {
            code: None,
            id: Some(id),
        }
    }

    pub fn lane(&self) -> Lane {
        match self {
            FieldValue::Text(_) => Lane::Text,
            FieldValue::Numeric(_) => Lane::Numeric,
            FieldValue::ForeignKey { .. } => Lane::ForeignKey,
        }
    }

    /// Project the stored value through a field kind.
    ///
    /// A value read through a kind of another lane projects to `Null`.
    pub fn project(&self, kind: FieldKind) -> CellValue {
        match (kind, self) {
            (FieldKind::String, FieldValue::Text(text)) => CellValue::from(text.clone()),
            (FieldKind::Numeric, FieldValue::Numeric(n)) => CellValue::Numeric(*n),
            (FieldKind::FkString, FieldValue::ForeignKey { code, .. }) => {
                CellValue::from(code.clone())
            }
            (FieldKind::FkInt, FieldValue::ForeignKey { id: Some(id), .. }) => CellValue::Int(*id),
            _ => CellValue::Null,
        }
    }
}

/// The client-facing shape of a value, one scalar per cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int(i64),
    Numeric(Decimal),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map(CellValue::Text).unwrap_or(CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("null"),
            CellValue::Int(n) => write!(f, "{}", n),
            CellValue::Numeric(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}
