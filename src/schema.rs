//! Field schema: which fields each entity has and which lane each one uses

use std::collections::BTreeMap;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::record::EntityType;
use crate::value::{FieldKind, FieldValue};

/// Maximum length of a text value
pub const MAX_TEXT_LEN: usize = 2000;
/// Maximum length of a foreign-key code
pub const MAX_CODE_LEN: usize = 10;
/// Fractional digits kept for numeric values
pub const NUMERIC_SCALE: u32 = 2;
/// Total digits allowed for numeric values
pub const NUMERIC_PRECISION: u32 = 15;

const PLANNING_RECORD_FIELDS: &[(&str, FieldKind)] = &[
    ("nazwa_projektu", FieldKind::String),
    ("nazwa_zadania", FieldKind::String),
    ("szczegolowe_uzasadnienie_realizacji", FieldKind::String),
    ("budzet", FieldKind::String),
    ("czesc_budzetowa_kod", FieldKind::FkString),
    ("dzial_kod", FieldKind::FkString),
    ("rozdzial_kod", FieldKind::FkString),
    ("paragraf_kod", FieldKind::FkString),
    ("zrodlo_finansowania_kod", FieldKind::FkString),
    ("grupa_wydatkow_id", FieldKind::FkInt),
    ("komorka_organizacyjna_id", FieldKind::FkInt),
];

const YEAR_RECORD_FIELDS: &[(&str, FieldKind)] = &[
    ("limit", FieldKind::Numeric),
    ("potrzeba", FieldKind::Numeric),
];

/// Static classification of field names into value kinds, per entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: BTreeMap<EntityType, Vec<(String, FieldKind)>>,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::budget()
    }
}

impl FieldSchema {
    /// An empty schema; every field lookup fails until fields are declared
    pub fn empty() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// The budget-planning schema: planning records and their year records
    pub fn budget() -> Self {
        let mut schema = Self::empty();
        for (name, kind) in PLANNING_RECORD_FIELDS {
            schema.declare(EntityType::PlanningRecord, *name, *kind);
        }
        for (name, kind) in YEAR_RECORD_FIELDS {
            schema.declare(EntityType::YearRecord, *name, *kind);
        }
        schema
    }

    /// Build a schema from `entity_type -> field -> kind` string tables
    pub fn from_tables(tables: &BTreeMap<String, BTreeMap<String, String>>) -> Result<Self> {
        let mut schema = Self::empty();
        for (entity, fields) in tables {
            let entity_type: EntityType = entity.parse()?;
            for (name, kind) in fields {
                schema.declare(entity_type, name.clone(), kind.parse()?);
            }
        }
        Ok(schema)
    }

    /// Declare (or redeclare) a field. Declaration order is kept.
    pub fn declare(&mut self, entity_type: EntityType, name: impl Into<String>, kind: FieldKind) {
        let name = name.into();
        let fields = self.fields.entry(entity_type).or_default();
        match fields.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = kind,
            None => fields.push((name, kind)),
        }
    }

    /// Look up the kind of a field, rejecting unknown names
    pub fn kind_of(&self, entity_type: EntityType, field: &str) -> Result<FieldKind> {
        self.fields
            .get(&entity_type)
            .and_then(|fields| fields.iter().find(|(n, _)| n == field))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| StoreError::UnknownField {
                entity_type,
                field: field.to_string(),
            })
    }

    /// All declared fields of an entity type, in declaration order
    pub fn fields(&self, entity_type: EntityType) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields
            .get(&entity_type)
            .into_iter()
            .flatten()
            .map(|(n, k)| (n.as_str(), *k))
    }

    /// Coerce a raw client value into the lane of `kind`.
    ///
    /// Only text fields accept null.
    pub fn coerce(field: &str, kind: FieldKind, raw: &Value) -> Result<FieldValue> {
        match kind {
            FieldKind::String => match raw {
                Value::Null => Ok(FieldValue::Text(None)),
                other => {
                    let text = scalar_text(field, other)?;
                    if text.chars().count() > MAX_TEXT_LEN {
                        return Err(StoreError::invalid(
                            field,
                            format!("longer than {} characters", MAX_TEXT_LEN),
                        ));
                    }
                    Ok(FieldValue::Text(Some(text)))
                }
            },
            FieldKind::Numeric => Ok(FieldValue::Numeric(coerce_decimal(field, raw)?)),
            FieldKind::FkString => {
                let code = scalar_text(field, not_null(field, raw)?)?;
                if code.is_empty() || code.chars().count() > MAX_CODE_LEN {
                    return Err(StoreError::invalid(
                        field,
                        format!("code must be 1 to {} characters", MAX_CODE_LEN),
                    ));
                }
                Ok(FieldValue::fk_code(code))
            }
            FieldKind::FkInt => {
                let id = match not_null(field, raw)? {
                    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_number)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                id.map(FieldValue::fk_id).ok_or_else(|| {
                    StoreError::invalid(field, format!("not an integer id: {}", raw))
                })
            }
        }
    }
}

fn not_null<'a>(field: &str, raw: &'a Value) -> Result<&'a Value> {
    if raw.is_null() {
        Err(StoreError::invalid(field, "cannot be null"))
    } else {
        Ok(raw)
    }
}

fn scalar_text(field: &str, raw: &Value) -> Result<String> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(true) => Ok("True".to_string()),
        Value::Bool(false) => Ok("False".to_string()),
        _ => Err(StoreError::invalid(field, "expected a scalar value")),
    }
}

/// An id sent as a float is accepted only when it has no fractional part
fn whole_number(n: f64) -> Option<i64> {
    let in_range = n >= i64::MIN as f64 && n < i64::MAX as f64;
    (n.fract() == 0.0 && in_range).then_some(n as i64)
}

fn coerce_decimal(field: &str, raw: &Value) -> Result<Decimal> {
    let parsed = match not_null(field, raw)? {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(Decimal::from_f64),
        },
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };
    let value = parsed
        .ok_or_else(|| StoreError::invalid(field, format!("not a number: {}", raw)))?
        .round_dp_with_strategy(NUMERIC_SCALE, RoundingStrategy::MidpointAwayFromZero);

    let limit = Decimal::from(10i64.pow(NUMERIC_PRECISION - NUMERIC_SCALE));
    if value.abs() >= limit {
        return Err(StoreError::invalid(
            field,
            format!("exceeds {} integer digits", NUMERIC_PRECISION - NUMERIC_SCALE),
        ));
    }
    Ok(value)
}
