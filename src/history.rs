//! Field history and history presence

use std::collections::BTreeMap;

use crate::error::Result;
use crate::record::{EntityType, HistoryEntry, SeriesKey, VersionRecord};
use crate::resolve::newest_first;
use crate::schema::FieldSchema;
use crate::store::VersionStore;
use crate::value::FieldKind;

impl VersionStore {
    /// Every record of a series, newest first
    pub fn list_history(&self, key: &SeriesKey, kind: FieldKind) -> Result<Vec<VersionRecord>> {
        let mut records = self.read_series(key, kind.lane(), <[VersionRecord]>::to_vec);
        records.sort_by(newest_first);
        Ok(records)
    }

    /// History reduced to client-facing entries, newest first
    pub fn history_entries(&self, key: &SeriesKey, kind: FieldKind) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .list_history(key, kind)?
            .iter()
            .map(|r| r.entry(kind))
            .collect())
    }

    /// Number of recorded versions of a field
    pub fn history_len(&self, key: &SeriesKey, kind: FieldKind) -> Result<usize> {
        Ok(self.read_series(key, kind.lane(), <[VersionRecord]>::len))
    }

    /// Whether a field has been edited since it was first set
    pub fn has_history(&self, key: &SeriesKey, kind: FieldKind) -> Result<bool> {
        Ok(self.history_len(key, kind)? > 1)
    }

    /// `has_history` for every declared field of an entity
    pub fn history_status(
        &self,
        schema: &FieldSchema,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<BTreeMap<String, bool>> {
        let mut status = BTreeMap::new();
        for (field, kind) in schema.fields(entity_type) {
            let key = SeriesKey::new(entity_type, entity_id, field);
            status.insert(field.to_string(), self.has_history(&key, kind)?);
        }
        Ok(status)
    }

    /// Full history of every declared field of an entity
    pub fn entity_history(
        &self,
        schema: &FieldSchema,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<BTreeMap<String, Vec<HistoryEntry>>> {
        let mut history = BTreeMap::new();
        for (field, kind) in schema.fields(entity_type) {
            let key = SeriesKey::new(entity_type, entity_id, field);
            history.insert(field.to_string(), self.history_entries(&key, kind)?);
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::value::{CellValue, FieldValue};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    #[test]
    fn test_numeric_history_newest_first() {
        let clock = Arc::new(ManualClock::epoch());
        let store = VersionStore::in_memory().with_clock(clock.clone());
        let key = SeriesKey::new(EntityType::YearRecord, 1, "limit");

        for cents in [5000000, 6000000, 7000000] {
            store.append(&key, FieldValue::Numeric(Decimal::new(cents, 2)), None).unwrap();
            clock.advance(Duration::milliseconds(10));
        }

        let values: Vec<_> = store
            .history_entries(&key, FieldKind::Numeric)
            .unwrap()
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(
            values,
            vec![
                CellValue::Numeric(Decimal::new(7000000, 2)),
                CellValue::Numeric(Decimal::new(6000000, 2)),
                CellValue::Numeric(Decimal::new(5000000, 2)),
            ]
        );
    }

    #[test]
    fn test_tied_timestamps_order_by_append() {
        let store = VersionStore::in_memory().with_clock(Arc::new(ManualClock::epoch()));
        let key = SeriesKey::new(EntityType::PlanningRecord, 1, "nazwa_zadania");

        for name in ["a", "b", "c"] {
            store.append(&key, FieldValue::text(name), None).unwrap();
        }

        let history = store.list_history(&key, FieldKind::String).unwrap();
        let versions: Vec<_> = history.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[test]
    fn test_has_history_needs_two_versions() {
        let store = VersionStore::in_memory();
        let key = SeriesKey::new(EntityType::PlanningRecord, 1, "budzet");

        assert!(!store.has_history(&key, FieldKind::String).unwrap());
        store.append(&key, FieldValue::text("100"), None).unwrap();
        assert!(!store.has_history(&key, FieldKind::String).unwrap());
        store.append(&key, FieldValue::text("200"), None).unwrap();
        assert!(store.has_history(&key, FieldKind::String).unwrap());
        store.append(&key, FieldValue::text("300"), None).unwrap();
        assert!(store.has_history(&key, FieldKind::String).unwrap());
    }

    #[test]
    fn test_history_status_and_entity_history() {
        let store = VersionStore::in_memory();
        let schema = FieldSchema::budget();
        let limit = SeriesKey::new(EntityType::YearRecord, 2, "limit");
        let need = SeriesKey::new(EntityType::YearRecord, 2, "potrzeba");

        store.append(&limit, FieldValue::Numeric(Decimal::ONE), None).unwrap();
        store.append(&limit, FieldValue::Numeric(Decimal::TWO), None).unwrap();
        store.append(&need, FieldValue::Numeric(Decimal::TEN), None).unwrap();

        let status = store.history_status(&schema, EntityType::YearRecord, 2).unwrap();
        assert!(status["limit"]);
        assert!(!status["potrzeba"]);

        let history = store.entity_history(&schema, EntityType::YearRecord, 2).unwrap();
        assert_eq!(history["limit"].len(), 2);
        assert_eq!(history["potrzeba"].len(), 1);
    }
}
