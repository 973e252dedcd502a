//! Latest-value resolution
//!
//! The current value of a field is the newest record of its series, where
//! records compare by `(timestamp, seq)`. Timestamps come from a clock that
//! may repeat or step backwards, so two records can share a timestamp; the
//! one appended later then wins. The result never depends on sort stability.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::record::{EntityType, SeriesKey, VersionRecord};
use crate::schema::FieldSchema;
use crate::store::VersionStore;
use crate::value::{CellValue, FieldKind};

/// Newest-first comparison of two records of the same series
pub fn newest_first(a: &VersionRecord, b: &VersionRecord) -> Ordering {
    b.order_key().cmp(&a.order_key())
}

/// The newest record of a series, if any
pub fn newest(records: &[VersionRecord]) -> Option<&VersionRecord> {
    records.iter().max_by_key(|r| r.order_key())
}

impl VersionStore {
    /// The newest record of a series, or `None` if the field was never set
    pub fn latest_record(&self, key: &SeriesKey, kind: FieldKind) -> Result<Option<VersionRecord>> {
        Ok(self.read_series(key, kind.lane(), |records| newest(records).cloned()))
    }

    /// Current value of a field as seen through `kind`; `None` means unset
    pub fn get_latest(&self, key: &SeriesKey, kind: FieldKind) -> Result<Option<CellValue>> {
        Ok(self.latest_record(key, kind)?.map(|r| r.cell(kind)))
    }

    /// Current value of every declared field of an entity. Unset fields map to null.
    pub fn snapshot(
        &self,
        schema: &FieldSchema,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<BTreeMap<String, CellValue>> {
        let mut cells = BTreeMap::new();
        for (field, kind) in schema.fields(entity_type) {
            let key = SeriesKey::new(entity_type, entity_id, field);
            let value = self.get_latest(&key, kind)?.unwrap_or(CellValue::Null);
            cells.insert(field.to_string(), value);
        }
        Ok(cells)
    }
}
