//! Cell edit path used by the CRUD layer
//!
//! The store itself validates nothing. [`CellEditor`] puts the checks of an
//! interactive edit in front of it: the entity must exist, the field must be
//! declared, the raw value must coerce into the field's lane, and if the
//! client sent the timestamp it last saw, the write is a compare-and-append.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::conflict::Precondition;
use crate::error::{Result, StoreError};
use crate::record::{EntityType, SeriesKey, UserId, VersionRecord};
use crate::schema::FieldSchema;
use crate::store::VersionStore;

/// Confirms that an entity exists before its fields are written
pub trait EntityRegistrar: Send + Sync {
    fn exists(&self, entity_type: EntityType, entity_id: i64) -> bool;
}

/// Supplies the identity of the acting user
pub trait AuthProvider {
    fn current_user(&self) -> Option<UserId>;
}

/// A fixed identity, as carried by a mock user-id header
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedActor(pub Option<UserId>);

impl AuthProvider for FixedActor {
    fn current_user(&self) -> Option<UserId> {
        self.0
    }
}

/// Registrar backed by an in-memory set of entity ids
#[derive(Debug, Default)]
pub struct InMemoryRegistrar {
    entities: RwLock<BTreeSet<(EntityType, i64)>>,
}

impl InMemoryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entity_type: EntityType, entity_id: i64) {
        self.entities.write().insert((entity_type, entity_id));
    }
}

impl EntityRegistrar for InMemoryRegistrar {
    fn exists(&self, entity_type: EntityType, entity_id: i64) -> bool {
        self.entities.read().contains(&(entity_type, entity_id))
    }
}

/// A single cell edit as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct CellUpdate {
    pub field: String,
    #[serde(default)]
    pub value: Value,
    /// When present, the edit fails with a conflict if the field changed after this instant
    #[serde(default)]
    pub last_known_timestamp: Option<DateTime<Utc>>,
}

impl CellUpdate {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
            last_known_timestamp: None,
        }
    }

    pub fn seen_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.last_known_timestamp = Some(timestamp);
        self
    }
}

/// Validating front door to a [`VersionStore`]
pub struct CellEditor<'a> {
    store: &'a VersionStore,
    schema: &'a FieldSchema,
    registrar: &'a dyn EntityRegistrar,
}

impl<'a> CellEditor<'a> {
    pub fn new(
        store: &'a VersionStore,
        schema: &'a FieldSchema,
        registrar: &'a dyn EntityRegistrar,
    ) -> Self {
        Self {
            store,
            schema,
            registrar,
        }
    }

    /// Seed every declared field of a newly registered entity in one commit.
    ///
    /// Missing text fields start out null; other kinds must be supplied.
    pub fn create_entity(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        values: &Map<String, Value>,
        auth: &dyn AuthProvider,
    ) -> Result<Vec<VersionRecord>> {
        self.ensure_exists(entity_type, entity_id)?;

        let undeclared = |name: &&String| self.schema.kind_of(entity_type, name).is_err();
        if let Some(unknown) = values.keys().find(undeclared) {
            return Err(StoreError::UnknownField {
                entity_type,
                field: unknown.clone(),
            });
        }

        let mut writes = Vec::new();
        for (field, kind) in self.schema.fields(entity_type) {
            let value = match values.get(field) {
                Some(raw) => FieldSchema::coerce(field, kind, raw)?,
                None => FieldSchema::coerce(field, kind, &Value::Null)?,
            };
            writes.push((SeriesKey::new(entity_type, entity_id, field), value));
        }

        let records = self.store.append_batch(writes, auth.current_user())?;
        info!(
            entity = %entity_type,
            id = entity_id,
            fields = records.len(),
            "entity fields seeded"
        );
        Ok(records)
    }

    /// Apply one cell edit, returning the record it produced
    pub fn update_cell(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        update: &CellUpdate,
        auth: &dyn AuthProvider,
    ) -> Result<VersionRecord> {
        self.ensure_exists(entity_type, entity_id)?;

        let kind = self.schema.kind_of(entity_type, &update.field)?;
        let value = FieldSchema::coerce(&update.field, kind, &update.value)?;
        let key = SeriesKey::new(entity_type, entity_id, update.field.as_str());
        let actor = auth.current_user();

        match update.last_known_timestamp {
            Some(seen) => self
                .store
                .append_guarded(&key, value, actor, Precondition::SeenAt(seen)),
            None => self.store.append(&key, value, actor),
        }
    }

    fn ensure_exists(&self, entity_type: EntityType, entity_id: i64) -> Result<()> {
        if self.registrar.exists(entity_type, entity_id) {
            Ok(())
        } else {
            Err(StoreError::EntityNotFound {
                entity_type,
                entity_id,
            })
        }
    }
}
