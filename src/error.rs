//! Error types for the versioned field store

use thiserror::Error;

use crate::conflict::Conflict;
use crate::record::EntityType;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Versioned field store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt journal at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Unknown field kind: {0}")]
    UnknownFieldKind(String),

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Unknown field: {entity_type}.{field}")]
    UnknownField { entity_type: EntityType, field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Entity not found: {entity_type} #{entity_id}")]
    EntityNotFound { entity_type: EntityType, entity_id: i64 },

    #[error("{0}")]
    Conflict(Conflict),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl StoreError {
    /// Whether this error is a storage-layer fault rather than a caller mistake
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            StoreError::Storage(_)
                | StoreError::Io(_)
                | StoreError::Json(_)
                | StoreError::Corrupt { .. }
        )
    }

    /// The competing versions, if this is a lost-update conflict
    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            StoreError::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
