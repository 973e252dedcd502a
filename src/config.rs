//! Configuration management for the field store
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (fieldstore.toml)
//! - Environment variables (FIELDSTORE__*)
//!
//! ## Example config file (fieldstore.toml):
//! ```toml
//! [store]
//! journal = "./data/fields.journal"
//! sync_on_append = true
//!
//! [fields.year_record]
//! limit = "numeric"
//! potrzeba = "numeric"
//! ```
//!
//! Without a `[fields]` table the built-in budget schema is used.

use std::collections::BTreeMap;
use std::path::PathBuf;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::FieldSchema;

/// Main configuration for the field store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage settings
    #[serde(default)]
    pub store: StorageConfig,

    /// Field kinds per entity type: `entity_type -> field -> kind`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, BTreeMap<String, String>>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Journal file; records are kept in memory only when unset
    #[serde(default)]
    pub journal: Option<PathBuf>,

    /// fsync the journal after every append
    #[serde(default = "default_true")]
    pub sync_on_append: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            journal: None,
            sync_on_append: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file over the default locations
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["fieldstore.toml", ".fieldstore.toml", "config/fieldstore.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "budget", "fieldstore") {
            let xdg_config = config_dir.config_dir().join("fieldstore.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("FIELDSTORE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Journal path with relative paths resolved against the working directory
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.store.journal.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                std::env::current_dir().unwrap_or_default().join(p)
            }
        })
    }

    /// The field schema: configured tables, or the built-in budget schema
    pub fn schema(&self) -> Result<FieldSchema> {
        if self.fields.is_empty() {
            Ok(FieldSchema::budget())
        } else {
            FieldSchema::from_tables(&self.fields)
        }
    }
}
