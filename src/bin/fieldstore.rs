//! Field Store CLI
//!
//! Append to and inspect a journal-backed versioned field store.

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use versioned_fields::{
    CellEditor, CellUpdate, EntityRegistrar, EntityType, FieldKind, FieldSchema, FixedActor,
    Precondition, SeriesKey, StoreConfig, StoreError, UserId, VersionStore,
};

#[derive(Parser)]
#[command(name = "fieldstore")]
#[command(about = "Append-only versioned field store")]
struct Cli {
    /// Config file (layered over fieldstore.toml and FIELDSTORE__* variables)
    #[arg(short, long)]
    config: Option<String>,

    /// Journal file, overriding the configured one
    #[arg(short, long)]
    journal: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a new version of a field
    Append {
        entity: String,
        id: i64,
        field: String,
        /// JSON value; bare text is taken as a string
        value: String,
        /// Acting user id
        #[arg(short, long)]
        user: Option<i64>,
        /// Reject the write if the field changed after this instant (RFC 3339)
        #[arg(long, conflicts_with = "expect_version")]
        seen_at: Option<DateTime<Utc>>,
        /// Reject the write unless the field is at exactly this version
        #[arg(long)]
        expect_version: Option<u64>,
    },

    /// Show the current value of a field
    Latest { entity: String, id: i64, field: String },

    /// Show every version of a field, newest first
    History { entity: String, id: i64, field: String },

    /// List versions committed after an instant
    Check {
        entity: String,
        id: i64,
        field: String,
        /// Last instant the client observed (RFC 3339)
        since: DateTime<Utc>,
    },

    /// Show which fields of an entity have been edited
    Status { entity: String, id: i64 },

    /// Show the current value of every field of an entity
    Snapshot { entity: String, id: i64 },
}

/// The CLI has no entity registry of its own; every id is accepted
struct AnyEntity;

impl EntityRegistrar for AnyEntity {
    fn exists(&self, _entity_type: EntityType, _entity_id: i64) -> bool {
        true
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        if let Some(conflict) = e.downcast_ref::<StoreError>().and_then(StoreError::as_conflict) {
            eprintln!("Error: {}", conflict);
            if let Ok(json) = serde_json::to_string_pretty(conflict) {
                println!("{}", json);
            }
            std::process::exit(2);
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        StoreConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(journal) = cli.journal {
        config.store.journal = Some(journal);
    }
    if config.store.journal.is_none() {
        bail!("no journal configured; pass --journal or set [store] journal");
    }

    let schema = config.schema()?;
    let store = VersionStore::from_config(&config)?;

    match cli.command {
        Commands::Append {
            entity,
            id,
            field,
            value,
            user,
            seen_at,
            expect_version,
        } => {
            let entity_type: EntityType = entity.parse()?;
            let raw = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let actor = user.map(UserId);

            let record = match expect_version {
                Some(version) => {
                    let kind = schema.kind_of(entity_type, &field)?;
                    let value = FieldSchema::coerce(&field, kind, &raw)?;
                    let key = SeriesKey::new(entity_type, id, field);
                    store.append_guarded(&key, value, actor, Precondition::Version(version))?
                }
                None => {
                    let mut update = CellUpdate::new(field, raw);
                    update.last_known_timestamp = seen_at;
                    CellEditor::new(&store, &schema, &AnyEntity).update_cell(
                        entity_type,
                        id,
                        &update,
                        &FixedActor(actor),
                    )?
                }
            };
            print_json(&record)
        }

        Commands::Latest { entity, id, field } => {
            let (key, kind) = resolve(&schema, &entity, id, &field)?;
            match store.latest_record(&key, kind)? {
                Some(record) => print_json(&record.entry(kind)),
                None => {
                    println!("null");
                    Ok(())
                }
            }
        }

        Commands::History { entity, id, field } => {
            let (key, kind) = resolve(&schema, &entity, id, &field)?;
            print_json(&store.history_entries(&key, kind)?)
        }

        Commands::Check {
            entity,
            id,
            field,
            since,
        } => {
            let (key, kind) = resolve(&schema, &entity, id, &field)?;
            let newer = store.check_conflict(&key, kind, since)?;
            print_json(&newer)?;
            if !newer.is_empty() {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Status { entity, id } => {
            print_json(&store.history_status(&schema, entity.parse()?, id)?)
        }

        Commands::Snapshot { entity, id } => {
            print_json(&store.snapshot(&schema, entity.parse()?, id)?)
        }
    }
}

fn resolve(
    schema: &FieldSchema,
    entity: &str,
    id: i64,
    field: &str,
) -> anyhow::Result<(SeriesKey, FieldKind)> {
    let entity_type: EntityType = entity.parse()?;
    let kind = schema.kind_of(entity_type, field)?;
    Ok((SeriesKey::new(entity_type, id, field), kind))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
