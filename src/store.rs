//! Version Store
//!
//! The single writer of version records. Records are kept in memory, grouped
//! by series, and optionally mirrored to an append-only [`Journal`]. A record
//! is written to the journal before it becomes visible, so a failed append
//! leaves both the file and the readable state unchanged.
//!
//! Writers queue on one mutex that also owns the journal. Readers only take
//! the series lock, which a writer holds just long enough to publish a
//! commit, never across disk I/O.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::conflict::Precondition;
use crate::error::{Result, StoreError};
use crate::journal::Journal;
use crate::record::{SeriesKey, UserId, VersionRecord};
use crate::value::{FieldValue, Lane};

type SeriesId = (SeriesKey, Lane);

// ============================================================================
// Internal state
// ============================================================================

/// Published series, each in append order
#[derive(Default)]
struct SeriesMap {
    series: HashMap<SeriesId, Vec<VersionRecord>>,
}

impl SeriesMap {
    fn records(&self, key: &SeriesKey, lane: Lane) -> &[VersionRecord] {
        self.series
            .get(&(key.clone(), lane))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn insert(&mut self, record: VersionRecord) {
        self.series
            .entry((record.key.clone(), record.lane()))
            .or_default()
            .push(record);
    }
}

/// State only a committing writer touches
struct Writer {
    next_seq: u64,
    journal: Option<Journal>,
}

// ============================================================================
// Version Store
// ============================================================================

/// Append-only store of versioned field values
///
/// Thread-safe: readers share an `RwLock`, writers are serialized by a `Mutex`
pub struct VersionStore {
    series: RwLock<SeriesMap>,
    writer: Mutex<Writer>,
    total_records: AtomicU64,
    journal_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl VersionStore {
    /// A store with no journal; everything is lost when it is dropped
    pub fn in_memory() -> Self {
        Self {
            series: RwLock::new(SeriesMap::default()),
            writer: Mutex::new(Writer {
                next_seq: 1,
                journal: None,
            }),
            total_records: AtomicU64::new(0),
            journal_path: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Open a journal-backed store, replaying every committed version
    pub fn open(path: impl AsRef<Path>, sync_on_append: bool) -> Result<Self> {
        let (journal, records) = Journal::open(path, sync_on_append)?;

        let mut series = SeriesMap::default();
        let next_seq = records.last().map_or(1, |r| r.seq + 1);
        let total = records.len() as u64;
        for record in records {
            series.insert(record);
        }

        Ok(Self {
            series: RwLock::new(series),
            journal_path: Some(journal.path().to_path_buf()),
            writer: Mutex::new(Writer {
                next_seq,
                journal: Some(journal),
            }),
            total_records: AtomicU64::new(total),
            clock: Arc::new(SystemClock),
        })
    }

    /// Build a store as described by configuration
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        match config.journal_path() {
            Some(path) => Self::open(path, config.store.sync_on_append),
            None => Ok(Self::in_memory()),
        }
    }

    /// Replace the clock used to stamp appended records
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal_path.as_deref()
    }

    /// Total number of records across all series
    pub fn len(&self) -> usize {
        self.total_records.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All series keys present in the store, sorted
    pub fn keys(&self) -> Vec<(SeriesKey, Lane)> {
        let mut keys: Vec<_> = self.series.read().series.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Append a new version of a field. Always succeeds unless storage fails;
    /// concurrent edits are overwritten silently (last write wins).
    pub fn append(
        &self,
        key: &SeriesKey,
        value: FieldValue,
        actor: Option<UserId>,
    ) -> Result<VersionRecord> {
        let records = self.commit(vec![(key.clone(), value)], actor, None)?;
        single(records)
    }

    /// Append several versions as one atomic unit, sharing one timestamp
    pub fn append_batch(
        &self,
        writes: Vec<(SeriesKey, FieldValue)>,
        actor: Option<UserId>,
    ) -> Result<Vec<VersionRecord>> {
        self.commit(writes, actor, None)
    }

    /// Compare-and-append: `precondition` is checked while this writer holds
    /// the writer lock, so no other append can land between check and write.
    /// The first writer to commit wins; the rest get a conflict.
    pub fn append_guarded(
        &self,
        key: &SeriesKey,
        value: FieldValue,
        actor: Option<UserId>,
        precondition: Precondition,
    ) -> Result<VersionRecord> {
        let records = self.commit(vec![(key.clone(), value)], actor, Some(precondition))?;
        single(records)
    }

    /// Run `f` over one series, in append order, under the read lock
    pub(crate) fn read_series<R>(
        &self,
        key: &SeriesKey,
        lane: Lane,
        f: impl FnOnce(&[VersionRecord]) -> R,
    ) -> R {
        let series = self.series.read();
        f(series.records(key, lane))
    }

    fn commit(
        &self,
        writes: Vec<(SeriesKey, FieldValue)>,
        actor: Option<UserId>,
        precondition: Option<Precondition>,
    ) -> Result<Vec<VersionRecord>> {
        let mut writer = self.writer.lock();

        // Only writers change the series map, and they all hold `writer`,
        // so what is read here stays current until the publish below.
        let records = {
            let series = self.series.read();

            if let (Some(precondition), Some((key, value))) = (precondition, writes.first()) {
                precondition.enforce(key, series.records(key, value.lane()))?;
            }

            let timestamp = self.clock.now();
            let mut pending: HashMap<SeriesId, u64> = HashMap::new();
            let mut records = Vec::with_capacity(writes.len());

            for (offset, (key, value)) in writes.into_iter().enumerate() {
                let lane = value.lane();
                let existing = series.records(&key, lane);
                if let Some(last) = existing.last() {
                    if timestamp <= last.timestamp {
                        warn!(
                            series = %key,
                            previous = %last.timestamp,
                            assigned = %timestamp,
                            "clock did not advance; ordering falls back to append sequence"
                        );
                    }
                }

                let already = pending.entry((key.clone(), lane)).or_insert(0);
                *already += 1;
                let version = existing.len() as u64 + *already;

                records.push(VersionRecord {
                    key,
                    value,
                    timestamp,
                    seq: writer.next_seq + offset as u64,
                    version,
                    created_by: actor,
                });
            }
            records
        };

        if let Some(journal) = writer.journal.as_mut() {
            journal.append(&records)?;
        }
        writer.next_seq += records.len() as u64;

        let mut series = self.series.write();
        for record in &records {
            debug!(series = %record.key, version = record.version, seq = record.seq, "appended");
            series.insert(record.clone());
        }
        self.total_records
            .fetch_add(records.len() as u64, Ordering::Relaxed);

        Ok(records)
    }
}

fn single(mut records: Vec<VersionRecord>) -> Result<VersionRecord> {
    records
        .pop()
        .ok_or_else(|| StoreError::Storage("append produced no record".to_string()))
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore")
            .field("records", &self.len())
            .field("journal", &self.journal_path)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
