//! Durable append-only journal of version records
//!
//! One entry per line, prefixed with the SHA256 of the entry text, in the
//! same `checksum  payload` shape as a `sha256sum` listing. Every append is
//! a group of record lines closed by a commit line:
//!
//! ```text
//! 3f1a…e9  {"record":{"entity_id":1,"field_name":"dzial_kod",…}}
//! 9b07…4c  {"record":{"entity_id":1,"field_name":"budzet",…}}
//! c2d8…11  {"commit":{"records":2,"last_seq":2}}
//! ```
//!
//! Records only count once their commit line is on disk. Whatever follows
//! the last commit (a torn line, or whole record lines whose commit never
//! landed) is the remains of an interrupted append. It is dropped and
//! truncated away on open; any other damaged line is reported as corruption.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checksum::Checksum;
use crate::error::{Result, StoreError};
use crate::record::VersionRecord;

const SEPARATOR: &str = "  ";

/// One journal line
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Entry<R> {
    Record(R),
    /// Closes the `records` lines before it
    Commit { records: usize, last_seq: u64 },
}

/// File-backed record log
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    /// Length of the durable, fully committed prefix
    len: u64,
    sync_on_append: bool,
}

impl Journal {
    /// Open (creating if needed) a journal and replay its committed records
    /// in append order
    pub fn open(
        path: impl AsRef<Path>,
        sync_on_append: bool,
    ) -> Result<(Self, Vec<VersionRecord>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let replay = parse(&content)?;
        if replay.committed_len < content.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = content.len() - replay.committed_len,
                dropped_records = replay.uncommitted,
                "discarding uncommitted journal tail"
            );
            file.set_len(replay.committed_len as u64)?;
        }

        info!(path = %path.display(), records = replay.records.len(), "journal opened");

        let journal = Self {
            path,
            file,
            len: replay.committed_len as u64,
            sync_on_append,
        };
        Ok((journal, replay.records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length in bytes of the committed journal
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write records and their commit line as one buffer. On failure the
    /// file is cut back to its previous length, so either every record
    /// lands or none does.
    pub fn append(&mut self, records: &[VersionRecord]) -> Result<()> {
        let Some(last) = records.last() else {
            return Ok(());
        };

        let mut buffer = String::new();
        for record in records {
            push_line(&mut buffer, &Entry::Record(record))?;
        }
        let commit: Entry<&VersionRecord> = Entry::Commit {
            records: records.len(),
            last_seq: last.seq,
        };
        push_line(&mut buffer, &commit)?;

        if let Err(e) = self.write_durably(buffer.as_bytes()) {
            if let Err(rollback) = self.file.set_len(self.len) {
                warn!(path = %self.path.display(), error = %rollback, "journal rollback failed");
            }
            return Err(e.into());
        }

        self.len += buffer.len() as u64;
        Ok(())
    }

    fn write_durably(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        if self.sync_on_append {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl Journal {
    /// Swap the handle for a read-only one so every later write fails
    pub(crate) fn make_read_only(&mut self) -> Result<()> {
        self.file = OpenOptions::new().read(true).open(&self.path)?;
        Ok(())
    }
}

fn push_line(buffer: &mut String, entry: &Entry<&VersionRecord>) -> Result<()> {
    let payload = serde_json::to_string(entry)?;
    buffer.push_str(Checksum::of(&payload).as_str());
    buffer.push_str(SEPARATOR);
    buffer.push_str(&payload);
    buffer.push('\n');
    Ok(())
}

/// Outcome of reading a journal
struct Replay {
    records: Vec<VersionRecord>,
    /// Byte length of the prefix ending with the last commit line
    committed_len: usize,
    /// Complete record lines after the last commit
    uncommitted: usize,
}

fn parse(content: &str) -> Result<Replay> {
    let mut records: Vec<VersionRecord> = Vec::new();
    let mut pending: Vec<VersionRecord> = Vec::new();
    let mut offset = 0;
    let mut committed_len = 0;

    for (index, line) in content.split_inclusive('\n').enumerate() {
        let Some(line_text) = line.strip_suffix('\n') else {
            // torn tail
            break;
        };
        offset += line.len();

        if line_text.trim().is_empty() {
            if pending.is_empty() {
                committed_len = offset;
            }
            continue;
        }

        let line_no = index + 1;
        let corrupt = |reason: String| StoreError::Corrupt {
            line: line_no,
            reason,
        };

        let (hash, payload) = line_text
            .split_once(SEPARATOR)
            .ok_or_else(|| corrupt("missing checksum separator".to_string()))?;
        if !Checksum::from(hash).verify(payload) {
            return Err(corrupt(format!("checksum mismatch (expected {})", hash)));
        }

        let entry: Entry<VersionRecord> = serde_json::from_str(payload)
            .map_err(|e| corrupt(format!("unreadable entry: {}", e)))?;

        match entry {
            Entry::Record(record) => {
                if let Some(previous) = pending.last().or(records.last()) {
                    if record.seq <= previous.seq {
                        return Err(corrupt(format!(
                            "sequence {} does not follow {}",
                            record.seq, previous.seq
                        )));
                    }
                }
                pending.push(record);
            }
            Entry::Commit {
                records: count,
                last_seq,
            } => {
                let closes = pending.last().map(|r| r.seq);
                if count == 0 || count != pending.len() || closes != Some(last_seq) {
                    return Err(corrupt(format!(
                        "commit of {} records through seq {} does not match the {} pending",
                        count,
                        last_seq,
                        pending.len()
                    )));
                }
                records.append(&mut pending);
                committed_len = offset;
            }
        }
    }

    Ok(Replay {
        records,
        committed_len,
        uncommitted: pending.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EntityType, SeriesKey};
    use crate::value::FieldValue;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn record(seq: u64, value: &str) -> VersionRecord {
        VersionRecord {
            key: SeriesKey::new(EntityType::PlanningRecord, 1, "nazwa_projektu"),
            value: FieldValue::text(value),
            timestamp: Utc::now(),
            seq,
            version: seq,
            created_by: None,
        }
    }

    fn truncate_by(path: &Path, bytes: u64) {
        let len = fs::metadata(path).unwrap().len();
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_len(len - bytes).unwrap();
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let (mut journal, replayed) = Journal::open(&path, false).unwrap();
        assert!(replayed.is_empty());
        journal.append(&[record(1, "Alpha"), record(2, "Beta")]).unwrap();
        drop(journal);

        let (_, replayed) = Journal::open(&path, false).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[1].value, FieldValue::text("Beta"));
    }

    #[test]
    fn test_numeric_record_replays_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let mut limit = record(1, "");
        limit.key = SeriesKey::new(EntityType::YearRecord, 4, "limit");
        limit.value = FieldValue::Numeric(Decimal::new(1234567890123, 2));

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(std::slice::from_ref(&limit)).unwrap();
        drop(journal);

        let (_, replayed) = Journal::open(&path, false).unwrap();
        assert_eq!(replayed, vec![limit]);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&[record(1, "Alpha")]).unwrap();
        drop(journal);

        let intact = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"deadbeef  {\"record\":{\"entity_ty").unwrap();
        drop(file);

        let (mut journal, replayed) = Journal::open(&path, false).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);

        journal.append(&[record(2, "Beta")]).unwrap();
        drop(journal);
        let (_, replayed) = Journal::open(&path, false).unwrap();
        assert_eq!(replayed.len(), 2);
    }

    #[test]
    fn test_batch_cut_inside_last_line_is_dropped_whole() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&[record(1, "Alpha")]).unwrap();
        let intact = journal.len();
        journal
            .append(&[record(2, "Beta"), record(3, "Gamma"), record(4, "Delta")])
            .unwrap();
        drop(journal);

        truncate_by(&path, 20);

        let (journal, replayed) = Journal::open(&path, false).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].seq, 1);
        assert_eq!(journal.len(), intact);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);
    }

    #[test]
    fn test_records_without_commit_are_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&[record(1, "Alpha"), record(2, "Beta")]).unwrap();
        drop(journal);

        // cut exactly at the start of the commit line
        let content = fs::read_to_string(&path).unwrap();
        let commit_start = content.trim_end_matches('\n').rfind('\n').unwrap() + 1;
        truncate_by(&path, (content.len() - commit_start) as u64);

        let (_, replayed) = Journal::open(&path, false).unwrap();
        assert!(replayed.is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_tampered_line_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&[record(1, "Alpha")]).unwrap();
        drop(journal);

        let content = fs::read_to_string(&path).unwrap().replace("Alpha", "Omega");
        fs::write(&path, content).unwrap();

        let err = Journal::open(&path, false).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 1, .. }));
        assert!(err.is_storage());
    }

    #[test]
    fn test_sequence_going_backwards_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&[record(5, "Alpha")]).unwrap();
        journal.append(&[record(3, "Beta")]).unwrap();
        drop(journal);

        let err = Journal::open(&path, false).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 3, .. }));
    }

    #[test]
    fn test_failed_write_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.journal");

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&[record(1, "Alpha")]).unwrap();
        let before = journal.len();

        journal.make_read_only().unwrap();
        let err = journal.append(&[record(2, "Beta")]).unwrap_err();
        assert!(err.is_storage());
        assert_eq!(journal.len(), before);
        assert_eq!(fs::metadata(&path).unwrap().len(), before);
        drop(journal);

        let (_, replayed) = Journal::open(&path, false).unwrap();
        assert_eq!(replayed.len(), 1);
    }
}
