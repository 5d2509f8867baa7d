//! Durable history store.
//!
//! The store is a CSV file whose header row is the canonical column
//! layout of [`PlayRecord`], plus a gzipped JSON snapshot of the same
//! data for faster reload. Both files are replaced atomically (write to
//! a temporary sibling, then rename) so that a crashed run never leaves
//! a partial store behind for the next run's checkpoint read.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::model::PlayRecord;

/// The history store loaded into memory.
///
/// The header row is kept verbatim: the merge stage compares it against
/// [`PlayRecord::FIELDS`] before accepting a write.
#[derive(Debug, Clone)]
pub struct StoredHistory {
    /// Column names exactly as read from the store's header row.
    pub fields: Vec<String>,
    /// All persisted records, in stored order.
    pub records: Vec<PlayRecord>,
}

impl StoredHistory {
    /// The most recent `played_on` value in the store.
    ///
    /// This is the checkpoint: fetches request only events after it.
    /// An empty store has no checkpoint and is an error; this design
    /// assumes a pre-existing baseline rather than a start-from-zero
    /// default.
    pub fn checkpoint(&self) -> Result<NaiveDateTime> {
        self.records
            .iter()
            .map(|record| record.played_on)
            .max()
            .ok_or(Error::EmptyStore)
    }
}

/// Handle to the on-disk history store.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    csv_path: PathBuf,
    snapshot_path: PathBuf,
}

impl HistoryStore {
    #[must_use]
    pub fn new(csv_path: PathBuf, snapshot_path: PathBuf) -> Self {
        Self {
            csv_path,
            snapshot_path,
        }
    }

    #[must_use]
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Load the full store from the CSV file.
    ///
    /// Fails with [`Error::MissingStore`] when the file does not exist;
    /// decode failures surface as CSV errors. No attempt is made to
    /// repair or migrate an unreadable store.
    pub fn load(&self) -> Result<StoredHistory> {
        if !self.csv_path.exists() {
            return Err(Error::MissingStore {
                path: self.csv_path.clone(),
            });
        }

        let mut reader = csv::Reader::from_path(&self.csv_path)?;
        let fields: Vec<String> = reader.headers()?.iter().map(ToString::to_string).collect();

        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }

        log::debug!(
            "loaded {} records from {}",
            records.len(),
            self.csv_path.display()
        );

        Ok(StoredHistory { fields, records })
    }

    /// Load the gzipped JSON snapshot copy.
    ///
    /// The snapshot mirrors the CSV store and exists only as a faster
    /// reload path for ad-hoc consumers; the pipeline itself reads the
    /// CSV.
    pub fn load_snapshot(&self) -> Result<Vec<PlayRecord>> {
        let file = File::open(&self.snapshot_path)?;
        let decoder = GzDecoder::new(file);
        let records = serde_json::from_reader(decoder)?;
        Ok(records)
    }

    /// Persist the merged record set, replacing the previous store.
    ///
    /// Both the CSV store and the snapshot are written to a temporary
    /// sibling first and swapped into place with a rename, so a partial
    /// write cannot corrupt the checkpoint used on the next run.
    pub fn write(&self, records: &[PlayRecord]) -> Result<()> {
        let csv_tmp = tmp_path(&self.csv_path);
        write_csv(&csv_tmp, records)?;
        fs::rename(&csv_tmp, &self.csv_path)?;

        let snapshot_tmp = tmp_path(&self.snapshot_path);
        write_snapshot(&snapshot_tmp, records)?;
        fs::rename(&snapshot_tmp, &self.snapshot_path)?;

        log::debug!(
            "wrote {} records to {}",
            records.len(),
            self.csv_path.display()
        );

        Ok(())
    }
}

fn write_csv(path: &Path, records: &[PlayRecord]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    // The header is written explicitly so an empty record set still
    // produces a store with the canonical layout.
    writer.write_record(PlayRecord::FIELDS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_snapshot(path: &Path, records: &[PlayRecord]) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    serde_json::to_writer(&mut encoder, records)?;
    encoder.finish()?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record_at(entry_id: u32, hour: u32) -> PlayRecord {
        let played_on = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        PlayRecord::new(
            entry_id,
            format!("Track {entry_id}"),
            "Artist".to_string(),
            "Album".to_string(),
            played_on,
            false,
            None,
            played_on,
        )
    }

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::new(
            dir.path().join("history.csv"),
            dir.path().join("history.json.gz"),
        )
    }

    #[test]
    fn test_load_missing_store_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::MissingStore { .. }));
    }

    #[test]
    fn test_write_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let records = vec![record_at(1, 11), record_at(2, 10)];

        store.write(&records).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.records, records);
        assert_eq!(loaded.fields, PlayRecord::FIELDS);
    }

    #[test]
    fn test_checkpoint_is_max_played_on() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .write(&[record_at(1, 8), record_at(2, 11), record_at(3, 9)])
            .unwrap();

        let checkpoint = store.load().unwrap().checkpoint().unwrap();
        assert_eq!(
            checkpoint,
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_empty_store_has_no_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(&[]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.fields, PlayRecord::FIELDS);
        assert!(matches!(loaded.checkpoint(), Err(Error::EmptyStore)));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let records = vec![record_at(1, 10)];

        store.write(&records).unwrap();
        assert_eq!(store.load_snapshot().unwrap(), records);
    }

    #[test]
    fn test_rewrite_replaces_previous_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.write(&[record_at(1, 10), record_at(2, 9)]).unwrap();
        store.write(&[record_at(1, 11)]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].entry_id, 1);
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(&[record_at(1, 10)]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "stray temp files: {leftovers:?}");
    }
}
