//! Startup recovery: restore-from-backup detection and the index rebuild.
//!
//! Segments are scanned in ascending numeric order so later records win in
//! the index. Archived segments must scan cleanly end to end; any corruption
//! there is fatal because nothing ever legitimately truncates an archived
//! file. The active segment gets the opposite policy: a crash mid-append is
//! expected, so its scan stops at the first bad record, keeps everything
//! before it, and reports the logical length for the writer to resume at.

use std::fs;

use crate::config::Config;
use crate::error::Result;
use crate::index::{Index, IndexEntry};
use crate::segment::{self, reader::SegmentScanner};
use crate::Error;

/// State reconstructed from disk, handed to the store constructor.
pub(crate) struct Recovered {
    pub index: Index,
    pub active_segment: String,
    pub active_number: u64,
    /// Records in the active segment, including tombstones and superseded
    /// writes; this seeds the rotation counter.
    pub active_count: usize,
    /// Logical length of the active segment: the append offset.
    pub active_size: u64,
}

pub(crate) fn recover(config: &Config) -> Result<Recovered> {
    restore_from_backup(config)?;
    fs::create_dir_all(&config.db_path)?;

    let segments = segment::list_segments(&config.db_path)?;
    let (active_segment, active_number) = segments
        .last()
        .map(|(name, num)| (name.clone(), *num))
        .unwrap_or_else(|| (segment::segment_name(0), 0));

    let mut index = Index::new();
    let mut active_count = 0usize;
    let mut active_size = 0u64;

    for (name, _) in &segments {
        let is_active = *name == active_segment;
        let mut scanner = SegmentScanner::open(&config.db_path, name)?;

        loop {
            match scanner.next() {
                Some(Ok(record)) => {
                    index.insert(
                        record.payload.key.clone(),
                        IndexEntry::from_header(name, &record.header),
                    );
                    if is_active {
                        active_count += 1;
                    }
                }
                Some(Err(e)) if is_active => {
                    tracing::warn!(
                        segment = %name,
                        error = %e,
                        "active segment scan stopped, keeping records before the corruption"
                    );
                    break;
                }
                Some(Err(e)) => {
                    return Err(Error::ArchivedCorruption(format!("{name}: {e}")));
                }
                None => break,
            }
        }

        if is_active {
            active_size = scanner.pos();
        }
    }

    tracing::debug!(
        segments = segments.len(),
        keys = index.len(),
        "index rebuilt"
    );

    Ok(Recovered {
        index,
        active_segment,
        active_number,
        active_count,
        active_size,
    })
}

/// The one transient state compaction can leave behind after a crash: the
/// database directory gone, the backup still present. The backup is by
/// construction a complete pre-compaction snapshot, so take it wholesale and
/// then delete it. Failing to restore here is unrecoverable.
fn restore_from_backup(config: &Config) -> Result<()> {
    if config.db_path.exists() || !config.backup_path.exists() {
        return Ok(());
    }

    tracing::info!(
        backup = %config.backup_path.display(),
        "database missing but backup present, restoring"
    );
    segment::copy_database(&config.backup_path, &config.db_path)
        .map_err(|e| Error::BackupRestoreFailed(e.to_string()))?;

    if let Err(e) = fs::remove_dir_all(&config.backup_path) {
        tracing::warn!(error = %e, "failed to delete backup after restore");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::writer::SegmentWriter;
    use crate::record::Payload;
    use crate::tmpfs::TempDir;

    #[test]
    fn test_recover_missing_directory() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("db"));

        let recovered = recover(&config).unwrap();
        assert!(recovered.index.is_empty());
        assert_eq!(recovered.active_segment, "seg0.log");
        assert_eq!(recovered.active_number, 0);
        assert_eq!(recovered.active_count, 0);
        assert_eq!(recovered.active_size, 0);
        assert!(config.db_path.is_dir());
    }

    #[test]
    fn test_recover_counts_active_records() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("db"));
        fs::create_dir_all(&config.db_path).unwrap();

        let mut writer = SegmentWriter::open(&config.db_path, "seg0.log", 0).unwrap();
        for (key, value) in [("a", "1"), ("a", "2"), ("b", "3")] {
            let payload = Payload {
                key: key.into(),
                value: value.into(),
            };
            writer.append_payload(&payload, 0).unwrap();
        }
        let logical = writer.offset();
        drop(writer);

        let recovered = recover(&config).unwrap();
        // two keys, but all three records count toward rotation
        assert_eq!(recovered.index.len(), 2);
        assert_eq!(recovered.active_count, 3);
        assert_eq!(recovered.active_size, logical);
        // last-writer-wins: "a" points past its first record
        assert!(recovered.index["a"].offset > crate::record::HEADER_SIZE as u64);
        assert!(recovered.index["b"].offset > recovered.index["a"].offset);
        assert!(!recovered.index["a"].deleted);
    }

    #[test]
    fn test_recover_active_is_highest_numbered() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("db"));
        fs::create_dir_all(&config.db_path).unwrap();

        for name in ["seg0.log", "seg3.log"] {
            let mut writer = SegmentWriter::open(&config.db_path, name, 0).unwrap();
            let payload = Payload {
                key: "k".into(),
                value: name.into(),
            };
            writer.append_payload(&payload, 0).unwrap();
        }

        let recovered = recover(&config).unwrap();
        assert_eq!(recovered.active_segment, "seg3.log");
        assert_eq!(recovered.active_number, 3);
        assert_eq!(recovered.active_count, 1);
        // the later segment's record wins
        assert_eq!(recovered.index["k"].segment, "seg3.log");
    }

    #[test]
    fn test_restore_from_backup_then_delete_it() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("db"));
        fs::create_dir_all(&config.backup_path).unwrap();

        let mut writer = SegmentWriter::open(&config.backup_path, "seg0.log", 0).unwrap();
        let payload = Payload {
            key: "a".into(),
            value: "1".into(),
        };
        writer.append_payload(&payload, 0).unwrap();
        drop(writer);

        let recovered = recover(&config).unwrap();
        assert_eq!(recovered.index.len(), 1);
        assert!(config.db_path.join("seg0.log").exists());
        assert!(!config.backup_path.exists());
    }

    #[test]
    fn test_backup_ignored_when_database_exists() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("db"));
        fs::create_dir_all(&config.db_path).unwrap();
        fs::create_dir_all(&config.backup_path).unwrap();

        let mut writer = SegmentWriter::open(&config.backup_path, "seg0.log", 0).unwrap();
        let payload = Payload {
            key: "stale".into(),
            value: "x".into(),
        };
        writer.append_payload(&payload, 0).unwrap();
        drop(writer);

        let recovered = recover(&config).unwrap();
        assert!(recovered.index.is_empty());
        assert!(config.backup_path.exists());
    }
}
