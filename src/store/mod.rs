//! The store coordinator: open/recover, Put/Get/Delete, segment rotation.
//!
//! All mutations and the whole compaction cycle serialize behind one
//! read/write lock over the store state. Reads only hold the lock long enough
//! to copy the index entry out; the file read happens unlocked, which is safe
//! because archived segments are immutable and the active segment only grows.

pub mod compaction;
pub mod recovery;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::config::Config;
use crate::error::Result;
use crate::flock::FileLock;
use crate::index::{Index, IndexEntry};
use crate::record::{self, compose_flags, Payload, TOMBSTONE_BIT};
use crate::segment::{self, reader, writer::SegmentWriter};
use crate::Error;

/// A persistent key-value store over a directory of append-only segments.
pub struct Store {
    config: Config,
    _lock: FileLock,
    state: RwLock<State>,
}

/// Mutable state guarded by the store's lock. `writer` is `None` only after
/// `close` or transiently inside the compaction swap.
struct State {
    index: Index,
    writer: Option<SegmentWriter>,
    active_segment: String,
    active_number: u64,
    active_count: usize,
}

impl Store {
    /// Opens a database, restoring from backup and rebuilding the index as
    /// needed (see [`recovery`]). Acquires an exclusive lock on a sibling
    /// `<db_path>.lock` file; a second open of the same path fails.
    ///
    /// Compaction is not scheduled here. The caller decides: register a
    /// [`compaction::CompactionTask`] on a scheduler for the main store, and
    /// don't for short-lived or staging stores.
    pub fn open(config: Config) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let lock = FileLock::acquire(lock_path(&config.db_path))?;

        let recovered = recovery::recover(&config)?;
        let writer = SegmentWriter::open(
            &config.db_path,
            &recovered.active_segment,
            recovered.active_size,
        )?;

        tracing::info!(
            path = %config.db_path.display(),
            keys = recovered.index.len(),
            segment = %recovered.active_segment,
            "store opened"
        );

        Ok(Self {
            config,
            _lock: lock,
            state: RwLock::new(State {
                index: recovered.index,
                writer: Some(writer),
                active_segment: recovered.active_segment,
                active_number: recovered.active_number,
                active_count: recovered.active_count,
            }),
        })
    }

    /// Stores a key-value pair, superseding any previous record for the key.
    /// Rotates to a fresh segment once the active one has absorbed
    /// `max_keys_per_segment` records.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write()?;

        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if key.len() > self.config.max_key_size {
            return Err(Error::KeyTooLarge(self.config.max_key_size));
        }
        if value.len() > self.config.max_value_size {
            return Err(Error::ValueTooLarge(self.config.max_value_size));
        }

        if state.active_count >= self.config.max_keys_per_segment {
            self.rotate(&mut state)?;
        }

        let payload = Payload {
            key: key.to_string(),
            value: value.to_string(),
        };
        let writer = state.writer.as_mut().ok_or(Error::Closed)?;
        let desc = writer.append_payload(&payload, 0)?;

        state.index.insert(
            key.to_string(),
            IndexEntry {
                segment: desc.segment,
                offset: desc.offset,
                size: desc.size,
                value_digest: desc.value_digest,
                deleted: false,
            },
        );
        state.active_count += 1;

        tracing::debug!(key, segment = %state.active_segment, "put");
        Ok(())
    }

    /// Returns the value of the most recent completed put for `key`, or
    /// `KeyNotFound` if the key is absent or tombstoned. A value-digest
    /// mismatch purges the entry and surfaces as `ValueCorrupt`; without
    /// replication there is nothing to repair it from.
    pub fn get(&self, key: &str) -> Result<String> {
        let entry = {
            let state = self.state.read()?;
            match state.index.get(key) {
                None => return Err(Error::KeyNotFound),
                Some(entry) if entry.deleted => return Err(Error::KeyNotFound),
                Some(entry) => entry.clone(),
            }
        };

        match self.read_entry_value(&entry) {
            Ok(value) => Ok(value),
            Err(Error::ValueCorrupt) => {
                let mut state = self.state.write()?;
                // skip the purge if a writer replaced the entry in the window
                // between our index lookup and the failed read
                if state.index.get(key) == Some(&entry) {
                    state.index.remove(key);
                    tracing::warn!(key, segment = %entry.segment, "purged corrupted index entry");
                }
                Err(Error::ValueCorrupt)
            }
            Err(e) => Err(e),
        }
    }

    /// Logically deletes `key` by appending a tombstone record. The index
    /// entry flips to deleted and points at the tombstone; compaction drops
    /// both. Deleting an absent or already-deleted key writes nothing.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.write()?;

        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if key.len() > self.config.max_key_size {
            return Err(Error::KeyTooLarge(self.config.max_key_size));
        }
        match state.index.get(key) {
            None => return Err(Error::KeyNotFound),
            Some(entry) if entry.deleted => return Err(Error::KeyNotFound),
            Some(_) => {}
        }

        let payload = Payload::tombstone(key);
        let writer = state.writer.as_mut().ok_or(Error::Closed)?;
        let desc = writer.append_payload(&payload, compose_flags(&[TOMBSTONE_BIT]))?;

        state.index.insert(
            key.to_string(),
            IndexEntry {
                segment: desc.segment,
                offset: desc.offset,
                size: desc.size,
                value_digest: desc.value_digest,
                deleted: true,
            },
        );
        state.active_count += 1;

        tracing::debug!(key, segment = %state.active_segment, "delete");
        Ok(())
    }

    /// Number of live (non-deleted) keys.
    pub fn len(&self) -> Result<usize> {
        let state = self.state.read()?;
        Ok(state.index.values().filter(|entry| !entry.deleted).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Closes the writer. Reads keep working; mutations fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write()?;
        state.writer = None;
        Ok(())
    }

    /// Closes the current active segment and opens `seg<max+1>.log`. Gaps in
    /// the numbering (e.g. after compaction) are fine; only monotonicity
    /// matters.
    fn rotate(&self, state: &mut State) -> Result<()> {
        let next = state.active_number + 1;
        let name = segment::segment_name(next);

        state.writer = None;
        state.writer = Some(SegmentWriter::open(&self.config.db_path, &name, 0)?);
        state.active_segment = name;
        state.active_number = next;
        state.active_count = 0;

        tracing::info!(segment = %state.active_segment, "rotated active segment");
        Ok(())
    }

    /// Reads and verifies the payload an index entry points at, returning the
    /// decoded value.
    fn read_entry_value(&self, entry: &IndexEntry) -> Result<String> {
        let payload =
            reader::read_value_at(&self.config.db_path, &entry.segment, entry.offset, entry.size)?;

        let flags = if entry.deleted { compose_flags(&[TOMBSTONE_BIT]) } else { 0 };
        let digest =
            record::value_digest_for(entry.offset, entry.size, flags, &entry.segment, &payload)?;
        if digest != entry.value_digest {
            return Err(Error::ValueCorrupt);
        }

        Ok(Payload::decode(&payload)?.value)
    }

    fn into_state(self) -> Result<State> {
        Ok(self.state.into_inner()?)
    }
}

/// The lock file lives next to the database directory, not inside it, so the
/// lock survives compaction replacing the directory.
fn lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}
