//! Offline-style compaction: back up, rewrite live records into a staging
//! database, swap it in, self-heal on failure.
//!
//! The cycle holds the store's write lock throughout, so reads and writes
//! block while it runs. The backup taken first is what makes the
//! non-atomic swap safe: if the process dies between removing the database
//! directory and finishing the rename, startup recovery finds
//! "database missing, backup present" and restores the pre-compaction state.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::scheduler::{BackgroundTask, Context};
use crate::segment::{self, writer::SegmentWriter};

use super::{State, Store};

impl Store {
    /// Runs one compaction cycle. Any failure before the swap leaves the
    /// store untouched and the cycle is simply retried at the next interval;
    /// a failure during the swap restores from the backup. The process
    /// terminates only if that restore itself fails, because at that point
    /// neither the pre- nor the post-compaction state can be produced.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state.write()?;

        if let Err(e) = segment::copy_database(&self.config.db_path, &self.config.backup_path) {
            tracing::warn!(error = %e, "backup failed, skipping compaction cycle");
            return Err(e);
        }

        let sub = match self.rewrite_live_records(&state) {
            Ok(sub) => sub,
            Err(e) => {
                tracing::warn!(error = %e, "compaction rewrite failed, skipping cycle");
                remove_staging(&self.config.backup_path);
                remove_staging(&self.config.tmp_path);
                return Err(e);
            }
        };

        self.swap_in(&mut state, sub)
    }

    /// Creates a fresh sub-store at `tmp_path` and puts every live key's
    /// current value into it. The sub-store runs the ordinary write path, so
    /// the output is framed, digested, and rotated exactly like any other
    /// database. No compaction task is registered for it.
    fn rewrite_live_records(&self, state: &State) -> Result<Store> {
        // a crashed cycle may have left stale staging output behind
        if self.config.tmp_path.exists() {
            fs::remove_dir_all(&self.config.tmp_path)?;
        }

        let sub = Store::open(self.config.compaction_target())?;
        for (key, entry) in &state.index {
            if entry.deleted {
                continue;
            }
            let value = self.read_entry_value(entry)?;
            sub.put(key, &value)?;
        }

        Ok(sub)
    }

    /// Replaces the database directory with the staging output and adopts the
    /// sub-store's state. Both writers are closed first so no handle points
    /// into the directory being removed.
    fn swap_in(&self, state: &mut State, sub: Store) -> Result<()> {
        let prior_offset = state.writer.as_ref().map(|w| w.offset()).unwrap_or(0);
        state.writer = None;

        let mut sub_state = sub.into_state()?;
        let sub_offset = sub_state.writer.as_ref().map(|w| w.offset()).unwrap_or(0);
        sub_state.writer = None;

        let swapped = (|| -> Result<SegmentWriter> {
            fs::remove_dir_all(&self.config.db_path)?;
            fs::rename(&self.config.tmp_path, &self.config.db_path)?;
            SegmentWriter::open(&self.config.db_path, &sub_state.active_segment, sub_offset)
        })();

        match swapped {
            Ok(writer) => {
                state.index = sub_state.index;
                state.active_segment = sub_state.active_segment;
                state.active_number = sub_state.active_number;
                state.active_count = sub_state.active_count;
                state.writer = Some(writer);

                remove_staging(&self.config.backup_path);
                tracing::info!(
                    keys = state.index.len(),
                    segment = %state.active_segment,
                    "compaction cycle completed"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "database swap failed, restoring from backup");
                remove_staging(&self.config.tmp_path);

                if let Err(restore_err) =
                    segment::copy_database(&self.config.backup_path, &self.config.db_path)
                {
                    tracing::error!(
                        error = %restore_err,
                        "backup restore failed, database state is unrecoverable"
                    );
                    panic!("compaction restore failed: {restore_err}");
                }

                match SegmentWriter::open(&self.config.db_path, &state.active_segment, prior_offset)
                {
                    Ok(writer) => state.writer = Some(writer),
                    Err(reopen_err) => {
                        tracing::error!(
                            error = %reopen_err,
                            "failed to reopen writer after restore"
                        );
                        panic!("compaction restore failed: {reopen_err}");
                    }
                }

                Err(e)
            }
        }
    }
}

fn remove_staging(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove staging directory");
        }
    }
}

/// Periodic compaction for a long-lived store. Register it explicitly on a
/// [`crate::scheduler::Scheduler`]; stores opened as compaction targets or
/// for one-off work simply never register one.
pub struct CompactionTask {
    store: Arc<Store>,
}

impl CompactionTask {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for CompactionTask {
    fn name(&self) -> &'static str {
        "compaction"
    }

    fn interval(&self) -> Duration {
        self.store.config.compaction_interval
    }

    async fn execute(&self, _ctx: Context) -> Result<()> {
        self.store.compact()
    }
}
