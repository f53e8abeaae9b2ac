use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a CaskDB store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the segment files.
    pub db_path: PathBuf,

    /// Staging directory for the pre-compaction backup (default: `<db_path>_backup`).
    pub backup_path: PathBuf,

    /// Staging directory for the compaction output (default: `<db_path>_tmp`).
    pub tmp_path: PathBuf,

    /// Maximum key size in bytes (default: 256).
    pub max_key_size: usize,

    /// Maximum value size in bytes (default: 1 MiB).
    pub max_value_size: usize,

    /// Records written to the active segment before rotation (default: 1024).
    pub max_keys_per_segment: usize,

    /// Delay between compaction cycles (default: 30s).
    pub compaction_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new("./caskdb")
    }
}

impl Config {
    /// Create a config rooted at the given directory. The backup and tmp
    /// staging directories are derived as siblings of `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        Self {
            backup_path: sibling(&db_path, "_backup"),
            tmp_path: sibling(&db_path, "_tmp"),
            db_path,
            max_key_size: 256,
            max_value_size: 1024 * 1024,
            max_keys_per_segment: 1024,
            compaction_interval: Duration::from_secs(30),
        }
    }

    /// Set the backup staging directory.
    pub fn backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = path.into();
        self
    }

    /// Set the compaction staging directory.
    pub fn tmp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmp_path = path.into();
        self
    }

    /// Set the maximum key size.
    pub fn max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    /// Set the maximum value size.
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Set the rotation threshold for the active segment.
    pub fn max_keys_per_segment(mut self, count: usize) -> Self {
        self.max_keys_per_segment = count;
        self
    }

    /// Set the delay between compaction cycles.
    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Configuration for the sub-store that compaction rewrites live records
    /// into: rooted at `tmp_path`, same limits, own staging siblings.
    pub(crate) fn compaction_target(&self) -> Config {
        Config {
            db_path: self.tmp_path.clone(),
            backup_path: sibling(&self.tmp_path, "_backup"),
            tmp_path: sibling(&self.tmp_path, "_tmp"),
            ..self.clone()
        }
    }
}

/// Appends a suffix to the final path component, keeping the parent.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "caskdb".to_string());
    name.push_str(suffix);
    path.parent().map(|p| p.join(&name)).unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.db_path, PathBuf::from("./caskdb"));
        assert_eq!(config.backup_path, PathBuf::from("./caskdb_backup"));
        assert_eq!(config.tmp_path, PathBuf::from("./caskdb_tmp"));
        assert_eq!(config.max_key_size, 256);
        assert_eq!(config.max_value_size, 1024 * 1024);
        assert_eq!(config.max_keys_per_segment, 1024);
        assert_eq!(config.compaction_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new("/tmp/kv")
            .max_key_size(64)
            .max_value_size(4096)
            .max_keys_per_segment(3)
            .compaction_interval(Duration::from_millis(500))
            .backup_path("/tmp/kv_bkp");

        assert_eq!(config.db_path, PathBuf::from("/tmp/kv"));
        assert_eq!(config.backup_path, PathBuf::from("/tmp/kv_bkp"));
        assert_eq!(config.tmp_path, PathBuf::from("/tmp/kv_tmp"));
        assert_eq!(config.max_key_size, 64);
        assert_eq!(config.max_value_size, 4096);
        assert_eq!(config.max_keys_per_segment, 3);
        assert_eq!(config.compaction_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_compaction_target_shares_limits() {
        let config = Config::new("/tmp/kv").max_keys_per_segment(7);
        let target = config.compaction_target();
        assert_eq!(target.db_path, PathBuf::from("/tmp/kv_tmp"));
        assert_eq!(target.max_keys_per_segment, 7);
        assert_ne!(target.tmp_path, config.tmp_path);
    }
}
