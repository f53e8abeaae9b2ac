//! Segment files and the directory they live in.
//!
//! A database directory holds files named `seg<N>.log` with `N` a decimal
//! u64. The highest-numbered segment is the active one; every other segment
//! is archived and immutable. Records within a segment are concatenated
//! `[header][payload]` frames (see [`crate::record`]).

pub mod reader;
pub mod writer;

use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::error::Result;
use crate::Error;

pub const SEGMENT_PREFIX: &str = "seg";
pub const SEGMENT_EXT: &str = ".log";

/// Renders the filename for segment number `n`, e.g. `seg0.log`. The rendered
/// name always fits the 32-byte header field: prefix + 20 digits + extension
/// is 27 bytes.
pub fn segment_name(n: u64) -> String {
    format!("{SEGMENT_PREFIX}{n}{SEGMENT_EXT}")
}

/// Extracts the segment number from a filename shaped like `seg<digits>.log`.
/// Returns `None` for names that don't match the shape at all, and an error
/// for names that match but whose digits don't parse as a u64.
pub fn parse_segment_name(name: &str) -> Result<Option<u64>> {
    let digits = match name
        .strip_prefix(SEGMENT_PREFIX)
        .and_then(|rest| rest.strip_suffix(SEGMENT_EXT))
    {
        Some(d) => d,
        None => return Ok(None),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    digits
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::InvalidSegmentName(name.to_string()))
}

/// Lists the segment files in `dir` as `(name, number)` pairs, ascending by
/// number. Scanning them in this order yields records chronologically, which
/// is what makes last-writer-wins index rebuilds correct. Entries that are
/// not segment files are ignored; a segment-shaped name with an unparseable
/// number is a hard error.
pub fn list_segments(dir: &Path) -> Result<Vec<(String, u64)>> {
    let mut segments = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(num) = parse_segment_name(&name)? {
            segments.push((name, num));
        }
    }

    segments.sort_by_key(|(_, num)| *num);
    Ok(segments)
}

/// Copies a database directory file-by-file: removes `dst` if present,
/// recreates it, then copies every segment file and fsyncs each copy. Only
/// segment files are carried over. Not atomic, but idempotent when re-driven
/// from scratch.
pub fn copy_database(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() {
        fs::remove_dir_all(dst)?;
    }
    fs::create_dir_all(dst)?;

    for (name, _) in list_segments(src)? {
        let mut source = File::open(src.join(&name))?;
        let mut target = File::create(dst.join(&name))?;
        io::copy(&mut source, &mut target)?;
        target.sync_all()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::TempDir;

    #[test]
    fn test_segment_name_round_trip() {
        assert_eq!(segment_name(0), "seg0.log");
        assert_eq!(segment_name(42), "seg42.log");
        assert_eq!(parse_segment_name("seg0.log").unwrap(), Some(0));
        assert_eq!(parse_segment_name("seg42.log").unwrap(), Some(42));
    }

    #[test]
    fn test_parse_ignores_foreign_names() {
        assert_eq!(parse_segment_name("manifest.log").unwrap(), None);
        assert_eq!(parse_segment_name("seg.log").unwrap(), None);
        assert_eq!(parse_segment_name("seg12.txt").unwrap(), None);
        assert_eq!(parse_segment_name("seg1x2.log").unwrap(), None);
        assert_eq!(parse_segment_name("segment7.log").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_overflowing_number() {
        // 21 digits cannot fit a u64
        let name = format!("seg{}{}", "9".repeat(21), SEGMENT_EXT);
        assert_eq!(
            parse_segment_name(&name),
            Err(Error::InvalidSegmentName(name.clone()))
        );
    }

    #[test]
    fn test_list_segments_sorted_numerically() {
        let dir = TempDir::new().unwrap();
        for n in [10u64, 2, 0] {
            std::fs::write(dir.path().join(segment_name(n)), b"x").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let segments = list_segments(dir.path()).unwrap();
        let names: Vec<_> = segments.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["seg0.log", "seg2.log", "seg10.log"]);
    }

    #[test]
    fn test_list_segments_hard_errors_on_bad_digits() {
        let dir = TempDir::new().unwrap();
        let name = format!("seg{}{}", "9".repeat(21), SEGMENT_EXT);
        std::fs::write(dir.path().join(&name), b"x").unwrap();

        assert_eq!(
            list_segments(dir.path()),
            Err(Error::InvalidSegmentName(name))
        );
    }

    #[test]
    fn test_copy_database_replaces_destination() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        std::fs::write(src.path().join("seg0.log"), b"record bytes").unwrap();
        std::fs::write(src.path().join("seg1.log"), b"more records").unwrap();
        std::fs::write(src.path().join("stray.tmp"), b"skip me").unwrap();
        std::fs::write(dst.path().join("seg9.log"), b"stale").unwrap();

        copy_database(src.path(), dst.path()).unwrap();

        let copied = list_segments(dst.path()).unwrap();
        assert_eq!(copied.len(), 2);
        assert!(!dst.path().join("seg9.log").exists());
        assert!(!dst.path().join("stray.tmp").exists());
        assert_eq!(
            std::fs::read(dst.path().join("seg0.log")).unwrap(),
            b"record bytes"
        );
    }
}
