use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// CaskDB errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The key was empty. Rejected before anything is written.
    EmptyKey,
    /// The key exceeds the configured maximum, given in bytes.
    KeyTooLarge(usize),
    /// The value exceeds the configured maximum, given in bytes.
    ValueTooLarge(usize),
    /// The key is not present in the index, or is shadowed by a tombstone.
    KeyNotFound,
    /// A record append failed. The writer's offset is unchanged.
    WriteFailed(String),
    /// A positional value read failed or went out of bounds.
    ReadFailed(String),
    /// A record header had the wrong length when decoding.
    HeaderSizeMismatch { expected: usize, actual: usize },
    /// The recomputed header digest does not match the stored one.
    HeaderCorrupt,
    /// The recomputed value digest does not match the stored one.
    ValueCorrupt,
    /// A segment ended mid-record: short header or short payload.
    TruncatedRecord(String),
    /// A segment filename does not fit in the fixed 32-byte header field.
    FilenameTooLong(String),
    /// A directory entry looks like a segment file but its number is invalid.
    InvalidSegmentName(String),
    /// An archived segment failed to scan during recovery. Archived segments
    /// are immutable, so this is unrecoverable without a backup.
    ArchivedCorruption(String),
    /// The database directory was missing and restoring the backup failed.
    BackupRestoreFailed(String),
    /// Invalid data, typically payload decoding failures.
    InvalidData(String),
    /// The store's writer has been closed.
    Closed,
    /// An IO error.
    IO(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::EmptyKey => write!(f, "key should not be empty"),
            Error::KeyTooLarge(max) => write!(f, "key exceeds maximum size ({max} bytes)"),
            Error::ValueTooLarge(max) => write!(f, "value exceeds maximum size ({max} bytes)"),
            Error::KeyNotFound => write!(f, "key not found in index"),
            Error::WriteFailed(msg) => write!(f, "write failed: {msg}"),
            Error::ReadFailed(msg) => write!(f, "read failed: {msg}"),
            Error::HeaderSizeMismatch { expected, actual } => {
                write!(f, "header size mismatch: expected {expected} bytes, got {actual}")
            }
            Error::HeaderCorrupt => write!(f, "header digest mismatch"),
            Error::ValueCorrupt => write!(f, "value digest mismatch"),
            Error::TruncatedRecord(msg) => write!(f, "truncated record: {msg}"),
            Error::FilenameTooLong(name) => write!(f, "segment filename too long: {name}"),
            Error::InvalidSegmentName(name) => write!(f, "invalid segment name: {name}"),
            Error::ArchivedCorruption(msg) => write!(f, "archived segment corrupted: {msg}"),
            Error::BackupRestoreFailed(msg) => write!(f, "backup restore failed: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::Closed => write!(f, "store is closed"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
        }
    }
}

/// A CaskDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::IO(err.to_string())
    }
}
