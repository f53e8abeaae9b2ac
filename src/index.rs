use std::collections::HashMap;

use crate::record::RecordHeader;

/// Location of a key's most recent record across all segments. Deleted keys
/// keep an entry pointing at their tombstone until the next compaction.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Name of the segment file holding the record.
    pub segment: String,
    /// Byte position of the payload in that file.
    pub offset: u64,
    /// Payload length in bytes.
    pub size: u64,
    /// Stored value digest, compared against a recomputation on every read.
    pub value_digest: [u8; 32],
    /// Soft-delete marker. Reads treat the key as absent; compaction drops it.
    pub deleted: bool,
}

impl IndexEntry {
    /// Entry for a record scanned out of `segment` during recovery.
    pub fn from_header(segment: &str, header: &RecordHeader) -> Self {
        Self {
            segment: segment.to_string(),
            offset: header.offset,
            size: header.size,
            value_digest: header.value_digest,
            deleted: header.is_tombstone(),
        }
    }
}

/// In-memory map from key to the location of its latest record. Represents
/// the current logical state of the store.
pub type Index = HashMap<String, IndexEntry>;
