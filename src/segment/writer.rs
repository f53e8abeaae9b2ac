use std::fs::File;
use std::path::Path;

use crate::error::Result;
use crate::record::{Payload, RecordHeader, HEADER_SIZE};
use crate::Error;

/// Location of a freshly appended record, handed back to the store so it can
/// update the index.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDescriptor {
    pub segment: String,
    pub offset: u64,
    pub size: u64,
    pub value_digest: [u8; 32],
}

/// Appends framed records to the active segment.
///
/// The file is opened with `O_SYNC`, so header and payload are on disk before
/// `append` returns. The append offset is tracked in memory: a failed payload
/// write rolls it back so the next append overwrites the partial tail, and a
/// corrupt tail left behind by a crash is overwritten the same way once
/// recovery reports the segment's logical length.
///
/// Exclusive access is the caller's job; the store serializes all mutations
/// behind its write lock.
#[derive(Debug)]
pub struct SegmentWriter {
    file: File,
    name: String,
    offset: u64,
}

impl SegmentWriter {
    /// Opens (creating if needed) the segment `name` under `dir` and positions
    /// the writer at `offset`, the segment's logical length.
    pub fn open(dir: &Path, name: &str, offset: u64) -> Result<Self> {
        let mut options = File::options();
        options.create(true).write(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_SYNC);
        }

        let file = options.open(dir.join(name))?;

        Ok(Self {
            file,
            name: name.to_string(),
            offset,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The next append position, i.e. the segment's logical length.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Appends one framed record: header at the current offset, payload right
    /// after it. On any write failure the offset is left where it was, so the
    /// segment's logical length is unchanged and the next append overwrites
    /// whatever partial bytes landed.
    pub fn append(&mut self, payload: &[u8], flags: u64) -> Result<RecordDescriptor> {
        let value_offset = self.offset + HEADER_SIZE as u64;
        let size = payload.len() as u64;
        let header = RecordHeader::compute(value_offset, size, flags, &self.name, payload)?;

        write_at(&self.file, &header.encode(), self.offset)?;

        self.offset += HEADER_SIZE as u64;
        if let Err(err) = write_at(&self.file, payload, value_offset) {
            self.offset -= HEADER_SIZE as u64;
            return Err(err);
        }
        self.offset += size;

        Ok(RecordDescriptor {
            segment: self.name.clone(),
            offset: value_offset,
            size,
            value_digest: header.value_digest,
        })
    }

    /// Serializes a payload and appends it. Convenience used by the store's
    /// put and delete paths.
    pub fn append_payload(&mut self, payload: &Payload, flags: u64) -> Result<RecordDescriptor> {
        self.append(&payload.encode()?, flags)
    }
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
        .map_err(|e| Error::WriteFailed(e.to_string()))
}

#[cfg(not(unix))]
fn write_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = file;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(buf))
        .map_err(|e| Error::WriteFailed(e.to_string()))
}
