use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;
use crate::record::{Payload, RecordHeader, HEADER_SIZE};
use crate::Error;

/// One record yielded by a segment scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRecord {
    pub header: RecordHeader,
    pub payload: Payload,
}

/// Sequentially decodes the framed records of one segment file.
///
/// Each step reads a header, validates its digest, then reads and decodes the
/// payload. Payload digests are deliberately not checked here; the read path
/// verifies them on access. The scan ends cleanly when the file ends exactly
/// at a header boundary. Anything else (a short header or payload, a header
/// digest mismatch, undecodable JSON) surfaces as a typed error and the
/// caller decides whether that is fatal.
pub struct SegmentScanner {
    reader: BufReader<File>,
    segment: String,
    pos: u64,
    len: u64,
}

impl SegmentScanner {
    pub fn open(dir: &Path, segment: &str) -> Result<Self> {
        let file = File::open(dir.join(segment))?;
        let len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            segment: segment.to_string(),
            pos: 0,
            len,
        })
    }

    /// Position after the last successfully decoded record: the segment's
    /// logical length. Recovery resumes appending here, overwriting any
    /// corrupt tail.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    fn read_record(&mut self) -> Result<Option<ScannedRecord>> {
        if self.pos == self.len {
            return Ok(None);
        }
        if self.pos + HEADER_SIZE as u64 > self.len {
            return Err(Error::TruncatedRecord(format!(
                "{}: {} trailing bytes, header needs {}",
                self.segment,
                self.len - self.pos,
                HEADER_SIZE
            )));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_buf)?;
        let header = RecordHeader::decode(&header_buf)?;
        header.verify_header()?;

        let payload_end = self.pos + HEADER_SIZE as u64 + header.size;
        if payload_end > self.len {
            return Err(Error::TruncatedRecord(format!(
                "{}: payload of {} bytes at offset {} runs past end of file",
                self.segment, header.size, header.offset
            )));
        }

        let mut payload_buf = vec![0u8; header.size as usize];
        self.reader.read_exact(&mut payload_buf)?;
        let payload = Payload::decode(&payload_buf)?;

        self.pos = payload_end;
        Ok(Some(ScannedRecord { header, payload }))
    }
}

impl Iterator for SegmentScanner {
    type Item = Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Positional read of exactly `size` payload bytes at `offset`. Bounds are
/// checked against the file length first; the caller recomputes and compares
/// the value digest.
pub fn read_value_at(dir: &Path, segment: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
    let file = File::open(dir.join(segment)).map_err(|e| Error::ReadFailed(e.to_string()))?;
    let len = file
        .metadata()
        .map_err(|e| Error::ReadFailed(e.to_string()))?
        .len();

    if offset + size > len {
        return Err(Error::ReadFailed(format!(
            "{segment}: offset+size ({offset}+{size}) exceeds file length ({len})"
        )));
    }

    let mut buf = vec![0u8; size as usize];
    read_at(&file, &mut buf, offset).map_err(|e| Error::ReadFailed(e.to_string()))?;
    Ok(buf)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(not(unix))]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = file;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}
