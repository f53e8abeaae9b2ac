//! Record codec for the append-only segment format.
//!
//! Every record is a fixed-width header followed by a JSON payload:
//!
//! ```text
//! +--------+--------+--------+----------------+--------------+---------------+
//! | offset | size   | flags  | segment (32 B) | value digest | header digest |
//! | u64 BE | u64 BE | u64 BE | zero-padded    | SHA-256      | SHA-256       |
//! +--------+--------+--------+----------------+--------------+---------------+
//! | payload: `{"key":"…","value":"…"}`, `size` bytes                         |
//! +--------------------------------------------------------------------------+
//! ```
//!
//! The two digests are layered so a scan can validate headers without reading
//! payloads, while the read path verifies the payload itself:
//!
//! - value digest  = SHA-256(offset ‖ size ‖ flags ‖ segment ‖ payload)
//! - header digest = SHA-256(offset ‖ size ‖ flags ‖ segment ‖ value digest)
//!
//! All integers are big-endian. The segment field is the raw 32-byte
//! zero-padded filename, not a length-prefixed string.

use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::Error;

/// Fixed width of every record header.
pub const HEADER_SIZE: usize = 120;

/// Width of the zero-padded segment filename field.
pub const SEGMENT_NAME_SIZE: usize = 32;

/// Bit 0 of the flag word marks a tombstone. The remaining bits are reserved
/// and must stay zero.
pub const TOMBSTONE_BIT: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    /// Byte position of the payload in the segment file.
    pub offset: u64,
    /// Payload length in bytes.
    pub size: u64,
    /// Flag word; see [`TOMBSTONE_BIT`].
    pub flags: u64,
    /// Zero-padded name of the segment file the record lives in.
    pub segment: [u8; SEGMENT_NAME_SIZE],
    /// SHA-256 over the non-digest fields and the payload.
    pub value_digest: [u8; 32],
    /// SHA-256 over the non-digest fields and the value digest.
    pub header_digest: [u8; 32],
}

impl RecordHeader {
    /// Build a header for a payload landing at `offset` in `segment_name`,
    /// computing both digests. Fails if the name exceeds the 32-byte field.
    pub fn compute(
        offset: u64,
        size: u64,
        flags: u64,
        segment_name: &str,
        payload: &[u8],
    ) -> Result<Self> {
        let segment = fit_segment_name(segment_name)?;
        let value_digest = value_digest(offset, size, flags, &segment, payload);
        let header_digest = header_digest(offset, size, flags, &segment, &value_digest);
        Ok(Self {
            offset,
            size,
            flags,
            segment,
            value_digest,
            header_digest,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_be_bytes());
        buf[8..16].copy_from_slice(&self.size.to_be_bytes());
        buf[16..24].copy_from_slice(&self.flags.to_be_bytes());
        buf[24..56].copy_from_slice(&self.segment);
        buf[56..88].copy_from_slice(&self.value_digest);
        buf[88..120].copy_from_slice(&self.header_digest);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_SIZE {
            return Err(Error::HeaderSizeMismatch {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let offset = (&buf[0..8]).read_u64::<BigEndian>()?;
        let size = (&buf[8..16]).read_u64::<BigEndian>()?;
        let flags = (&buf[16..24]).read_u64::<BigEndian>()?;

        let mut segment = [0u8; SEGMENT_NAME_SIZE];
        segment.copy_from_slice(&buf[24..56]);
        let mut value_digest = [0u8; 32];
        value_digest.copy_from_slice(&buf[56..88]);
        let mut header_digest = [0u8; 32];
        header_digest.copy_from_slice(&buf[88..120]);

        Ok(Self {
            offset,
            size,
            flags,
            segment,
            value_digest,
            header_digest,
        })
    }

    /// Recompute the header digest and compare against the stored one.
    pub fn verify_header(&self) -> Result<()> {
        let expected = header_digest(
            self.offset,
            self.size,
            self.flags,
            &self.segment,
            &self.value_digest,
        );
        if expected != self.header_digest {
            return Err(Error::HeaderCorrupt);
        }
        Ok(())
    }

    /// Recompute the value digest over `payload` and compare against the
    /// stored one.
    pub fn verify_value(&self, payload: &[u8]) -> Result<()> {
        let expected = value_digest(self.offset, self.size, self.flags, &self.segment, payload);
        if expected != self.value_digest {
            return Err(Error::ValueCorrupt);
        }
        Ok(())
    }

    pub fn is_tombstone(&self) -> bool {
        self.flag(TOMBSTONE_BIT)
    }

    /// Whether the given flag bit is set.
    pub fn flag(&self, bit: u64) -> bool {
        (self.flags & (1 << bit)) != 0
    }
}

/// Composes a flag word from a list of bit numbers.
pub fn compose_flags(bits: &[u64]) -> u64 {
    bits.iter().fold(0, |word, bit| word | (1 << bit))
}

/// Recomputes the value digest for a record located via the index. The
/// segment name comes back from the index as a string, so it is re-fitted to
/// the 32-byte field the digests were originally computed over.
pub fn value_digest_for(
    offset: u64,
    size: u64,
    flags: u64,
    segment_name: &str,
    payload: &[u8],
) -> Result<[u8; 32]> {
    let segment = fit_segment_name(segment_name)?;
    Ok(value_digest(offset, size, flags, &segment, payload))
}

fn value_digest(
    offset: u64,
    size: u64,
    flags: u64,
    segment: &[u8; SEGMENT_NAME_SIZE],
    payload: &[u8],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(offset.to_be_bytes());
    hasher.update(size.to_be_bytes());
    hasher.update(flags.to_be_bytes());
    hasher.update(segment);
    hasher.update(payload);
    hasher.finalize().into()
}

fn header_digest(
    offset: u64,
    size: u64,
    flags: u64,
    segment: &[u8; SEGMENT_NAME_SIZE],
    value_digest: &[u8; 32],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(offset.to_be_bytes());
    hasher.update(size.to_be_bytes());
    hasher.update(flags.to_be_bytes());
    hasher.update(segment);
    hasher.update(value_digest);
    hasher.finalize().into()
}

/// Zero-pads a segment filename into the fixed header field.
pub fn fit_segment_name(name: &str) -> Result<[u8; SEGMENT_NAME_SIZE]> {
    let bytes = name.as_bytes();
    if bytes.len() > SEGMENT_NAME_SIZE {
        return Err(Error::FilenameTooLong(name.to_string()));
    }
    let mut out = [0u8; SEGMENT_NAME_SIZE];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// The JSON payload of every record. Field declaration order fixes the
/// canonical byte sequence, so digests over the payload are reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub key: String,
    pub value: String,
}

impl Payload {
    /// A tombstone payload carries the key and an empty value.
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let payload = b"{\"key\":\"a\",\"value\":\"1\"}";
        let header =
            RecordHeader::compute(120, payload.len() as u64, 0, "seg0.log", payload).unwrap();

        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);

        let decoded = RecordHeader::decode(&encoded).expect("failed to decode header");
        assert_eq!(header, decoded);
        decoded.verify_header().expect("header digest mismatch");
        decoded.verify_value(payload).expect("value digest mismatch");
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let result = RecordHeader::decode(&[0u8; HEADER_SIZE - 8]);
        assert_eq!(
            result,
            Err(Error::HeaderSizeMismatch {
                expected: HEADER_SIZE,
                actual: HEADER_SIZE - 8,
            })
        );
    }

    #[test]
    fn test_header_corruption_detected() {
        let payload = b"{\"key\":\"a\",\"value\":\"1\"}";
        let header =
            RecordHeader::compute(0, payload.len() as u64, 0, "seg0.log", payload).unwrap();

        let mut encoded = header.encode();
        encoded[8] ^= 0xff; // flip a size byte
        let decoded = RecordHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.verify_header(), Err(Error::HeaderCorrupt));
    }

    #[test]
    fn test_value_corruption_detected() {
        let payload = b"{\"key\":\"a\",\"value\":\"1\"}";
        let header =
            RecordHeader::compute(0, payload.len() as u64, 0, "seg0.log", payload).unwrap();

        let mut tampered = payload.to_vec();
        tampered[10] ^= 0x01;
        assert_eq!(header.verify_value(&tampered), Err(Error::ValueCorrupt));
        header.verify_value(payload).unwrap();
    }

    #[test]
    fn test_digest_covers_flags() {
        let payload = b"{\"key\":\"a\",\"value\":\"\"}";
        let live = RecordHeader::compute(0, payload.len() as u64, 0, "seg0.log", payload).unwrap();
        let dead = RecordHeader::compute(0, payload.len() as u64, 1, "seg0.log", payload).unwrap();
        assert_ne!(live.value_digest, dead.value_digest);
        assert_ne!(live.header_digest, dead.header_digest);
    }

    #[test]
    fn test_segment_name_bounds() {
        // 32 bytes fits exactly, 33 is rejected
        let exact = "a".repeat(SEGMENT_NAME_SIZE);
        assert!(fit_segment_name(&exact).is_ok());

        let long = "a".repeat(SEGMENT_NAME_SIZE + 1);
        assert_eq!(fit_segment_name(&long), Err(Error::FilenameTooLong(long.clone())));
    }

    #[test]
    fn test_segment_name_zero_padded() {
        let fitted = fit_segment_name("seg0.log").unwrap();
        assert_eq!(&fitted[..8], b"seg0.log");
        assert!(fitted[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tombstone_flag() {
        let payload = Payload::tombstone("k").encode().unwrap();
        let header = RecordHeader::compute(
            0,
            payload.len() as u64,
            compose_flags(&[TOMBSTONE_BIT]),
            "seg0.log",
            &payload,
        )
        .unwrap();
        assert!(header.is_tombstone());
        assert_eq!(header.flags, 1);

        let live = RecordHeader::compute(0, payload.len() as u64, 0, "seg0.log", &payload).unwrap();
        assert!(!live.is_tombstone());
    }

    #[test]
    fn test_compose_flags() {
        assert_eq!(compose_flags(&[]), 0);
        assert_eq!(compose_flags(&[0]), 1);
        assert_eq!(compose_flags(&[0, 2]), 5);
    }

    #[test]
    fn test_payload_canonical_encoding() {
        let payload = Payload {
            key: "a".to_string(),
            value: "1".to_string(),
        };
        let bytes = payload.encode().unwrap();
        assert_eq!(bytes, b"{\"key\":\"a\",\"value\":\"1\"}");
        assert_eq!(Payload::decode(&bytes).unwrap(), payload);
    }
}
