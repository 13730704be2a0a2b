//! NV block framing
//!
//! # Block format
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Magic "DEM\0" (4 bytes)            │  offset 0
//! ├─────────────────────────────────────┤
//! │  Layout version (1 byte)            │  offset 4
//! │  Block kind (1 byte)                │  offset 5
//! │  Payload length, LE (4 bytes)       │  offset 6
//! ├─────────────────────────────────────┤
//! │  Payload (variable)                 │  offset 10
//! ├─────────────────────────────────────┤
//! │  CRC-32 of bytes 0..(len-4), LE     │  offset len-4
//! └─────────────────────────────────────┘
//! ```
//!
//! Payload fields are little-endian and written with [`bytes::BufMut`];
//! [`PayloadReader`] reads them back with length checks.

use bytes::{Buf, BufMut};
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::NvError;

// ── Layout constants ───────────────────────────────────────────────────────

/// Block magic (offset 0, 4 bytes)
pub const NV_MAGIC: &[u8; 4] = b"DEM\0";
/// Incremented whenever a payload layout changes
pub const NV_LAYOUT_VERSION: u8 = 1;
/// Magic + version + kind + length
pub const NV_HEADER_SIZE: usize = 10;
/// CRC-32 trailer
pub const NV_TRAILER_SIZE: usize = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Frame a payload as block of `kind`
pub fn encode_block(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NV_HEADER_SIZE + payload.len() + NV_TRAILER_SIZE);
    out.put_slice(NV_MAGIC);
    out.put_u8(NV_LAYOUT_VERSION);
    out.put_u8(kind);
    out.put_u32_le(payload.len() as u32);
    out.put_slice(payload);
    let crc = CRC32.checksum(&out);
    out.put_u32_le(crc);
    out
}

/// Validate a framed block of `kind` and return its payload
pub fn decode_block(kind: u8, bytes: &[u8]) -> Result<&[u8], NvError> {
    if bytes.len() < NV_HEADER_SIZE + NV_TRAILER_SIZE {
        return Err(NvError::LengthMismatch {
            expected: NV_HEADER_SIZE + NV_TRAILER_SIZE,
            got: bytes.len(),
        });
    }
    if &bytes[0..4] != NV_MAGIC {
        return Err(NvError::Corrupt("bad magic".to_string()));
    }
    if bytes[4] != NV_LAYOUT_VERSION {
        return Err(NvError::Corrupt(format!(
            "layout version {} (expected {})",
            bytes[4], NV_LAYOUT_VERSION
        )));
    }
    if bytes[5] != kind {
        return Err(NvError::Corrupt(format!(
            "block kind 0x{:02X} (expected 0x{:02X})",
            bytes[5], kind
        )));
    }
    let mut len_bytes = &bytes[6..10];
    let payload_len = len_bytes.get_u32_le() as usize;
    let expected = NV_HEADER_SIZE + payload_len + NV_TRAILER_SIZE;
    if bytes.len() != expected {
        return Err(NvError::LengthMismatch {
            expected,
            got: bytes.len(),
        });
    }
    let body = &bytes[..expected - NV_TRAILER_SIZE];
    let mut trailer = &bytes[expected - NV_TRAILER_SIZE..];
    let stored = trailer.get_u32_le();
    let computed = CRC32.checksum(body);
    if stored != computed {
        return Err(NvError::Corrupt(format!(
            "checksum mismatch: stored 0x{:08X}, computed 0x{:08X}",
            stored, computed
        )));
    }
    Ok(&body[NV_HEADER_SIZE..])
}

/// Bounds-checked little-endian payload reader
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> Result<(), NvError> {
        if self.buf.remaining() < n {
            return Err(NvError::Corrupt(format!(
                "payload truncated: need {} more bytes, {} left",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, NvError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn i8(&mut self) -> Result<i8, NvError> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn bool(&mut self) -> Result<bool, NvError> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, NvError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn u32(&mut self) -> Result<u32, NvError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>, NvError> {
        self.need(n)?;
        let out = self.buf[..n].to_vec();
        self.buf.advance(n);
        Ok(out)
    }

    /// Fail unless the whole payload was consumed
    pub fn finish(self) -> Result<(), NvError> {
        if self.buf.has_remaining() {
            return Err(NvError::Corrupt(format!(
                "{} trailing payload bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_roundtrip() {
        let block = encode_block(0x02, &[1, 2, 3]);
        assert_eq!(block.len(), NV_HEADER_SIZE + 3 + NV_TRAILER_SIZE);
        assert_eq!(&block[0..4], NV_MAGIC);
        assert_eq!(decode_block(0x02, &block).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut block = encode_block(0x02, &[1, 2, 3]);
        block[NV_HEADER_SIZE] ^= 0xFF;
        assert!(matches!(decode_block(0x02, &block), Err(NvError::Corrupt(_))));
    }

    #[test]
    fn test_wrong_kind_and_truncation() {
        let block = encode_block(0x01, &[]);
        assert!(matches!(decode_block(0x02, &block), Err(NvError::Corrupt(_))));
        assert!(matches!(
            decode_block(0x01, &block[..block.len() - 1]),
            Err(NvError::LengthMismatch { .. })
        ));
        assert!(matches!(decode_block(0x01, &[0u8; 3]), Err(NvError::LengthMismatch { .. })));
    }

    #[test]
    fn test_payload_reader_bounds() {
        let mut payload = Vec::new();
        payload.put_u16_le(0x1234);
        payload.put_i8(-3);
        let mut reader = PayloadReader::new(&payload);
        assert_eq!(reader.u16().unwrap(), 0x1234);
        assert_eq!(reader.i8().unwrap(), -3);
        assert!(reader.u32().is_err());
        reader.finish().unwrap();
    }
}
