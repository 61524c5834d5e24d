//! Little-endian primitives and ECMA compressed integers.

use crate::ImageError;

/// Largest value representable as a compressed unsigned integer.
pub const MAX_COMPRESSED: u32 = 0x1FFF_FFFF;

/// Append a compressed unsigned integer (1, 2 or 4 bytes, big-endian).
#[expect(
    clippy::cast_possible_truncation,
    reason = "each branch bounds the value before narrowing"
)]
pub fn write_compressed_u32(out: &mut Vec<u8>, value: u32) -> Result<(), ImageError> {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.push(0x80 | (value >> 8) as u8);
        out.push(value as u8);
    } else if value <= MAX_COMPRESSED {
        out.push(0xC0 | (value >> 24) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    } else {
        return Err(ImageError::CompressedOverflow(value));
    }
    Ok(())
}

#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Cursor over a byte slice with bounds-checked reads.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ImageError> {
        if self.remaining() < len {
            return Err(ImageError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ImageError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ImageError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ImageError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, ImageError> {
        let b = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_compressed_u32(&mut self) -> Result<u32, ImageError> {
        let lead = self.read_u8()?;
        let value = if lead & 0x80 == 0 {
            u32::from(lead)
        } else if lead & 0xC0 == 0x80 {
            (u32::from(lead & 0x3F) << 8) | u32::from(self.read_u8()?)
        } else if lead & 0xE0 == 0xC0 {
            let rest = self.read_bytes(3)?;
            (u32::from(lead & 0x1F) << 24)
                | (u32::from(rest[0]) << 16)
                | (u32::from(rest[1]) << 8)
                | u32::from(rest[2])
        } else {
            return Err(ImageError::InvalidCompressedInteger(lead));
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn compressed(value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        write_compressed_u32(&mut out, value).unwrap_or_else(|e| panic!("{e}"));
        out
    }

    #[test]
    fn compressed_widths_match_ecma_examples() {
        assert_eq!(compressed(0x03), vec![0x03]);
        assert_eq!(compressed(0x7F), vec![0x7F]);
        assert_eq!(compressed(0x80), vec![0x80, 0x80]);
        assert_eq!(compressed(0x2E57), vec![0xAE, 0x57]);
        assert_eq!(compressed(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(compressed(0x4000), vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(compressed(MAX_COMPRESSED), vec![0xDF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn compressed_overflow_is_rejected() {
        let mut out = Vec::new();
        assert_eq!(
            write_compressed_u32(&mut out, MAX_COMPRESSED + 1),
            Err(ImageError::CompressedOverflow(MAX_COMPRESSED + 1))
        );
    }

    #[test]
    fn invalid_lead_byte() {
        let mut reader = ByteReader::new(&[0xFF]);
        assert_eq!(
            reader.read_compressed_u32(),
            Err(ImageError::InvalidCompressedInteger(0xFF))
        );
    }

    #[test]
    fn truncated_read_reports_offset() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        assert_eq!(reader.read_u16(), Ok(0x0201));
        assert_eq!(
            reader.read_u32(),
            Err(ImageError::Truncated {
                offset: 2,
                needed: 3
            })
        );
    }

    proptest! {
        #[test]
        fn compressed_decodes_to_written_value(value in 0..=MAX_COMPRESSED) {
            let bytes = compressed(value);
            let mut reader = ByteReader::new(&bytes);
            prop_assert_eq!(reader.read_compressed_u32(), Ok(value));
            prop_assert!(reader.is_empty());
        }
    }
}
