//! Method body blobs in the IL stream.
//!
//! ```text
//! flags u8 | max_stack u16 | code_size u32 | local_sig token u32 | code
//! [region_count u32 | (try_offset, try_length, handler_offset, handler_length) u32 each]
//! ```
//!
//! The IL stream of every image starts with a four-byte reserved header, so
//! a `MethodDef.body_offset` of zero means "no body".

use enc_ir::codec::{write_u16, write_u32, ByteReader};
use enc_ir::{Handle, ImageError, TableIndex};

const HAS_REGIONS: u8 = 0x01;

/// Bytes reserved at the start of every IL stream.
pub const IL_HEADER_SIZE: usize = 4;

/// `finally` region, offsets relative to the start of the code.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExceptionRegion {
    pub try_offset: u32,
    pub try_length: u32,
    pub handler_offset: u32,
    pub handler_length: u32,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MethodBody {
    pub max_stack: u16,
    /// `StandAloneSig` row of the local signature.
    pub local_signature: Option<Handle>,
    pub code: Vec<u8>,
    pub regions: Vec<ExceptionRegion>,
}

impl MethodBody {
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), ImageError> {
        out.push(if self.regions.is_empty() { 0 } else { HAS_REGIONS });
        write_u16(out, self.max_stack);
        write_u32(out, len_u32(self.code.len())?);
        write_u32(out, self.local_signature.map_or(0, Handle::token));
        out.extend_from_slice(&self.code);
        if !self.regions.is_empty() {
            write_u32(out, len_u32(self.regions.len())?);
            for region in &self.regions {
                write_u32(out, region.try_offset);
                write_u32(out, region.try_length);
                write_u32(out, region.handler_offset);
                write_u32(out, region.handler_length);
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let mut out = Vec::with_capacity(11 + self.code.len());
        self.write(&mut out)?;
        Ok(out)
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<MethodBody, ImageError> {
        let flags = reader.read_u8()?;
        let max_stack = reader.read_u16()?;
        let code_size = reader.read_u32()? as usize;
        let token = reader.read_u32()?;
        let local_signature = if token == 0 {
            None
        } else {
            Some(Handle::from_token(token).ok_or(ImageError::InvalidColumn {
                table: TableIndex::StandAloneSig,
                value: token,
            })?)
        };
        let code = reader.read_bytes(code_size)?.to_vec();
        let mut regions = Vec::new();
        if flags & HAS_REGIONS != 0 {
            let count = reader.read_u32()?;
            for _ in 0..count {
                regions.push(ExceptionRegion {
                    try_offset: reader.read_u32()?,
                    try_length: reader.read_u32()?,
                    handler_offset: reader.read_u32()?,
                    handler_length: reader.read_u32()?,
                });
            }
        }
        Ok(MethodBody {
            max_stack,
            local_signature,
            code,
            regions,
        })
    }

    /// Read the body at `offset` in an IL stream.
    pub fn read_at(il: &[u8], offset: u32) -> Result<MethodBody, ImageError> {
        let start = offset as usize;
        let bytes = il.get(start..).ok_or(ImageError::Truncated {
            offset: start,
            needed: 1,
        })?;
        Self::read(&mut ByteReader::new(bytes))
    }
}

/// Append a body to an IL stream, returning its offset.
pub fn append_body(il: &mut Vec<u8>, body: &MethodBody) -> Result<u32, ImageError> {
    if il.len() < IL_HEADER_SIZE {
        il.resize(IL_HEADER_SIZE, 0);
    }
    let offset = len_u32(il.len())?;
    body.write(il)?;
    Ok(offset)
}

fn len_u32(len: usize) -> Result<u32, ImageError> {
    u32::try_from(len).map_err(|_| ImageError::TooLarge { what: "method body", len })
}
