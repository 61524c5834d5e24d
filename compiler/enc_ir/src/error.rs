//! Errors raised while decoding images, heaps, signatures and bytecode.

use crate::TableIndex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("bad magic 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("unsupported image format version {0}")]
    UnsupportedVersion(u16),

    #[error("unexpected end of data at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("unknown table number 0x{0:02X}")]
    UnknownTable(u8),

    #[error("{table} row {row} out of range (table has {count} rows)")]
    RowOutOfRange {
        table: TableIndex,
        row: u32,
        count: u32,
    },

    #[error("invalid column value 0x{value:08X} in {table}")]
    InvalidColumn { table: TableIndex, value: u32 },

    #[error("{heap} offset {offset} out of range")]
    HeapOffsetOutOfRange { heap: &'static str, offset: u32 },

    #[error("invalid UTF-8 in #Strings at offset {0}")]
    InvalidUtf8(u32),

    #[error("invalid compressed integer lead byte 0x{0:02X}")]
    InvalidCompressedInteger(u8),

    #[error("value {0} too large for compressed encoding")]
    CompressedOverflow(u32),

    #[error("invalid signature element 0x{0:02X}")]
    InvalidSignature(u8),

    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("{what} of {len} bytes exceeds the format limit")]
    TooLarge { what: &'static str, len: usize },

    #[error("{trailing} trailing bytes after image end")]
    TrailingData { trailing: usize },
}
