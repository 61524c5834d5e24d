//! Metadata vocabulary for incremental delta emission.
//!
//! This crate holds the data structures every stage of the emitter shares:
//! - Spans and interned names
//! - Table kinds, entity handles (tokens) and heap offsets
//! - The edit-and-continue operation log vocabulary
//! - Typed metadata rows, heaps and signature blobs
//! - The bytecode instruction set
//! - The binary module image codec
//!
//! # Design Philosophy
//!
//! - **Intern names**: strings become `Name(u32)` shared across generations
//! - **Typed handles**: a row is a `Handle { table, row }`, never a bare `u32`
//! - **Aggregate offsets**: heap and row numbers are chain-wide, so a value
//!   produced in any generation can be referenced from any later one

/// Compile-time assertion that a type has a specific size.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

pub mod codec;
mod enc;
mod error;
mod handle;
pub mod heap;
mod image;
mod interner;
mod name;
pub mod opcode;
pub mod rows;
pub mod sig;
mod span;
mod table;

pub use enc::{EncLogEntry, EncOperation};
pub use error::ImageError;
pub use handle::{BlobId, GuidId, Handle, StringId, UserStringId, USER_STRING_TOKEN_PREFIX};
pub use heap::{HeapSizes, Heaps};
pub use image::{MetadataImage, MAGIC, VERSION};
pub use interner::{InternError, SharedInterner, StringInterner};
pub use name::Name;
pub use span::Span;
pub use table::{TableIndex, TableRowCounts};

#[cfg(target_pointer_width = "64")]
mod size_asserts {
    use super::{Handle, Name};
    crate::static_assert_size!(Name, 4);
    crate::static_assert_size!(Handle, 8);
}
