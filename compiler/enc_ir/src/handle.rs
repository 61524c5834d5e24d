//! Entity handles (metadata tokens) and heap offsets.

use std::fmt;

use crate::TableIndex;

/// Row in a metadata table.
///
/// Encodes as a token `(table << 24) | row`. Rows are 1-based; row 0 is the
/// nil handle of its table. Ordering is token order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Handle {
    table: TableIndex,
    row: u32,
}

impl Handle {
    /// Largest row number a token can carry.
    pub const MAX_ROW: u32 = 0x00FF_FFFF;

    #[inline]
    pub const fn new(table: TableIndex, row: u32) -> Self {
        debug_assert!(row <= Self::MAX_ROW);
        Handle { table, row }
    }

    #[inline]
    pub const fn nil(table: TableIndex) -> Self {
        Handle { table, row: 0 }
    }

    #[inline]
    pub const fn table(self) -> TableIndex {
        self.table
    }

    #[inline]
    pub const fn row(self) -> u32 {
        self.row
    }

    #[inline]
    pub const fn is_nil(self) -> bool {
        self.row == 0
    }

    #[inline]
    pub const fn token(self) -> u32 {
        ((self.table as u32) << 24) | self.row
    }

    /// Decode a token. Fails for table numbers outside [`TableIndex`].
    pub fn from_token(token: u32) -> Option<Handle> {
        let table = TableIndex::from_number(u8::try_from(token >> 24).ok()?)?;
        Some(Handle::new(table, token & Self::MAX_ROW))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.table, self.row)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.token())
    }
}

/// Token prefix for user-string (`#US`) references in bytecode.
pub const USER_STRING_TOKEN_PREFIX: u32 = 0x70;

macro_rules! heap_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Debug)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Offset of the empty item.
            pub const EMPTY: $name = $name(0);

            #[inline]
            pub const fn new(offset: u32) -> Self {
                $name(offset)
            }

            #[inline]
            pub const fn offset(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }
    };
}

heap_id!(
    /// Aggregate offset into the `#Strings` heap chain.
    StringId
);
heap_id!(
    /// Aggregate offset into the `#Blob` heap chain.
    BlobId
);
heap_id!(
    /// Aggregate offset into the `#US` heap chain.
    UserStringId
);
heap_id!(
    /// 1-based aggregate index into the `#GUID` heap chain (0 is nil).
    GuidId
);

impl UserStringId {
    /// Token used by `ldstr` for this string.
    #[inline]
    pub const fn token(self) -> u32 {
        (USER_STRING_TOKEN_PREFIX << 24) | self.0
    }
}
