//! Metadata table kinds and per-table row counts.

use std::fmt;

/// Metadata tables understood by the emitter, with their ECMA-335 numbers.
///
/// Declaration order matches numeric order, so the derived `Ord` is the
/// canonical table order used by the touched-handle index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TableIndex {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    Field = 0x04,
    MethodDef = 0x06,
    Param = 0x08,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    Event = 0x14,
    PropertyMap = 0x15,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    TypeSpec = 0x1B,
    EncLog = 0x1E,
    EncMap = 0x1F,
    AssemblyRef = 0x23,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
}

impl TableIndex {
    pub const COUNT: usize = 23;

    /// All tables in canonical order.
    pub const ALL: [TableIndex; Self::COUNT] = [
        TableIndex::Module,
        TableIndex::TypeRef,
        TableIndex::TypeDef,
        TableIndex::Field,
        TableIndex::MethodDef,
        TableIndex::Param,
        TableIndex::MemberRef,
        TableIndex::Constant,
        TableIndex::CustomAttribute,
        TableIndex::StandAloneSig,
        TableIndex::EventMap,
        TableIndex::Event,
        TableIndex::PropertyMap,
        TableIndex::Property,
        TableIndex::MethodSemantics,
        TableIndex::MethodImpl,
        TableIndex::TypeSpec,
        TableIndex::EncLog,
        TableIndex::EncMap,
        TableIndex::AssemblyRef,
        TableIndex::NestedClass,
        TableIndex::GenericParam,
        TableIndex::MethodSpec,
    ];

    /// ECMA table number.
    #[inline]
    pub const fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<TableIndex> {
        Self::ALL.iter().copied().find(|t| t.number() == number)
    }

    /// Dense position in [`TableIndex::ALL`].
    #[inline]
    pub fn slot(self) -> usize {
        // ALL is sorted by number; the search always succeeds.
        Self::ALL
            .binary_search_by_key(&self.number(), |t| t.number())
            .unwrap_or(0)
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Row count for every table.
///
/// In a baseline this is the cumulative count through its generation: the
/// next row allocated in a table is always `count + 1`.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct TableRowCounts([u32; TableIndex::COUNT]);

impl TableRowCounts {
    #[inline]
    pub fn get(&self, table: TableIndex) -> u32 {
        self.0[table.slot()]
    }

    #[inline]
    pub fn set(&mut self, table: TableIndex, count: u32) {
        self.0[table.slot()] = count;
    }

    /// Raise a count to at least `row`, keeping it monotone.
    #[inline]
    pub fn observe(&mut self, table: TableIndex, row: u32) {
        let slot = &mut self.0[table.slot()];
        *slot = (*slot).max(row);
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableIndex, u32)> + '_ {
        TableIndex::ALL.iter().map(|&t| (t, self.get(t)))
    }
}

impl fmt::Debug for TableRowCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().filter(|&(_, n)| n != 0))
            .finish()
    }
}
