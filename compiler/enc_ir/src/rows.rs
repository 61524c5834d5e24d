//! Typed metadata rows and the table set of one image.
//!
//! Every column is stored as a little-endian `u32` in images. Coded indices
//! are stored as full tokens (0 for nil), which keeps the codec uniform and
//! lets delta rows point into any generation.

use crate::{BlobId, EncOperation, GuidId, Handle, ImageError, StringId, TableIndex};

/// Conversion between a typed column and its stored `u32`.
pub trait Column: Sized {
    fn to_column(&self) -> u32;
    fn from_column(table: TableIndex, value: u32) -> Result<Self, ImageError>;
}

impl Column for u32 {
    fn to_column(&self) -> u32 {
        *self
    }

    fn from_column(_: TableIndex, value: u32) -> Result<Self, ImageError> {
        Ok(value)
    }
}

impl Column for u16 {
    fn to_column(&self) -> u32 {
        u32::from(*self)
    }

    fn from_column(table: TableIndex, value: u32) -> Result<Self, ImageError> {
        u16::try_from(value).map_err(|_| ImageError::InvalidColumn { table, value })
    }
}

impl Column for u8 {
    fn to_column(&self) -> u32 {
        u32::from(*self)
    }

    fn from_column(table: TableIndex, value: u32) -> Result<Self, ImageError> {
        u8::try_from(value).map_err(|_| ImageError::InvalidColumn { table, value })
    }
}

macro_rules! heap_column {
    ($($id:ty),*) => {$(
        impl Column for $id {
            fn to_column(&self) -> u32 {
                self.offset()
            }

            fn from_column(_: TableIndex, value: u32) -> Result<Self, ImageError> {
                Ok(<$id>::new(value))
            }
        }
    )*};
}

heap_column!(StringId, BlobId, GuidId);

impl Column for Handle {
    fn to_column(&self) -> u32 {
        self.token()
    }

    fn from_column(table: TableIndex, value: u32) -> Result<Self, ImageError> {
        Handle::from_token(value).ok_or(ImageError::InvalidColumn { table, value })
    }
}

impl Column for Option<Handle> {
    fn to_column(&self) -> u32 {
        self.map_or(0, Handle::token)
    }

    fn from_column(table: TableIndex, value: u32) -> Result<Self, ImageError> {
        if value == 0 {
            return Ok(None);
        }
        Handle::from_column(table, value).map(Some)
    }
}

impl Column for EncOperation {
    fn to_column(&self) -> u32 {
        *self as u32
    }

    fn from_column(table: TableIndex, value: u32) -> Result<Self, ImageError> {
        EncOperation::from_u32(value).ok_or(ImageError::InvalidColumn { table, value })
    }
}

/// A row type bound to its table.
pub trait Row: Sized {
    const TABLE: TableIndex;
    const COLUMNS: usize;

    fn write_columns(&self, out: &mut Vec<u32>);
    fn read_columns(columns: &[u32]) -> Result<Self, ImageError>;
}

macro_rules! rows {
    ($(
        $(#[$doc:meta])*
        $name:ident => $table:ident { $($field:ident : $ty:ty),* $(,)? }
    )*) => {$(
        $(#[$doc])*
        #[derive(Clone, Eq, PartialEq, Hash, Debug)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl Row for $name {
            const TABLE: TableIndex = TableIndex::$table;
            const COLUMNS: usize = [$(stringify!($field)),*].len();

            fn write_columns(&self, out: &mut Vec<u32>) {
                $(out.push(Column::to_column(&self.$field));)*
            }

            #[allow(unused_assignments, reason = "last column index is never read")]
            fn read_columns(columns: &[u32]) -> Result<Self, ImageError> {
                let mut i = 0;
                Ok($name {
                    $($field: {
                        let value = <$ty as Column>::from_column(Self::TABLE, columns[i])?;
                        i += 1;
                        value
                    },)*
                })
            }
        }
    )*};
}

rows! {
    /// One per image. Deltas carry an updated copy with the new EncId.
    ModuleRow => Module {
        generation: u16,
        name: StringId,
        mvid: GuidId,
        enc_id: GuidId,
        enc_base_id: GuidId,
    }

    TypeRefRow => TypeRef {
        resolution_scope: Option<Handle>,
        name: StringId,
        namespace: StringId,
    }

    /// `field_list` and `method_list` are the first member rows of the
    /// type's contiguous range (full images only).
    TypeDefRow => TypeDef {
        flags: u32,
        name: StringId,
        namespace: StringId,
        extends: Option<Handle>,
        field_list: u32,
        method_list: u32,
    }

    FieldRow => Field {
        flags: u16,
        name: StringId,
        signature: BlobId,
    }

    /// `body_offset` locates the body in the image's IL stream.
    MethodDefRow => MethodDef {
        body_offset: u32,
        impl_flags: u16,
        flags: u16,
        name: StringId,
        signature: BlobId,
        param_list: u32,
    }

    ParamRow => Param {
        flags: u16,
        sequence: u16,
        name: StringId,
    }

    MemberRefRow => MemberRef {
        parent: Handle,
        name: StringId,
        signature: BlobId,
    }

    ConstantRow => Constant {
        kind: u8,
        parent: Handle,
        value: BlobId,
    }

    CustomAttributeRow => CustomAttribute {
        parent: Handle,
        constructor: Handle,
        value: BlobId,
    }

    StandAloneSigRow => StandAloneSig {
        signature: BlobId,
    }

    EventMapRow => EventMap {
        parent: Handle,
        event_list: u32,
    }

    EventRow => Event {
        flags: u16,
        name: StringId,
        event_type: Option<Handle>,
    }

    PropertyMapRow => PropertyMap {
        parent: Handle,
        property_list: u32,
    }

    PropertyRow => Property {
        flags: u16,
        name: StringId,
        signature: BlobId,
    }

    MethodSemanticsRow => MethodSemantics {
        semantics: u16,
        method: Handle,
        association: Handle,
    }

    /// Explicit implementation: `body` overrides `declaration` in `class`.
    /// Both methods are MethodDef or MemberRef tokens.
    MethodImplRow => MethodImpl {
        class: Handle,
        body: Handle,
        declaration: Handle,
    }

    TypeSpecRow => TypeSpec {
        signature: BlobId,
    }

    EncLogRow => EncLog {
        token: Handle,
        operation: EncOperation,
    }

    EncMapRow => EncMap {
        token: Handle,
    }

    AssemblyRefRow => AssemblyRef {
        major: u16,
        minor: u16,
        build: u16,
        revision: u16,
        flags: u32,
        name: StringId,
        culture: StringId,
    }

    NestedClassRow => NestedClass {
        nested: Handle,
        enclosing: Handle,
    }

    /// `owner` is a TypeDef or MethodDef; `number` is the zero-based
    /// position in the owner's parameter list.
    GenericParamRow => GenericParam {
        number: u16,
        flags: u16,
        owner: Handle,
        name: StringId,
    }

    MethodSpecRow => MethodSpec {
        method: Handle,
        instantiation: BlobId,
    }
}

/// `MethodSemantics.semantics` values.
pub mod semantics {
    pub const SETTER: u16 = 0x0001;
    pub const GETTER: u16 = 0x0002;
    pub const ADD_ON: u16 = 0x0008;
    pub const REMOVE_ON: u16 = 0x0010;
}

/// Rows of one table, each tagged with its row number.
///
/// Full images number rows densely from 1. Delta tables hold only the rows
/// a generation adds or updates, so numbers are sparse but ascending.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Table<R> {
    rows: Vec<(u32, R)>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Table { rows: Vec::new() }
    }
}

impl<R: Row> Table<R> {
    /// Append with the next dense row number.
    pub fn push(&mut self, row: R) -> Handle {
        let number = self.rows.last().map_or(1, |(n, _)| n + 1);
        self.rows.push((number, row));
        Handle::new(R::TABLE, number)
    }

    /// Insert at an explicit row number, keeping rows sorted.
    pub fn insert(&mut self, number: u32, row: R) -> Handle {
        let at = self.rows.partition_point(|(n, _)| *n < number);
        if self.rows.get(at).is_some_and(|(n, _)| *n == number) {
            self.rows[at].1 = row;
        } else {
            self.rows.insert(at, (number, row));
        }
        Handle::new(R::TABLE, number)
    }

    pub fn get(&self, number: u32) -> Option<&R> {
        self.rows
            .binary_search_by_key(&number, |(n, _)| *n)
            .ok()
            .map(|i| &self.rows[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &R)> + '_ {
        self.rows
            .iter()
            .map(|(n, r)| (Handle::new(R::TABLE, *n), r))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest row number present (0 when empty).
    pub fn max_row(&self) -> u32 {
        self.rows.last().map_or(0, |(n, _)| *n)
    }

    /// Whether rows are numbered `1..=len` without gaps.
    pub fn is_dense(&self) -> bool {
        self.rows
            .iter()
            .enumerate()
            .all(|(i, (n, _))| u32::try_from(i + 1).is_ok_and(|expected| expected == *n))
    }

    pub(crate) fn entries(&self) -> &[(u32, R)] {
        &self.rows
    }
}

macro_rules! tables {
    ($($field:ident: $row:ident),* $(,)?) => {
        /// All tables of one image.
        #[derive(Clone, Default, Eq, PartialEq, Debug)]
        pub struct Tables {
            $(pub $field: Table<$row>,)*
        }

        impl Tables {
            /// Highest row number present in each table.
            pub fn max_rows(&self) -> crate::TableRowCounts {
                let mut counts = crate::TableRowCounts::default();
                $(counts.set(<$row as Row>::TABLE, self.$field.max_row());)*
                counts
            }

            /// Total rows across all tables.
            pub fn total_rows(&self) -> usize {
                0 $(+ self.$field.len())*
            }
        }
    };
}

tables! {
    module: ModuleRow,
    type_ref: TypeRefRow,
    type_def: TypeDefRow,
    field: FieldRow,
    method_def: MethodDefRow,
    param: ParamRow,
    member_ref: MemberRefRow,
    constant: ConstantRow,
    custom_attribute: CustomAttributeRow,
    stand_alone_sig: StandAloneSigRow,
    event_map: EventMapRow,
    event: EventRow,
    property_map: PropertyMapRow,
    property: PropertyRow,
    method_semantics: MethodSemanticsRow,
    method_impl: MethodImplRow,
    type_spec: TypeSpecRow,
    enc_log: EncLogRow,
    enc_map: EncMapRow,
    assembly_ref: AssemblyRefRow,
    nested_class: NestedClassRow,
    generic_param: GenericParamRow,
    method_spec: MethodSpecRow,
}

#[cfg(test)]
mod tests;
