//! Binary module image codec.
//!
//! # Format
//!
//! ```text
//! magic        u32  "ENCM"
//! version      u16
//! flags        u16  bit 0: delta image
//! heap bases   4 x u32 (strings, blobs, user strings, guids)
//! table count  u8
//! per table:   number u8, row count u32, column count u8, dense u8,
//!              rows: [row number u32 unless dense] columns u32...
//! heaps        4 x (length u32, bytes)
//! il           length u32, bytes
//! ```
//!
//! Only non-empty tables are written, in canonical table order. Full images
//! are always dense; delta images carry explicit row numbers.

use std::io::{self, Write};

use crate::codec::{write_u16, write_u32, ByteReader};
use crate::heap::{BlobHeap, GuidHeap, HeapSizes, Heaps, StringHeap, UserStringHeap};
use crate::rows::{
    AssemblyRefRow, ConstantRow, CustomAttributeRow, EncLogRow, EncMapRow, EventMapRow, EventRow,
    FieldRow, GenericParamRow, MemberRefRow, MethodDefRow, MethodImplRow, MethodSemanticsRow,
    MethodSpecRow, ModuleRow, NestedClassRow, ParamRow, PropertyMapRow, PropertyRow, Row,
    StandAloneSigRow, Table, Tables, TypeDefRow, TypeRefRow, TypeSpecRow,
};
use crate::{BlobId, ImageError, StringId, TableIndex};

pub const MAGIC: u32 = u32::from_le_bytes(*b"ENCM");
pub const VERSION: u16 = 1;
const FLAG_DELTA: u16 = 0x0001;

/// Metadata tables, heaps and bytecode of one module or one delta.
#[derive(Clone, Debug)]
pub struct MetadataImage {
    pub delta: bool,
    pub tables: Tables,
    pub heaps: Heaps,
    pub il: Vec<u8>,
}

macro_rules! with_tables {
    ($callback:ident!($($args:tt)*)) => {
        $callback!($($args)*;
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
        )
    };
}

macro_rules! write_all_tables {
    ($tables:expr, $out:expr; $($field:ident: $row:ident,)*) => {{
        let present = 0u8 $(+ u8::from(!$tables.$field.is_empty()))*;
        $out.push(present);
        $(write_table($out, &$tables.$field)?;)*
    }};
}

macro_rules! read_one_table {
    ($reader:expr, $tables:expr, $table:expr, $dense:expr; $($field:ident: $row:ident,)*) => {
        match $table {
            $(t if t == <$row as Row>::TABLE => read_table($reader, &mut $tables.$field, $dense)?,)*
            other => return Err(ImageError::UnknownTable(other.number())),
        }
    };
}

impl MetadataImage {
    /// A new empty image whose heaps continue after `previous`.
    pub fn new(delta: bool, previous: HeapSizes) -> Self {
        MetadataImage {
            delta,
            tables: Tables::default(),
            heaps: Heaps::new(previous),
            il: Vec::new(),
        }
    }

    #[inline]
    pub fn string(&self, id: StringId) -> Result<&str, ImageError> {
        self.heaps.strings.get(id)
    }

    #[inline]
    pub fn blob(&self, id: BlobId) -> Result<&[u8], ImageError> {
        self.heaps.blobs.get(id)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let mut out = Vec::new();
        write_u32(&mut out, MAGIC);
        write_u16(&mut out, VERSION);
        write_u16(&mut out, if self.delta { FLAG_DELTA } else { 0 });
        let bases = self.heaps.bases();
        for base in [bases.strings, bases.blobs, bases.user_strings, bases.guids] {
            write_u32(&mut out, base);
        }

        with_tables!(write_all_tables!(self.tables, &mut out));

        write_section(&mut out, self.heaps.strings.bytes())?;
        write_section(&mut out, self.heaps.blobs.bytes())?;
        write_section(&mut out, self.heaps.user_strings.bytes())?;
        write_section(&mut out, &self.heaps.guids.bytes())?;
        write_section(&mut out, &self.il)?;
        Ok(out)
    }

    /// Serialize into a sink.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        let bytes = self
            .to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        sink.write_all(&bytes)
    }

    pub fn read_from(bytes: &[u8]) -> Result<MetadataImage, ImageError> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(ImageError::BadMagic { found: magic });
        }
        let version = reader.read_u16()?;
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }
        let delta = reader.read_u16()? & FLAG_DELTA != 0;
        let bases = HeapSizes {
            strings: reader.read_u32()?,
            blobs: reader.read_u32()?,
            user_strings: reader.read_u32()?,
            guids: reader.read_u32()?,
        };

        let mut tables = Tables::default();
        let count = reader.read_u8()?;
        for _ in 0..count {
            let number = reader.read_u8()?;
            let table = TableIndex::from_number(number).ok_or(ImageError::UnknownTable(number))?;
            with_tables!(read_one_table!(&mut reader, tables, table, !delta));
        }

        let strings = reader.read_section()?;
        let blobs = reader.read_section()?;
        let user_strings = reader.read_section()?;
        let guids = reader.read_section()?;
        let il = reader.read_section()?.to_vec();
        if !reader.is_empty() {
            return Err(ImageError::TrailingData {
                trailing: reader.remaining(),
            });
        }

        Ok(MetadataImage {
            delta,
            tables,
            heaps: Heaps {
                strings: StringHeap::from_bytes(bases.strings, strings.to_vec()),
                blobs: BlobHeap::from_bytes(bases.blobs, blobs.to_vec()),
                user_strings: UserStringHeap::from_bytes(bases.user_strings, user_strings.to_vec()),
                guids: GuidHeap::from_bytes(bases.guids, guids),
            },
            il,
        })
    }
}

fn len_u32(len: usize) -> Result<u32, ImageError> {
    u32::try_from(len).map_err(|_| ImageError::TooLarge { what: "section", len })
}

fn write_section(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), ImageError> {
    write_u32(out, len_u32(bytes.len())?);
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_table<R: Row>(out: &mut Vec<u8>, table: &Table<R>) -> Result<(), ImageError> {
    if table.is_empty() {
        return Ok(());
    }
    let dense = table.is_dense();
    out.push(R::TABLE.number());
    write_u32(out, len_u32(table.len())?);
    out.push(u8::try_from(R::COLUMNS).map_err(|_| ImageError::UnknownTable(R::TABLE.number()))?);
    out.push(u8::from(dense));
    let mut columns = Vec::with_capacity(R::COLUMNS);
    for (number, row) in table.entries() {
        if !dense {
            write_u32(out, *number);
        }
        columns.clear();
        row.write_columns(&mut columns);
        for &column in &columns {
            write_u32(out, column);
        }
    }
    Ok(())
}

fn read_table<R: Row>(
    reader: &mut ByteReader<'_>,
    table: &mut Table<R>,
    require_dense: bool,
) -> Result<(), ImageError> {
    let rows = reader.read_u32()?;
    let columns = usize::from(reader.read_u8()?);
    if columns != R::COLUMNS {
        return Err(ImageError::InvalidColumn {
            table: R::TABLE,
            value: len_u32(columns)?,
        });
    }
    let dense = reader.read_u8()? != 0;
    if require_dense && !dense {
        return Err(ImageError::RowOutOfRange {
            table: R::TABLE,
            row: 0,
            count: rows,
        });
    }
    let mut values = Vec::with_capacity(columns);
    for _ in 0..rows {
        let number = if dense { None } else { Some(reader.read_u32()?) };
        values.clear();
        for _ in 0..columns {
            values.push(reader.read_u32()?);
        }
        let row = R::read_columns(&values)?;
        match number {
            Some(number) => {
                if number <= table.max_row() {
                    return Err(ImageError::RowOutOfRange {
                        table: R::TABLE,
                        row: number,
                        count: rows,
                    });
                }
                table.insert(number, row);
            }
            None => {
                table.push(row);
            }
        }
    }
    Ok(())
}

impl<'a> ByteReader<'a> {
    fn read_section(&mut self) -> Result<&'a [u8], ImageError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }
}

#[cfg(test)]
mod tests;
