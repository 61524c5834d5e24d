//! Signature blobs.
//!
//! Types are written with ECMA-335 element codes. Class and value-type
//! references use the `TypeDefOrRef` coded index (`row << 2 | tag`) as a
//! compressed integer.

use crate::codec::{write_compressed_u32, ByteReader};
use crate::{Handle, ImageError, TableIndex};

pub mod element {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const GENERICINST: u8 = 0x15;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
}

/// Calling-convention bytes.
pub mod callconv {
    pub const DEFAULT: u8 = 0x00;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC: u8 = 0x10;
    pub const HAS_THIS: u8 = 0x20;
}

/// A type as it appears in a signature blob.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeSig {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Object,
    /// Reference type by TypeDef/TypeRef/TypeSpec handle.
    Class(Handle),
    ValueType(Handle),
    GenericInst {
        value_type: bool,
        base: Handle,
        args: Vec<TypeSig>,
    },
    SzArray(Box<TypeSig>),
    /// Generic parameter of the enclosing type, by position.
    Var(u32),
    /// Generic parameter of the enclosing method, by position.
    MVar(u32),
}

impl TypeSig {
    fn primitive_code(&self) -> Option<u8> {
        Some(match self {
            TypeSig::Void => element::VOID,
            TypeSig::Boolean => element::BOOLEAN,
            TypeSig::Char => element::CHAR,
            TypeSig::I1 => element::I1,
            TypeSig::U1 => element::U1,
            TypeSig::I2 => element::I2,
            TypeSig::U2 => element::U2,
            TypeSig::I4 => element::I4,
            TypeSig::U4 => element::U4,
            TypeSig::I8 => element::I8,
            TypeSig::U8 => element::U8,
            TypeSig::R4 => element::R4,
            TypeSig::R8 => element::R8,
            TypeSig::String => element::STRING,
            TypeSig::Object => element::OBJECT,
            _ => return None,
        })
    }

    fn from_primitive_code(code: u8) -> Option<TypeSig> {
        Some(match code {
            element::VOID => TypeSig::Void,
            element::BOOLEAN => TypeSig::Boolean,
            element::CHAR => TypeSig::Char,
            element::I1 => TypeSig::I1,
            element::U1 => TypeSig::U1,
            element::I2 => TypeSig::I2,
            element::U2 => TypeSig::U2,
            element::I4 => TypeSig::I4,
            element::U4 => TypeSig::U4,
            element::I8 => TypeSig::I8,
            element::U8 => TypeSig::U8,
            element::R4 => TypeSig::R4,
            element::R8 => TypeSig::R8,
            element::STRING => TypeSig::String,
            element::OBJECT => TypeSig::Object,
            _ => return None,
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), ImageError> {
        if let Some(code) = self.primitive_code() {
            out.push(code);
            return Ok(());
        }
        match self {
            TypeSig::Class(handle) => {
                out.push(element::CLASS);
                write_type_def_or_ref(out, *handle)
            }
            TypeSig::ValueType(handle) => {
                out.push(element::VALUETYPE);
                write_type_def_or_ref(out, *handle)
            }
            TypeSig::GenericInst {
                value_type,
                base,
                args,
            } => {
                out.push(element::GENERICINST);
                out.push(if *value_type {
                    element::VALUETYPE
                } else {
                    element::CLASS
                });
                write_type_def_or_ref(out, *base)?;
                write_len(out, args.len())?;
                args.iter().try_for_each(|arg| arg.encode(out))
            }
            TypeSig::SzArray(element_type) => {
                out.push(element::SZARRAY);
                element_type.encode(out)
            }
            TypeSig::Var(number) => {
                out.push(element::VAR);
                write_compressed_u32(out, *number)
            }
            TypeSig::MVar(number) => {
                out.push(element::MVAR);
                write_compressed_u32(out, *number)
            }
            _ => Ok(()),
        }
    }

    pub fn decode(reader: &mut ByteReader<'_>) -> Result<TypeSig, ImageError> {
        let code = reader.read_u8()?;
        if let Some(sig) = TypeSig::from_primitive_code(code) {
            return Ok(sig);
        }
        match code {
            element::CLASS => Ok(TypeSig::Class(read_type_def_or_ref(reader)?)),
            element::VALUETYPE => Ok(TypeSig::ValueType(read_type_def_or_ref(reader)?)),
            element::GENERICINST => {
                let kind = reader.read_u8()?;
                let value_type = match kind {
                    element::VALUETYPE => true,
                    element::CLASS => false,
                    other => return Err(ImageError::InvalidSignature(other)),
                };
                let base = read_type_def_or_ref(reader)?;
                let count = reader.read_compressed_u32()?;
                let args = (0..count)
                    .map(|_| TypeSig::decode(reader))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TypeSig::GenericInst {
                    value_type,
                    base,
                    args,
                })
            }
            element::SZARRAY => Ok(TypeSig::SzArray(Box::new(TypeSig::decode(reader)?))),
            element::VAR => Ok(TypeSig::Var(reader.read_compressed_u32()?)),
            element::MVAR => Ok(TypeSig::MVar(reader.read_compressed_u32()?)),
            other => Err(ImageError::InvalidSignature(other)),
        }
    }
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<(), ImageError> {
    let len = u32::try_from(len).map_err(|_| ImageError::CompressedOverflow(u32::MAX))?;
    write_compressed_u32(out, len)
}

fn write_type_def_or_ref(out: &mut Vec<u8>, handle: Handle) -> Result<(), ImageError> {
    let tag = match handle.table() {
        TableIndex::TypeDef => 0,
        TableIndex::TypeRef => 1,
        TableIndex::TypeSpec => 2,
        other => {
            return Err(ImageError::InvalidColumn {
                table: other,
                value: handle.token(),
            })
        }
    };
    write_compressed_u32(out, (handle.row() << 2) | tag)
}

fn read_type_def_or_ref(reader: &mut ByteReader<'_>) -> Result<Handle, ImageError> {
    let coded = reader.read_compressed_u32()?;
    let table = match coded & 0b11 {
        0 => TableIndex::TypeDef,
        1 => TableIndex::TypeRef,
        2 => TableIndex::TypeSpec,
        _ => {
            return Err(ImageError::InvalidColumn {
                table: TableIndex::TypeSpec,
                value: coded,
            })
        }
    };
    Ok(Handle::new(table, coded >> 2))
}

/// Method signature (`MethodDefSig` / `MethodRefSig`).
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct MethodSig {
    pub has_this: bool,
    /// Generic parameter count; 0 for non-generic methods.
    pub generic_params: u32,
    pub ret: TypeSig,
    pub params: Vec<TypeSig>,
}

impl MethodSig {
    pub fn encode(&self) -> Result<Vec<u8>, ImageError> {
        let mut out = Vec::new();
        let mut conv = if self.has_this {
            callconv::HAS_THIS
        } else {
            callconv::DEFAULT
        };
        if self.generic_params > 0 {
            conv |= callconv::GENERIC;
        }
        out.push(conv);
        if self.generic_params > 0 {
            write_compressed_u32(&mut out, self.generic_params)?;
        }
        write_len(&mut out, self.params.len())?;
        self.ret.encode(&mut out)?;
        for param in &self.params {
            param.encode(&mut out)?;
        }
        Ok(out)
    }

    pub fn decode(blob: &[u8]) -> Result<MethodSig, ImageError> {
        let mut reader = ByteReader::new(blob);
        let conv = reader.read_u8()?;
        if conv & !(callconv::HAS_THIS | callconv::GENERIC) != callconv::DEFAULT {
            return Err(ImageError::InvalidSignature(conv));
        }
        let generic_params = if conv & callconv::GENERIC != 0 {
            reader.read_compressed_u32()?
        } else {
            0
        };
        let count = reader.read_compressed_u32()?;
        let ret = TypeSig::decode(&mut reader)?;
        let params = (0..count)
            .map(|_| TypeSig::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MethodSig {
            has_this: conv & callconv::HAS_THIS != 0,
            generic_params,
            ret,
            params,
        })
    }
}

pub fn encode_field_sig(ty: &TypeSig) -> Result<Vec<u8>, ImageError> {
    let mut out = vec![callconv::FIELD];
    ty.encode(&mut out)?;
    Ok(out)
}

pub fn decode_field_sig(blob: &[u8]) -> Result<TypeSig, ImageError> {
    let mut reader = ByteReader::new(blob);
    match reader.read_u8()? {
        callconv::FIELD => TypeSig::decode(&mut reader),
        other => Err(ImageError::InvalidSignature(other)),
    }
}

/// Instance property signature with no index parameters.
pub fn encode_property_sig(ty: &TypeSig) -> Result<Vec<u8>, ImageError> {
    let mut out = vec![callconv::PROPERTY | callconv::HAS_THIS, 0];
    ty.encode(&mut out)?;
    Ok(out)
}

pub fn encode_local_sig(locals: &[TypeSig]) -> Result<Vec<u8>, ImageError> {
    let mut out = vec![callconv::LOCAL_SIG];
    write_len(&mut out, locals.len())?;
    for local in locals {
        local.encode(&mut out)?;
    }
    Ok(out)
}

pub fn decode_local_sig(blob: &[u8]) -> Result<Vec<TypeSig>, ImageError> {
    let mut reader = ByteReader::new(blob);
    match reader.read_u8()? {
        callconv::LOCAL_SIG => {
            let count = reader.read_compressed_u32()?;
            (0..count).map(|_| TypeSig::decode(&mut reader)).collect()
        }
        other => Err(ImageError::InvalidSignature(other)),
    }
}

/// Generic method instantiation blob (`0x0A count args...`).
pub fn encode_method_spec(args: &[TypeSig]) -> Result<Vec<u8>, ImageError> {
    let mut out = vec![0x0A];
    write_len(&mut out, args.len())?;
    for arg in args {
        arg.encode(&mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests;
