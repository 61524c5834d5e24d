//! Stack bytecode instruction set.
//!
//! One-byte opcodes followed by little-endian operands. Branch operands are
//! `i32` displacements relative to the end of the branch instruction.

use std::fmt;

use crate::codec::ByteReader;
use crate::ImageError;

/// Operand shape of an opcode.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OperandKind {
    None,
    /// Local or argument index.
    Var,
    I32,
    I64,
    F64,
    Token,
    Branch,
}

macro_rules! opcodes {
    ($($name:ident = $code:literal, $operand:ident, $mnemonic:literal;)*) => {
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $code,)*
        }

        impl Opcode {
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($code => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            pub const fn operand(self) -> OperandKind {
                match self {
                    $(Opcode::$name => OperandKind::$operand,)*
                }
            }

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, None, "nop";
    LdArg = 0x01, Var, "ldarg";
    LdLoc = 0x02, Var, "ldloc";
    StLoc = 0x03, Var, "stloc";
    LdcI4 = 0x04, I32, "ldc.i4";
    LdcI8 = 0x05, I64, "ldc.i8";
    LdcR8 = 0x06, F64, "ldc.r8";
    LdStr = 0x07, Token, "ldstr";
    LdNull = 0x08, None, "ldnull";
    Dup = 0x09, None, "dup";
    Pop = 0x0A, None, "pop";
    Call = 0x0B, Token, "call";
    CallVirt = 0x0C, Token, "callvirt";
    NewObj = 0x0D, Token, "newobj";
    Ret = 0x0E, None, "ret";
    Br = 0x0F, Branch, "br";
    BrFalse = 0x10, Branch, "brfalse";
    BrTrue = 0x11, Branch, "brtrue";
    Add = 0x12, None, "add";
    Sub = 0x13, None, "sub";
    Mul = 0x14, None, "mul";
    Ceq = 0x15, None, "ceq";
    Clt = 0x16, None, "clt";
    LdFld = 0x17, Token, "ldfld";
    StFld = 0x18, Token, "stfld";
    LdSFld = 0x19, Token, "ldsfld";
    StSFld = 0x1A, Token, "stsfld";
    Box = 0x1B, Token, "box";
    Throw = 0x1C, None, "throw";
    Leave = 0x1D, Branch, "leave";
    EndFinally = 0x1E, None, "endfinally";
    StArg = 0x1F, Var, "starg";
}

/// Decoded operand.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Operand {
    None,
    Var(u16),
    I32(i32),
    I64(i64),
    F64(f64),
    Token(u32),
    /// Absolute target offset.
    Target(u32),
}

/// Decoded instruction with its offset.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: Opcode,
    pub operand: Operand,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode.mnemonic())?;
        match self.operand {
            Operand::None => Ok(()),
            Operand::Var(v) => write!(f, " {v}"),
            Operand::I32(v) => write!(f, " {v}"),
            Operand::I64(v) => write!(f, " {v}"),
            Operand::F64(v) => write!(f, " {v}"),
            Operand::Token(t) => write!(f, " 0x{t:08X}"),
            Operand::Target(t) => write!(f, " IL_{t:04x}"),
        }
    }
}

/// Decode a code stream into instructions.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, ImageError> {
    let mut reader = ByteReader::new(code);
    let mut out = Vec::new();
    while !reader.is_empty() {
        let offset = position(&reader)?;
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_byte(byte).ok_or(ImageError::UnknownOpcode(byte))?;
        let operand = match opcode.operand() {
            OperandKind::None => Operand::None,
            OperandKind::Var => Operand::Var(reader.read_u16()?),
            OperandKind::I32 => Operand::I32(i32::from_le_bytes(reader.read_u32()?.to_le_bytes())),
            OperandKind::I64 => Operand::I64(i64::from_le_bytes(reader.read_u64()?.to_le_bytes())),
            OperandKind::F64 => Operand::F64(f64::from_bits(reader.read_u64()?)),
            OperandKind::Token => Operand::Token(reader.read_u32()?),
            OperandKind::Branch => {
                let delta = i32::from_le_bytes(reader.read_u32()?.to_le_bytes());
                let next = i64::from(position(&reader)?);
                let target = u32::try_from(next + i64::from(delta))
                    .map_err(|_| ImageError::UnknownOpcode(byte))?;
                Operand::Target(target)
            }
        };
        out.push(Instruction {
            offset,
            opcode,
            operand,
        });
    }
    Ok(out)
}

fn position(reader: &ByteReader<'_>) -> Result<u32, ImageError> {
    u32::try_from(reader.position()).map_err(|_| ImageError::Truncated {
        offset: reader.position(),
        needed: 0,
    })
}

/// Render a code stream one instruction per line.
pub fn disassemble(code: &[u8]) -> Result<String, ImageError> {
    let lines: Vec<String> = decode(code)?.iter().map(ToString::to_string).collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests;
