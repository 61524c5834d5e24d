//! Symbolic code buffer.
//!
//! Lowering emits instructions whose locals and tokens are still symbolic:
//! locals are slot request indices and tokens are [`TokenRef`]s. Slot
//! allocation and row allocation happen afterwards, and [`CodeBuilder::finish`]
//! resolves both while encoding.

use enc_diagnostic::ErrorCode;
use enc_ir::codec::{write_u16, write_u32};
use enc_ir::opcode::{OperandKind, Opcode};
use enc_ir::{Name, Span};

use crate::symbols::{AnonymousTypeKey, FieldId, MethodId, Ty};
use crate::EmitError;

use super::format::ExceptionRegion;

/// Symbolic metadata token.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum TokenRef {
    Method { method: MethodId, type_args: Vec<Ty> },
    Field(FieldId),
    Type(Ty),
    String(Name),
    AnonymousConstructor(AnonymousTypeKey),
    AnonymousGetter(AnonymousTypeKey, u16),
    AnonymousField(AnonymousTypeKey, u16),
    /// `System.Object::.ctor`, called by template constructors.
    ObjectConstructor,
    /// `System.MissingMethodException::.ctor`, thrown by deleted members.
    MissingMethodConstructor,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum VarRef {
    /// Index of the slot request.
    Local(u32),
    Arg(u16),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Label(u32);

#[derive(Clone, Debug)]
enum Op {
    Plain(Opcode),
    Var(Opcode, VarRef),
    I32(i32),
    I64(i64),
    F64(f64),
    Token(Opcode, TokenRef),
    Branch(Opcode, Label),
    Mark(Label),
    Point(Span),
}

struct Region {
    try_start: Label,
    handler_start: Label,
    handler_end: Label,
}

/// IL offset paired with the source span it starts.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SequencePoint {
    pub il_offset: u32,
    pub span: Span,
}

/// Fully resolved body.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EncodedBody {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub regions: Vec<ExceptionRegion>,
    pub sequence_points: Vec<SequencePoint>,
}

#[derive(Default)]
pub struct CodeBuilder {
    ops: Vec<Op>,
    label_count: u32,
    label_depth: Vec<Option<u32>>,
    regions: Vec<Region>,
    depth: u32,
    max_depth: u32,
}

fn stack_effect(opcode: Opcode) -> (u32, u32) {
    match opcode {
        Opcode::Nop | Opcode::Br | Opcode::Leave | Opcode::EndFinally | Opcode::Ret => (0, 0),
        Opcode::LdArg
        | Opcode::LdLoc
        | Opcode::LdcI4
        | Opcode::LdcI8
        | Opcode::LdcR8
        | Opcode::LdStr
        | Opcode::LdNull
        | Opcode::LdSFld => (0, 1),
        Opcode::StLoc | Opcode::StArg | Opcode::Pop | Opcode::BrFalse | Opcode::BrTrue | Opcode::StSFld | Opcode::Throw => {
            (1, 0)
        }
        Opcode::Dup => (1, 2),
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Ceq | Opcode::Clt => (2, 1),
        Opcode::LdFld | Opcode::Box => (1, 1),
        Opcode::StFld => (2, 0),
        // Calls state their effect explicitly.
        Opcode::Call | Opcode::CallVirt | Opcode::NewObj => (0, 0),
    }
}

const fn ends_block(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Br | Opcode::Leave | Opcode::Ret | Opcode::Throw | Opcode::EndFinally
    )
}

fn operand_size(opcode: Opcode) -> u32 {
    match opcode.operand() {
        OperandKind::None => 0,
        OperandKind::Var => 2,
        OperandKind::I32 | OperandKind::Token | OperandKind::Branch => 4,
        OperandKind::I64 | OperandKind::F64 => 8,
    }
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn adjust(&mut self, pops: u32, pushes: u32) {
        self.depth = self.depth.saturating_sub(pops) + pushes;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn after(&mut self, opcode: Opcode) {
        if ends_block(opcode) {
            self.depth = 0;
        }
    }

    pub fn define_label(&mut self) -> Label {
        let label = Label(self.label_count);
        self.label_count += 1;
        self.label_depth.push(None);
        label
    }

    pub fn mark(&mut self, label: Label) {
        if let Some(Some(depth)) = self.label_depth.get(label.0 as usize) {
            self.depth = *depth;
        }
        self.ops.push(Op::Mark(label));
    }

    /// Start a sequence point at the next instruction.
    pub fn point(&mut self, span: Span) {
        if !span.is_dummy() {
            self.ops.push(Op::Point(span));
        }
    }

    pub fn emit(&mut self, opcode: Opcode) {
        let (pops, pushes) = stack_effect(opcode);
        self.adjust(pops, pushes);
        self.ops.push(Op::Plain(opcode));
        self.after(opcode);
    }

    /// `ret`, popping the return value when there is one.
    pub fn emit_ret(&mut self, has_value: bool) {
        self.adjust(u32::from(has_value), 0);
        self.ops.push(Op::Plain(Opcode::Ret));
        self.after(Opcode::Ret);
    }

    pub fn emit_var(&mut self, opcode: Opcode, var: VarRef) {
        let (pops, pushes) = stack_effect(opcode);
        self.adjust(pops, pushes);
        self.ops.push(Op::Var(opcode, var));
    }

    pub fn emit_i4(&mut self, value: i32) {
        self.adjust(0, 1);
        self.ops.push(Op::I32(value));
    }

    pub fn emit_i8(&mut self, value: i64) {
        self.adjust(0, 1);
        self.ops.push(Op::I64(value));
    }

    pub fn emit_r8(&mut self, value: f64) {
        self.adjust(0, 1);
        self.ops.push(Op::F64(value));
    }

    pub fn emit_token(&mut self, opcode: Opcode, token: TokenRef) {
        let (pops, pushes) = stack_effect(opcode);
        self.adjust(pops, pushes);
        self.ops.push(Op::Token(opcode, token));
    }

    /// Call-like instruction with an explicit stack effect.
    pub fn emit_call(&mut self, opcode: Opcode, token: TokenRef, pops: u32, pushes: u32) {
        self.adjust(pops, pushes);
        self.ops.push(Op::Token(opcode, token));
    }

    pub fn emit_branch(&mut self, opcode: Opcode, target: Label) {
        let (pops, pushes) = stack_effect(opcode);
        self.adjust(pops, pushes);
        let depth = if opcode == Opcode::Leave { 0 } else { self.depth };
        if let Some(slot @ None) = self.label_depth.get_mut(target.0 as usize) {
            *slot = Some(depth);
        }
        self.ops.push(Op::Branch(opcode, target));
        self.after(opcode);
    }

    /// Protect the code between `try_start` and `handler_start` with the
    /// finally handler between `handler_start` and `handler_end`.
    pub fn add_finally(&mut self, try_start: Label, handler_start: Label, handler_end: Label) {
        self.regions.push(Region {
            try_start,
            handler_start,
            handler_end,
        });
    }

    /// Whether the last instruction never falls through.
    pub fn is_terminated(&self) -> bool {
        matches!(self.ops.last(), Some(Op::Plain(op)) if matches!(op, Opcode::Ret | Opcode::Throw))
    }

    /// Tokens in instruction order.
    pub fn tokens(&self) -> impl Iterator<Item = &TokenRef> + '_ {
        self.ops.iter().filter_map(|op| match op {
            Op::Token(_, token) => Some(token),
            _ => None,
        })
    }

    /// Encode with final local ordinals and token values.
    pub fn finish(
        &self,
        ordinals: &[u16],
        resolve: &mut dyn FnMut(&TokenRef) -> Result<u32, EmitError>,
    ) -> Result<EncodedBody, EmitError> {
        let unbound = || EmitError::internal(ErrorCode::E2005, "branch to an unbound label");

        let mut labels = vec![None; self.label_count as usize];
        let mut offset = 0u32;
        for op in &self.ops {
            match op {
                Op::Mark(label) => labels[label.0 as usize] = Some(offset),
                Op::Point(_) => {}
                Op::Plain(opcode)
                | Op::Var(opcode, _)
                | Op::Token(opcode, _)
                | Op::Branch(opcode, _) => offset += 1 + operand_size(*opcode),
                Op::I32(_) => offset += 1 + operand_size(Opcode::LdcI4),
                Op::I64(_) => offset += 1 + operand_size(Opcode::LdcI8),
                Op::F64(_) => offset += 1 + operand_size(Opcode::LdcR8),
            }
        }
        let resolve_label = |label: Label| labels[label.0 as usize].ok_or_else(unbound);

        let mut code = Vec::with_capacity(offset as usize);
        let mut sequence_points = Vec::new();
        for op in &self.ops {
            let here = u32::try_from(code.len()).unwrap_or(u32::MAX);
            match op {
                Op::Mark(_) => {}
                Op::Point(span) => sequence_points.push(SequencePoint {
                    il_offset: here,
                    span: *span,
                }),
                Op::Plain(opcode) => code.push(*opcode as u8),
                Op::Var(opcode, var) => {
                    code.push(*opcode as u8);
                    let index = match *var {
                        VarRef::Arg(index) => index,
                        VarRef::Local(request) => *ordinals.get(request as usize).ok_or_else(|| {
                            EmitError::internal(ErrorCode::E2005, format!("no slot for local request {request}"))
                        })?,
                    };
                    write_u16(&mut code, index);
                }
                Op::I32(value) => {
                    code.push(Opcode::LdcI4 as u8);
                    code.extend_from_slice(&value.to_le_bytes());
                }
                Op::I64(value) => {
                    code.push(Opcode::LdcI8 as u8);
                    code.extend_from_slice(&value.to_le_bytes());
                }
                Op::F64(value) => {
                    code.push(Opcode::LdcR8 as u8);
                    code.extend_from_slice(&value.to_le_bytes());
                }
                Op::Token(opcode, token) => {
                    code.push(*opcode as u8);
                    write_u32(&mut code, resolve(token)?);
                }
                Op::Branch(opcode, target) => {
                    code.push(*opcode as u8);
                    let next = i64::from(here) + 5;
                    let displacement = i64::from(resolve_label(*target)?) - next;
                    let displacement = i32::try_from(displacement).map_err(|_| unbound())?;
                    code.extend_from_slice(&displacement.to_le_bytes());
                }
            }
        }

        let regions = self
            .regions
            .iter()
            .map(|r| {
                let try_offset = resolve_label(r.try_start)?;
                let handler_offset = resolve_label(r.handler_start)?;
                let handler_end = resolve_label(r.handler_end)?;
                Ok(ExceptionRegion {
                    try_offset,
                    try_length: handler_offset.saturating_sub(try_offset),
                    handler_offset,
                    handler_length: handler_end.saturating_sub(handler_offset),
                })
            })
            .collect::<Result<Vec<_>, EmitError>>()?;

        Ok(EncodedBody {
            code,
            max_stack: u16::try_from(self.max_depth).unwrap_or(u16::MAX),
            regions,
            sequence_points,
        })
    }
}

#[cfg(test)]
mod tests;
