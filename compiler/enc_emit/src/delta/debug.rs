//! Per-generation debug information: local names and scopes by slot, plus
//! the sequence points of every re-emitted body.

use std::io::{self, Write};

use enc_ir::{Handle, Name, Span, StringInterner};

use crate::body::SequencePoint;
use crate::locals::SlotAllocation;

/// Debug tables of one delta, ordered by method handle.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeltaDebugInfo {
    pub methods: Vec<MethodDebugInfo>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodDebugInfo {
    pub method: Handle,
    /// One entry per slot, in ordinal order.
    pub locals: Vec<LocalDebugInfo>,
    pub sequence_points: Vec<SequencePoint>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalDebugInfo {
    pub ordinal: u16,
    /// `None` for temporaries and placeholder slots.
    pub name: Option<String>,
    /// [`Span::DUMMY`] when no live local occupies the slot.
    pub scope: Span,
}

impl DeltaDebugInfo {
    pub fn method(&self, method: Handle) -> Option<&MethodDebugInfo> {
        self.methods.iter().find(|m| m.method == method)
    }

    /// Little-endian record stream.
    ///
    /// ```text
    /// u32 methods
    ///   u32 token, u32 locals
    ///     u16 ordinal, u32 start, u32 end, u8 named, [u32 len, utf8]
    ///   u32 points
    ///     u32 il_offset, u32 start, u32 end
    /// ```
    pub fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(&count(self.methods.len())?.to_le_bytes())?;
        for method in &self.methods {
            sink.write_all(&method.method.token().to_le_bytes())?;
            sink.write_all(&count(method.locals.len())?.to_le_bytes())?;
            for local in &method.locals {
                sink.write_all(&local.ordinal.to_le_bytes())?;
                sink.write_all(&local.scope.start.to_le_bytes())?;
                sink.write_all(&local.scope.end.to_le_bytes())?;
                match &local.name {
                    Some(name) => {
                        sink.write_all(&[1])?;
                        sink.write_all(&count(name.len())?.to_le_bytes())?;
                        sink.write_all(name.as_bytes())?;
                    }
                    None => sink.write_all(&[0])?,
                }
            }
            sink.write_all(&count(method.sequence_points.len())?.to_le_bytes())?;
            for point in &method.sequence_points {
                sink.write_all(&point.il_offset.to_le_bytes())?;
                sink.write_all(&point.span.start.to_le_bytes())?;
                sink.write_all(&point.span.end.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec only fails on counts above u32::MAX.
        if self.write_to(&mut out).is_err() {
            out.clear();
        }
        out
    }
}

fn count(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "debug table too large"))
}

/// Local table of one method. A slot takes the name and scope of the live
/// local mapped onto it; placeholders stay unnamed.
pub(super) fn method_locals(
    interner: &StringInterner,
    allocation: &SlotAllocation,
    scopes: &[Option<(Name, Span)>],
) -> Vec<LocalDebugInfo> {
    allocation
        .slots
        .slots()
        .iter()
        .map(|slot| {
            let live = allocation
                .ordinals
                .iter()
                .position(|&ordinal| ordinal == slot.ordinal)
                .and_then(|request| scopes.get(request).copied().flatten());
            let (name, scope) = match (slot.placeholder, live) {
                (false, Some((name, scope))) => (Some(interner.lookup(name).to_owned()), scope),
                (false, None) => (slot.name.map(|n| interner.lookup(n).to_owned()), Span::DUMMY),
                (true, _) => (None, Span::DUMMY),
            };
            LocalDebugInfo {
                ordinal: slot.ordinal,
                name,
                scope,
            }
        })
        .collect()
}
