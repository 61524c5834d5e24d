//! Local slot allocation across generations.
//!
//! A method's slot table only ever grows. When a method is re-emitted, each
//! new local is matched to the previous generation's slot through the edit's
//! syntax map: a slot is reused only when the map sends the slot's old
//! declarator to the new local's declarator and the slot's type is still
//! producible. Previous slots nobody claims stay in the table as unnamed
//! placeholders, so every ordinal keeps its meaning for frames that were
//! live when the edit was applied. Unmatched locals are appended.
//!
//! Short-lived compiler temporaries never participate in matching.

use std::sync::Arc;

use tracing::debug;

use enc_ir::Name;

use crate::symbols::{AnonymousTypeKey, SyntaxId, Ty};

/// Compiler temporaries.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum TempKind {
    /// Read-modify-write scratch value.
    Scratch,
    /// Resource of a `using` without a declared variable.
    UsingResource,
    /// Subject of a string switch.
    SwitchSubject,
}

impl TempKind {
    /// Long-lived temporaries span statements and are matched like locals.
    pub const fn is_long_lived(self) -> bool {
        matches!(self, TempKind::UsingResource)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotKind {
    UserDeclared,
    /// Source local whose type is an anonymous shape.
    AnonymousTypeBound,
    Temporary(TempKind),
}

impl SlotKind {
    pub const fn is_matchable(self) -> bool {
        match self {
            SlotKind::UserDeclared | SlotKind::AnonymousTypeBound => true,
            SlotKind::Temporary(temp) => temp.is_long_lived(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotType {
    Known(Ty),
    /// Anonymous shape whose template is no longer reachable. Encoded as
    /// `object`.
    Unresolved,
}

impl SlotType {
    pub fn as_ty(&self) -> Option<&Ty> {
        match self {
            SlotType::Known(ty) => Some(ty),
            SlotType::Unresolved => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalSlot {
    pub ordinal: u16,
    pub ty: SlotType,
    /// Debug name; `None` for temporaries and placeholders.
    pub name: Option<Name>,
    pub kind: SlotKind,
    /// Declaring syntax in the generation that last claimed the slot.
    pub declarator: Option<SyntaxId>,
    pub placeholder: bool,
}

/// Slot table of one method, indexed by ordinal.
#[derive(Clone, Default, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodSlots {
    slots: Vec<LocalSlot>,
}

impl MethodSlots {
    /// Build from slots in ordinal order.
    pub fn from_slots(slots: Vec<LocalSlot>) -> Self {
        MethodSlots { slots }
    }

    pub fn slots(&self) -> &[LocalSlot] {
        &self.slots
    }

    pub fn get(&self, ordinal: u16) -> Option<&LocalSlot> {
        self.slots.get(usize::from(ordinal))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lay debug-info slots over the slots of a local signature.
    ///
    /// Every signature ordinal survives with its type; debug information
    /// only contributes names, kinds and declarators. Trailing signature
    /// slots the debug information does not name stay unnamed placeholders.
    /// An `object` signature slot may carry an anonymous shape, since that
    /// is how a slot with an unreachable shape is encoded.
    pub fn overlay(&self, named: &MethodSlots) -> Result<MethodSlots, SlotMismatch> {
        let mut slots = self.slots.clone();
        for (index, slot) in named.slots.iter().enumerate() {
            if usize::from(slot.ordinal) != index {
                return Err(SlotMismatch::Ordinal {
                    index,
                    ordinal: slot.ordinal,
                });
            }
            let Some(base) = slots.get_mut(index) else {
                return Err(SlotMismatch::Missing { ordinal: slot.ordinal });
            };
            let refines_object = base.ty == SlotType::Known(Ty::OBJECT)
                && matches!(slot.ty, SlotType::Known(Ty::Anonymous(_)) | SlotType::Unresolved);
            if base.ty != slot.ty && !refines_object {
                return Err(SlotMismatch::Type {
                    ordinal: slot.ordinal,
                    signature: base.ty.clone(),
                    named: slot.ty.clone(),
                });
            }
            *base = slot.clone();
        }
        Ok(MethodSlots { slots })
    }

    /// Whether `self` keeps every ordinal of `previous` (placeholders
    /// included) with the same type.
    pub fn extends(&self, previous: &MethodSlots) -> bool {
        previous.slots.len() <= self.slots.len()
            && previous
                .slots
                .iter()
                .zip(&self.slots)
                .all(|(old, new)| old.ordinal == new.ordinal && (old.ty == new.ty || new.ty == SlotType::Unresolved))
    }
}

/// Debug-info slots that disagree with a method's local signature.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum SlotMismatch {
    #[error("slot {index} claims ordinal {ordinal}")]
    Ordinal { index: usize, ordinal: u16 },
    #[error("slot {ordinal} is not in the local signature")]
    Missing { ordinal: u16 },
    #[error("slot {ordinal} is typed {named:?} but the local signature holds {signature:?}")]
    Type {
        ordinal: u16,
        signature: SlotType,
        named: SlotType,
    },
}

/// A local the re-emitted body needs.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SlotRequest {
    pub ty: Ty,
    pub name: Option<Name>,
    pub kind: SlotKind,
    pub declarator: Option<SyntaxId>,
}

impl SlotRequest {
    pub fn user(name: Name, ty: Ty, declarator: SyntaxId) -> Self {
        let mut anonymous = false;
        ty.for_each_anonymous(&mut |_| anonymous = true);
        SlotRequest {
            ty,
            name: Some(name),
            kind: if anonymous {
                SlotKind::AnonymousTypeBound
            } else {
                SlotKind::UserDeclared
            },
            declarator: Some(declarator),
        }
    }

    pub fn temporary(kind: TempKind, ty: Ty, declarator: Option<SyntaxId>) -> Self {
        SlotRequest {
            ty,
            name: None,
            kind: SlotKind::Temporary(kind),
            declarator: declarator.filter(|_| kind.is_long_lived()),
        }
    }
}

/// Result of allocating one method's locals.
#[derive(Clone, Debug)]
pub struct SlotAllocation {
    pub slots: MethodSlots,
    /// Ordinal of each request, in request order.
    pub ordinals: Vec<u16>,
    pub matched: usize,
    pub placeholders: usize,
    pub fresh: usize,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum AllocationError {
    /// A live local maps to a slot whose anonymous type cannot be produced.
    UnreachableType { request: usize, ordinal: u16 },
    /// The table would need more ordinals than a local signature holds.
    TooManySlots { requested: usize },
}

/// Syntax map from old declarators to new ones.
pub type SyntaxMap = Arc<dyn Fn(SyntaxId) -> Option<SyntaxId> + Send + Sync>;

/// Computes a method's slot table for one generation.
pub struct SlotAllocator<'a> {
    previous: Option<&'a MethodSlots>,
    syntax_map: Option<&'a SyntaxMap>,
    preserve_locals: bool,
    is_registered: &'a dyn Fn(&AnonymousTypeKey) -> bool,
}

impl<'a> SlotAllocator<'a> {
    /// `is_registered` tells whether an anonymous shape has a template in
    /// the baseline.
    pub fn new(is_registered: &'a dyn Fn(&AnonymousTypeKey) -> bool) -> Self {
        SlotAllocator {
            previous: None,
            syntax_map: None,
            preserve_locals: false,
            is_registered,
        }
    }

    #[must_use]
    pub fn previous(mut self, previous: Option<&'a MethodSlots>) -> Self {
        self.previous = previous;
        self
    }

    #[must_use]
    pub fn syntax_map(mut self, map: Option<&'a SyntaxMap>, preserve_locals: bool) -> Self {
        self.syntax_map = map;
        self.preserve_locals = preserve_locals;
        self
    }

    fn producible(&self, ty: &Ty) -> bool {
        let mut ok = true;
        ty.for_each_anonymous(&mut |key| ok &= (self.is_registered)(key));
        ok
    }

    /// Slots are addressed by position; a previous table's ordinals are
    /// its positions.
    pub fn allocate(&self, requests: &[SlotRequest]) -> Result<SlotAllocation, AllocationError> {
        let previous = self.previous.map_or(&[][..], MethodSlots::slots);
        let mut slots: Vec<LocalSlot> = previous.to_vec();
        let mut claimed = vec![false; previous.len()];

        // new declarator -> previous position
        let mut candidates = rustc_hash::FxHashMap::default();
        if self.preserve_locals {
            if let Some(map) = self.syntax_map {
                for (position, slot) in previous.iter().enumerate() {
                    if slot.placeholder || !slot.kind.is_matchable() {
                        continue;
                    }
                    if let Some(new) = slot.declarator.and_then(|old| map(old)) {
                        candidates.entry(new).or_insert(position);
                    }
                }
            }
        }

        let mut ordinals = Vec::with_capacity(requests.len());
        let mut matched = 0;
        for (index, request) in requests.iter().enumerate() {
            let candidate = request
                .declarator
                .filter(|_| request.kind.is_matchable())
                .and_then(|d| candidates.get(&d).copied())
                .filter(|&p| !claimed[p] && previous[p].kind == request.kind);

            if let Some(position) = candidate {
                let ordinal = ordinal_at(position)?;
                let old_ty = previous[position].ty.as_ty();
                if old_ty.is_none() || old_ty.is_some_and(|t| !self.producible(t)) {
                    return Err(AllocationError::UnreachableType { request: index, ordinal });
                }
                if old_ty == Some(&request.ty) {
                    claimed[position] = true;
                    let slot = &mut slots[position];
                    slot.ordinal = ordinal;
                    slot.declarator = request.declarator;
                    slot.placeholder = false;
                    ordinals.push(ordinal);
                    matched += 1;
                    continue;
                }
            }

            let ordinal = ordinal_at(slots.len())?;
            slots.push(LocalSlot {
                ordinal,
                ty: SlotType::Known(request.ty.clone()),
                name: request.name,
                kind: request.kind,
                declarator: request.declarator,
                placeholder: false,
            });
            ordinals.push(ordinal);
        }

        let mut placeholders = 0;
        for (slot, claimed) in slots.iter_mut().zip(&claimed) {
            if *claimed {
                continue;
            }
            placeholders += 1;
            slot.placeholder = true;
            slot.name = None;
            slot.declarator = None;
            if slot.ty.as_ty().is_some_and(|t| !self.producible(t)) {
                slot.ty = SlotType::Unresolved;
            }
        }

        let fresh = requests.len() - matched;
        debug!(matched, placeholders, fresh, total = slots.len(), "allocated local slots");
        Ok(SlotAllocation {
            slots: MethodSlots::from_slots(slots),
            ordinals,
            matched,
            placeholders,
            fresh,
        })
    }
}

fn ordinal_at(position: usize) -> Result<u16, AllocationError> {
    u16::try_from(position).map_err(|_| AllocationError::TooManySlots { requested: position + 1 })
}

#[cfg(test)]
mod tests;
