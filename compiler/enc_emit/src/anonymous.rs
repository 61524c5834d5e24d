//! Anonymous type templates and their reuse across generations.
//!
//! A template is keyed by its ordered `(name, type)` member list. Templates
//! registered by any earlier generation are reused; only a miss creates a
//! new template, numbered after every index the chain has ever used.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use enc_diagnostic::ErrorCode;
use enc_ir::Handle;

use crate::symbols::{AnonymousTypeKey, Ty};
use crate::EmitError;

const TEMPLATE_PREFIX: &str = "<>f__AnonymousType";

/// Metadata name of the template with `index`.
pub fn template_name(index: u32) -> String {
    format!("{TEMPLATE_PREFIX}{index}")
}

/// Inverse of [`template_name`].
pub fn parse_template_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(TEMPLATE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Backing field name for a template member.
pub fn template_field_name(member: &str) -> String {
    format!("<{member}>i__Field")
}

pub fn parse_template_field_name(name: &str) -> Option<&str> {
    name.strip_prefix('<')?.strip_suffix(">i__Field")
}

/// An emitted anonymous type.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AnonymousTypeTemplate {
    pub key: AnonymousTypeKey,
    pub index: u32,
    pub type_def: Handle,
    pub constructor: Handle,
    /// One per member, in member order.
    pub getters: Vec<Handle>,
    pub fields: Vec<Handle>,
    /// Generation that emitted the template.
    pub generation: u32,
}

/// Every template known to a baseline.
#[derive(Clone, Default, Debug)]
pub struct AnonymousTypeRegistry {
    templates: Vec<Arc<AnonymousTypeTemplate>>,
    by_key: FxHashMap<AnonymousTypeKey, usize>,
    /// Wider than an index so a template numbered `u32::MAX` leaves no
    /// room instead of wrapping.
    next_index: u64,
}

impl AnonymousTypeRegistry {
    pub fn get(&self, key: &AnonymousTypeKey) -> Option<&Arc<AnonymousTypeTemplate>> {
        self.by_key.get(key).map(|&i| &self.templates[i])
    }

    pub fn contains(&self, key: &AnonymousTypeKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Index the next new template receives.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnonymousTypeTemplate> + '_ {
        self.templates.iter().map(AsRef::as_ref)
    }

    /// Add a template. The first registration of a key wins.
    pub fn register(&mut self, template: AnonymousTypeTemplate) {
        self.next_index = self.next_index.max(u64::from(template.index) + 1);
        if self.by_key.contains_key(&template.key) {
            return;
        }
        self.by_key.insert(template.key.clone(), self.templates.len());
        self.templates.push(Arc::new(template));
    }
}

/// A template first needed in the current generation.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PendingTemplate {
    pub key: AnonymousTypeKey,
    pub index: u32,
}

/// Outcome of resolving one shape.
#[derive(Copy, Clone, Debug)]
pub enum ResolvedTemplate<'r> {
    Existing(&'r AnonymousTypeTemplate),
    Pending(u32),
}

/// Per-generation view over a registry that records misses.
pub struct AnonymousTypeResolver<'r> {
    registry: &'r AnonymousTypeRegistry,
    pending: Vec<PendingTemplate>,
    pending_by_key: FxHashMap<AnonymousTypeKey, usize>,
}

impl<'r> AnonymousTypeResolver<'r> {
    pub fn new(registry: &'r AnonymousTypeRegistry) -> Self {
        AnonymousTypeResolver {
            registry,
            pending: Vec::new(),
            pending_by_key: FxHashMap::default(),
        }
    }

    /// Resolve a shape, first resolving shapes nested in its member types.
    pub fn resolve(&mut self, key: &AnonymousTypeKey) -> Result<ResolvedTemplate<'r>, EmitError> {
        for member in &key.members {
            self.resolve_ty(&member.ty)?;
        }
        if let Some(existing) = self.registry.get(key) {
            trace!(index = existing.index, "anonymous type reused");
            return Ok(ResolvedTemplate::Existing(existing));
        }
        if let Some(&i) = self.pending_by_key.get(key) {
            return Ok(ResolvedTemplate::Pending(self.pending[i].index));
        }
        let index = u64::try_from(self.pending.len())
            .ok()
            .and_then(|offset| self.registry.next_index().checked_add(offset))
            .and_then(|index| u32::try_from(index).ok())
            .ok_or_else(|| EmitError::internal(ErrorCode::E2005, "anonymous type indices are exhausted"))?;
        trace!(index, "anonymous type created");
        self.pending_by_key.insert(key.clone(), self.pending.len());
        self.pending.push(PendingTemplate {
            key: key.clone(),
            index,
        });
        Ok(ResolvedTemplate::Pending(index))
    }

    /// Resolve every shape mentioned by a type.
    pub fn resolve_ty(&mut self, ty: &Ty) -> Result<(), EmitError> {
        let mut keys = Vec::new();
        ty.for_each_anonymous(&mut |key| keys.push(key.clone()));
        for key in &keys {
            self.resolve(key)?;
        }
        Ok(())
    }

    pub fn pending(&self) -> &[PendingTemplate] {
        &self.pending
    }

    pub fn into_pending(self) -> Vec<PendingTemplate> {
        self.pending
    }
}

#[cfg(test)]
mod tests;
