//! Semantic edits and the session-wide record of added symbols.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use enc_ir::Name;

use crate::locals::SyntaxMap;
use crate::symbols::{SymbolKey, SymbolRef, SyntaxId};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum EditKind {
    Insert,
    Update,
    Delete,
}

/// One symbol-level change.
///
/// `old` resolves against the compilation the baseline was built from,
/// `new` against the edited one.
#[derive(Clone)]
pub struct SemanticEdit {
    pub kind: EditKind,
    pub old: Option<SymbolRef>,
    pub new: Option<SymbolRef>,
    pub syntax_map: Option<SyntaxMap>,
    pub preserve_locals: bool,
}

impl SemanticEdit {
    pub fn insert(new: SymbolRef) -> Self {
        SemanticEdit {
            kind: EditKind::Insert,
            old: None,
            new: Some(new),
            syntax_map: None,
            preserve_locals: false,
        }
    }

    pub fn update(old: SymbolRef, new: SymbolRef) -> Self {
        SemanticEdit {
            kind: EditKind::Update,
            old: Some(old),
            new: Some(new),
            syntax_map: None,
            preserve_locals: false,
        }
    }

    pub fn delete(old: SymbolRef) -> Self {
        SemanticEdit {
            kind: EditKind::Delete,
            old: Some(old),
            new: None,
            syntax_map: None,
            preserve_locals: false,
        }
    }

    /// Attach a syntax map and preserve locals through it.
    #[must_use]
    pub fn with_syntax_map(mut self, map: SyntaxMap) -> Self {
        self.syntax_map = Some(map);
        self.preserve_locals = true;
        self
    }

    #[must_use]
    pub fn with_preserve_locals(mut self, preserve: bool) -> Self {
        self.preserve_locals = preserve;
        self
    }
}

impl fmt::Debug for SemanticEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticEdit")
            .field("kind", &self.kind)
            .field("old", &self.old)
            .field("new", &self.new)
            .field("syntax_map", &self.syntax_map.is_some())
            .field("preserve_locals", &self.preserve_locals)
            .finish()
    }
}

/// Syntax map sending every node to itself.
pub fn identity_syntax_map() -> SyntaxMap {
    Arc::new(|id: SyntaxId| Some(id))
}

/// Symbols added by any module during one debugging session, keyed by
/// the module that declares them.
///
/// Shared by the chains of every module in the session. Successful
/// emissions record their additions here. Symbol keys carry no module, so
/// same-named symbols of different modules stay distinct only through the
/// module half of the key.
#[derive(Clone, Default, Debug)]
pub struct EditSession {
    added: FxHashSet<(Name, SymbolKey)>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, module: Name, key: SymbolKey) {
        self.added.insert((module, key));
    }

    /// Whether `module` added `key` this session.
    pub fn was_added(&self, module: Name, key: &SymbolKey) -> bool {
        self.added.contains(&(module, *key))
    }

    pub fn len(&self) -> usize {
        self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}
