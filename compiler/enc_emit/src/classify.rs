//! Edit classification and legality checks.
//!
//! Each [`SemanticEdit`] becomes the row-level operations it needs. The
//! whole batch is classified and validated before anything is allocated;
//! every rejection is collected and the batch fails as a unit.
//!
//! Inserting a type inserts all of its members and nested types. Property
//! and event edits carry their accessors along as method edits.

mod validate;

use rustc_hash::FxHashSet;
use tracing::debug;

use enc_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode};
use enc_ir::Handle;

use crate::baseline::Baseline;
use crate::edit::{EditKind, EditSession, SemanticEdit};
use crate::symbols::{Compilation, EventId, FieldId, MethodId, PropertyId, SymbolKey, SymbolRef, TypeId};
use crate::EmitError;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum MemberOp {
    Insert,
    /// Re-emit the existing row.
    Update(Handle),
    /// Replace the member's body with one that throws.
    Delete(Handle),
}

/// Row-level operation derived from an edit.
///
/// Ids index the current compilation, except under [`MemberOp::Delete`],
/// where the member only exists in the previous one.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ClassifiedEdit {
    TypeInsert(TypeId),
    MethodEdit {
        method: MethodId,
        op: MemberOp,
        /// Batch index of the edit that produced this one.
        edit: usize,
    },
    FieldEdit {
        field: FieldId,
        op: MemberOp,
    },
    PropertyEdit {
        property: PropertyId,
        op: MemberOp,
    },
    EventEdit {
        event: EventId,
        op: MemberOp,
    },
}

struct Classifier<'a> {
    baseline: &'a Baseline,
    previous: &'a Compilation,
    current: &'a Compilation,
    queue: DiagnosticQueue,
    out: Vec<ClassifiedEdit>,
    /// Current-compilation symbols already classified.
    seen: FxHashSet<SymbolRef>,
    /// Baseline rows already deleted.
    deleted: FxHashSet<Handle>,
    /// Types inserted by this batch, nested types included.
    inserted_types: FxHashSet<TypeId>,
}

/// Classify and validate a batch.
pub(crate) fn classify(
    baseline: &Baseline,
    previous: &Compilation,
    current: &Compilation,
    edits: &[SemanticEdit],
    session: &EditSession,
) -> Result<Vec<ClassifiedEdit>, EmitError> {
    let mut classifier = Classifier {
        baseline,
        previous,
        current,
        queue: DiagnosticQueue::new(),
        out: Vec::new(),
        seen: FxHashSet::default(),
        deleted: FxHashSet::default(),
        inserted_types: FxHashSet::default(),
    };
    classifier.collect_inserted_types(edits);
    for (index, edit) in edits.iter().enumerate() {
        classifier.edit(index, edit);
    }

    for classified in &classifier.out {
        match *classified {
            ClassifiedEdit::MethodEdit {
                method,
                op: MemberOp::Insert | MemberOp::Update(_),
                ..
            } => validate::check_method(current, session, method, &mut classifier.queue),
            ClassifiedEdit::TypeInsert(ty) => validate::check_type(current, session, ty, &mut classifier.queue),
            _ => {}
        }
    }

    if classifier.queue.has_errors().is_some() {
        let diagnostics = classifier.queue.flush();
        debug!(
            errors = diagnostics.iter().filter(|d| d.is_error()).count(),
            "edit batch rejected"
        );
        return Err(EmitError::from_diagnostics(diagnostics));
    }
    debug!(edits = edits.len(), classified = classifier.out.len(), "classified edit batch");
    Ok(classifier.out)
}

/// Keys of the methods `method` implements explicitly.
fn implemented(compilation: &Compilation, method: MethodId) -> FxHashSet<SymbolKey> {
    compilation
        .method(method)
        .implements
        .iter()
        .map(|&m| compilation.key(SymbolRef::Method(m)))
        .collect()
}

impl Classifier<'_> {
    fn collect_inserted_types(&mut self, edits: &[SemanticEdit]) {
        let mut stack: Vec<TypeId> = edits
            .iter()
            .filter(|e| e.kind == EditKind::Insert)
            .filter_map(|e| match e.new {
                Some(SymbolRef::Type(ty)) if self.current.is_local(ty) => Some(ty),
                _ => None,
            })
            .collect();
        while let Some(ty) = stack.pop() {
            if self.inserted_types.insert(ty) {
                stack.extend(self.current.ty(ty).nested.iter().copied());
            }
        }
    }

    fn error(&mut self, code: ErrorCode, compilation: &Compilation, symbol: SymbolRef, message: String) {
        let diagnostic = Diagnostic::error(code)
            .with_message(message)
            .with_label(compilation.span_of(symbol), "edited here");
        self.queue.push(diagnostic);
    }

    /// E1004, pointing at both declarations.
    fn changed(&mut self, old: SymbolRef, new: SymbolRef, message: String) {
        let diagnostic = Diagnostic::error(ErrorCode::E1004)
            .with_message(message)
            .with_label(self.current.span_of(new), "edited here")
            .with_secondary_label(self.previous.span_of(old), "declared like this before the edit");
        self.queue.push(diagnostic);
    }

    fn in_baseline(&self, compilation: &Compilation, symbol: SymbolRef) -> Option<Handle> {
        self.baseline.handle_of(&compilation.key(symbol))
    }

    fn type_exists(&self, ty: TypeId) -> bool {
        self.inserted_types.contains(&ty) || self.in_baseline(self.current, SymbolRef::Type(ty)).is_some()
    }

    fn edit(&mut self, index: usize, edit: &SemanticEdit) {
        match (edit.kind, edit.old, edit.new) {
            (EditKind::Insert, _, Some(new)) => self.insert(index, new),
            (EditKind::Update, Some(old), Some(new)) => self.update(index, old, new),
            (EditKind::Delete, Some(old), _) => self.delete(index, old),
            (kind, _, _) => self.queue.push(
                Diagnostic::error(ErrorCode::E2002)
                    .with_message(format!("{kind:?} edit #{index} is missing its symbol")),
            ),
        }
    }

    fn insert(&mut self, index: usize, new: SymbolRef) {
        let current = self.current;
        let owner = current.owner_of(new);
        let described = current.describe(new);
        if !current.is_local(owner) {
            self.error(ErrorCode::E2002, current, new, format!("{described} is declared outside this module"));
            return;
        }

        if let SymbolRef::Type(ty) = new {
            if let Some(outer) = current.ty(ty).enclosing {
                if self.inserted_types.contains(&outer) {
                    return;
                }
                if !self.type_exists(outer) {
                    self.error(ErrorCode::E2002, current, new, format!("enclosing type of {described} does not exist"));
                    return;
                }
            }
            if self.in_baseline(current, new).is_some() {
                self.error(ErrorCode::E2002, current, new, format!("{described} is already in the baseline"));
                return;
            }
            self.insert_type(ty);
            return;
        }

        if self.inserted_types.contains(&owner) {
            return;
        }
        if self.in_baseline(current, SymbolRef::Type(owner)).is_none() {
            self.error(
                ErrorCode::E2002,
                current,
                new,
                format!("{described} is inserted into a type that neither exists nor is inserted"),
            );
            return;
        }
        if self.in_baseline(current, new).is_some() {
            self.error(ErrorCode::E2002, current, new, format!("{described} is already in the baseline"));
            return;
        }

        match new {
            SymbolRef::Method(method) => self.push_method(method, MemberOp::Insert, index),
            SymbolRef::Field(field) => {
                if self.seen.insert(new) {
                    self.out.push(ClassifiedEdit::FieldEdit {
                        field,
                        op: MemberOp::Insert,
                    });
                }
            }
            SymbolRef::Property(property) => {
                if self.seen.insert(new) {
                    self.out.push(ClassifiedEdit::PropertyEdit {
                        property,
                        op: MemberOp::Insert,
                    });
                }
                let symbol = current.property(property);
                self.accessors(index, [None, None], [symbol.getter, symbol.setter]);
            }
            SymbolRef::Event(event) => {
                if self.seen.insert(new) {
                    self.out.push(ClassifiedEdit::EventEdit {
                        event,
                        op: MemberOp::Insert,
                    });
                }
                let symbol = current.event(event);
                self.accessors(index, [None, None], [symbol.adder, symbol.remover]);
            }
            SymbolRef::Type(_) => {}
        }
    }

    /// Insert a type with every member and nested type.
    fn insert_type(&mut self, ty: TypeId) {
        if !self.seen.insert(SymbolRef::Type(ty)) {
            return;
        }
        let current = self.current;
        let symbol = current.ty(ty);
        self.out.push(ClassifiedEdit::TypeInsert(ty));
        for &field in &symbol.fields {
            if self.seen.insert(SymbolRef::Field(field)) {
                self.out.push(ClassifiedEdit::FieldEdit {
                    field,
                    op: MemberOp::Insert,
                });
            }
        }
        for &method in &symbol.methods {
            // Type inserts carry no syntax map; any edit index will do.
            self.push_method(method, MemberOp::Insert, 0);
        }
        for &property in &symbol.properties {
            if self.seen.insert(SymbolRef::Property(property)) {
                self.out.push(ClassifiedEdit::PropertyEdit {
                    property,
                    op: MemberOp::Insert,
                });
            }
        }
        for &event in &symbol.events {
            if self.seen.insert(SymbolRef::Event(event)) {
                self.out.push(ClassifiedEdit::EventEdit {
                    event,
                    op: MemberOp::Insert,
                });
            }
        }
        for &nested in &symbol.nested {
            self.insert_type(nested);
        }
    }

    fn push_method(&mut self, method: MethodId, op: MemberOp, edit: usize) {
        if self.seen.insert(SymbolRef::Method(method)) {
            self.out.push(ClassifiedEdit::MethodEdit { method, op, edit });
        }
    }

    /// Reconcile accessor lists: accessors already in the baseline are
    /// updated, new ones inserted, and vanished ones deleted.
    fn accessors(&mut self, index: usize, old: [Option<MethodId>; 2], new: [Option<MethodId>; 2]) {
        let current = self.current;
        let previous = self.previous;
        let mut kept = Vec::new();
        for method in new.into_iter().flatten() {
            let symbol = SymbolRef::Method(method);
            kept.push(current.key(symbol));
            let op = self.in_baseline(current, symbol).map_or(MemberOp::Insert, MemberOp::Update);
            self.push_method(method, op, index);
        }
        for method in old.into_iter().flatten() {
            let symbol = SymbolRef::Method(method);
            if !kept.contains(&previous.key(symbol)) {
                self.delete(index, symbol);
            }
        }
    }

    fn update(&mut self, index: usize, old: SymbolRef, new: SymbolRef) {
        let (current, previous) = (self.current, self.previous);
        let described = current.describe(new);
        if old.kind() != new.kind() {
            self.error(ErrorCode::E1006, current, new, format!("update changes the kind of {described}"));
            return;
        }
        if let SymbolRef::Type(_) = new {
            self.error(
                ErrorCode::E1006,
                current,
                new,
                format!("updating type {described} cannot be expressed as a delta"),
            );
            return;
        }
        if previous.key(old) != current.key(new) {
            self.changed(old, new, format!("update changes the signature of {}", previous.describe(old)));
            return;
        }
        let Some(handle) = self.in_baseline(current, new) else {
            self.error(ErrorCode::E2002, current, new, format!("{described} is not in the baseline"));
            return;
        };

        match (old, new) {
            (SymbolRef::Method(o), SymbolRef::Method(n)) => {
                if implemented(previous, o) != implemented(current, n) {
                    self.changed(old, new, format!("update changes the interface methods {described} implements"));
                } else {
                    self.push_method(n, MemberOp::Update(handle), index);
                }
            }
            (SymbolRef::Field(o), SymbolRef::Field(n)) => {
                let (before, after) = (previous.field(o), current.field(n));
                if before.ty != after.ty || before.is_static != after.is_static {
                    self.changed(old, new, format!("update changes the type of {described}"));
                } else if self.seen.insert(new) {
                    self.out.push(ClassifiedEdit::FieldEdit {
                        field: n,
                        op: MemberOp::Update(handle),
                    });
                }
            }
            (SymbolRef::Property(o), SymbolRef::Property(n)) => {
                let (before, after) = (previous.property(o), current.property(n));
                if before.ty != after.ty {
                    self.changed(old, new, format!("update changes the type of {described}"));
                    return;
                }
                if self.seen.insert(new) {
                    self.out.push(ClassifiedEdit::PropertyEdit {
                        property: n,
                        op: MemberOp::Update(handle),
                    });
                }
                self.accessors(index, [before.getter, before.setter], [after.getter, after.setter]);
            }
            (SymbolRef::Event(o), SymbolRef::Event(n)) => {
                let (before, after) = (previous.event(o), current.event(n));
                if before.ty != after.ty {
                    self.changed(old, new, format!("update changes the type of {described}"));
                    return;
                }
                if self.seen.insert(new) {
                    self.out.push(ClassifiedEdit::EventEdit {
                        event: n,
                        op: MemberOp::Update(handle),
                    });
                }
                self.accessors(index, [before.adder, before.remover], [after.adder, after.remover]);
            }
            _ => {}
        }
    }

    fn delete(&mut self, index: usize, old: SymbolRef) {
        let previous = self.previous;
        let described = previous.describe(old);
        if let SymbolRef::Type(_) = old {
            self.error(
                ErrorCode::E1006,
                previous,
                old,
                format!("deleting type {described} cannot be expressed as a delta"),
            );
            return;
        }
        if !previous.is_local(previous.owner_of(old)) {
            self.error(ErrorCode::E2002, previous, old, format!("{described} is declared outside this module"));
            return;
        }
        let Some(handle) = self.in_baseline(previous, old) else {
            self.error(ErrorCode::E2002, previous, old, format!("{described} is not in the baseline"));
            return;
        };
        if !self.deleted.insert(handle) {
            return;
        }

        let op = MemberOp::Delete(handle);
        match old {
            SymbolRef::Method(method) => self.out.push(ClassifiedEdit::MethodEdit { method, op, edit: index }),
            SymbolRef::Field(field) => self.out.push(ClassifiedEdit::FieldEdit { field, op }),
            SymbolRef::Property(property) => {
                self.out.push(ClassifiedEdit::PropertyEdit { property, op });
                let symbol = previous.property(property);
                for accessor in [symbol.getter, symbol.setter].into_iter().flatten() {
                    self.delete(index, SymbolRef::Method(accessor));
                }
            }
            SymbolRef::Event(event) => {
                self.out.push(ClassifiedEdit::EventEdit { event, op });
                let symbol = previous.event(event);
                for accessor in [symbol.adder, symbol.remover].into_iter().flatten() {
                    self.delete(index, SymbolRef::Method(accessor));
                }
            }
            SymbolRef::Type(_) => {}
        }
    }
}
