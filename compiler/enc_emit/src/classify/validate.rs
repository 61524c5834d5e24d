//! Body, signature and implementation legality checks for edited methods.

use enc_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode};
use enc_ir::Span;

use crate::edit::EditSession;
use crate::symbols::visit::{walk_expr, walk_place, walk_stmt, Visitor};
use crate::symbols::{
    Compilation, Expr, ExprKind, LocalDecl, MethodId, Place, Stmt, StmtKind, SymbolRef, Ty, TypeFlags, TypeId,
};

struct BodyCheck<'a> {
    compilation: &'a Compilation,
    session: &'a EditSession,
    queue: &'a mut DiagnosticQueue,
    /// Innermost span seen on the way down.
    span: Span,
}

/// Check an inserted or updated method's signature and body.
pub(super) fn check_method(
    compilation: &Compilation,
    session: &EditSession,
    method: MethodId,
    queue: &mut DiagnosticQueue,
) {
    let symbol = compilation.method(method);
    let mut check = BodyCheck {
        compilation,
        session,
        queue,
        span: symbol.span,
    };
    for param in &symbol.params {
        check.ty(&param.ty);
    }
    check.ty(&symbol.ret);
    for &declaration in &symbol.implements {
        check.symbol(SymbolRef::Method(declaration));
    }
    if let Some(body) = &symbol.body {
        check.visit_body(body);
    }
}

/// Check what an inserted type derives from.
pub(super) fn check_type(compilation: &Compilation, session: &EditSession, ty: TypeId, queue: &mut DiagnosticQueue) {
    let symbol = compilation.ty(ty);
    let mut check = BodyCheck {
        compilation,
        session,
        queue,
        span: symbol.span,
    };
    if let Some(base) = &symbol.base {
        check.ty(base);
    }
}

impl BodyCheck<'_> {
    fn ty(&mut self, ty: &Ty) {
        let compilation = self.compilation;
        let mut names = Vec::new();
        ty.for_each_named(&mut |name| names.push(name));
        for name in names {
            let Some(id) = compilation.lookup_type(name) else {
                continue;
            };
            let symbol = compilation.ty(id);
            if symbol.flags.contains(TypeFlags::EMBEDDED_INTEROP) && symbol.module != compilation.module() {
                let diagnostic = Diagnostic::error(ErrorCode::E1002)
                    .with_message(format!(
                        "embedded interop type `{}` has no stable identity across generations",
                        compilation.interner().lookup(name)
                    ))
                    .with_label(self.span, "referenced here");
                self.queue.push(diagnostic);
            } else {
                self.symbol(SymbolRef::Type(id));
            }
        }
    }

    /// Reject references to symbols another module added this session.
    fn symbol(&mut self, symbol: SymbolRef) {
        let compilation = self.compilation;
        let owner = compilation.owner_of(symbol);
        let module = compilation.ty(owner).module;
        if module == compilation.module() {
            return;
        }
        for candidate in [symbol, SymbolRef::Type(owner)] {
            let key = compilation.key(candidate);
            if !self.session.was_added(module, &key) {
                continue;
            }
            let interner = compilation.interner();
            let diagnostic = Diagnostic::error(ErrorCode::E1003)
                .with_message(format!(
                    "`{}` was added to module `{}` during this session",
                    interner.lookup(key.text),
                    interner.lookup(module)
                ))
                .with_label(self.span, "referenced here")
                .with_note("rebuild the referencing module to use it");
            self.queue.push(diagnostic);
            return;
        }
    }

    fn at(&mut self, span: Span) -> Span {
        let outer = self.span;
        if !span.is_dummy() {
            self.span = span;
        }
        outer
    }
}

impl<'b> Visitor<'b> for BodyCheck<'_> {
    fn visit_local(&mut self, local: &'b LocalDecl) {
        let outer = self.at(local.span);
        self.ty(&local.ty);
        self.span = outer;
    }

    fn visit_stmt(&mut self, stmt: &'b Stmt) {
        let outer = self.at(stmt.span);
        match &stmt.kind {
            StmtKind::Using { dispose, .. } => self.symbol(SymbolRef::Method(*dispose)),
            StmtKind::Switch { equality, .. } => self.symbol(SymbolRef::Method(*equality)),
            _ => {}
        }
        walk_stmt(self, stmt);
        self.span = outer;
    }

    fn visit_expr(&mut self, expr: &'b Expr) {
        let outer = self.at(expr.span);
        match &expr.kind {
            ExprKind::Dynamic { .. } => {
                let diagnostic = Diagnostic::error(ErrorCode::E1001)
                    .with_message("late-bound operations cannot be added by an edit")
                    .with_label(self.span, "late-bound operation");
                self.queue.push(diagnostic);
            }
            ExprKind::Call { method, type_args, .. } => {
                self.symbol(SymbolRef::Method(*method));
                type_args.iter().for_each(|t| self.ty(t));
            }
            ExprKind::New { constructor, .. } => self.symbol(SymbolRef::Method(*constructor)),
            ExprKind::Box { ty, .. } => self.ty(ty),
            ExprKind::NewAnonymous { shape, .. } | ExprKind::AnonymousMember { shape, .. } => {
                for member in &shape.members {
                    self.ty(&member.ty);
                }
            }
            ExprKind::Subscribe { event, .. } => self.symbol(SymbolRef::Event(*event)),
            _ => {}
        }
        walk_expr(self, expr);
        self.span = outer;
    }

    fn visit_place(&mut self, place: &'b Place) {
        match place {
            Place::Field { field, .. } => self.symbol(SymbolRef::Field(*field)),
            Place::Property { property, .. } => self.symbol(SymbolRef::Property(*property)),
            Place::Local(_) | Place::Param(_) => {}
        }
        walk_place(self, place);
    }
}
