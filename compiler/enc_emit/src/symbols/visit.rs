//! Method body visitor.
//!
//! Default `visit_*` methods call the matching `walk_*` function, which
//! traverses children. Override a `visit_*` method to observe a node and
//! call `walk_*` from it to keep descending.
//!
//! ```text
//! struct FindDynamic { found: Option<Span> }
//!
//! impl<'b> Visitor<'b> for FindDynamic {
//!     fn visit_expr(&mut self, expr: &'b Expr) {
//!         if let ExprKind::Dynamic { .. } = expr.kind {
//!             self.found.get_or_insert(expr.span);
//!         }
//!         walk_expr(self, expr);
//!     }
//! }
//! ```

use super::{Body, Expr, ExprKind, LocalDecl, Place, Stmt, StmtKind, UsingResource};

pub trait Visitor<'b> {
    fn visit_body(&mut self, body: &'b Body) {
        walk_body(self, body);
    }

    fn visit_local(&mut self, local: &'b LocalDecl) {
        let _ = local;
    }

    fn visit_stmt(&mut self, stmt: &'b Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'b Expr) {
        walk_expr(self, expr);
    }

    fn visit_place(&mut self, place: &'b Place) {
        walk_place(self, place);
    }
}

pub fn walk_body<'b, V: Visitor<'b> + ?Sized>(visitor: &mut V, body: &'b Body) {
    for local in &body.locals {
        visitor.visit_local(local);
    }
    for stmt in &body.stmts {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<'b, V: Visitor<'b> + ?Sized>(visitor: &mut V, stmt: &'b Stmt) {
    match &stmt.kind {
        StmtKind::Local { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr(init);
            }
        }
        StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::Assign { target, value } => {
            visitor.visit_place(target);
            visitor.visit_expr(value);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(cond);
            then_branch.iter().for_each(|s| visitor.visit_stmt(s));
            else_branch.iter().for_each(|s| visitor.visit_stmt(s));
        }
        StmtKind::Using { resource, body, .. } => {
            match resource {
                UsingResource::Declared { init, .. } | UsingResource::Expr(init) => visitor.visit_expr(init),
            }
            body.iter().for_each(|s| visitor.visit_stmt(s));
        }
        StmtKind::Switch {
            subject,
            cases,
            default,
            ..
        } => {
            visitor.visit_expr(subject);
            for case in cases {
                case.body.iter().for_each(|s| visitor.visit_stmt(s));
            }
            default.iter().for_each(|s| visitor.visit_stmt(s));
        }
    }
}

pub fn walk_expr<'b, V: Visitor<'b> + ?Sized>(visitor: &mut V, expr: &'b Expr) {
    match &expr.kind {
        ExprKind::Const(_) | ExprKind::This => {}
        ExprKind::Read(place) => visitor.visit_place(place),
        ExprKind::Call { receiver, args, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
            args.iter().for_each(|a| visitor.visit_expr(a));
        }
        ExprKind::New { args, .. } => args.iter().for_each(|a| visitor.visit_expr(a)),
        ExprKind::NewAnonymous { values, .. } => values.iter().for_each(|v| visitor.visit_expr(v)),
        ExprKind::AnonymousMember { target, .. } => visitor.visit_expr(target),
        ExprKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        ExprKind::Box { value, .. } => visitor.visit_expr(value),
        ExprKind::Increment { place, .. } => visitor.visit_place(place),
        ExprKind::Dynamic { receiver, args, .. } => {
            visitor.visit_expr(receiver);
            args.iter().for_each(|a| visitor.visit_expr(a));
        }
        ExprKind::Subscribe {
            receiver, handler, ..
        } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
            visitor.visit_expr(handler);
        }
    }
}

pub fn walk_place<'b, V: Visitor<'b> + ?Sized>(visitor: &mut V, place: &'b Place) {
    match place {
        Place::Local(_) | Place::Param(_) => {}
        Place::Field { receiver, .. } | Place::Property { receiver, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
        }
    }
}
