//! Lowering of front-end bodies to symbolic code.

use tracing::{debug, instrument};

use enc_diagnostic::{Diagnostic, ErrorCode};
use enc_ir::opcode::Opcode;
use enc_ir::{Name, Span};

use crate::locals::{SlotRequest, TempKind};
use crate::symbols::{
    AnonymousTypeKey, BinaryOp, Body, Compilation, Constant, Expr, ExprKind, LocalId, MethodId, MethodSymbol,
    Place, Stmt, StmtKind, SwitchCase, SyntaxId, Ty, UsingResource,
};
use crate::EmitError;

use super::builder::{CodeBuilder, Label, TokenRef, VarRef};

/// Output of lowering one method.
pub struct LoweredBody {
    pub code: CodeBuilder,
    /// Source locals first, in declaration order, then temporaries in
    /// the order they are first needed.
    pub requests: Vec<SlotRequest>,
    /// `(name, scope)` of each request; `None` for temporaries.
    pub local_scopes: Vec<Option<(Name, Span)>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoweredBody {
    fn without_locals(code: CodeBuilder) -> Self {
        LoweredBody {
            code,
            requests: Vec::new(),
            local_scopes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Lower the body of `method`.
///
/// String switches are always lowered to sequential comparisons; at or
/// above `switch_helper_threshold` cases a warning records that the hash
/// dispatch helper of a full build was not synthesized.
#[instrument(level = "trace", skip_all, fields(method = method.raw()))]
pub fn lower_method(
    compilation: &Compilation,
    method: MethodId,
    switch_helper_threshold: usize,
) -> Result<LoweredBody, EmitError> {
    let symbol = compilation.method(method);
    let body = symbol.body.as_ref().ok_or_else(|| {
        EmitError::internal(
            ErrorCode::E2002,
            format!("{} has no body to emit", compilation.describe(crate::symbols::SymbolRef::Method(method))),
        )
    })?;

    let mut lowerer = Lowerer {
        compilation,
        method: symbol,
        body,
        code: CodeBuilder::new(),
        requests: Vec::new(),
        local_scopes: Vec::new(),
        diagnostics: Vec::new(),
        switch_helper_threshold,
    };
    for local in &body.locals {
        lowerer.requests.push(SlotRequest::user(local.name, local.ty.clone(), local.syntax));
        lowerer.local_scopes.push(Some((local.name, local.scope)));
    }
    lowerer.stmts(&body.stmts)?;
    if !lowerer.code.is_terminated() {
        lowerer.code.emit_ret(false);
    }
    debug!(
        locals = body.locals.len(),
        temporaries = lowerer.requests.len() - body.locals.len(),
        "lowered body"
    );
    Ok(LoweredBody {
        code: lowerer.code,
        requests: lowerer.requests,
        local_scopes: lowerer.local_scopes,
        diagnostics: lowerer.diagnostics,
    })
}

/// Body of a deleted member: throw `MissingMethodException`.
pub fn lower_missing_method() -> LoweredBody {
    let mut code = CodeBuilder::new();
    code.emit_call(Opcode::NewObj, TokenRef::MissingMethodConstructor, 0, 1);
    code.emit(Opcode::Throw);
    LoweredBody::without_locals(code)
}

/// Template constructor: call the base constructor, then store each
/// argument in its backing field.
pub fn lower_template_constructor(key: &AnonymousTypeKey) -> Result<LoweredBody, EmitError> {
    let mut code = CodeBuilder::new();
    code.emit_var(Opcode::LdArg, VarRef::Arg(0));
    code.emit_call(Opcode::Call, TokenRef::ObjectConstructor, 1, 0);
    for index in 0..key.members.len() {
        let field: u16 = EmitError::narrow(index, "anonymous member")?;
        let arg: u16 = EmitError::narrow(index + 1, "constructor argument")?;
        code.emit_var(Opcode::LdArg, VarRef::Arg(0));
        code.emit_var(Opcode::LdArg, VarRef::Arg(arg));
        code.emit_token(Opcode::StFld, TokenRef::AnonymousField(key.clone(), field));
    }
    code.emit_ret(false);
    Ok(LoweredBody::without_locals(code))
}

pub fn lower_template_getter(key: &AnonymousTypeKey, index: u16) -> LoweredBody {
    let mut code = CodeBuilder::new();
    code.emit_var(Opcode::LdArg, VarRef::Arg(0));
    code.emit_token(Opcode::LdFld, TokenRef::AnonymousField(key.clone(), index));
    code.emit_ret(true);
    LoweredBody::without_locals(code)
}

struct Lowerer<'c> {
    compilation: &'c Compilation,
    method: &'c MethodSymbol,
    body: &'c Body,
    code: CodeBuilder,
    requests: Vec<SlotRequest>,
    local_scopes: Vec<Option<(Name, Span)>>,
    diagnostics: Vec<Diagnostic>,
    switch_helper_threshold: usize,
}

fn unresolved(what: impl std::fmt::Display) -> EmitError {
    EmitError::internal(ErrorCode::E2002, format!("cannot resolve {what}"))
}

impl Lowerer<'_> {
    fn temp(&mut self, kind: TempKind, ty: Ty, syntax: Option<SyntaxId>) -> Result<VarRef, EmitError> {
        let index = EmitError::narrow(self.requests.len(), "local")?;
        self.requests.push(SlotRequest::temporary(kind, ty, syntax));
        self.local_scopes.push(None);
        Ok(VarRef::Local(index))
    }

    fn local(&self, id: LocalId) -> Result<VarRef, EmitError> {
        if self.body.local(id).is_none() {
            return Err(unresolved(format_args!("local #{}", id.index())));
        }
        Ok(VarRef::Local(id.raw()))
    }

    fn arg(&self, index: u16) -> Result<VarRef, EmitError> {
        if usize::from(index) >= self.method.params.len() {
            return Err(unresolved(format_args!("parameter #{index}")));
        }
        let offset = u16::from(!self.method.is_static());
        Ok(VarRef::Arg(index + offset))
    }

    fn this_ty(&self) -> Ty {
        Ty::Named(self.compilation.ty(self.method.owner).qualified)
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<(), EmitError> {
        stmts.iter().try_for_each(|s| self.stmt(s))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), EmitError> {
        self.code.point(stmt.span);
        match &stmt.kind {
            StmtKind::Local { local, init } => {
                if let Some(init) = init {
                    self.expr(init)?;
                    let var = self.local(*local)?;
                    self.code.emit_var(Opcode::StLoc, var);
                }
            }
            StmtKind::Expr(expr) => {
                self.expr(expr)?;
                if self.type_of(expr) != Ty::Void {
                    self.code.emit(Opcode::Pop);
                }
            }
            StmtKind::Assign { target, value } => self.assign(target, value)?,
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
                self.code.emit_ret(value.is_some());
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let else_label = self.code.define_label();
                let end = self.code.define_label();
                self.expr(cond)?;
                self.code.emit_branch(Opcode::BrFalse, else_label);
                self.stmts(then_branch)?;
                self.code.emit_branch(Opcode::Br, end);
                self.code.mark(else_label);
                self.stmts(else_branch)?;
                self.code.mark(end);
            }
            StmtKind::Using {
                syntax,
                resource,
                dispose,
                body,
            } => self.using(*syntax, resource, *dispose, body)?,
            StmtKind::Switch {
                subject,
                equality,
                cases,
                default,
                ..
            } => self.switch(stmt.span, subject, *equality, cases, default)?,
        }
        Ok(())
    }

    fn using(&mut self, syntax: SyntaxId, resource: &UsingResource, dispose: MethodId, body: &[Stmt]) -> Result<(), EmitError> {
        let var = match resource {
            UsingResource::Declared { local, init } => {
                self.expr(init)?;
                self.local(*local)?
            }
            UsingResource::Expr(init) => {
                self.expr(init)?;
                let ty = self.type_of(init);
                self.temp(TempKind::UsingResource, ty, Some(syntax))?
            }
        };
        self.code.emit_var(Opcode::StLoc, var);

        let try_start = self.code.define_label();
        let handler = self.code.define_label();
        let skip = self.code.define_label();
        let handler_end = self.code.define_label();
        let end = self.code.define_label();

        self.code.mark(try_start);
        self.stmts(body)?;
        self.code.emit_branch(Opcode::Leave, end);

        self.code.mark(handler);
        self.code.emit_var(Opcode::LdLoc, var);
        self.code.emit_branch(Opcode::BrFalse, skip);
        self.code.emit_var(Opcode::LdLoc, var);
        let pushes = u32::from(self.compilation.method(dispose).ret != Ty::Void);
        self.code.emit_call(Opcode::CallVirt, self.method_token(dispose), 1, pushes);
        if pushes > 0 {
            self.code.emit(Opcode::Pop);
        }
        self.code.mark(skip);
        self.code.emit(Opcode::EndFinally);
        self.code.mark(handler_end);
        self.code.add_finally(try_start, handler, handler_end);
        self.code.mark(end);
        Ok(())
    }

    fn switch(
        &mut self,
        span: Span,
        subject: &Expr,
        equality: MethodId,
        cases: &[SwitchCase],
        default: &[Stmt],
    ) -> Result<(), EmitError> {
        if cases.len() >= self.switch_helper_threshold {
            debug!(cases = cases.len(), "string switch lowered without dispatch helper");
            self.diagnostics.push(
                Diagnostic::warning(ErrorCode::W1001)
                    .with_message(format!(
                        "string switch with {} cases lowered to sequential comparisons; private dispatch helper not synthesized in a delta",
                        cases.len()
                    ))
                    .with_label(span, "switch"),
            );
        }

        self.expr(subject)?;
        let value = self.temp(TempKind::SwitchSubject, Ty::STRING, None)?;
        self.code.emit_var(Opcode::StLoc, value);

        let labels: Vec<Label> = cases.iter().map(|_| self.code.define_label()).collect();
        let default_label = self.code.define_label();
        let end = self.code.define_label();
        let compare = self.method_token(equality);
        for (case, &label) in cases.iter().zip(&labels) {
            self.code.emit_var(Opcode::LdLoc, value);
            self.code.emit_token(Opcode::LdStr, TokenRef::String(case.label));
            self.code.emit_call(Opcode::Call, compare.clone(), 2, 1);
            self.code.emit_branch(Opcode::BrTrue, label);
        }
        self.code.emit_branch(Opcode::Br, default_label);
        for (case, &label) in cases.iter().zip(&labels) {
            self.code.mark(label);
            self.stmts(&case.body)?;
            self.code.emit_branch(Opcode::Br, end);
        }
        self.code.mark(default_label);
        self.stmts(default)?;
        self.code.mark(end);
        Ok(())
    }

    fn method_token(&self, method: MethodId) -> TokenRef {
        TokenRef::Method {
            method,
            type_args: Vec::new(),
        }
    }

    /// Push the receiver of an instance member; `this` when omitted.
    fn receiver(&mut self, receiver: Option<&Expr>) -> Result<(), EmitError> {
        match receiver {
            Some(expr) => self.expr(expr),
            None => {
                self.code.emit_var(Opcode::LdArg, VarRef::Arg(0));
                Ok(())
            }
        }
    }

    fn call(&mut self, method: MethodId, type_args: &[Ty], receiver: Option<&Expr>, args: &[Expr]) -> Result<(), EmitError> {
        let callee = self.compilation.method(method);
        let instance = !callee.is_static();
        if instance {
            self.receiver(receiver)?;
        }
        for arg in args {
            self.expr(arg)?;
        }
        let pops = EmitError::narrow::<u32>(args.len(), "argument count")? + u32::from(instance);
        let pushes = u32::from(callee.ret != Ty::Void);
        let opcode = if instance { Opcode::CallVirt } else { Opcode::Call };
        let token = TokenRef::Method {
            method,
            type_args: type_args.to_vec(),
        };
        self.code.emit_call(opcode, token, pops, pushes);
        Ok(())
    }

    fn accessor(&self, accessor: Option<MethodId>, what: &str) -> Result<MethodId, EmitError> {
        accessor.ok_or_else(|| unresolved(format_args!("{what} accessor")))
    }

    fn load(&mut self, place: &Place) -> Result<(), EmitError> {
        match place {
            Place::Local(id) => {
                let var = self.local(*id)?;
                self.code.emit_var(Opcode::LdLoc, var);
            }
            Place::Param(index) => {
                let var = self.arg(*index)?;
                self.code.emit_var(Opcode::LdArg, var);
            }
            Place::Field { receiver, field } => {
                if self.compilation.field(*field).is_static {
                    self.code.emit_token(Opcode::LdSFld, TokenRef::Field(*field));
                } else {
                    self.receiver(receiver.as_deref())?;
                    self.code.emit_token(Opcode::LdFld, TokenRef::Field(*field));
                }
            }
            Place::Property { receiver, property } => {
                let getter = self.accessor(self.compilation.property(*property).getter, "get")?;
                self.call(getter, &[], receiver.as_deref(), &[])?;
            }
        }
        Ok(())
    }

    fn place_ty(&self, place: &Place) -> Ty {
        match place {
            Place::Local(id) => self.body.local(*id).map_or(Ty::OBJECT, |l| l.ty.clone()),
            Place::Param(index) => self
                .method
                .params
                .get(usize::from(*index))
                .map_or(Ty::OBJECT, |p| p.ty.clone()),
            Place::Field { field, .. } => self.compilation.field(*field).ty.clone(),
            Place::Property { property, .. } => self.compilation.property(*property).ty.clone(),
        }
    }

    /// Whether a place needs a receiver object on the stack.
    fn instance_member(&self, place: &Place) -> bool {
        match place {
            Place::Local(_) | Place::Param(_) => false,
            Place::Field { field, .. } => !self.compilation.field(*field).is_static,
            Place::Property { property, .. } => self
                .compilation
                .property(*property)
                .getter
                .or(self.compilation.property(*property).setter)
                .is_some_and(|m| !self.compilation.method(m).is_static()),
        }
    }

    fn assign(&mut self, target: &Place, value: &Expr) -> Result<(), EmitError> {
        match target {
            Place::Local(id) => {
                self.expr(value)?;
                let var = self.local(*id)?;
                self.code.emit_var(Opcode::StLoc, var);
            }
            Place::Param(index) => {
                self.expr(value)?;
                let var = self.arg(*index)?;
                self.code.emit_var(Opcode::StArg, var);
            }
            Place::Field { receiver, field } => {
                if self.compilation.field(*field).is_static {
                    self.expr(value)?;
                    self.code.emit_token(Opcode::StSFld, TokenRef::Field(*field));
                } else {
                    self.receiver(receiver.as_deref())?;
                    self.expr(value)?;
                    self.code.emit_token(Opcode::StFld, TokenRef::Field(*field));
                }
            }
            Place::Property { receiver, property } => {
                let setter = self.accessor(self.compilation.property(*property).setter, "set")?;
                self.call(setter, &[], receiver.as_deref(), std::slice::from_ref(value))?;
            }
        }
        Ok(())
    }

    /// Store the value on top of the stack, below which sits the receiver
    /// for instance members.
    fn store_top(&mut self, place: &Place) -> Result<(), EmitError> {
        match place {
            Place::Local(id) => {
                let var = self.local(*id)?;
                self.code.emit_var(Opcode::StLoc, var);
            }
            Place::Param(index) => {
                let var = self.arg(*index)?;
                self.code.emit_var(Opcode::StArg, var);
            }
            Place::Field { field, .. } => {
                let opcode = if self.compilation.field(*field).is_static {
                    Opcode::StSFld
                } else {
                    Opcode::StFld
                };
                self.code.emit_token(opcode, TokenRef::Field(*field));
            }
            Place::Property { property, .. } => {
                let setter = self.accessor(self.compilation.property(*property).setter, "set")?;
                let instance = !self.compilation.method(setter).is_static();
                self.code.emit_call(
                    if instance { Opcode::CallVirt } else { Opcode::Call },
                    self.method_token(setter),
                    1 + u32::from(instance),
                    0,
                );
            }
        }
        Ok(())
    }

    /// Load through an already evaluated receiver.
    fn load_from(&mut self, place: &Place, receiver: Option<VarRef>) -> Result<(), EmitError> {
        match (place, receiver) {
            (Place::Field { field, .. }, Some(r)) => {
                self.code.emit_var(Opcode::LdLoc, r);
                self.code.emit_token(Opcode::LdFld, TokenRef::Field(*field));
            }
            (Place::Property { property, .. }, Some(r)) => {
                let getter = self.accessor(self.compilation.property(*property).getter, "get")?;
                self.code.emit_var(Opcode::LdLoc, r);
                self.code.emit_call(Opcode::CallVirt, self.method_token(getter), 1, 1);
            }
            _ => self.load(place)?,
        }
        Ok(())
    }

    /// Read-modify-write through short-lived scratch temporaries:
    /// the receiver (for instance members) and the produced value.
    fn increment(&mut self, place: &Place, delta: i32, postfix: bool) -> Result<(), EmitError> {
        let receiver = if self.instance_member(place) {
            let receiver_expr = match place {
                Place::Field { receiver, .. } | Place::Property { receiver, .. } => receiver.as_deref(),
                Place::Local(_) | Place::Param(_) => None,
            };
            let receiver_ty = match receiver_expr {
                Some(expr) => self.type_of(expr),
                None => self.this_ty(),
            };
            self.receiver(receiver_expr)?;
            let var = self.temp(TempKind::Scratch, receiver_ty, None)?;
            self.code.emit_var(Opcode::StLoc, var);
            Some(var)
        } else {
            None
        };
        let value = self.temp(TempKind::Scratch, self.place_ty(place), None)?;

        self.load_from(place, receiver)?;
        if !postfix {
            self.code.emit_i4(delta);
            self.code.emit(Opcode::Add);
        }
        self.code.emit_var(Opcode::StLoc, value);

        if let Some(r) = receiver {
            self.code.emit_var(Opcode::LdLoc, r);
        }
        self.code.emit_var(Opcode::LdLoc, value);
        if postfix {
            self.code.emit_i4(delta);
            self.code.emit(Opcode::Add);
        }
        self.store_top(place)?;
        self.code.emit_var(Opcode::LdLoc, value);
        Ok(())
    }

    fn constant(&mut self, value: &Constant) {
        match value {
            Constant::Null => self.code.emit(Opcode::LdNull),
            Constant::Bool(b) => self.code.emit_i4(i32::from(*b)),
            Constant::I4(v) => self.code.emit_i4(*v),
            Constant::I8(v) => self.code.emit_i8(*v),
            Constant::R8(bits) => self.code.emit_r8(f64::from_bits(*bits)),
            Constant::String(s) => self.code.emit_token(Opcode::LdStr, TokenRef::String(*s)),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), EmitError> {
        match &expr.kind {
            ExprKind::Const(value) => self.constant(value),
            ExprKind::Read(place) => self.load(place)?,
            ExprKind::This => self.code.emit_var(Opcode::LdArg, VarRef::Arg(0)),
            ExprKind::Call {
                method,
                type_args,
                receiver,
                args,
            } => self.call(*method, type_args, receiver.as_deref(), args)?,
            ExprKind::New { constructor, args } => {
                for arg in args {
                    self.expr(arg)?;
                }
                let pops = EmitError::narrow(args.len(), "argument count")?;
                self.code.emit_call(Opcode::NewObj, self.method_token(*constructor), pops, 1);
            }
            ExprKind::NewAnonymous { shape, values } => {
                for value in values {
                    self.expr(value)?;
                }
                let pops = EmitError::narrow(values.len(), "argument count")?;
                self.code
                    .emit_call(Opcode::NewObj, TokenRef::AnonymousConstructor(shape.clone()), pops, 1);
            }
            ExprKind::AnonymousMember { target, shape, member } => {
                let (index, _) = shape
                    .member(*member)
                    .ok_or_else(|| unresolved(format_args!("anonymous member {}", self.compilation.interner().lookup(*member))))?;
                self.expr(target)?;
                let index = EmitError::narrow(index, "anonymous member")?;
                self.code
                    .emit_call(Opcode::CallVirt, TokenRef::AnonymousGetter(shape.clone(), index), 1, 1);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.code.emit(match op {
                    BinaryOp::Add => Opcode::Add,
                    BinaryOp::Sub => Opcode::Sub,
                    BinaryOp::Mul => Opcode::Mul,
                    BinaryOp::Eq => Opcode::Ceq,
                    BinaryOp::Lt => Opcode::Clt,
                });
            }
            ExprKind::Box { ty, value } => {
                self.expr(value)?;
                self.code.emit_token(Opcode::Box, TokenRef::Type(ty.clone()));
            }
            ExprKind::Increment { place, delta, postfix } => self.increment(place, *delta, *postfix)?,
            ExprKind::Dynamic { .. } => {
                return Err(EmitError::StructuralRejection {
                    diagnostics: vec![Diagnostic::error(ErrorCode::E1001)
                        .with_message("late-bound operation cannot be emitted")
                        .with_label(expr.span, "dynamic operation")],
                });
            }
            ExprKind::Subscribe {
                receiver,
                event,
                handler,
            } => {
                let adder = self.accessor(self.compilation.event(*event).adder, "add")?;
                self.call(adder, &[], receiver.as_deref(), std::slice::from_ref(handler))?;
            }
        }
        Ok(())
    }

    fn type_of(&self, expr: &Expr) -> Ty {
        match &expr.kind {
            ExprKind::Const(value) => value.ty(),
            ExprKind::Read(place) => self.place_ty(place),
            ExprKind::This => self.this_ty(),
            ExprKind::Call { method, .. } => self.compilation.method(*method).ret.clone(),
            ExprKind::New { constructor, .. } => {
                let owner = self.compilation.method(*constructor).owner;
                Ty::Named(self.compilation.ty(owner).qualified)
            }
            ExprKind::NewAnonymous { shape, .. } => Ty::Anonymous(shape.clone()),
            ExprKind::AnonymousMember { shape, member, .. } => {
                shape.member(*member).map_or(Ty::OBJECT, |(_, m)| m.ty.clone())
            }
            ExprKind::Binary { op, lhs, .. } => match op {
                BinaryOp::Eq | BinaryOp::Lt => Ty::BOOL,
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => self.type_of(lhs),
            },
            ExprKind::Box { .. } => Ty::OBJECT,
            ExprKind::Increment { place, .. } => self.place_ty(place),
            ExprKind::Dynamic { .. } => Ty::Dynamic,
            ExprKind::Subscribe { .. } => Ty::Void,
        }
    }
}
