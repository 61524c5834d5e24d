//! Method bodies as the front end lowers them for emission.

use enc_ir::{Name, Span};

use super::{AnonymousTypeKey, Constant, EventId, FieldId, LocalId, MethodId, PropertyId, SyntaxId, Ty};

#[derive(Clone, Debug)]
pub struct Body {
    /// Source-declared locals in declaration order.
    pub locals: Vec<LocalDecl>,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Body {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Body {
            locals: Vec::new(),
            stmts,
            span: Span::DUMMY,
        }
    }

    /// Declare a local and return its id.
    pub fn declare(&mut self, name: Name, ty: Ty, syntax: SyntaxId) -> LocalId {
        let id = LocalId::from_raw(u32::try_from(self.locals.len()).unwrap_or(u32::MAX));
        self.locals.push(LocalDecl {
            name,
            ty,
            syntax,
            span: Span::DUMMY,
            scope: self.span,
        });
        id
    }

    pub fn local(&self, id: LocalId) -> Option<&LocalDecl> {
        self.locals.get(id.index())
    }
}

#[derive(Clone, Debug)]
pub struct LocalDecl {
    pub name: Name,
    pub ty: Ty,
    /// Declarator node; the key the syntax map is queried with.
    pub syntax: SyntaxId,
    pub span: Span,
    /// Lexical scope the local is visible in.
    pub scope: Span,
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            kind,
            span: Span::DUMMY,
        }
    }

    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Local { local: LocalId, init: Option<Expr> },
    Expr(Expr),
    Assign { target: Place, value: Expr },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    /// Scoped resource; `dispose` runs on every exit from `body`.
    Using {
        syntax: SyntaxId,
        resource: UsingResource,
        dispose: MethodId,
        body: Vec<Stmt>,
    },
    /// String switch. `equality` is the `(string, string) -> bool` operator.
    Switch {
        syntax: SyntaxId,
        subject: Expr,
        equality: MethodId,
        cases: Vec<SwitchCase>,
        default: Vec<Stmt>,
    },
}

#[derive(Clone, Debug)]
pub enum UsingResource {
    Declared { local: LocalId, init: Expr },
    /// No variable: the resource lives in a compiler temporary.
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub label: Name,
    pub body: Vec<Stmt>,
}

/// Assignable location.
#[derive(Clone, Debug)]
pub enum Place {
    Local(LocalId),
    /// Parameter by position, not counting `this`.
    Param(u16),
    Field {
        receiver: Option<Box<Expr>>,
        field: FieldId,
    },
    Property {
        receiver: Option<Box<Expr>>,
        property: PropertyId,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            kind,
            span: Span::DUMMY,
        }
    }

    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn constant(value: Constant) -> Self {
        Expr::new(ExprKind::Const(value))
    }

    pub fn read(place: Place) -> Self {
        Expr::new(ExprKind::Read(Box::new(place)))
    }

    pub fn call(method: MethodId, receiver: Option<Expr>, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Call {
            method,
            type_args: Vec::new(),
            receiver: receiver.map(Box::new),
            args,
        })
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Const(Constant),
    Read(Box<Place>),
    This,
    Call {
        method: MethodId,
        type_args: Vec<Ty>,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    New {
        constructor: MethodId,
        args: Vec<Expr>,
    },
    NewAnonymous {
        shape: AnonymousTypeKey,
        values: Vec<Expr>,
    },
    AnonymousMember {
        target: Box<Expr>,
        shape: AnonymousTypeKey,
        member: Name,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Box {
        ty: Ty,
        value: Box<Expr>,
    },
    /// Read-modify-write (`x++`, `o.P += 1`); evaluates to the new value,
    /// or the old one when `postfix`.
    Increment {
        place: Box<Place>,
        delta: i32,
        postfix: bool,
    },
    /// Late-bound operation resolved at run time.
    Dynamic {
        operation: Name,
        receiver: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Event subscription (`o.E += handler`).
    Subscribe {
        receiver: Option<Box<Expr>>,
        event: EventId,
        handler: Box<Expr>,
    },
}
