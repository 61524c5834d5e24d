//! Front-end symbol model.
//!
//! The front end hands the emitter two [`Compilation`]s per batch: the one
//! the baseline was built from and the edited one. Symbols are plain arena
//! entries addressed by typed ids; identity across compilations goes through
//! [`SymbolKey`], never through ids.

mod body;
mod compilation;
mod key;
mod ty;
pub mod visit;

pub use body::{
    BinaryOp, Body, Expr, ExprKind, LocalDecl, Place, Stmt, StmtKind, SwitchCase, UsingResource,
};
pub use compilation::{
    AttributeData, Compilation, CompilationBuilder, EventSymbol, FieldSymbol, MethodFlags,
    MethodKind, MethodSymbol, ParamSymbol, PropertySymbol, TypeFlags, TypeSymbol,
};
pub use key::{SymbolKey, SymbolKind};
pub use ty::{AnonymousMember, AnonymousTypeKey, Constant, Primitive, Ty};

macro_rules! symbol_id {
    ($($(#[$doc:meta])* $name:ident;)*) => {$(
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                $name(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    )*};
}

symbol_id! {
    TypeId;
    MethodId;
    FieldId;
    PropertyId;
    EventId;
    /// Index into [`Body::locals`].
    LocalId;
    /// Syntax node identity, stable within one compilation. The edit's
    /// syntax map relates old ids to new ids.
    SyntaxId;
}

/// Any definition symbol.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SymbolRef {
    Type(TypeId),
    Method(MethodId),
    Field(FieldId),
    Property(PropertyId),
    Event(EventId),
}

impl SymbolRef {
    pub fn kind(self) -> SymbolKind {
        match self {
            SymbolRef::Type(_) => SymbolKind::Type,
            SymbolRef::Method(_) => SymbolKind::Method,
            SymbolRef::Field(_) => SymbolKind::Field,
            SymbolRef::Property(_) => SymbolKind::Property,
            SymbolRef::Event(_) => SymbolKind::Event,
        }
    }
}
