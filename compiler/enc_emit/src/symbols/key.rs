//! Stable symbol identity across compilations and generations.

use enc_ir::{Name, StringInterner};

use super::{Compilation, SymbolRef, Ty};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum SymbolKind {
    Type,
    Method,
    Field,
    Property,
    Event,
}

/// `(kind, canonical text)`.
///
/// Type text is the qualified name (`Ns.Outer/Inner`). Members append
/// `::name`; methods further append their generic arity (`` `2 ``, when
/// generic), the parameter list and return type, so a signature change
/// yields a different key.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolKey {
    pub kind: SymbolKind,
    pub text: Name,
}

impl SymbolKey {
    pub fn ty(interner: &StringInterner, qualified: &str) -> Self {
        SymbolKey {
            kind: SymbolKind::Type,
            text: interner.intern(qualified),
        }
    }

    pub fn member(interner: &StringInterner, kind: SymbolKind, owner: &str, name: &str) -> Self {
        SymbolKey {
            kind,
            text: interner.intern(&format!("{owner}::{name}")),
        }
    }

    pub fn method(interner: &StringInterner, owner: &str, name: &str, arity: usize, params: &[Ty], ret: &Ty) -> Self {
        let mut text = if arity > 0 {
            format!("{owner}::{name}`{arity}(")
        } else {
            format!("{owner}::{name}(")
        };
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                text.push(',');
            }
            param.write_canonical(interner, &mut text);
        }
        text.push_str("):");
        ret.write_canonical(interner, &mut text);
        SymbolKey {
            kind: SymbolKind::Method,
            text: interner.intern(&text),
        }
    }

    /// `Method C::F():int32`, for diagnostics and logs.
    pub fn display(&self, interner: &StringInterner) -> String {
        format!("{:?} {}", self.kind, interner.lookup(self.text))
    }
}

impl Compilation {
    /// Key of a symbol of this compilation.
    pub fn key(&self, symbol: SymbolRef) -> SymbolKey {
        let interner = self.interner();
        let owner_text = |owner| interner.lookup(self.ty(owner).qualified);
        match symbol {
            SymbolRef::Type(id) => SymbolKey {
                kind: SymbolKind::Type,
                text: self.ty(id).qualified,
            },
            SymbolRef::Method(id) => {
                let method = self.method(id);
                let params: Vec<Ty> = method.params.iter().map(|p| p.ty.clone()).collect();
                SymbolKey::method(
                    interner,
                    owner_text(method.owner),
                    interner.lookup(method.name),
                    method.generic_params.len(),
                    &params,
                    &method.ret,
                )
            }
            SymbolRef::Field(id) => {
                let field = self.field(id);
                SymbolKey::member(interner, SymbolKind::Field, owner_text(field.owner), interner.lookup(field.name))
            }
            SymbolRef::Property(id) => {
                let property = self.property(id);
                SymbolKey::member(
                    interner,
                    SymbolKind::Property,
                    owner_text(property.owner),
                    interner.lookup(property.name),
                )
            }
            SymbolRef::Event(id) => {
                let event = self.event(id);
                SymbolKey::member(interner, SymbolKind::Event, owner_text(event.owner), interner.lookup(event.name))
            }
        }
    }
}
