//! Types as the front end describes them.

use std::fmt::Write;

use enc_ir::{Name, StringInterner};

/// Built-in types with a dedicated signature element.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Primitive {
    Bool,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Object,
}

impl Primitive {
    pub const fn canonical(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::I1 => "int8",
            Primitive::U1 => "uint8",
            Primitive::I2 => "int16",
            Primitive::U2 => "uint16",
            Primitive::I4 => "int32",
            Primitive::U4 => "uint32",
            Primitive::I8 => "int64",
            Primitive::U8 => "uint64",
            Primitive::R4 => "float32",
            Primitive::R8 => "float64",
            Primitive::String => "string",
            Primitive::Object => "object",
        }
    }

    pub const fn is_value_type(self) -> bool {
        !matches!(self, Primitive::String | Primitive::Object)
    }
}

/// A type reference in a signature, local declaration or expression.
///
/// Nominal types are identified by their canonical qualified name
/// (`Ns.Outer/Inner`), which is stable across compilations and recoverable
/// from metadata.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Ty {
    Void,
    Primitive(Primitive),
    Named(Name),
    Generic { base: Name, args: Vec<Ty> },
    Array(Box<Ty>),
    /// Structurally defined type; identity is the ordered member list.
    Anonymous(AnonymousTypeKey),
    /// Late-bound type. Stored as `object` in signatures.
    Dynamic,
    /// Generic parameter of the declaring type, by position.
    TypeParam(u16),
    /// Generic parameter of the declaring method, by position.
    MethodParam(u16),
}

impl Ty {
    pub const I4: Ty = Ty::Primitive(Primitive::I4);
    pub const STRING: Ty = Ty::Primitive(Primitive::String);
    pub const OBJECT: Ty = Ty::Primitive(Primitive::Object);
    pub const BOOL: Ty = Ty::Primitive(Primitive::Bool);

    /// Append the canonical text used in symbol keys.
    pub fn write_canonical(&self, interner: &StringInterner, out: &mut String) {
        match self {
            Ty::Void => out.push_str("void"),
            Ty::Primitive(p) => out.push_str(p.canonical()),
            Ty::Dynamic => out.push_str("object"),
            Ty::Named(name) => out.push_str(interner.lookup(*name)),
            Ty::Generic { base, args } => {
                out.push_str(interner.lookup(*base));
                out.push('<');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.write_canonical(interner, out);
                }
                out.push('>');
            }
            Ty::Array(element) => {
                element.write_canonical(interner, out);
                out.push_str("[]");
            }
            Ty::Anonymous(key) => key.write_canonical(interner, out),
            Ty::TypeParam(n) => {
                let _ = write!(out, "!{n}");
            }
            Ty::MethodParam(n) => {
                let _ = write!(out, "!!{n}");
            }
        }
    }

    pub fn canonical(&self, interner: &StringInterner) -> String {
        let mut out = String::new();
        self.write_canonical(interner, &mut out);
        out
    }

    /// Call `f` for every anonymous shape inside this type, innermost first.
    pub fn for_each_anonymous<'a>(&'a self, f: &mut impl FnMut(&'a AnonymousTypeKey)) {
        match self {
            Ty::Generic { args, .. } => args.iter().for_each(|a| a.for_each_anonymous(f)),
            Ty::Array(element) => element.for_each_anonymous(f),
            Ty::Anonymous(key) => {
                for member in &key.members {
                    member.ty.for_each_anonymous(f);
                }
                f(key);
            }
            Ty::Void | Ty::Primitive(_) | Ty::Named(_) | Ty::Dynamic | Ty::TypeParam(_) | Ty::MethodParam(_) => {}
        }
    }

    /// Call `f` for every nominal type name inside this type.
    pub fn for_each_named(&self, f: &mut impl FnMut(Name)) {
        match self {
            Ty::Named(name) => f(*name),
            Ty::Generic { base, args } => {
                f(*base);
                args.iter().for_each(|a| a.for_each_named(f));
            }
            Ty::Array(element) => element.for_each_named(f),
            Ty::Anonymous(key) => key.members.iter().for_each(|m| m.ty.for_each_named(f)),
            Ty::Void | Ty::Primitive(_) | Ty::Dynamic | Ty::TypeParam(_) | Ty::MethodParam(_) => {}
        }
    }
}

/// One member of an anonymous type shape.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct AnonymousMember {
    pub name: Name,
    pub ty: Ty,
}

/// Structural key of an anonymous type: the ordered `(name, type)` list.
///
/// `{A, B}` and `{B, A}` are different keys.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct AnonymousTypeKey {
    pub members: Vec<AnonymousMember>,
}

impl AnonymousTypeKey {
    pub fn new(members: impl IntoIterator<Item = (Name, Ty)>) -> Self {
        AnonymousTypeKey {
            members: members
                .into_iter()
                .map(|(name, ty)| AnonymousMember { name, ty })
                .collect(),
        }
    }

    pub fn member(&self, name: Name) -> Option<(usize, &AnonymousMember)> {
        self.members.iter().enumerate().find(|(_, m)| m.name == name)
    }

    pub fn write_canonical(&self, interner: &StringInterner, out: &mut String) {
        out.push('{');
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}:", interner.lookup(member.name));
            member.ty.write_canonical(interner, out);
        }
        out.push('}');
    }
}

/// Compile-time constant: literals, parameter defaults, field values.
///
/// Floats are stored as bits so the type stays `Eq + Hash`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Constant {
    Null,
    Bool(bool),
    I4(i32),
    I8(i64),
    R8(u64),
    String(Name),
}

impl Constant {
    pub fn r8(value: f64) -> Self {
        Constant::R8(value.to_bits())
    }

    pub fn ty(&self) -> Ty {
        match self {
            Constant::Null => Ty::OBJECT,
            Constant::Bool(_) => Ty::BOOL,
            Constant::I4(_) => Ty::I4,
            Constant::I8(_) => Ty::Primitive(Primitive::I8),
            Constant::R8(_) => Ty::Primitive(Primitive::R8),
            Constant::String(_) => Ty::STRING,
        }
    }
}
