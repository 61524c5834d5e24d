//! Compilations and their symbol arenas.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use enc_ir::{Name, SharedInterner, Span};

use super::{
    Body, Constant, EventId, FieldId, MethodId, PropertyId, SymbolKey, SymbolRef, Ty, TypeId,
};

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TypeFlags: u32 {
        const PUBLIC = 1 << 0;
        const SEALED = 1 << 1;
        const ABSTRACT = 1 << 2;
        const VALUE_TYPE = 1 << 3;
        const INTERFACE = 1 << 4;
        /// Interop type embedded by value from another module. Such types
        /// have no stable identity across generations.
        const EMBEDDED_INTEROP = 1 << 5;
    }
}

bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct MethodFlags: u32 {
        const PUBLIC = 1 << 0;
        const STATIC = 1 << 1;
        const VIRTUAL = 1 << 2;
        const SPECIAL_NAME = 1 << 3;
    }
}

#[derive(Clone, Debug)]
pub struct TypeSymbol {
    pub name: Name,
    pub namespace: Name,
    /// `Ns.Outer/Inner`.
    pub qualified: Name,
    /// Declaring module.
    pub module: Name,
    pub flags: TypeFlags,
    pub enclosing: Option<TypeId>,
    pub base: Option<Ty>,
    /// Generic parameter names; [`Ty::TypeParam`] indexes this list.
    pub generic_params: Vec<Name>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub properties: Vec<PropertyId>,
    pub events: Vec<EventId>,
    pub nested: Vec<TypeId>,
    pub attributes: Vec<AttributeData>,
    pub span: Span,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MethodKind {
    Ordinary,
    Constructor,
    Getter(PropertyId),
    Setter(PropertyId),
    Adder(EventId),
    Remover(EventId),
}

#[derive(Clone, Debug)]
pub struct MethodSymbol {
    pub name: Name,
    pub owner: TypeId,
    pub params: Vec<ParamSymbol>,
    pub ret: Ty,
    /// Generic parameter names; [`Ty::MethodParam`] indexes this list.
    pub generic_params: Vec<Name>,
    /// Interface methods this method implements explicitly.
    pub implements: Vec<MethodId>,
    pub return_attributes: Vec<AttributeData>,
    pub attributes: Vec<AttributeData>,
    pub flags: MethodFlags,
    pub kind: MethodKind,
    /// `None` for abstract and external methods.
    pub body: Option<Body>,
    pub span: Span,
}

impl MethodSymbol {
    #[inline]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }
}

#[derive(Clone, Debug)]
pub struct ParamSymbol {
    pub name: Name,
    pub ty: Ty,
    pub default: Option<Constant>,
    pub attributes: Vec<AttributeData>,
}

#[derive(Clone, Debug)]
pub struct FieldSymbol {
    pub name: Name,
    pub owner: TypeId,
    pub ty: Ty,
    pub is_static: bool,
    /// Literal value; makes the field a compile-time constant.
    pub constant: Option<Constant>,
    pub attributes: Vec<AttributeData>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct PropertySymbol {
    pub name: Name,
    pub owner: TypeId,
    pub ty: Ty,
    pub getter: Option<MethodId>,
    pub setter: Option<MethodId>,
    pub attributes: Vec<AttributeData>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct EventSymbol {
    pub name: Name,
    pub owner: TypeId,
    pub ty: Ty,
    pub adder: Option<MethodId>,
    pub remover: Option<MethodId>,
    pub attributes: Vec<AttributeData>,
    pub span: Span,
}

/// Custom attribute application with positional arguments.
#[derive(Clone, Debug)]
pub struct AttributeData {
    pub constructor: MethodId,
    pub args: Vec<Constant>,
}

/// One module's worth of symbols, plus the external symbols it references.
#[derive(Clone, Debug)]
pub struct Compilation {
    module: Name,
    interner: SharedInterner,
    types: Vec<TypeSymbol>,
    methods: Vec<MethodSymbol>,
    fields: Vec<FieldSymbol>,
    properties: Vec<PropertySymbol>,
    events: Vec<EventSymbol>,
    types_by_name: FxHashMap<Name, TypeId>,
    by_key: FxHashMap<SymbolKey, SymbolRef>,
}

impl Compilation {
    #[inline]
    pub fn module(&self) -> Name {
        self.module
    }

    #[inline]
    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    /// The symbol's declaring type lives in this module.
    pub fn is_local(&self, ty: TypeId) -> bool {
        self.ty(ty).module == self.module
    }

    pub fn ty(&self, id: TypeId) -> &TypeSymbol {
        &self.types[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &MethodSymbol {
        &self.methods[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldSymbol {
        &self.fields[id.index()]
    }

    pub fn property(&self, id: PropertyId) -> &PropertySymbol {
        &self.properties[id.index()]
    }

    pub fn event(&self, id: EventId) -> &EventSymbol {
        &self.events[id.index()]
    }

    /// Types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeSymbol)> + '_ {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId::from_raw(raw_index(i)), t))
    }

    pub fn lookup_type(&self, qualified: Name) -> Option<TypeId> {
        self.types_by_name.get(&qualified).copied()
    }

    /// Resolve a stable key to this compilation's symbol.
    pub fn resolve(&self, key: &SymbolKey) -> Option<SymbolRef> {
        self.by_key.get(key).copied()
    }

    /// Type that declares a symbol (the symbol itself for types).
    pub fn owner_of(&self, symbol: SymbolRef) -> TypeId {
        match symbol {
            SymbolRef::Type(id) => id,
            SymbolRef::Method(id) => self.method(id).owner,
            SymbolRef::Field(id) => self.field(id).owner,
            SymbolRef::Property(id) => self.property(id).owner,
            SymbolRef::Event(id) => self.event(id).owner,
        }
    }

    pub fn span_of(&self, symbol: SymbolRef) -> Span {
        match symbol {
            SymbolRef::Type(id) => self.ty(id).span,
            SymbolRef::Method(id) => self.method(id).span,
            SymbolRef::Field(id) => self.field(id).span,
            SymbolRef::Property(id) => self.property(id).span,
            SymbolRef::Event(id) => self.event(id).span,
        }
    }

    /// Display text of a symbol for diagnostics.
    pub fn describe(&self, symbol: SymbolRef) -> &'static str {
        self.interner.lookup(self.key(symbol).text)
    }
}

#[expect(clippy::cast_possible_truncation, reason = "arena sizes are bounded by u32 ids")]
fn raw_index(index: usize) -> u32 {
    index as u32
}

/// Incrementally assembles a [`Compilation`].
///
/// Accessor methods for properties and events are created along with them;
/// bodies are attached afterwards through [`CompilationBuilder::method_mut`].
pub struct CompilationBuilder {
    compilation: Compilation,
}

impl CompilationBuilder {
    pub fn new(interner: SharedInterner, module: &str) -> Self {
        let module = interner.intern(module);
        CompilationBuilder {
            compilation: Compilation {
                module,
                interner,
                types: Vec::new(),
                methods: Vec::new(),
                fields: Vec::new(),
                properties: Vec::new(),
                events: Vec::new(),
                types_by_name: FxHashMap::default(),
                by_key: FxHashMap::default(),
            },
        }
    }

    pub fn intern(&self, text: &str) -> Name {
        self.compilation.interner.intern(text)
    }

    pub fn module(&self) -> Name {
        self.compilation.module
    }

    fn push_type(&mut self, module: Name, namespace: &str, name: &str, enclosing: Option<TypeId>) -> TypeId {
        let interner = &self.compilation.interner;
        let qualified = match enclosing {
            Some(outer) => {
                let outer = interner.lookup(self.compilation.ty(outer).qualified);
                interner.intern(&format!("{outer}/{name}"))
            }
            None if namespace.is_empty() => interner.intern(name),
            None => interner.intern(&format!("{namespace}.{name}")),
        };
        let id = TypeId::from_raw(raw_index(self.compilation.types.len()));
        self.compilation.types.push(TypeSymbol {
            name: interner.intern(name),
            namespace: interner.intern(namespace),
            qualified,
            module,
            flags: TypeFlags::PUBLIC,
            enclosing,
            base: None,
            generic_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            nested: Vec::new(),
            attributes: Vec::new(),
            span: Span::DUMMY,
        });
        if let Some(outer) = enclosing {
            self.compilation.types[outer.index()].nested.push(id);
        }
        self.compilation.types_by_name.insert(qualified, id);
        id
    }

    /// Type declared in this module.
    pub fn define_type(&mut self, namespace: &str, name: &str) -> TypeId {
        let module = self.compilation.module;
        self.push_type(module, namespace, name, None)
    }

    pub fn define_nested(&mut self, enclosing: TypeId, name: &str) -> TypeId {
        let module = self.compilation.ty(enclosing).module;
        self.push_type(module, "", name, Some(enclosing))
    }

    /// Type declared by another module.
    pub fn external_type(&mut self, module: &str, namespace: &str, name: &str) -> TypeId {
        let module = self.intern(module);
        self.push_type(module, namespace, name, None)
    }

    pub fn type_mut(&mut self, id: TypeId) -> &mut TypeSymbol {
        &mut self.compilation.types[id.index()]
    }

    fn push_method(&mut self, owner: TypeId, name: &str, params: &[(&str, Ty)], ret: Ty, kind: MethodKind) -> MethodId {
        let id = MethodId::from_raw(raw_index(self.compilation.methods.len()));
        let params = params
            .iter()
            .map(|(name, ty)| ParamSymbol {
                name: self.intern(name),
                ty: ty.clone(),
                default: None,
                attributes: Vec::new(),
            })
            .collect();
        let flags = match kind {
            MethodKind::Ordinary => MethodFlags::PUBLIC,
            _ => MethodFlags::PUBLIC | MethodFlags::SPECIAL_NAME,
        };
        self.compilation.methods.push(MethodSymbol {
            name: self.intern(name),
            owner,
            params,
            ret,
            generic_params: Vec::new(),
            implements: Vec::new(),
            return_attributes: Vec::new(),
            attributes: Vec::new(),
            flags,
            kind,
            body: None,
            span: Span::DUMMY,
        });
        self.compilation.types[owner.index()].methods.push(id);
        id
    }

    /// Public instance method without a body.
    pub fn define_method(&mut self, owner: TypeId, name: &str, params: &[(&str, Ty)], ret: Ty) -> MethodId {
        self.push_method(owner, name, params, ret, MethodKind::Ordinary)
    }

    pub fn define_constructor(&mut self, owner: TypeId, params: &[(&str, Ty)]) -> MethodId {
        self.push_method(owner, ".ctor", params, Ty::Void, MethodKind::Constructor)
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodSymbol {
        &mut self.compilation.methods[id.index()]
    }

    pub fn define_field(&mut self, owner: TypeId, name: &str, ty: Ty) -> FieldId {
        let id = FieldId::from_raw(raw_index(self.compilation.fields.len()));
        self.compilation.fields.push(FieldSymbol {
            name: self.intern(name),
            owner,
            ty,
            is_static: false,
            constant: None,
            attributes: Vec::new(),
            span: Span::DUMMY,
        });
        self.compilation.types[owner.index()].fields.push(id);
        id
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldSymbol {
        &mut self.compilation.fields[id.index()]
    }

    /// Property with a `get_{name}` accessor and, optionally, `set_{name}`.
    pub fn define_property(&mut self, owner: TypeId, name: &str, ty: Ty, setter: bool) -> PropertyId {
        let id = PropertyId::from_raw(raw_index(self.compilation.properties.len()));
        let getter = self.push_method(owner, &format!("get_{name}"), &[], ty.clone(), MethodKind::Getter(id));
        let setter = setter.then(|| {
            self.push_method(owner, &format!("set_{name}"), &[("value", ty.clone())], Ty::Void, MethodKind::Setter(id))
        });
        self.compilation.properties.push(PropertySymbol {
            name: self.intern(name),
            owner,
            ty,
            getter: Some(getter),
            setter,
            attributes: Vec::new(),
            span: Span::DUMMY,
        });
        self.compilation.types[owner.index()].properties.push(id);
        id
    }

    pub fn property_mut(&mut self, id: PropertyId) -> &mut PropertySymbol {
        &mut self.compilation.properties[id.index()]
    }

    /// Event with `add_{name}` and `remove_{name}` accessors.
    pub fn define_event(&mut self, owner: TypeId, name: &str, ty: Ty) -> EventId {
        let id = EventId::from_raw(raw_index(self.compilation.events.len()));
        let params = [("value", ty.clone())];
        let adder = self.push_method(owner, &format!("add_{name}"), &params, Ty::Void, MethodKind::Adder(id));
        let remover = self.push_method(owner, &format!("remove_{name}"), &params, Ty::Void, MethodKind::Remover(id));
        self.compilation.events.push(EventSymbol {
            name: self.intern(name),
            owner,
            ty,
            adder: Some(adder),
            remover: Some(remover),
            attributes: Vec::new(),
            span: Span::DUMMY,
        });
        self.compilation.types[owner.index()].events.push(id);
        id
    }

    pub fn event_mut(&mut self, id: EventId) -> &mut EventSymbol {
        &mut self.compilation.events[id.index()]
    }

    /// Finish, indexing every symbol by key.
    pub fn build(mut self) -> Compilation {
        let c = &self.compilation;
        let symbols = (0..c.types.len())
            .map(|i| SymbolRef::Type(TypeId::from_raw(raw_index(i))))
            .chain((0..c.methods.len()).map(|i| SymbolRef::Method(MethodId::from_raw(raw_index(i)))))
            .chain((0..c.fields.len()).map(|i| SymbolRef::Field(FieldId::from_raw(raw_index(i)))))
            .chain((0..c.properties.len()).map(|i| SymbolRef::Property(PropertyId::from_raw(raw_index(i)))))
            .chain((0..c.events.len()).map(|i| SymbolRef::Event(EventId::from_raw(raw_index(i)))));
        let by_key = symbols.map(|s| (c.key(s), s)).collect();
        self.compilation.by_key = by_key;
        self.compilation
    }
}
