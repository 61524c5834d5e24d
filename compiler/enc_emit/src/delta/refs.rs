//! Token resolution and on-demand reference rows.
//!
//! Definitions resolve to rows allocated this generation or to baseline
//! rows. Everything declared elsewhere goes through AssemblyRef, TypeRef
//! and MemberRef rows created the first time a body or signature needs
//! them, deduplicated within the generation.

use rustc_hash::FxHashMap;

use enc_diagnostic::ErrorCode;
use enc_ir::rows::{
    AssemblyRefRow, MemberRefRow, MethodSpecRow, StandAloneSigRow, TypeRefRow, TypeSpecRow,
};
use enc_ir::sig::{encode_field_sig, encode_local_sig, encode_method_spec, MethodSig, TypeSig};
use enc_ir::{BlobId, Handle, Name, StringId, TableIndex};

use crate::body::TokenRef;
use crate::locals::{MethodSlots, SlotType};
use crate::symbols::{AnonymousTypeKey, FieldId, MethodId, Primitive, SymbolRef, Ty, TypeFlags, TypeId};
use crate::EmitError;

use super::Builder;

/// References created this generation.
#[derive(Default)]
pub(super) struct RefCache {
    assemblies: FxHashMap<Name, Handle>,
    types: FxHashMap<Name, Handle>,
    members: FxHashMap<(Handle, StringId, BlobId), Handle>,
    type_specs: FxHashMap<BlobId, Handle>,
    method_specs: FxHashMap<(Handle, BlobId), Handle>,
    signatures: FxHashMap<BlobId, Handle>,
}

/// Core library type backing a primitive in token position.
fn primitive_name(primitive: Primitive) -> &'static str {
    match primitive {
        Primitive::Bool => "Boolean",
        Primitive::Char => "Char",
        Primitive::I1 => "SByte",
        Primitive::U1 => "Byte",
        Primitive::I2 => "Int16",
        Primitive::U2 => "UInt16",
        Primitive::I4 => "Int32",
        Primitive::U4 => "UInt32",
        Primitive::I8 => "Int64",
        Primitive::U8 => "UInt64",
        Primitive::R4 => "Single",
        Primitive::R8 => "Double",
        Primitive::String => "String",
        Primitive::Object => "Object",
    }
}

fn primitive_sig(primitive: Primitive) -> TypeSig {
    match primitive {
        Primitive::Bool => TypeSig::Boolean,
        Primitive::Char => TypeSig::Char,
        Primitive::I1 => TypeSig::I1,
        Primitive::U1 => TypeSig::U1,
        Primitive::I2 => TypeSig::I2,
        Primitive::U2 => TypeSig::U2,
        Primitive::I4 => TypeSig::I4,
        Primitive::U4 => TypeSig::U4,
        Primitive::I8 => TypeSig::I8,
        Primitive::U8 => TypeSig::U8,
        Primitive::R4 => TypeSig::R4,
        Primitive::R8 => TypeSig::R8,
        Primitive::String => TypeSig::String,
        Primitive::Object => TypeSig::Object,
    }
}

fn unresolved(what: impl std::fmt::Display) -> EmitError {
    EmitError::internal(
        ErrorCode::E2002,
        format!("{what} is neither in the baseline nor added by this delta"),
    )
}

impl Builder<'_> {
    /// Next row of `table`, above every row earlier generations used.
    pub(super) fn allocate(&mut self, table: TableIndex) -> Handle {
        let row = self.next.get(table) + 1;
        self.next.set(table, row);
        Handle::new(table, row)
    }

    pub(super) fn string(&mut self, text: &str) -> Result<StringId, EmitError> {
        self.image.heaps.strings.add(text).map_err(|e| EmitError::encoding(&e))
    }

    pub(super) fn name(&mut self, name: Name) -> Result<StringId, EmitError> {
        let text = self.current.interner().lookup(name);
        self.string(text)
    }

    pub(super) fn blob(&mut self, bytes: &[u8]) -> Result<BlobId, EmitError> {
        self.image.heaps.blobs.add(bytes).map_err(|e| EmitError::encoding(&e))
    }

    /// The AssemblyRef every delta carries for its own module.
    pub(super) fn self_reference(&mut self) -> Result<Handle, EmitError> {
        let module = self.current.module();
        self.assembly_ref(module)
    }

    fn assembly_ref(&mut self, module: Name) -> Result<Handle, EmitError> {
        if let Some(&handle) = self.refs.assemblies.get(&module) {
            return Ok(handle);
        }
        let name = self.name(module)?;
        let handle = self.allocate(TableIndex::AssemblyRef);
        self.image.tables.assembly_ref.insert(
            handle.row(),
            AssemblyRefRow {
                major: 0,
                minor: 0,
                build: 0,
                revision: 0,
                flags: 0,
                name,
                culture: StringId::EMPTY,
            },
        );
        self.refs.assemblies.insert(module, handle);
        Ok(handle)
    }

    /// TypeRef to a type of the core library, by namespace-qualified name.
    pub(super) fn core_type(&mut self, namespace: &str, name: &str) -> Result<Handle, EmitError> {
        let interner = self.current.interner().clone();
        let qualified = interner.intern(&format!("{namespace}.{name}"));
        if let Some(&handle) = self.refs.types.get(&qualified) {
            return Ok(handle);
        }
        let core = interner.intern(&self.options.core_library);
        let scope = self.assembly_ref(core)?;
        let row = TypeRefRow {
            resolution_scope: Some(scope),
            name: self.string(name)?,
            namespace: self.string(namespace)?,
        };
        let handle = self.allocate(TableIndex::TypeRef);
        self.image.tables.type_ref.insert(handle.row(), row);
        self.refs.types.insert(qualified, handle);
        Ok(handle)
    }

    /// TypeRef to a type declared by another module.
    fn external_type(&mut self, ty: TypeId) -> Result<Handle, EmitError> {
        let current = self.current;
        let symbol = current.ty(ty);
        if let Some(&handle) = self.refs.types.get(&symbol.qualified) {
            return Ok(handle);
        }
        let scope = match symbol.enclosing {
            Some(outer) => self.external_type(outer)?,
            None => self.assembly_ref(symbol.module)?,
        };
        let row = TypeRefRow {
            resolution_scope: Some(scope),
            name: self.name(symbol.name)?,
            namespace: self.name(symbol.namespace)?,
        };
        let handle = self.allocate(TableIndex::TypeRef);
        self.image.tables.type_ref.insert(handle.row(), row);
        self.refs.types.insert(symbol.qualified, handle);
        Ok(handle)
    }

    /// Row of a definition symbol of this module.
    pub(super) fn definition(&self, symbol: SymbolRef) -> Result<Handle, EmitError> {
        let added = match symbol {
            SymbolRef::Type(id) => self.plan.types.get(&id),
            SymbolRef::Method(id) => self.plan.methods.get(&id),
            SymbolRef::Field(id) => self.plan.field_handles.get(&id),
            SymbolRef::Property(id) => self.plan.property_handles.get(&id),
            SymbolRef::Event(id) => self.plan.event_handles.get(&id),
        };
        if let Some(&handle) = added {
            return Ok(handle);
        }
        let key = self.current.key(symbol);
        self.baseline
            .handle_of(&key)
            .ok_or_else(|| unresolved(key.display(self.current.interner())))
    }

    /// TypeDef or TypeRef of a nominal type.
    fn nominal(&mut self, name: Name) -> Result<(Handle, bool), EmitError> {
        let current = self.current;
        let id = current
            .lookup_type(name)
            .ok_or_else(|| unresolved(format!("type `{}`", current.interner().lookup(name))))?;
        let value_type = current.ty(id).flags.contains(TypeFlags::VALUE_TYPE);
        let handle = if current.is_local(id) {
            self.definition(SymbolRef::Type(id))?
        } else {
            self.external_type(id)?
        };
        Ok((handle, value_type))
    }

    /// TypeDef of an anonymous template, new or inherited.
    pub(super) fn template(&self, key: &AnonymousTypeKey) -> Result<TemplateRows<'_>, EmitError> {
        if let Some(&index) = self.plan.template_by_key.get(key) {
            let template = &self.plan.templates[index];
            return Ok(TemplateRows {
                type_def: template.type_def,
                constructor: template.constructor,
                getters: &template.getters,
                fields: &template.fields,
            });
        }
        let template = self.baseline.anonymous_types().get(key).ok_or_else(|| {
            EmitError::internal(
                ErrorCode::E2005,
                format!(
                    "anonymous type {} was never resolved",
                    Ty::Anonymous(key.clone()).canonical(self.current.interner())
                ),
            )
        })?;
        Ok(TemplateRows {
            type_def: template.type_def,
            constructor: template.constructor,
            getters: &template.getters,
            fields: &template.fields,
        })
    }

    pub(super) fn type_sig(&mut self, ty: &Ty) -> Result<TypeSig, EmitError> {
        Ok(match ty {
            Ty::Void => TypeSig::Void,
            Ty::Primitive(p) => primitive_sig(*p),
            Ty::Dynamic => TypeSig::Object,
            Ty::Named(name) => match self.nominal(*name)? {
                (handle, true) => TypeSig::ValueType(handle),
                (handle, false) => TypeSig::Class(handle),
            },
            Ty::Generic { base, args } => {
                let (base, value_type) = self.nominal(*base)?;
                let args = args.iter().map(|a| self.type_sig(a)).collect::<Result<_, _>>()?;
                TypeSig::GenericInst {
                    value_type,
                    base,
                    args,
                }
            }
            Ty::Array(element) => TypeSig::SzArray(Box::new(self.type_sig(element)?)),
            Ty::Anonymous(key) => TypeSig::Class(self.template(key)?.type_def),
            Ty::TypeParam(number) => TypeSig::Var(u32::from(*number)),
            Ty::MethodParam(number) => TypeSig::MVar(u32::from(*number)),
        })
    }

    /// TypeDefOrRef handle for a type in token position.
    pub(super) fn type_handle(&mut self, ty: &Ty) -> Result<Handle, EmitError> {
        match ty {
            Ty::Primitive(p) => self.core_type("System", primitive_name(*p)),
            Ty::Dynamic => self.core_type("System", "Object"),
            Ty::Named(name) => Ok(self.nominal(*name)?.0),
            Ty::Anonymous(key) => Ok(self.template(key)?.type_def),
            Ty::Generic { .. } | Ty::Array(_) | Ty::TypeParam(_) | Ty::MethodParam(_) => {
                let sig = self.type_sig(ty)?;
                let mut bytes = Vec::new();
                sig.encode(&mut bytes).map_err(|e| EmitError::encoding(&e))?;
                let signature = self.blob(&bytes)?;
                if let Some(&handle) = self.refs.type_specs.get(&signature) {
                    return Ok(handle);
                }
                let handle = self.allocate(TableIndex::TypeSpec);
                self.image.tables.type_spec.insert(handle.row(), TypeSpecRow { signature });
                self.refs.type_specs.insert(signature, handle);
                Ok(handle)
            }
            Ty::Void => Err(EmitError::internal(ErrorCode::E2005, "`void` has no type token")),
        }
    }

    pub(super) fn method_sig(&mut self, has_this: bool, params: &[Ty], ret: &Ty) -> Result<BlobId, EmitError> {
        self.generic_method_sig(has_this, 0, params, ret)
    }

    fn generic_method_sig(
        &mut self,
        has_this: bool,
        generic_params: u32,
        params: &[Ty],
        ret: &Ty,
    ) -> Result<BlobId, EmitError> {
        let sig = MethodSig {
            has_this,
            generic_params,
            ret: self.type_sig(ret)?,
            params: params.iter().map(|p| self.type_sig(p)).collect::<Result<_, _>>()?,
        };
        let bytes = sig.encode().map_err(|e| EmitError::encoding(&e))?;
        self.blob(&bytes)
    }

    pub(super) fn symbol_method_sig(&mut self, method: MethodId) -> Result<BlobId, EmitError> {
        let current = self.current;
        let symbol = current.method(method);
        let params: Vec<Ty> = symbol.params.iter().map(|p| p.ty.clone()).collect();
        let generic_params = EmitError::narrow(symbol.generic_params.len(), "generic parameter count")?;
        self.generic_method_sig(!symbol.is_static(), generic_params, &params, &symbol.ret)
    }

    fn member_ref(&mut self, parent: Handle, name: &str, signature: BlobId) -> Result<Handle, EmitError> {
        let name = self.string(name)?;
        if let Some(&handle) = self.refs.members.get(&(parent, name, signature)) {
            return Ok(handle);
        }
        let handle = self.allocate(TableIndex::MemberRef);
        self.image.tables.member_ref.insert(
            handle.row(),
            MemberRefRow {
                parent,
                name,
                signature,
            },
        );
        self.refs.members.insert((parent, name, signature), handle);
        Ok(handle)
    }

    /// Instance `.ctor()` of a core library type.
    fn core_constructor(&mut self, name: &str) -> Result<Handle, EmitError> {
        let parent = self.core_type("System", name)?;
        let signature = self.method_sig(true, &[], &Ty::Void)?;
        self.member_ref(parent, ".ctor", signature)
    }

    /// MethodDef, MemberRef or (with type arguments) MethodSpec.
    pub(super) fn method_handle(&mut self, method: MethodId, type_args: &[Ty]) -> Result<Handle, EmitError> {
        let current = self.current;
        let symbol = current.method(method);
        let base = if current.is_local(symbol.owner) {
            self.definition(SymbolRef::Method(method))?
        } else {
            let parent = self.external_type(symbol.owner)?;
            let signature = self.symbol_method_sig(method)?;
            self.member_ref(parent, current.interner().lookup(symbol.name), signature)?
        };
        if type_args.is_empty() {
            return Ok(base);
        }

        let args = type_args.iter().map(|t| self.type_sig(t)).collect::<Result<Vec<_>, _>>()?;
        let bytes = encode_method_spec(&args).map_err(|e| EmitError::encoding(&e))?;
        let instantiation = self.blob(&bytes)?;
        if let Some(&handle) = self.refs.method_specs.get(&(base, instantiation)) {
            return Ok(handle);
        }
        let handle = self.allocate(TableIndex::MethodSpec);
        self.image.tables.method_spec.insert(
            handle.row(),
            MethodSpecRow {
                method: base,
                instantiation,
            },
        );
        self.refs.method_specs.insert((base, instantiation), handle);
        Ok(handle)
    }

    fn field_handle(&mut self, field: FieldId) -> Result<Handle, EmitError> {
        let current = self.current;
        let symbol = current.field(field);
        if current.is_local(symbol.owner) {
            return self.definition(SymbolRef::Field(field));
        }
        let parent = self.external_type(symbol.owner)?;
        let sig = self.type_sig(&symbol.ty)?;
        let bytes = encode_field_sig(&sig).map_err(|e| EmitError::encoding(&e))?;
        let signature = self.blob(&bytes)?;
        self.member_ref(parent, current.interner().lookup(symbol.name), signature)
    }

    /// Token value of an instruction operand.
    pub(super) fn token(&mut self, token: &TokenRef) -> Result<u32, EmitError> {
        let member = |rows: &[Handle], index: u16| {
            rows.get(usize::from(index))
                .copied()
                .ok_or_else(|| EmitError::internal(ErrorCode::E2005, format!("anonymous type has no member {index}")))
        };
        let handle = match token {
            TokenRef::Method { method, type_args } => self.method_handle(*method, type_args)?,
            TokenRef::Field(field) => self.field_handle(*field)?,
            TokenRef::Type(ty) => self.type_handle(ty)?,
            TokenRef::String(text) => {
                let text = self.current.interner().lookup(*text);
                let id = self.image.heaps.user_strings.add(text).map_err(|e| EmitError::encoding(&e))?;
                return Ok(id.token());
            }
            TokenRef::AnonymousConstructor(key) => self.template(key)?.constructor,
            TokenRef::AnonymousGetter(key, index) => member(self.template(key)?.getters, *index)?,
            TokenRef::AnonymousField(key, index) => member(self.template(key)?.fields, *index)?,
            TokenRef::ObjectConstructor => self.core_constructor("Object")?,
            TokenRef::MissingMethodConstructor => self.core_constructor("MissingMethodException")?,
        };
        Ok(handle.token())
    }

    /// StandAloneSig row for a slot table, shared by identical tables.
    pub(super) fn local_signature(&mut self, slots: &MethodSlots) -> Result<Option<Handle>, EmitError> {
        if slots.is_empty() {
            return Ok(None);
        }
        let types = slots
            .slots()
            .iter()
            .map(|slot| match &slot.ty {
                SlotType::Known(ty) => self.type_sig(ty),
                SlotType::Unresolved => Ok(TypeSig::Object),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let bytes = encode_local_sig(&types).map_err(|e| EmitError::encoding(&e))?;
        let signature = self.blob(&bytes)?;
        if let Some(&handle) = self.refs.signatures.get(&signature) {
            return Ok(Some(handle));
        }
        let handle = self.allocate(TableIndex::StandAloneSig);
        self.image.tables.stand_alone_sig.insert(handle.row(), StandAloneSigRow { signature });
        self.refs.signatures.insert(signature, handle);
        Ok(Some(handle))
    }
}

/// Rows of one anonymous template.
pub(super) struct TemplateRows<'a> {
    pub type_def: Handle,
    pub constructor: Handle,
    pub getters: &'a [Handle],
    pub fields: &'a [Handle],
}
