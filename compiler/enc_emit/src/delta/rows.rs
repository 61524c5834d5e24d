//! Definition rows: allocation in full-build order, then the rows
//! themselves.
//!
//! Row numbers are fixed before any body is encoded, so tokens can point
//! at definitions whose rows are written afterwards. New TypeDefs come
//! first (anonymous templates, then inserted types breadth-first), then
//! members ordered by `(owner row, declaration index)`, then parameters
//! ordered by `(method row, sequence)`. Generic parameters and explicit
//! implementations of new definitions are appended while rows are written.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use enc_diagnostic::ErrorCode;
use enc_ir::rows::{
    semantics, ConstantRow, CustomAttributeRow, EventMapRow, EventRow, FieldRow, GenericParamRow, MethodDefRow,
    MethodImplRow, MethodSemanticsRow, NestedClassRow, ParamRow, PropertyMapRow, PropertyRow, TypeDefRow,
};
use enc_ir::sig::{encode_field_sig, encode_property_sig};
use enc_ir::{BlobId, Handle, Name, TableIndex};

use crate::anonymous::{template_field_name, template_name, PendingTemplate};
use crate::classify::{ClassifiedEdit, MemberOp};
use crate::symbols::{
    AnonymousMember, AttributeData, Constant, EventId, FieldId, MethodFlags, MethodId, MethodKind, PropertyId, SymbolRef, Ty,
    TypeFlags, TypeId,
};
use crate::EmitError;

use super::{Builder, PlannedTemplate};

mod flags {
    pub const TYPE_PUBLIC: u32 = 0x0001;
    pub const TYPE_NESTED_PUBLIC: u32 = 0x0002;
    pub const TYPE_NESTED_PRIVATE: u32 = 0x0003;
    pub const TYPE_INTERFACE: u32 = 0x0020;
    pub const TYPE_ABSTRACT: u32 = 0x0080;
    pub const TYPE_SEALED: u32 = 0x0100;

    pub const FIELD_PRIVATE: u16 = 0x0001;
    pub const FIELD_PUBLIC: u16 = 0x0006;
    pub const FIELD_STATIC: u16 = 0x0010;
    pub const FIELD_INIT_ONLY: u16 = 0x0020;
    pub const FIELD_LITERAL: u16 = 0x0040;
    pub const FIELD_HAS_DEFAULT: u16 = 0x8000;

    pub const METHOD_PRIVATE: u16 = 0x0001;
    pub const METHOD_PUBLIC: u16 = 0x0006;
    pub const METHOD_STATIC: u16 = 0x0010;
    pub const METHOD_VIRTUAL: u16 = 0x0040;
    pub const METHOD_HIDE_BY_SIG: u16 = 0x0080;
    pub const METHOD_ABSTRACT: u16 = 0x0400;
    pub const METHOD_SPECIAL_NAME: u16 = 0x0800;
    pub const METHOD_RT_SPECIAL_NAME: u16 = 0x1000;

    pub const PARAM_OPTIONAL: u16 = 0x0010;
    pub const PARAM_HAS_DEFAULT: u16 = 0x1000;
}

/// Element types of Constant rows.
mod constant_kind {
    pub const BOOLEAN: u8 = 0x02;
    pub const I4: u8 = 0x08;
    pub const I8: u8 = 0x0A;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const CLASS: u8 = 0x12;
}

#[derive(Copy, Clone, Debug)]
pub(super) enum FieldSource {
    Symbol(FieldId),
    Template(usize, u16),
}

#[derive(Copy, Clone, Debug)]
pub(super) enum MethodSource {
    Symbol(MethodId),
    TemplateConstructor(usize),
    TemplateGetter(usize, u16),
}

#[derive(Copy, Clone, Debug)]
pub(super) enum PropertySource {
    Symbol(PropertyId),
    Template(usize, u16),
}

#[derive(Copy, Clone, Debug)]
pub(super) enum ParamSource {
    /// Sequence 0 is the return value.
    Symbol { method: MethodId, sequence: u16 },
    Template { template: usize, member: u16 },
}

/// Every definition row this generation adds, in row order per table.
#[derive(Default)]
pub(super) struct Layout {
    pub types: Vec<(TypeId, Handle)>,
    pub fields: Vec<(FieldSource, Handle)>,
    pub methods: Vec<(MethodSource, Handle)>,
    pub properties: Vec<(PropertySource, Handle)>,
    pub events: Vec<(EventId, Handle)>,
    pub params: Vec<(ParamSource, Handle)>,
    /// `(owner TypeDef, map)` for maps created this generation.
    pub property_maps: Vec<(Handle, Handle)>,
    pub event_maps: Vec<(Handle, Handle)>,
    /// New member row -> the row it is attached to.
    pub owners: FxHashMap<Handle, Handle>,
}

impl Layout {
    /// Symbols of the current compilation that received a new row.
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolRef, Handle)> + '_ {
        let types = self.types.iter().map(|&(id, h)| (SymbolRef::Type(id), h));
        let fields = self.fields.iter().filter_map(|&(source, h)| match source {
            FieldSource::Symbol(id) => Some((SymbolRef::Field(id), h)),
            FieldSource::Template(..) => None,
        });
        let methods = self.methods.iter().filter_map(|&(source, h)| match source {
            MethodSource::Symbol(id) => Some((SymbolRef::Method(id), h)),
            _ => None,
        });
        let properties = self.properties.iter().filter_map(|&(source, h)| match source {
            PropertySource::Symbol(id) => Some((SymbolRef::Property(id), h)),
            PropertySource::Template(..) => None,
        });
        let events = self.events.iter().map(|&(id, h)| (SymbolRef::Event(id), h));
        types.chain(fields).chain(methods).chain(properties).chain(events)
    }
}

fn member_index(index: usize) -> Result<u16, EmitError> {
    EmitError::narrow(index, "member index")
}

fn position<T: PartialEq>(list: &[T], item: &T) -> usize {
    list.iter().position(|x| x == item).unwrap_or(list.len())
}

/// Sort key for a member: owner row, then declaration index.
type Slot<S> = (u32, usize, S);

impl Builder<'_> {
    /// Allocate every definition row of the batch.
    pub(super) fn allocate_definitions(
        &mut self,
        classified: &[ClassifiedEdit],
        pending: Vec<PendingTemplate>,
    ) -> Result<Layout, EmitError> {
        let mut layout = Layout::default();
        self.allocate_types(classified, pending, &mut layout);

        let mut fields: Vec<Slot<FieldSource>> = Vec::new();
        let mut methods: Vec<Slot<MethodSource>> = Vec::new();
        let mut properties: Vec<Slot<PropertySource>> = Vec::new();
        let mut events: Vec<Slot<EventId>> = Vec::new();

        for (t, template) in self.plan.templates.iter().enumerate() {
            let row = template.type_def.row();
            methods.push((row, 0, MethodSource::TemplateConstructor(t)));
            for i in 0..template.key.members.len() {
                let member = member_index(i)?;
                fields.push((row, i, FieldSource::Template(t, member)));
                methods.push((row, i + 1, MethodSource::TemplateGetter(t, member)));
                properties.push((row, i, PropertySource::Template(t, member)));
            }
        }

        let current = self.current;
        for edit in classified {
            match *edit {
                ClassifiedEdit::FieldEdit {
                    field,
                    op: MemberOp::Insert,
                } => {
                    let owner = current.field(field).owner;
                    let row = self.definition(SymbolRef::Type(owner))?.row();
                    fields.push((row, position(&current.ty(owner).fields, &field), FieldSource::Symbol(field)));
                }
                ClassifiedEdit::MethodEdit {
                    method,
                    op: MemberOp::Insert,
                    ..
                } => {
                    let owner = current.method(method).owner;
                    let row = self.definition(SymbolRef::Type(owner))?.row();
                    methods.push((row, position(&current.ty(owner).methods, &method), MethodSource::Symbol(method)));
                }
                ClassifiedEdit::PropertyEdit {
                    property,
                    op: MemberOp::Insert,
                } => {
                    let owner = current.property(property).owner;
                    let row = self.definition(SymbolRef::Type(owner))?.row();
                    let index = position(&current.ty(owner).properties, &property);
                    properties.push((row, index, PropertySource::Symbol(property)));
                }
                ClassifiedEdit::EventEdit {
                    event,
                    op: MemberOp::Insert,
                } => {
                    let owner = current.event(event).owner;
                    let row = self.definition(SymbolRef::Type(owner))?.row();
                    events.push((row, position(&current.ty(owner).events, &event), event));
                }
                _ => {}
            }
        }

        fields.sort_by_key(|&(row, index, _)| (row, index));
        methods.sort_by_key(|&(row, index, _)| (row, index));
        properties.sort_by_key(|&(row, index, _)| (row, index));
        events.sort_by_key(|&(row, index, _)| (row, index));

        for (owner, _, source) in fields {
            let handle = self.allocate(TableIndex::Field);
            layout.owners.insert(handle, Handle::new(TableIndex::TypeDef, owner));
            match source {
                FieldSource::Symbol(id) => {
                    self.plan.field_handles.insert(id, handle);
                }
                FieldSource::Template(t, _) => self.plan.templates[t].fields.push(handle),
            }
            layout.fields.push((source, handle));
        }

        for (owner, _, source) in methods {
            let handle = self.allocate(TableIndex::MethodDef);
            layout.owners.insert(handle, Handle::new(TableIndex::TypeDef, owner));
            match source {
                MethodSource::Symbol(id) => {
                    self.plan.methods.insert(id, handle);
                }
                MethodSource::TemplateConstructor(t) => self.plan.templates[t].constructor = handle,
                MethodSource::TemplateGetter(t, _) => self.plan.templates[t].getters.push(handle),
            }
            layout.methods.push((source, handle));
        }

        for (owner, _, source) in properties {
            let map = self.property_map(Handle::new(TableIndex::TypeDef, owner), &mut layout);
            let handle = self.allocate(TableIndex::Property);
            layout.owners.insert(handle, map);
            if let PropertySource::Symbol(id) = source {
                self.plan.property_handles.insert(id, handle);
            }
            layout.properties.push((source, handle));
        }

        for (owner, _, event) in events {
            let map = self.event_map(Handle::new(TableIndex::TypeDef, owner), &mut layout);
            let handle = self.allocate(TableIndex::Event);
            layout.owners.insert(handle, map);
            self.plan.event_handles.insert(event, handle);
            layout.events.push((event, handle));
        }

        self.allocate_params(&mut layout)?;
        Ok(layout)
    }

    /// TypeDefs: templates in first-use order, then inserted types
    /// breadth-first in declaration order.
    fn allocate_types(&mut self, classified: &[ClassifiedEdit], pending: Vec<PendingTemplate>, layout: &mut Layout) {
        for template in pending {
            let type_def = self.allocate(TableIndex::TypeDef);
            self.plan.template_by_key.insert(template.key.clone(), self.plan.templates.len());
            self.plan.templates.push(PlannedTemplate {
                key: template.key,
                index: template.index,
                type_def,
                constructor: Handle::nil(TableIndex::MethodDef),
                getters: Vec::new(),
                fields: Vec::new(),
            });
        }

        let inserted: FxHashSet<TypeId> = classified
            .iter()
            .filter_map(|edit| match *edit {
                ClassifiedEdit::TypeInsert(ty) => Some(ty),
                _ => None,
            })
            .collect();
        let current = self.current;
        let mut queue: VecDeque<TypeId> = current
            .types()
            .filter(|(id, symbol)| {
                inserted.contains(id) && !symbol.enclosing.is_some_and(|outer| inserted.contains(&outer))
            })
            .map(|(id, _)| id)
            .collect();
        while let Some(ty) = queue.pop_front() {
            let handle = self.allocate(TableIndex::TypeDef);
            self.plan.types.insert(ty, handle);
            layout.types.push((ty, handle));
            queue.extend(current.ty(ty).nested.iter().copied().filter(|n| inserted.contains(n)));
        }
    }

    fn property_map(&mut self, owner: Handle, layout: &mut Layout) -> Handle {
        if let Some(map) = self.baseline.property_map(owner) {
            return map;
        }
        if let Some(&(_, map)) = layout.property_maps.iter().find(|(o, _)| *o == owner) {
            return map;
        }
        let map = self.allocate(TableIndex::PropertyMap);
        layout.property_maps.push((owner, map));
        map
    }

    fn event_map(&mut self, owner: Handle, layout: &mut Layout) -> Handle {
        if let Some(map) = self.baseline.event_map(owner) {
            return map;
        }
        if let Some(&(_, map)) = layout.event_maps.iter().find(|(o, _)| *o == owner) {
            return map;
        }
        let map = self.allocate(TableIndex::EventMap);
        layout.event_maps.push((owner, map));
        map
    }

    /// Parameters of new methods, by method row then sequence. A return
    /// value row exists only when the return position has attributes.
    fn allocate_params(&mut self, layout: &mut Layout) -> Result<(), EmitError> {
        let current = self.current;
        let mut params = Vec::new();
        for &(source, method) in &layout.methods {
            match source {
                MethodSource::Symbol(id) => {
                    let symbol = current.method(id);
                    if !symbol.return_attributes.is_empty() {
                        params.push((method, ParamSource::Symbol { method: id, sequence: 0 }));
                    }
                    for i in 0..symbol.params.len() {
                        let sequence = member_index(i + 1)?;
                        params.push((method, ParamSource::Symbol { method: id, sequence }));
                    }
                }
                MethodSource::TemplateConstructor(t) => {
                    for i in 0..self.plan.templates[t].key.members.len() {
                        let member = member_index(i)?;
                        params.push((method, ParamSource::Template { template: t, member }));
                    }
                }
                MethodSource::TemplateGetter(..) => {}
            }
        }
        for (method, source) in params {
            let handle = self.allocate(TableIndex::Param);
            layout.owners.insert(handle, method);
            layout.params.push((source, handle));
        }
        Ok(())
    }

    /// Write every row allocated by [`Builder::allocate_definitions`],
    /// plus the Constant, CustomAttribute, MethodSemantics, NestedClass,
    /// MethodImpl and GenericParam rows that hang off them. Returns the new
    /// MethodDef rows.
    pub(super) fn write_definitions(
        &mut self,
        layout: &Layout,
        offsets: &FxHashMap<Handle, u32>,
    ) -> Result<Vec<(Handle, MethodDefRow)>, EmitError> {
        let current = self.current;
        let mut constants: Vec<(Handle, Constant)> = Vec::new();
        let mut attributes: Vec<(Handle, AttributeData)> = Vec::new();
        let mut accessors: Vec<MethodSemanticsRow> = Vec::new();
        let mut nested: Vec<NestedClassRow> = Vec::new();

        for template in 0..self.plan.templates.len() {
            let row = self.template_type_row(template)?;
            let handle = self.plan.templates[template].type_def;
            self.image.tables.type_def.insert(handle.row(), row);
        }
        for &(ty, handle) in &layout.types {
            let symbol = current.ty(ty);
            let row = self.type_def_row(ty)?;
            self.image.tables.type_def.insert(handle.row(), row);
            attributes.extend(symbol.attributes.iter().map(|a| (handle, a.clone())));
            if let Some(outer) = symbol.enclosing {
                nested.push(NestedClassRow {
                    nested: handle,
                    enclosing: self.definition(SymbolRef::Type(outer))?,
                });
            }
        }

        for &(source, handle) in &layout.fields {
            let row = match source {
                FieldSource::Symbol(id) => {
                    let symbol = current.field(id);
                    attributes.extend(symbol.attributes.iter().map(|a| (handle, a.clone())));
                    if let Some(value) = &symbol.constant {
                        constants.push((handle, value.clone()));
                    }
                    FieldRow {
                        flags: field_flags(symbol.is_static, symbol.constant.is_some()),
                        name: self.name(symbol.name)?,
                        signature: self.field_signature(&symbol.ty)?,
                    }
                }
                FieldSource::Template(t, member) => {
                    let member = self.template_member(t, member)?;
                    let interner = current.interner();
                    FieldRow {
                        flags: flags::FIELD_PRIVATE | flags::FIELD_INIT_ONLY,
                        name: self.string(&template_field_name(interner.lookup(member.name)))?,
                        signature: self.field_signature(&member.ty)?,
                    }
                }
            };
            self.image.tables.field.insert(handle.row(), row);
        }

        let mut written = Vec::with_capacity(layout.methods.len());
        for &(source, handle) in &layout.methods {
            let body_offset = offsets.get(&handle).copied().unwrap_or(0);
            let row = match source {
                MethodSource::Symbol(id) => {
                    let symbol = current.method(id);
                    attributes.extend(symbol.attributes.iter().map(|a| (handle, a.clone())));
                    let association = match symbol.kind {
                        MethodKind::Getter(p) => Some((semantics::GETTER, SymbolRef::Property(p))),
                        MethodKind::Setter(p) => Some((semantics::SETTER, SymbolRef::Property(p))),
                        MethodKind::Adder(e) => Some((semantics::ADD_ON, SymbolRef::Event(e))),
                        MethodKind::Remover(e) => Some((semantics::REMOVE_ON, SymbolRef::Event(e))),
                        MethodKind::Ordinary | MethodKind::Constructor => None,
                    };
                    if let Some((kind, owner)) = association {
                        accessors.push(MethodSemanticsRow {
                            semantics: kind,
                            method: handle,
                            association: self.definition(owner)?,
                        });
                    }
                    MethodDefRow {
                        body_offset,
                        impl_flags: 0,
                        flags: method_flags(symbol.flags, symbol.kind, symbol.body.is_some()),
                        name: self.name(symbol.name)?,
                        signature: self.symbol_method_sig(id)?,
                        param_list: 0,
                    }
                }
                MethodSource::TemplateConstructor(t) => {
                    let params: Vec<Ty> = self.plan.templates[t].key.members.iter().map(|m| m.ty.clone()).collect();
                    MethodDefRow {
                        body_offset,
                        impl_flags: 0,
                        flags: flags::METHOD_PUBLIC
                            | flags::METHOD_HIDE_BY_SIG
                            | flags::METHOD_SPECIAL_NAME
                            | flags::METHOD_RT_SPECIAL_NAME,
                        name: self.string(".ctor")?,
                        signature: self.method_sig(true, &params, &Ty::Void)?,
                        param_list: 0,
                    }
                }
                MethodSource::TemplateGetter(t, member) => {
                    let member = self.template_member(t, member)?;
                    let name = format!("get_{}", current.interner().lookup(member.name));
                    MethodDefRow {
                        body_offset,
                        impl_flags: 0,
                        flags: flags::METHOD_PUBLIC | flags::METHOD_HIDE_BY_SIG | flags::METHOD_SPECIAL_NAME,
                        name: self.string(&name)?,
                        signature: self.method_sig(true, &[], &member.ty)?,
                        param_list: 0,
                    }
                }
            };
            self.image.tables.method_def.insert(handle.row(), row.clone());
            written.push((handle, row));
        }

        for &(source, handle) in &layout.params {
            let row = match source {
                ParamSource::Symbol { method, sequence: 0 } => {
                    let symbol = current.method(method);
                    attributes.extend(symbol.return_attributes.iter().map(|a| (handle, a.clone())));
                    ParamRow {
                        flags: 0,
                        sequence: 0,
                        name: enc_ir::StringId::EMPTY,
                    }
                }
                ParamSource::Symbol { method, sequence } => {
                    let param = current
                        .method(method)
                        .params
                        .get(usize::from(sequence) - 1)
                        .ok_or_else(|| EmitError::internal(ErrorCode::E2005, format!("no parameter {sequence}")))?;
                    attributes.extend(param.attributes.iter().map(|a| (handle, a.clone())));
                    let mut param_flags = 0;
                    if let Some(value) = &param.default {
                        param_flags |= flags::PARAM_HAS_DEFAULT | flags::PARAM_OPTIONAL;
                        constants.push((handle, value.clone()));
                    }
                    ParamRow {
                        flags: param_flags,
                        sequence,
                        name: self.name(param.name)?,
                    }
                }
                ParamSource::Template { template, member } => {
                    let name = self.template_member(template, member)?.name;
                    ParamRow {
                        flags: 0,
                        sequence: member + 1,
                        name: self.name(name)?,
                    }
                }
            };
            self.image.tables.param.insert(handle.row(), row);
        }

        for &(source, handle) in &layout.properties {
            let row = match source {
                PropertySource::Symbol(id) => {
                    let symbol = current.property(id);
                    attributes.extend(symbol.attributes.iter().map(|a| (handle, a.clone())));
                    PropertyRow {
                        flags: 0,
                        name: self.name(symbol.name)?,
                        signature: self.property_signature(&symbol.ty)?,
                    }
                }
                PropertySource::Template(t, member) => {
                    let getter = self.plan.templates[t].getters.get(usize::from(member)).copied();
                    let member = self.template_member(t, member)?;
                    if let Some(getter) = getter {
                        accessors.push(MethodSemanticsRow {
                            semantics: semantics::GETTER,
                            method: getter,
                            association: handle,
                        });
                    }
                    PropertyRow {
                        flags: 0,
                        name: self.name(member.name)?,
                        signature: self.property_signature(&member.ty)?,
                    }
                }
            };
            self.image.tables.property.insert(handle.row(), row);
        }

        for &(event, handle) in &layout.events {
            let symbol = current.event(event);
            attributes.extend(symbol.attributes.iter().map(|a| (handle, a.clone())));
            let row = EventRow {
                flags: 0,
                name: self.name(symbol.name)?,
                event_type: Some(self.type_handle(&symbol.ty)?),
            };
            self.image.tables.event.insert(handle.row(), row);
        }

        for &(parent, map) in &layout.property_maps {
            self.image.tables.property_map.insert(
                map.row(),
                PropertyMapRow {
                    parent,
                    property_list: 0,
                },
            );
        }
        for &(parent, map) in &layout.event_maps {
            self.image.tables.event_map.insert(map.row(), EventMapRow { parent, event_list: 0 });
        }

        self.write_constants(constants)?;
        self.write_attributes(attributes)?;

        accessors.sort_by_key(|row| (row.association, row.method));
        for row in accessors {
            let handle = self.allocate(TableIndex::MethodSemantics);
            self.image.tables.method_semantics.insert(handle.row(), row);
        }
        nested.sort_by_key(|row| row.nested);
        for row in nested {
            let handle = self.allocate(TableIndex::NestedClass);
            self.image.tables.nested_class.insert(handle.row(), row);
        }
        self.write_method_impls(layout)?;
        self.write_generic_params(layout)?;
        Ok(written)
    }

    /// MethodImpl rows of new methods, ordered by implementing type.
    fn write_method_impls(&mut self, layout: &Layout) -> Result<(), EmitError> {
        let current = self.current;
        let mut rows = Vec::new();
        for &(source, body) in &layout.methods {
            let MethodSource::Symbol(method) = source else {
                continue;
            };
            let implements = &current.method(method).implements;
            if implements.is_empty() {
                continue;
            }
            let class = layout
                .owners
                .get(&body)
                .copied()
                .ok_or_else(|| EmitError::internal(ErrorCode::E2005, format!("new method {body:?} has no owner")))?;
            for &declaration in implements {
                rows.push(MethodImplRow {
                    class,
                    body,
                    declaration: self.method_handle(declaration, &[])?,
                });
            }
        }
        rows.sort_by_key(|row| row.class);
        for row in rows {
            let handle = self.allocate(TableIndex::MethodImpl);
            self.image.tables.method_impl.insert(handle.row(), row);
        }
        Ok(())
    }

    /// GenericParam rows of new types and methods, ordered by owner in
    /// `TypeOrMethodDef` coding, then by position.
    fn write_generic_params(&mut self, layout: &Layout) -> Result<(), EmitError> {
        let current = self.current;
        let types = layout
            .types
            .iter()
            .map(|&(ty, handle)| (handle, current.ty(ty).generic_params.as_slice()));
        let methods = layout.methods.iter().filter_map(|&(source, handle)| match source {
            MethodSource::Symbol(id) => Some((handle, current.method(id).generic_params.as_slice())),
            MethodSource::TemplateConstructor(_) | MethodSource::TemplateGetter(..) => None,
        });
        let mut owners: Vec<(Handle, &[Name])> = types.chain(methods).filter(|(_, names)| !names.is_empty()).collect();
        owners.sort_by_key(|&(owner, _)| (owner.row(), owner.table() == TableIndex::MethodDef));
        for (owner, names) in owners {
            for (i, &name) in names.iter().enumerate() {
                let row = GenericParamRow {
                    number: EmitError::narrow(i, "generic parameter index")?,
                    flags: 0,
                    owner,
                    name: self.name(name)?,
                };
                let handle = self.allocate(TableIndex::GenericParam);
                self.image.tables.generic_param.insert(handle.row(), row);
            }
        }
        Ok(())
    }

    fn template_member(&self, template: usize, member: u16) -> Result<AnonymousMember, EmitError> {
        self.plan
            .templates
            .get(template)
            .and_then(|t| t.key.members.get(usize::from(member)))
            .cloned()
            .ok_or_else(|| EmitError::internal(ErrorCode::E2005, format!("anonymous type has no member {member}")))
    }

    fn template_type_row(&mut self, template: usize) -> Result<TypeDefRow, EmitError> {
        let index = self.plan.templates[template].index;
        Ok(TypeDefRow {
            flags: flags::TYPE_SEALED,
            name: self.string(&template_name(index))?,
            namespace: enc_ir::StringId::EMPTY,
            extends: Some(self.core_type("System", "Object")?),
            field_list: 0,
            method_list: 0,
        })
    }

    fn type_def_row(&mut self, ty: TypeId) -> Result<TypeDefRow, EmitError> {
        let current = self.current;
        let symbol = current.ty(ty);
        let extends = match &symbol.base {
            Some(base) => Some(self.type_handle(base)?),
            None if symbol.flags.contains(TypeFlags::INTERFACE) => None,
            None if symbol.flags.contains(TypeFlags::VALUE_TYPE) => Some(self.core_type("System", "ValueType")?),
            None => Some(self.core_type("System", "Object")?),
        };
        Ok(TypeDefRow {
            flags: type_flags(symbol.flags, symbol.enclosing.is_some()),
            name: self.name(symbol.name)?,
            namespace: self.name(symbol.namespace)?,
            extends,
            field_list: 0,
            method_list: 0,
        })
    }

    fn field_signature(&mut self, ty: &Ty) -> Result<BlobId, EmitError> {
        let sig = self.type_sig(ty)?;
        let bytes = encode_field_sig(&sig).map_err(|e| EmitError::encoding(&e))?;
        self.blob(&bytes)
    }

    fn property_signature(&mut self, ty: &Ty) -> Result<BlobId, EmitError> {
        let sig = self.type_sig(ty)?;
        let bytes = encode_property_sig(&sig).map_err(|e| EmitError::encoding(&e))?;
        self.blob(&bytes)
    }

    /// Constant rows, ordered by parent.
    fn write_constants(&mut self, mut constants: Vec<(Handle, Constant)>) -> Result<(), EmitError> {
        constants.sort_by_key(|(parent, _)| *parent);
        for (parent, value) in constants {
            let (kind, bytes) = self.constant_blob(&value);
            let row = ConstantRow {
                kind,
                parent,
                value: self.blob(&bytes)?,
            };
            let handle = self.allocate(TableIndex::Constant);
            self.image.tables.constant.insert(handle.row(), row);
        }
        Ok(())
    }

    fn constant_blob(&self, value: &Constant) -> (u8, Vec<u8>) {
        match value {
            Constant::Null => (constant_kind::CLASS, vec![0; 4]),
            Constant::Bool(b) => (constant_kind::BOOLEAN, vec![u8::from(*b)]),
            Constant::I4(v) => (constant_kind::I4, v.to_le_bytes().to_vec()),
            Constant::I8(v) => (constant_kind::I8, v.to_le_bytes().to_vec()),
            Constant::R8(bits) => (constant_kind::R8, bits.to_le_bytes().to_vec()),
            Constant::String(text) => {
                let text = self.current.interner().lookup(*text);
                (constant_kind::STRING, text.encode_utf16().flat_map(u16::to_le_bytes).collect())
            }
        }
    }

    /// CustomAttribute rows, ordered by parent.
    fn write_attributes(&mut self, mut attributes: Vec<(Handle, AttributeData)>) -> Result<(), EmitError> {
        attributes.sort_by_key(|(parent, _)| *parent);
        for (parent, attribute) in attributes {
            let constructor = self.method_handle(attribute.constructor, &[])?;
            let blob = self.attribute_blob(&attribute.args)?;
            let row = CustomAttributeRow {
                parent,
                constructor,
                value: self.blob(&blob)?,
            };
            let handle = self.allocate(TableIndex::CustomAttribute);
            self.image.tables.custom_attribute.insert(handle.row(), row);
        }
        Ok(())
    }

    /// Prolog, positional arguments, and an empty named-argument list.
    fn attribute_blob(&self, args: &[Constant]) -> Result<Vec<u8>, EmitError> {
        let mut out = vec![0x01, 0x00];
        for arg in args {
            match arg {
                Constant::Null => out.push(0xFF),
                Constant::Bool(b) => out.push(u8::from(*b)),
                Constant::I4(v) => out.extend_from_slice(&v.to_le_bytes()),
                Constant::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
                Constant::R8(bits) => out.extend_from_slice(&bits.to_le_bytes()),
                Constant::String(text) => {
                    let text = self.current.interner().lookup(*text);
                    let len = u32::try_from(text.len())
                        .map_err(|_| EmitError::internal(ErrorCode::E2005, "attribute string is too long"))?;
                    enc_ir::codec::write_compressed_u32(&mut out, len).map_err(|e| EmitError::encoding(&e))?;
                    out.extend_from_slice(text.as_bytes());
                }
            }
        }
        out.extend_from_slice(&[0x00, 0x00]);
        Ok(out)
    }
}

fn type_flags(symbol: TypeFlags, nested: bool) -> u32 {
    let mut out = match (nested, symbol.contains(TypeFlags::PUBLIC)) {
        (false, true) => flags::TYPE_PUBLIC,
        (false, false) => 0,
        (true, true) => flags::TYPE_NESTED_PUBLIC,
        (true, false) => flags::TYPE_NESTED_PRIVATE,
    };
    if symbol.contains(TypeFlags::SEALED) {
        out |= flags::TYPE_SEALED;
    }
    if symbol.contains(TypeFlags::ABSTRACT) {
        out |= flags::TYPE_ABSTRACT;
    }
    if symbol.contains(TypeFlags::INTERFACE) {
        out |= flags::TYPE_INTERFACE | flags::TYPE_ABSTRACT;
    }
    out
}

fn field_flags(is_static: bool, literal: bool) -> u16 {
    let mut out = flags::FIELD_PUBLIC;
    if is_static || literal {
        out |= flags::FIELD_STATIC;
    }
    if literal {
        out |= flags::FIELD_LITERAL | flags::FIELD_HAS_DEFAULT;
    }
    out
}

fn method_flags(symbol: MethodFlags, kind: MethodKind, has_body: bool) -> u16 {
    let mut out = if symbol.contains(MethodFlags::PUBLIC) {
        flags::METHOD_PUBLIC
    } else {
        flags::METHOD_PRIVATE
    };
    out |= flags::METHOD_HIDE_BY_SIG;
    if symbol.contains(MethodFlags::STATIC) {
        out |= flags::METHOD_STATIC;
    }
    if symbol.contains(MethodFlags::VIRTUAL) {
        out |= flags::METHOD_VIRTUAL;
        if !has_body {
            out |= flags::METHOD_ABSTRACT;
        }
    }
    if symbol.contains(MethodFlags::SPECIAL_NAME) {
        out |= flags::METHOD_SPECIAL_NAME;
    }
    if kind == MethodKind::Constructor {
        out |= flags::METHOD_SPECIAL_NAME | flags::METHOD_RT_SPECIAL_NAME;
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn nested_private_type_flags() {
        assert_eq!(type_flags(TypeFlags::empty(), true), 0x0003);
        assert_eq!(type_flags(TypeFlags::PUBLIC | TypeFlags::SEALED, false), 0x0101);
        assert_eq!(type_flags(TypeFlags::PUBLIC | TypeFlags::INTERFACE, false), 0x00A1);
    }

    #[test]
    fn literal_fields_are_static_with_default() {
        assert_eq!(field_flags(false, false), 0x0006);
        assert_eq!(field_flags(true, false), 0x0016);
        assert_eq!(field_flags(false, true), 0x8056);
    }

    #[test]
    fn constructor_flags() {
        let flags = method_flags(MethodFlags::PUBLIC | MethodFlags::SPECIAL_NAME, MethodKind::Constructor, true);
        assert_eq!(flags, 0x1886);
        let abstract_flags = method_flags(MethodFlags::PUBLIC | MethodFlags::VIRTUAL, MethodKind::Ordinary, false);
        assert_eq!(abstract_flags, 0x04C6);
    }
}
