//! Symbol identity recovery from a full module image.
//!
//! Keys are rebuilt from table rows the same way [`Compilation::key`]
//! builds them from front-end symbols: qualified type names from TypeDef
//! and NestedClass rows, member names from the ECMA list ranges, and method
//! parameter types from decoded signatures.
//!
//! [`Compilation::key`]: crate::symbols::Compilation::key

use std::ops::Range;

use rustc_hash::FxHashMap;
use tracing::trace;

use enc_diagnostic::ErrorCode;
use enc_ir::codec::ByteReader;
use enc_ir::rows::MethodDefRow;
use enc_ir::sig::{decode_field_sig, decode_local_sig, MethodSig, TypeSig};
use enc_ir::{Handle, ImageError, MetadataImage, StringInterner, TableIndex};

use crate::anonymous::{
    parse_template_field_name, parse_template_index, template_name, AnonymousTypeRegistry,
    AnonymousTypeTemplate,
};
use crate::body::MethodBody;
use crate::locals::{LocalSlot, MethodSlots, SlotKind, SlotType};
use crate::symbols::{AnonymousTypeKey, Primitive, SymbolKey, SymbolKind, Ty};
use crate::EmitError;

const MAX_NESTING: u32 = 64;

pub(super) struct Recovered {
    pub symbols: FxHashMap<SymbolKey, Handle>,
    pub property_maps: FxHashMap<Handle, Handle>,
    pub event_maps: FxHashMap<Handle, Handle>,
    pub templates: AnonymousTypeRegistry,
    /// Placeholder slot tables rebuilt from local signatures.
    pub signature_slots: FxHashMap<Handle, MethodSlots>,
}

fn image_err(err: ImageError) -> EmitError {
    EmitError::unparseable(&err)
}

fn missing_row(handle: Handle) -> EmitError {
    EmitError::internal(
        ErrorCode::E2001,
        format!("module image references missing row {handle:?}"),
    )
}

fn generic_position(number: u32) -> Result<u16, EmitError> {
    u16::try_from(number)
        .map_err(|_| EmitError::internal(ErrorCode::E2001, format!("generic parameter {number} is out of range")))
}

enum TemplateState {
    InProgress,
    Done(AnonymousTypeKey),
}

struct Recovery<'a> {
    image: &'a MetadataImage,
    interner: &'a StringInterner,
    /// Qualified names by TypeDef row - 1.
    type_names: Vec<String>,
    /// Qualified names by TypeRef row - 1.
    ref_names: Vec<String>,
    field_ranges: Vec<Range<u32>>,
    method_ranges: Vec<Range<u32>>,
    /// TypeDef row -> template index.
    template_rows: FxHashMap<u32, u32>,
    templates: FxHashMap<u32, TemplateState>,
    depth: u32,
}

pub(super) fn recover(image: &MetadataImage, interner: &StringInterner) -> Result<Recovered, EmitError> {
    let tables = &image.tables;
    let field_starts: Vec<u32> = tables.type_def.iter().map(|(_, r)| r.field_list).collect();
    let method_starts: Vec<u32> = tables.type_def.iter().map(|(_, r)| r.method_list).collect();
    let mut template_rows = FxHashMap::default();
    for (handle, row) in tables.type_def.iter() {
        if let Some(index) = parse_template_index(image.string(row.name).map_err(image_err)?) {
            template_rows.insert(handle.row(), index);
        }
    }

    let mut recovery = Recovery {
        image,
        interner,
        type_names: qualified_def_names(image)?,
        ref_names: qualified_ref_names(image)?,
        field_ranges: list_ranges(&field_starts, tables.field.max_row()),
        method_ranges: list_ranges(&method_starts, tables.method_def.max_row()),
        template_rows,
        templates: FxHashMap::default(),
        depth: 0,
    };
    let mut out = Recovered {
        symbols: FxHashMap::default(),
        property_maps: FxHashMap::default(),
        event_maps: FxHashMap::default(),
        templates: AnonymousTypeRegistry::default(),
        signature_slots: FxHashMap::default(),
    };

    for (handle, _) in tables.type_def.iter() {
        if let Some(&index) = recovery.template_rows.get(&handle.row()) {
            let template = recovery.template(handle, index)?;
            trace!(index, members = template.key.members.len(), "recovered anonymous type");
            out.templates.register(template);
        }
    }

    for (handle, _) in tables.type_def.iter() {
        if recovery.template_rows.contains_key(&handle.row()) {
            continue;
        }
        let owner = recovery.type_name(handle)?.to_owned();
        out.symbols.insert(SymbolKey::ty(interner, &owner), handle);

        for row in recovery.field_range(handle.row()) {
            let field = tables.field.get(row).ok_or_else(|| missing_row(Handle::new(TableIndex::Field, row)))?;
            let name = image.string(field.name).map_err(image_err)?;
            out.symbols.insert(
                SymbolKey::member(interner, SymbolKind::Field, &owner, name),
                Handle::new(TableIndex::Field, row),
            );
        }

        for row in recovery.method_range(handle.row()) {
            let method_handle = Handle::new(TableIndex::MethodDef, row);
            let method = tables.method_def.get(row).ok_or_else(|| missing_row(method_handle))?;
            let name = image.string(method.name).map_err(image_err)?;
            let sig = MethodSig::decode(image.blob(method.signature).map_err(image_err)?).map_err(image_err)?;
            let params = sig.params.iter().map(|p| recovery.ty(p)).collect::<Result<Vec<_>, _>>()?;
            let ret = recovery.ty(&sig.ret)?;
            let arity = usize::try_from(sig.generic_params).map_err(|_| {
                EmitError::internal(ErrorCode::E2001, format!("{method_handle:?} declares too many generic parameters"))
            })?;
            out.symbols.insert(SymbolKey::method(interner, &owner, name, arity, &params, &ret), method_handle);
            if let Some(slots) = recovery.signature_slots(method)? {
                out.signature_slots.insert(method_handle, slots);
            }
        }
    }

    let property_maps: Vec<_> = tables.property_map.iter().collect();
    let starts: Vec<u32> = property_maps.iter().map(|(_, r)| r.property_list).collect();
    for ((map, row), range) in property_maps.iter().zip(list_ranges(&starts, tables.property.max_row())) {
        out.property_maps.insert(row.parent, *map);
        if recovery.template_rows.contains_key(&row.parent.row()) {
            continue;
        }
        let owner = recovery.type_name(row.parent)?.to_owned();
        for number in range {
            let handle = Handle::new(TableIndex::Property, number);
            let property = tables.property.get(number).ok_or_else(|| missing_row(handle))?;
            let name = image.string(property.name).map_err(image_err)?;
            out.symbols.insert(SymbolKey::member(interner, SymbolKind::Property, &owner, name), handle);
        }
    }

    let event_maps: Vec<_> = tables.event_map.iter().collect();
    let starts: Vec<u32> = event_maps.iter().map(|(_, r)| r.event_list).collect();
    for ((map, row), range) in event_maps.iter().zip(list_ranges(&starts, tables.event.max_row())) {
        out.event_maps.insert(row.parent, *map);
        let owner = recovery.type_name(row.parent)?.to_owned();
        for number in range {
            let handle = Handle::new(TableIndex::Event, number);
            let event = tables.event.get(number).ok_or_else(|| missing_row(handle))?;
            let name = image.string(event.name).map_err(image_err)?;
            out.symbols.insert(SymbolKey::member(interner, SymbolKind::Event, &owner, name), handle);
        }
    }

    Ok(out)
}

/// `[start, next start)` ranges of an ECMA list column. The last range
/// runs to the end of the member table.
fn list_ranges(starts: &[u32], member_rows: u32) -> Vec<Range<u32>> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let start = start.max(1);
            let end = starts.get(i + 1).map_or(member_rows + 1, |&next| next.max(1));
            start..end.max(start)
        })
        .collect()
}

fn qualified_def_names(image: &MetadataImage) -> Result<Vec<String>, EmitError> {
    let tables = &image.tables;
    let enclosing: FxHashMap<u32, u32> = tables
        .nested_class
        .iter()
        .map(|(_, r)| (r.nested.row(), r.enclosing.row()))
        .collect();
    let limit = tables.type_def.len();

    let mut names = Vec::with_capacity(limit);
    for (handle, _) in tables.type_def.iter() {
        let mut parts = Vec::new();
        let mut row = handle.row();
        loop {
            let def = tables
                .type_def
                .get(row)
                .ok_or_else(|| missing_row(Handle::new(TableIndex::TypeDef, row)))?;
            let name = image.string(def.name).map_err(image_err)?;
            match enclosing.get(&row) {
                Some(&outer) if parts.len() < limit => {
                    parts.push(name.to_owned());
                    row = outer;
                }
                Some(_) => {
                    return Err(EmitError::internal(
                        ErrorCode::E2001,
                        format!("nesting cycle through {handle:?}"),
                    ))
                }
                None => {
                    let namespace = image.string(def.namespace).map_err(image_err)?;
                    parts.push(if namespace.is_empty() {
                        name.to_owned()
                    } else {
                        format!("{namespace}.{name}")
                    });
                    break;
                }
            }
        }
        parts.reverse();
        names.push(parts.join("/"));
    }
    Ok(names)
}

fn qualified_ref_names(image: &MetadataImage) -> Result<Vec<String>, EmitError> {
    let tables = &image.tables;
    let mut names: Vec<String> = Vec::with_capacity(tables.type_ref.len());
    for (handle, row) in tables.type_ref.iter() {
        let name = image.string(row.name).map_err(image_err)?;
        let qualified = match row.resolution_scope {
            // Enclosing references always precede the nested one.
            Some(scope) if scope.table() == TableIndex::TypeRef => {
                let outer = scope
                    .row()
                    .checked_sub(1)
                    .and_then(|i| names.get(i as usize))
                    .ok_or_else(|| missing_row(scope))?;
                format!("{outer}/{name}")
            }
            _ => {
                let namespace = image.string(row.namespace).map_err(image_err)?;
                if namespace.is_empty() {
                    name.to_owned()
                } else {
                    format!("{namespace}.{name}")
                }
            }
        };
        trace!(?handle, %qualified, "type reference");
        names.push(qualified);
    }
    Ok(names)
}

impl Recovery<'_> {
    fn field_range(&self, type_row: u32) -> Range<u32> {
        self.field_ranges.get(type_row as usize - 1).cloned().unwrap_or(0..0)
    }

    fn method_range(&self, type_row: u32) -> Range<u32> {
        self.method_ranges.get(type_row as usize - 1).cloned().unwrap_or(0..0)
    }

    fn type_name(&self, handle: Handle) -> Result<&str, EmitError> {
        let names = match handle.table() {
            TableIndex::TypeDef => &self.type_names,
            TableIndex::TypeRef => &self.ref_names,
            _ => return Err(missing_row(handle)),
        };
        handle
            .row()
            .checked_sub(1)
            .and_then(|i| names.get(i as usize))
            .map(String::as_str)
            .ok_or_else(|| missing_row(handle))
    }

    fn ty(&mut self, sig: &TypeSig) -> Result<Ty, EmitError> {
        self.depth += 1;
        let ty = if self.depth > MAX_NESTING {
            Err(EmitError::internal(ErrorCode::E2001, "type signature nested too deeply"))
        } else {
            self.ty_inner(sig)
        };
        self.depth -= 1;
        ty
    }

    fn ty_inner(&mut self, sig: &TypeSig) -> Result<Ty, EmitError> {
        let primitive = |p| Ok(Ty::Primitive(p));
        match sig {
            TypeSig::Void => Ok(Ty::Void),
            TypeSig::Boolean => primitive(Primitive::Bool),
            TypeSig::Char => primitive(Primitive::Char),
            TypeSig::I1 => primitive(Primitive::I1),
            TypeSig::U1 => primitive(Primitive::U1),
            TypeSig::I2 => primitive(Primitive::I2),
            TypeSig::U2 => primitive(Primitive::U2),
            TypeSig::I4 => primitive(Primitive::I4),
            TypeSig::U4 => primitive(Primitive::U4),
            TypeSig::I8 => primitive(Primitive::I8),
            TypeSig::U8 => primitive(Primitive::U8),
            TypeSig::R4 => primitive(Primitive::R4),
            TypeSig::R8 => primitive(Primitive::R8),
            TypeSig::String => primitive(Primitive::String),
            TypeSig::Object => primitive(Primitive::Object),
            TypeSig::Class(handle) | TypeSig::ValueType(handle) => self.named(*handle),
            TypeSig::GenericInst { base, args, .. } => {
                let Ty::Named(base) = self.named(*base)? else {
                    return Err(EmitError::internal(
                        ErrorCode::E2001,
                        format!("generic instantiation over non-nominal {base:?}"),
                    ));
                };
                let args = args.iter().map(|a| self.ty(a)).collect::<Result<Vec<_>, _>>()?;
                Ok(Ty::Generic { base, args })
            }
            TypeSig::SzArray(element) => Ok(Ty::Array(Box::new(self.ty(element)?))),
            TypeSig::Var(number) => Ok(Ty::TypeParam(generic_position(*number)?)),
            TypeSig::MVar(number) => Ok(Ty::MethodParam(generic_position(*number)?)),
        }
    }

    fn named(&mut self, handle: Handle) -> Result<Ty, EmitError> {
        match handle.table() {
            TableIndex::TypeDef if self.template_rows.contains_key(&handle.row()) => {
                Ok(Ty::Anonymous(self.template_key(handle.row())?))
            }
            TableIndex::TypeDef | TableIndex::TypeRef => {
                let name = self.type_name(handle)?;
                Ok(Ty::Named(self.interner.intern(name)))
            }
            TableIndex::TypeSpec => {
                let image = self.image;
                let row = image.tables.type_spec.get(handle.row()).ok_or_else(|| missing_row(handle))?;
                let blob = image.blob(row.signature).map_err(image_err)?;
                let sig = TypeSig::decode(&mut ByteReader::new(blob)).map_err(image_err)?;
                self.ty(&sig)
            }
            _ => Err(missing_row(handle)),
        }
    }

    fn template_key(&mut self, row: u32) -> Result<AnonymousTypeKey, EmitError> {
        match self.templates.get(&row) {
            Some(TemplateState::Done(key)) => return Ok(key.clone()),
            Some(TemplateState::InProgress) => {
                return Err(EmitError::internal(
                    ErrorCode::E2001,
                    format!("anonymous type at TypeDef row {row} contains itself"),
                ))
            }
            None => {}
        }
        self.templates.insert(row, TemplateState::InProgress);

        let image = self.image;
        let mut members = Vec::new();
        for field_row in self.field_range(row) {
            let field = image
                .tables
                .field
                .get(field_row)
                .ok_or_else(|| missing_row(Handle::new(TableIndex::Field, field_row)))?;
            let Some(member) = parse_template_field_name(image.string(field.name).map_err(image_err)?) else {
                continue;
            };
            let sig = decode_field_sig(image.blob(field.signature).map_err(image_err)?).map_err(image_err)?;
            members.push((self.interner.intern(member), self.ty(&sig)?));
        }

        let key = AnonymousTypeKey::new(members);
        self.templates.insert(row, TemplateState::Done(key.clone()));
        Ok(key)
    }

    fn template(&mut self, type_def: Handle, index: u32) -> Result<AnonymousTypeTemplate, EmitError> {
        let key = self.template_key(type_def.row())?;
        let image = self.image;
        let incomplete = || {
            EmitError::internal(
                ErrorCode::E2001,
                format!("anonymous type {} is missing members", template_name(index)),
            )
        };

        let mut constructor = None;
        let mut getters = FxHashMap::default();
        for row in self.method_range(type_def.row()) {
            let handle = Handle::new(TableIndex::MethodDef, row);
            let method = image.tables.method_def.get(row).ok_or_else(|| missing_row(handle))?;
            let name = image.string(method.name).map_err(image_err)?;
            if name == ".ctor" {
                constructor = Some(handle);
            } else if let Some(member) = name.strip_prefix("get_") {
                getters.insert(member, handle);
            }
        }

        let mut fields = Vec::with_capacity(key.members.len());
        for row in self.field_range(type_def.row()) {
            let field = image
                .tables
                .field
                .get(row)
                .ok_or_else(|| missing_row(Handle::new(TableIndex::Field, row)))?;
            if parse_template_field_name(image.string(field.name).map_err(image_err)?).is_some() {
                fields.push(Handle::new(TableIndex::Field, row));
            }
        }

        let getters = key
            .members
            .iter()
            .map(|m| getters.get(self.interner.lookup(m.name)).copied().ok_or_else(incomplete))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AnonymousTypeTemplate {
            index,
            type_def,
            constructor: constructor.ok_or_else(incomplete)?,
            getters,
            fields,
            generation: 0,
            key,
        })
    }

    /// Unnamed placeholders typed from the body's local signature.
    fn signature_slots(&mut self, method: &MethodDefRow) -> Result<Option<MethodSlots>, EmitError> {
        if method.body_offset == 0 {
            return Ok(None);
        }
        let image = self.image;
        let body = MethodBody::read_at(&image.il, method.body_offset).map_err(image_err)?;
        let Some(signature) = body.local_signature else {
            return Ok(None);
        };
        let row = image
            .tables
            .stand_alone_sig
            .get(signature.row())
            .filter(|_| signature.table() == TableIndex::StandAloneSig)
            .ok_or_else(|| missing_row(signature))?;
        let types = decode_local_sig(image.blob(row.signature).map_err(image_err)?).map_err(image_err)?;

        let mut slots = Vec::with_capacity(types.len());
        for (ordinal, sig) in types.iter().enumerate() {
            slots.push(LocalSlot {
                ordinal: u16::try_from(ordinal).map_err(|_| {
                    EmitError::internal(ErrorCode::E2001, "local signature has more than 65535 slots")
                })?,
                ty: SlotType::Known(self.ty(sig)?),
                name: None,
                kind: SlotKind::UserDeclared,
                declarator: None,
                placeholder: true,
            });
        }
        Ok(Some(MethodSlots::from_slots(slots)))
    }
}
