use pretty_assertions::assert_eq;

use enc_diagnostic::ErrorCode;
use enc_ir::rows::{
    FieldRow, MethodDefRow, ModuleRow, NestedClassRow, PropertyMapRow, PropertyRow, StandAloneSigRow, TypeDefRow,
};
use enc_ir::sig::{encode_field_sig, encode_local_sig, encode_property_sig, MethodSig, TypeSig};
use enc_ir::{HeapSizes, ImageError, Name, StringId};

use super::*;
use crate::body::{append_body, MethodBody};
use crate::locals::{LocalSlot, SlotKind, SlotType};
use crate::symbols::{AnonymousTypeKey, SymbolKind, Ty};

const MVID: [u8; 16] = [7; 16];

fn method_sig(has_this: bool, params: Vec<TypeSig>, ret: TypeSig) -> Vec<u8> {
    MethodSig {
        has_this,
        generic_params: 0,
        ret,
        params,
    }
        .encode()
        .unwrap_or_else(|e| panic!("{e}"))
}

fn ok<T>(result: Result<T, ImageError>) -> T {
    result.unwrap_or_else(|e| panic!("{e}"))
}

/// `App.Widget` with a field, a method with two locals, a property and a
/// nested type, plus one anonymous template `{A:int32}`.
fn widget_image() -> Vec<u8> {
    let mut image = MetadataImage::new(false, HeapSizes::default());
    let heaps = &mut image.heaps;
    let s = |heaps: &mut enc_ir::Heaps, text: &str| -> StringId { ok(heaps.strings.add(text)) };

    let name = s(heaps, "App.dll");
    let mvid = ok(heaps.guids.add(MVID));
    image.tables.module.push(ModuleRow {
        generation: 0,
        name,
        mvid,
        enc_id: enc_ir::GuidId::EMPTY,
        enc_base_id: enc_ir::GuidId::EMPTY,
    });

    let template = Handle::new(TableIndex::TypeDef, 3);
    let types = [("App", "Widget", 1, 1), ("", "Inner", 2, 3), ("", "<>f__AnonymousType0", 2, 3)];
    for (namespace, type_name, field_list, method_list) in types {
        let row = TypeDefRow {
            flags: 0,
            name: s(heaps, type_name),
            namespace: s(heaps, namespace),
            extends: None,
            field_list,
            method_list,
        };
        image.tables.type_def.push(row);
    }
    image.tables.nested_class.push(NestedClassRow {
        nested: Handle::new(TableIndex::TypeDef, 2),
        enclosing: Handle::new(TableIndex::TypeDef, 1),
    });

    for (field_name, ty) in [("Count", TypeSig::I4), ("<A>i__Field", TypeSig::I4)] {
        let row = FieldRow {
            flags: 0,
            name: s(heaps, field_name),
            signature: ok(heaps.blobs.add(&ok(encode_field_sig(&ty)))),
        };
        image.tables.field.push(row);
    }

    let locals = ok(encode_local_sig(&[TypeSig::I4, TypeSig::Class(template)]));
    let local_sig = image.tables.stand_alone_sig.push(StandAloneSigRow {
        signature: ok(heaps.blobs.add(&locals)),
    });
    let body = MethodBody {
        max_stack: 1,
        local_signature: Some(local_sig),
        code: vec![0x2A],
        regions: Vec::new(),
    };
    let run_offset = ok(append_body(&mut image.il, &body));

    let methods = [
        ("Run", method_sig(true, vec![TypeSig::I4], TypeSig::String), run_offset),
        ("get_Size", method_sig(true, Vec::new(), TypeSig::I4), 0),
        (".ctor", method_sig(true, vec![TypeSig::I4], TypeSig::Void), 0),
        ("get_A", method_sig(true, Vec::new(), TypeSig::I4), 0),
    ];
    for (method_name, sig, body_offset) in methods {
        let row = MethodDefRow {
            body_offset,
            impl_flags: 0,
            flags: 0,
            name: s(heaps, method_name),
            signature: ok(heaps.blobs.add(&sig)),
            param_list: 1,
        };
        image.tables.method_def.push(row);
    }

    image.tables.property_map.push(PropertyMapRow {
        parent: Handle::new(TableIndex::TypeDef, 1),
        property_list: 1,
    });
    let size = s(heaps, "Size");
    image.tables.property.push(PropertyRow {
        flags: 0,
        name: size,
        signature: ok(heaps.blobs.add(&ok(encode_property_sig(&TypeSig::I4)))),
    });

    ok(image.to_bytes())
}

fn baseline(provider: &dyn DebugInfoProvider) -> Baseline {
    Baseline::initial(&widget_image(), SharedInterner::new(), provider).unwrap_or_else(|e| panic!("{}", e.render()))
}

#[test]
fn recovers_definition_keys() {
    let baseline = baseline(&NoDebugInfo);
    let i = baseline.interner().clone();

    assert_eq!(baseline.generation(), 0);
    assert_eq!(baseline.module_name(), "App.dll");
    assert_eq!(baseline.mvid(), MVID);
    assert_eq!(baseline.enc_id(), [0; 16]);
    assert_eq!(
        baseline.handle_of(&SymbolKey::ty(&i, "App.Widget")),
        Some(Handle::new(TableIndex::TypeDef, 1))
    );
    assert_eq!(
        baseline.handle_of(&SymbolKey::ty(&i, "App.Widget/Inner")),
        Some(Handle::new(TableIndex::TypeDef, 2))
    );
    assert_eq!(
        baseline.handle_of(&SymbolKey::member(&i, SymbolKind::Field, "App.Widget", "Count")),
        Some(Handle::new(TableIndex::Field, 1))
    );
    assert_eq!(
        baseline.handle_of(&SymbolKey::method(&i, "App.Widget", "Run", 0, &[Ty::I4], &Ty::STRING)),
        Some(Handle::new(TableIndex::MethodDef, 1))
    );
    assert_eq!(
        baseline.handle_of(&SymbolKey::member(&i, SymbolKind::Property, "App.Widget", "Size")),
        Some(Handle::new(TableIndex::Property, 1))
    );
    assert_eq!(
        baseline.property_map(Handle::new(TableIndex::TypeDef, 1)),
        Some(Handle::new(TableIndex::PropertyMap, 1))
    );
    assert_eq!(baseline.row_count(TableIndex::MethodDef), 4);
}

#[test]
fn templates_are_recovered_and_kept_out_of_symbols() {
    let baseline = baseline(&NoDebugInfo);
    let i = baseline.interner().clone();
    let registry = baseline.anonymous_types();

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.next_index(), 1);
    let key = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let template = registry.get(&key).unwrap_or_else(|| panic!("template not recovered"));
    assert_eq!(template.type_def, Handle::new(TableIndex::TypeDef, 3));
    assert_eq!(template.constructor, Handle::new(TableIndex::MethodDef, 3));
    assert_eq!(template.getters, vec![Handle::new(TableIndex::MethodDef, 4)]);
    assert_eq!(template.fields, vec![Handle::new(TableIndex::Field, 2)]);
    assert_eq!(baseline.handle_of(&SymbolKey::ty(&i, "<>f__AnonymousType0")), None);
    assert!(baseline.symbols().all(|(key, _)| !i.lookup(key.text).contains("AnonymousType")));
}

#[test]
fn local_signature_yields_placeholders() {
    let baseline = baseline(&NoDebugInfo);
    let i = baseline.interner().clone();
    let slots = baseline
        .method_slots(Handle::new(TableIndex::MethodDef, 1))
        .unwrap_or_else(|| panic!("no slots"));

    assert_eq!(slots.len(), 2);
    assert!(slots.slots().iter().all(|s| s.placeholder && s.name.is_none()));
    let anonymous = Ty::Anonymous(AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]));
    assert_eq!(slots.slots()[1].ty, SlotType::Known(anonymous));
    assert!(baseline.method_slots(Handle::new(TableIndex::MethodDef, 2)).is_none());
}

fn named_slot(ordinal: u16, ty: Ty, name: Name) -> LocalSlot {
    LocalSlot {
        ordinal,
        ty: SlotType::Known(ty),
        name: Some(name),
        kind: SlotKind::UserDeclared,
        declarator: None,
        placeholder: false,
    }
}

#[test]
fn debug_names_are_laid_over_signature_slots() {
    let interner = SharedInterner::new();
    let x = named_slot(0, Ty::I4, interner.intern("x"));
    let run = Handle::new(TableIndex::MethodDef, 1);
    let mut provider = FxHashMap::default();
    provider.insert(run, MethodSlots::from_slots(vec![x.clone()]));

    let baseline = Baseline::initial(&widget_image(), interner, &provider).unwrap_or_else(|e| panic!("{e}"));
    let slots = baseline.method_slots(run).unwrap_or_else(|| panic!("no slots"));
    assert_eq!(slots.len(), 2);
    assert_eq!(slots.get(0), Some(&x));
    // The unnamed trailing slot keeps its ordinal and type.
    let template = slots.get(1).unwrap_or_else(|| panic!("trailing slot dropped"));
    assert!(template.placeholder && template.name.is_none());
    assert!(matches!(template.ty, SlotType::Known(Ty::Anonymous(_))));
}

#[test]
fn debug_slots_that_contradict_the_signature_are_refused() {
    let interner = SharedInterner::new();
    let run = Handle::new(TableIndex::MethodDef, 1);
    let x = interner.intern("x");
    let tables = [
        vec![named_slot(3, Ty::I4, x)],
        vec![named_slot(0, Ty::STRING, x)],
        vec![
            named_slot(0, Ty::I4, x),
            named_slot(1, Ty::I4, x),
            named_slot(2, Ty::I4, x),
        ],
    ];
    for table in tables {
        let mut provider = FxHashMap::default();
        provider.insert(run, MethodSlots::from_slots(table));
        let err = Baseline::initial(&widget_image(), interner.clone(), &provider)
            .err()
            .unwrap_or_else(|| panic!("mismatched debug slots accepted"));
        assert!(matches!(err, EmitError::InternalInconsistency { .. }));
        assert_eq!(err.code(), Some(ErrorCode::E2003));
    }

    // A method without locals cannot gain slots from debug information.
    let mut provider = FxHashMap::default();
    provider.insert(Handle::new(TableIndex::MethodDef, 2), MethodSlots::from_slots(vec![named_slot(0, Ty::I4, x)]));
    let err = Baseline::initial(&widget_image(), interner, &provider)
        .err()
        .unwrap_or_else(|| panic!("slots for a method without locals accepted"));
    assert_eq!(err.code(), Some(ErrorCode::E2003));
}

#[test]
fn unparseable_image_is_internal_inconsistency() {
    let err = Baseline::initial(b"not an image", SharedInterner::new(), &NoDebugInfo)
        .err()
        .unwrap_or_else(|| panic!("garbage accepted"));
    assert!(matches!(err, EmitError::InternalInconsistency { .. }));
    assert_eq!(err.code(), Some(ErrorCode::E2001));
}

#[test]
fn delta_image_is_not_a_baseline() {
    let bytes = ok(MetadataImage::new(true, HeapSizes::default()).to_bytes());
    let err = Baseline::initial(&bytes, SharedInterner::new(), &NoDebugInfo)
        .err()
        .unwrap_or_else(|| panic!("delta accepted"));
    assert_eq!(err.code(), Some(ErrorCode::E2001));
}

#[test]
fn unknown_method_row_is_reported() {
    let baseline = baseline(&NoDebugInfo);
    let err = baseline
        .method_row(Handle::new(TableIndex::MethodDef, 40))
        .err()
        .unwrap_or_else(|| panic!("missing row found"));
    assert_eq!(err.code(), Some(ErrorCode::E2003));
}

#[test]
fn enc_ids_are_deterministic_per_generation() {
    assert_eq!(enc_id_for(MVID, 0), [0; 16]);
    assert_eq!(enc_id_for(MVID, 1), enc_id_for(MVID, 1));
    assert_ne!(enc_id_for(MVID, 1), enc_id_for(MVID, 2));
    assert_ne!(enc_id_for(MVID, 1), enc_id_for([8; 16], 1));
}
