use pretty_assertions::assert_eq;

use enc_ir::rows::{
    AssemblyRefRow, GenericParamRow, MethodDefRow, MethodImplRow, NestedClassRow, ParamRow, TypeDefRow, TypeRefRow,
};
use enc_ir::{BlobId, StringId};

use super::*;

fn method() -> MethodDefRow {
    MethodDefRow {
        body_offset: 0,
        impl_flags: 0,
        flags: 0,
        name: StringId::EMPTY,
        signature: BlobId::EMPTY,
        param_list: 0,
    }
}

fn type_def() -> TypeDefRow {
    TypeDefRow {
        flags: 0,
        name: StringId::EMPTY,
        namespace: StringId::EMPTY,
        extends: None,
        field_list: 0,
        method_list: 0,
    }
}

fn assembly_ref() -> AssemblyRefRow {
    AssemblyRefRow {
        major: 0,
        minor: 0,
        build: 0,
        revision: 0,
        flags: 0,
        name: StringId::EMPTY,
        culture: StringId::EMPTY,
    }
}

fn previous() -> TableRowCounts {
    let mut counts = TableRowCounts::default();
    counts.set(TableIndex::TypeDef, 2);
    counts.set(TableIndex::MethodDef, 4);
    counts.set(TableIndex::Param, 3);
    counts.set(TableIndex::AssemblyRef, 1);
    counts
}

fn render(log: &[EncLogEntry]) -> Vec<String> {
    log.iter().map(|e| format!("{:?} {:?}", e.handle, e.operation)).collect()
}

/// A new method with one parameter on an existing type, plus an update of
/// method 2 and the generation's self-reference.
fn sample() -> (Tables, FxHashMap<Handle, Handle>) {
    let mut tables = Tables::default();
    tables.assembly_ref.insert(2, assembly_ref());
    tables.method_def.insert(2, method());
    tables.method_def.insert(5, method());
    tables.param.insert(
        4,
        ParamRow {
            flags: 0,
            sequence: 1,
            name: StringId::EMPTY,
        },
    );
    let mut owners = FxHashMap::default();
    owners.insert(Handle::new(TableIndex::MethodDef, 5), Handle::new(TableIndex::TypeDef, 1));
    owners.insert(Handle::new(TableIndex::Param, 4), Handle::new(TableIndex::MethodDef, 5));
    (tables, owners)
}

#[test]
fn log_follows_table_order_with_owner_entries() {
    let (mut tables, owners) = sample();
    let (log, _) = write_log(&mut tables, &previous(), &owners).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        render(&log),
        vec![
            "AssemblyRef#2 Default",
            "MethodDef#2 Default",
            "TypeDef#1 AddMethod",
            "MethodDef#5 Default",
            "MethodDef#5 AddParameter",
            "Param#4 Default",
        ]
    );
    assert_eq!(tables.enc_log.len(), log.len());
}

#[test]
fn generic_params_and_method_impls_are_logged_last() {
    let (mut tables, owners) = sample();
    let method = Handle::new(TableIndex::MethodDef, 5);
    tables.generic_param.insert(
        1,
        GenericParamRow {
            number: 0,
            flags: 0,
            owner: method,
            name: StringId::EMPTY,
        },
    );
    tables.method_impl.insert(
        1,
        MethodImplRow {
            class: Handle::new(TableIndex::TypeDef, 1),
            body: method,
            declaration: Handle::new(TableIndex::MemberRef, 7),
        },
    );
    tables.nested_class.insert(
        1,
        NestedClassRow {
            nested: Handle::new(TableIndex::TypeDef, 2),
            enclosing: Handle::new(TableIndex::TypeDef, 1),
        },
    );
    let previous = previous();
    let (log, map) = write_log(&mut tables, &previous, &owners).unwrap_or_else(|e| panic!("{e}"));
    let rendered = render(&log);
    assert_eq!(
        rendered[rendered.len() - 3..].to_vec(),
        vec!["MethodImpl#1 Default", "NestedClass#1 Default", "GenericParam#1 Default"]
    );
    assert!(verify(&tables, &previous, &log, &map).is_ok());
}

#[test]
fn map_is_sorted_and_deduplicated() {
    let (mut tables, owners) = sample();
    let (_, map) = write_log(&mut tables, &previous(), &owners).unwrap_or_else(|e| panic!("{e}"));
    let rendered: Vec<String> = map.iter().map(|h| format!("{h:?}")).collect();
    assert_eq!(
        rendered,
        vec!["TypeDef#1", "MethodDef#2", "MethodDef#5", "Param#4", "AssemblyRef#2"]
    );
    assert_eq!(tables.enc_map.len(), map.len());
}

#[test]
fn new_member_without_owner_is_an_inconsistency() {
    let (mut tables, mut owners) = sample();
    owners.remove(&Handle::new(TableIndex::Param, 4));
    let err = write_log(&mut tables, &previous(), &owners).err();
    assert_eq!(err.and_then(|e| e.code()), Some(ErrorCode::E2005));
}

#[test]
fn verify_accepts_assembled_delta() {
    let (mut tables, owners) = sample();
    let previous = previous();
    let (log, map) = write_log(&mut tables, &previous, &owners).unwrap_or_else(|e| panic!("{e}"));
    assert!(verify(&tables, &previous, &log, &map).is_ok());
}

#[test]
fn verify_rejects_gap_in_new_rows() {
    let mut tables = Tables::default();
    tables.type_def.insert(4, type_def());
    let log = vec![EncLogEntry::new(Handle::new(TableIndex::TypeDef, 4), EncOperation::Default)];
    let map = vec![Handle::new(TableIndex::TypeDef, 4)];
    let err = verify(&tables, &previous(), &log, &map).err();
    assert_eq!(err.and_then(|e| e.code()), Some(ErrorCode::E2005));
}

#[test]
fn verify_rejects_rewritten_type_row() {
    let mut tables = Tables::default();
    tables.type_def.insert(2, type_def());
    let log = vec![EncLogEntry::new(Handle::new(TableIndex::TypeDef, 2), EncOperation::Default)];
    let map = vec![Handle::new(TableIndex::TypeDef, 2)];
    assert!(verify(&tables, &previous(), &log, &map).is_err());
}

#[test]
fn verify_rejects_log_map_mismatch() {
    let mut tables = Tables::default();
    tables.type_ref.insert(
        1,
        TypeRefRow {
            resolution_scope: None,
            name: StringId::EMPTY,
            namespace: StringId::EMPTY,
        },
    );
    let log = vec![EncLogEntry::new(Handle::new(TableIndex::TypeRef, 1), EncOperation::Default)];
    assert!(verify(&tables, &previous(), &log, &[]).is_err());

    let unsorted = vec![Handle::new(TableIndex::TypeRef, 1), Handle::new(TableIndex::TypeRef, 1)];
    assert!(verify(&tables, &previous(), &log, &unsorted).is_err());
}
