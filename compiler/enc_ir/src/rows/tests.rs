use pretty_assertions::assert_eq;

use super::*;

fn param(sequence: u16) -> ParamRow {
    ParamRow {
        flags: 0,
        sequence,
        name: StringId::EMPTY,
    }
}

#[test]
fn push_numbers_rows_densely() {
    let mut table = Table::default();
    assert_eq!(table.push(param(0)), Handle::new(TableIndex::Param, 1));
    assert_eq!(table.push(param(1)), Handle::new(TableIndex::Param, 2));
    assert!(table.is_dense());
    assert_eq!(table.max_row(), 2);
}

#[test]
fn insert_keeps_sparse_rows_sorted() {
    let mut table = Table::default();
    table.insert(9, param(2));
    table.insert(4, param(1));
    table.insert(9, param(3));
    let rows: Vec<(u32, u16)> = table
        .iter()
        .map(|(h, r)| (h.row(), r.sequence))
        .collect();
    assert_eq!(rows, vec![(4, 1), (9, 3)]);
    assert!(!table.is_dense());
    assert_eq!(table.get(4).map(|r| r.sequence), Some(1));
    assert_eq!(table.get(5), None);
}

#[test]
fn columns_round_trip_through_u32() {
    let row = MethodSemanticsRow {
        semantics: semantics::GETTER,
        method: Handle::new(TableIndex::MethodDef, 5),
        association: Handle::new(TableIndex::Property, 2),
    };
    let mut columns = Vec::new();
    row.write_columns(&mut columns);
    assert_eq!(columns, vec![2, 0x0600_0005, 0x1700_0002]);
    assert_eq!(MethodSemanticsRow::COLUMNS, 3);
    assert_eq!(MethodSemanticsRow::read_columns(&columns).unwrap(), row);
}

#[test]
fn nil_optional_handle_is_zero() {
    let row = TypeDefRow {
        flags: 0,
        name: StringId::new(1),
        namespace: StringId::EMPTY,
        extends: None,
        field_list: 1,
        method_list: 1,
    };
    let mut columns = Vec::new();
    row.write_columns(&mut columns);
    assert_eq!(columns[3], 0);
    assert_eq!(TypeDefRow::read_columns(&columns).unwrap().extends, None);
}

#[test]
fn narrow_column_overflow_is_an_error() {
    assert_eq!(
        ParamRow::read_columns(&[0x1_0000, 0, 0]),
        Err(ImageError::InvalidColumn {
            table: TableIndex::Param,
            value: 0x1_0000
        })
    );
}

#[test]
fn unknown_operation_is_an_error() {
    assert!(EncLogRow::read_columns(&[0x0600_0001, 9]).is_err());
}

#[test]
fn max_rows_reports_each_table() {
    let mut tables = Tables::default();
    tables.param.insert(7, param(0));
    tables.enc_map.push(EncMapRow {
        token: Handle::new(TableIndex::Param, 7),
    });
    let counts = tables.max_rows();
    assert_eq!(counts.get(TableIndex::Param), 7);
    assert_eq!(counts.get(TableIndex::EncMap), 1);
    assert_eq!(tables.total_rows(), 2);
}

#[test]
fn generic_param_owner_is_a_full_token() {
    let row = GenericParamRow {
        number: 1,
        flags: 0,
        owner: Handle::new(TableIndex::TypeDef, 4),
        name: StringId::new(9),
    };
    let mut columns = Vec::new();
    row.write_columns(&mut columns);
    assert_eq!(columns, vec![1, 0, 0x0200_0004, 9]);
    assert_eq!(GenericParamRow::read_columns(&columns).unwrap(), row);
    assert!(GenericParamRow::read_columns(&[0x1_0000, 0, 0x0200_0004, 9]).is_err());
}
