//! EncLog and EncMap assembly, plus the invariant checks run on them.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use enc_diagnostic::ErrorCode;
use enc_ir::rows::{EncLogRow, EncMapRow, Tables};
use enc_ir::{EncLogEntry, EncOperation, Handle, TableIndex, TableRowCounts};

use crate::EmitError;

/// Tables in log order.
const LOG_ORDER: [TableIndex; 20] = [
    TableIndex::AssemblyRef,
    TableIndex::MemberRef,
    TableIndex::MethodSpec,
    TableIndex::TypeRef,
    TableIndex::TypeSpec,
    TableIndex::StandAloneSig,
    TableIndex::TypeDef,
    TableIndex::EventMap,
    TableIndex::PropertyMap,
    TableIndex::Event,
    TableIndex::Field,
    TableIndex::MethodDef,
    TableIndex::Property,
    TableIndex::Param,
    TableIndex::Constant,
    TableIndex::CustomAttribute,
    TableIndex::MethodSemantics,
    TableIndex::MethodImpl,
    TableIndex::NestedClass,
    TableIndex::GenericParam,
];

/// Operation logged against the owner of a new member row.
fn addition(table: TableIndex) -> Option<EncOperation> {
    match table {
        TableIndex::Event => Some(EncOperation::AddEvent),
        TableIndex::Field => Some(EncOperation::AddField),
        TableIndex::MethodDef => Some(EncOperation::AddMethod),
        TableIndex::Property => Some(EncOperation::AddProperty),
        TableIndex::Param => Some(EncOperation::AddParameter),
        _ => None,
    }
}

/// Row numbers present in one table of a delta.
fn rows(tables: &Tables, table: TableIndex) -> Vec<u32> {
    macro_rules! numbers {
        ($field:ident) => {
            tables.$field.iter().map(|(h, _)| h.row()).collect()
        };
    }
    match table {
        TableIndex::Module => numbers!(module),
        TableIndex::TypeRef => numbers!(type_ref),
        TableIndex::TypeDef => numbers!(type_def),
        TableIndex::Field => numbers!(field),
        TableIndex::MethodDef => numbers!(method_def),
        TableIndex::Param => numbers!(param),
        TableIndex::MemberRef => numbers!(member_ref),
        TableIndex::Constant => numbers!(constant),
        TableIndex::CustomAttribute => numbers!(custom_attribute),
        TableIndex::StandAloneSig => numbers!(stand_alone_sig),
        TableIndex::EventMap => numbers!(event_map),
        TableIndex::Event => numbers!(event),
        TableIndex::PropertyMap => numbers!(property_map),
        TableIndex::Property => numbers!(property),
        TableIndex::MethodSemantics => numbers!(method_semantics),
        TableIndex::MethodImpl => numbers!(method_impl),
        TableIndex::TypeSpec => numbers!(type_spec),
        TableIndex::EncLog => numbers!(enc_log),
        TableIndex::EncMap => numbers!(enc_map),
        TableIndex::AssemblyRef => numbers!(assembly_ref),
        TableIndex::NestedClass => numbers!(nested_class),
        TableIndex::GenericParam => numbers!(generic_param),
        TableIndex::MethodSpec => numbers!(method_spec),
    }
}

/// Entries for one row: the owner's `Add*` entry first when the row is a
/// new member, then the row itself.
fn entries_for(
    handle: Handle,
    previous: &TableRowCounts,
    owners: &FxHashMap<Handle, Handle>,
) -> Result<SmallVec<[EncLogEntry; 2]>, EmitError> {
    let mut entries = SmallVec::new();
    let is_new = handle.row() > previous.get(handle.table());
    if let (true, Some(operation)) = (is_new, addition(handle.table())) {
        let owner = owners.get(&handle).ok_or_else(|| {
            EmitError::internal(ErrorCode::E2005, format!("new member {handle:?} has no owner"))
        })?;
        entries.push(EncLogEntry::new(*owner, operation));
    }
    entries.push(EncLogEntry::new(handle, EncOperation::Default));
    Ok(entries)
}

/// Build the log and the map, and store both in `tables`.
pub(super) fn write_log(
    tables: &mut Tables,
    previous: &TableRowCounts,
    owners: &FxHashMap<Handle, Handle>,
) -> Result<(Vec<EncLogEntry>, Vec<Handle>), EmitError> {
    let mut log = Vec::new();
    for table in LOG_ORDER {
        for row in rows(tables, table) {
            log.extend(entries_for(Handle::new(table, row), previous, owners)?);
        }
    }

    let mut map: Vec<Handle> = log.iter().map(|e| e.handle).collect();
    map.sort_unstable();
    map.dedup();

    for entry in &log {
        tables.enc_log.push(EncLogRow {
            token: entry.handle,
            operation: entry.operation,
        });
    }
    for &token in &map {
        tables.enc_map.push(EncMapRow { token });
    }
    Ok((log, map))
}

fn broken(message: String) -> EmitError {
    EmitError::internal(ErrorCode::E2005, message)
}

/// Recheck the chain invariants of an assembled delta.
///
/// - Every logged handle is in the map and every mapped handle is logged.
/// - The map is strictly ascending.
/// - New rows of each table run contiguously from the previous count.
/// - Only MethodDef rows may be re-emitted at or below that count.
pub(super) fn verify(
    tables: &Tables,
    previous: &TableRowCounts,
    log: &[EncLogEntry],
    map: &[Handle],
) -> Result<(), EmitError> {
    let logged: FxHashSet<Handle> = log.iter().map(|e| e.handle).collect();
    let mapped: FxHashSet<Handle> = map.iter().copied().collect();
    if let Some(handle) = logged.symmetric_difference(&mapped).next() {
        return Err(broken(format!("{handle:?} is in only one of EncLog and EncMap")));
    }
    if let Some(pair) = map.windows(2).find(|w| w[0] >= w[1]) {
        return Err(broken(format!("EncMap is not sorted at {:?}", pair[1])));
    }

    for table in TableIndex::ALL {
        if matches!(table, TableIndex::Module | TableIndex::EncLog | TableIndex::EncMap) {
            continue;
        }
        let count = previous.get(table);
        let mut expected = count + 1;
        for row in rows(tables, table) {
            if row <= count {
                if table != TableIndex::MethodDef {
                    return Err(broken(format!(
                        "{table} row {row} rewrites a row of an earlier generation"
                    )));
                }
                continue;
            }
            if row != expected {
                return Err(broken(format!(
                    "{table} row {row} breaks append order, expected {expected}"
                )));
            }
            expected += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
