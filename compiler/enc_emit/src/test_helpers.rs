//! Stand-ins for the collaborators around the emitter: a full module
//! writer for generation 0 and readable renderings of logs and maps.
//!
//! The writer emits every local type as an insertion into an empty module,
//! then folds that delta into a full image: delta heaps are appended to
//! the empty module's heaps, the log's `Add*` entries become the ECMA list
//! columns, and the slot tables of the emitted bodies become the debug
//! information handed to [`Baseline::initial`].

use rustc_hash::FxHashMap;

use enc_ir::heap::{BlobHeap, GuidHeap, StringHeap, UserStringHeap};
use enc_ir::rows::{ModuleRow, Table};
use enc_ir::{EncLogEntry, EncOperation, Handle, HeapSizes, MetadataImage, SharedInterner, TableIndex};

use crate::baseline::{Baseline, NoDebugInfo};
use crate::chain::GenerationChain;
use crate::edit::{EditSession, SemanticEdit};
use crate::locals::MethodSlots;
use crate::options::EmitOptions;
use crate::symbols::{
    Body, Compilation, CompilationBuilder, Constant, Expr, MethodId, Stmt, StmtKind, SymbolRef, Ty, TypeId,
};

pub const MVID: [u8; 16] = [0x4D; 16];

/// A full module and what the full writer knows about it.
pub struct Generation0 {
    pub image: Vec<u8>,
    pub slots: FxHashMap<Handle, MethodSlots>,
    pub baseline: Baseline,
}

fn empty_module(compilation: &Compilation) -> MetadataImage {
    let mut image = MetadataImage::new(false, HeapSizes::default());
    let name = compilation.interner().lookup(compilation.module());
    let name = image.heaps.strings.add(name).unwrap_or_else(|e| panic!("{e}"));
    let mvid = image.heaps.guids.add(MVID).unwrap_or_else(|e| panic!("{e}"));
    image.tables.module.push(ModuleRow {
        generation: 0,
        name,
        mvid,
        enc_id: enc_ir::GuidId::EMPTY,
        enc_base_id: enc_ir::GuidId::EMPTY,
    });
    image
}

/// Member ranges from `Add*` entries: owner row -> member rows.
fn owned_rows(log: &[EncLogEntry], operation: EncOperation) -> FxHashMap<u32, Vec<u32>> {
    let mut owned: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
    for pair in log.windows(2) {
        if pair[0].operation == operation {
            owned.entry(pair[0].handle.row()).or_default().push(pair[1].handle.row());
        }
    }
    owned
}

/// List column values for `owners` rows: the first owned member, or the
/// next owner's start when a row owns nothing.
fn list_starts(owners: &[u32], owned: &FxHashMap<u32, Vec<u32>>, members: u32) -> FxHashMap<u32, u32> {
    let mut starts = FxHashMap::default();
    let mut next = members + 1;
    for &owner in owners.iter().rev() {
        if let Some(first) = owned.get(&owner).and_then(|rows| rows.iter().min()) {
            next = *first;
        }
        starts.insert(owner, next);
    }
    starts
}

macro_rules! fill_lists {
    ($table:expr, $column:ident, $log:expr, $operation:expr, $members:expr) => {{
        let owners: Vec<u32> = $table.iter().map(|(h, _)| h.row()).collect();
        let starts = list_starts(&owners, &owned_rows($log, $operation), $members);
        let rows: Vec<_> = $table.iter().map(|(h, r)| (h.row(), r.clone())).collect();
        for (number, mut row) in rows {
            row.$column = starts.get(&number).copied().unwrap_or($members + 1);
            $table.insert(number, row);
        }
    }};
}

/// Write `compilation` as a full module and open generation 0 on it.
pub fn generation0(compilation: &Compilation) -> Generation0 {
    let interner = compilation.interner().clone();
    let base = empty_module(compilation);
    let base_bytes = base.to_bytes().unwrap_or_else(|e| panic!("{e}"));
    let empty = Baseline::initial(&base_bytes, interner.clone(), &NoDebugInfo).unwrap_or_else(|e| panic!("{e}"));

    let edits: Vec<SemanticEdit> = compilation
        .types()
        .filter(|(id, symbol)| compilation.is_local(*id) && symbol.enclosing.is_none())
        .map(|(id, _)| SemanticEdit::insert(SymbolRef::Type(id)))
        .collect();
    let chain = GenerationChain::new(EmitOptions::default());
    let (emitted, _) = chain
        .emit_difference_in_memory(&empty, compilation, compilation, &edits, &mut EditSession::new())
        .unwrap_or_else(|e| panic!("{}", e.render()));
    let delta = emitted.delta;

    let mut full = MetadataImage::new(false, HeapSizes::default());
    full.tables = delta.image.tables.clone();
    full.tables.module = base.tables.module.clone();
    full.tables.enc_log = Table::default();
    full.tables.enc_map = Table::default();

    let log = &delta.enc_log;
    let fields = full.tables.field.max_row();
    let methods = full.tables.method_def.max_row();
    let params = full.tables.param.max_row();
    let properties = full.tables.property.max_row();
    let events = full.tables.event.max_row();
    fill_lists!(full.tables.type_def, field_list, log, EncOperation::AddField, fields);
    fill_lists!(full.tables.type_def, method_list, log, EncOperation::AddMethod, methods);
    fill_lists!(full.tables.method_def, param_list, log, EncOperation::AddParameter, params);
    fill_lists!(full.tables.property_map, property_list, log, EncOperation::AddProperty, properties);
    fill_lists!(full.tables.event_map, event_list, log, EncOperation::AddEvent, events);

    let concat = |a: &[u8], b: &[u8]| [a, b].concat();
    full.heaps.strings = StringHeap::from_bytes(
        0,
        concat(base.heaps.strings.bytes(), delta.image.heaps.strings.bytes()),
    );
    full.heaps.blobs = BlobHeap::from_bytes(0, concat(base.heaps.blobs.bytes(), delta.image.heaps.blobs.bytes()));
    full.heaps.user_strings = UserStringHeap::from_bytes(
        0,
        concat(base.heaps.user_strings.bytes(), delta.image.heaps.user_strings.bytes()),
    );
    full.heaps.guids = GuidHeap::from_bytes(0, &base.heaps.guids.bytes());
    full.il = delta.il.clone();

    let slots: FxHashMap<Handle, MethodSlots> = full
        .tables
        .method_def
        .iter()
        .filter_map(|(method, _)| Some((method, emitted.baseline.method_slots(method)?.clone())))
        .collect();

    let image = full.to_bytes().unwrap_or_else(|e| panic!("{e}"));
    let baseline = Baseline::initial(&image, interner, &slots).unwrap_or_else(|e| panic!("{}", e.render()));
    Generation0 { image, slots, baseline }
}

/// `Table#row Operation` per log entry.
pub fn render_log(log: &[EncLogEntry]) -> Vec<String> {
    log.iter().map(|e| format!("{:?} {:?}", e.handle, e.operation)).collect()
}

/// `Table#row` per map entry.
pub fn render_map(map: &[Handle]) -> Vec<String> {
    map.iter().map(|h| format!("{h:?}")).collect()
}

/// Handles of `table` in a map.
pub fn map_rows(map: &[Handle], table: TableIndex) -> Vec<u32> {
    map.iter().filter(|h| h.table() == table).map(|h| h.row()).collect()
}

/// Symbols every fixture compilation declares, in the same order.
#[derive(Copy, Clone, Debug)]
pub struct Widget {
    pub ty: TypeId,
    /// `F() -> int32`, the method most tests edit.
    pub f: MethodId,
    /// Constructor of `System.ObsoleteAttribute` from the core library.
    pub obsolete_ctor: MethodId,
}

/// `App.Widget` in module `App` with `F` bodied by `f_body`; `extend` adds
/// whatever a test needs after the shared declarations.
pub fn widget(
    interner: &SharedInterner,
    f_body: Body,
    extend: impl FnOnce(&mut CompilationBuilder, &Widget),
) -> (Compilation, Widget) {
    let mut builder = CompilationBuilder::new(interner.clone(), "App");
    let obsolete = builder.external_type("System.Runtime", "System", "ObsoleteAttribute");
    let obsolete_ctor = builder.define_constructor(obsolete, &[]);
    let ty = builder.define_type("App", "Widget");
    let f = builder.define_method(ty, "F", &[], Ty::I4);
    builder.method_mut(f).body = Some(f_body);
    let ids = Widget { ty, f, obsolete_ctor };
    extend(&mut builder, &ids);
    (builder.build(), ids)
}

/// `return value;`
pub fn literal_body(value: i32) -> Body {
    Body::new(vec![Stmt::new(StmtKind::Return(Some(Expr::constant(Constant::I4(value)))))])
}

/// Baseline row of a symbol of `compilation`.
pub fn handle(baseline: &Baseline, compilation: &Compilation, symbol: SymbolRef) -> Handle {
    let key = compilation.key(symbol);
    baseline
        .handle_of(&key)
        .unwrap_or_else(|| panic!("{} is not in the baseline", key.display(compilation.interner())))
}
