//! Baseline store.
//!
//! A [`Baseline`] is the cumulative metadata state through one generation:
//! row counts and heap sizes (where the next delta continues), the stable
//! symbol key to handle map, slot tables of every method emitted so far,
//! and the anonymous type registry. Baselines are immutable; emitting a
//! delta produces a successor and leaves its input untouched.
//!
//! # Generation 0
//!
//! [`Baseline::initial`] parses the full module image written by the
//! non-incremental writer, recovers symbol keys and anonymous templates from
//! its tables, and types slot tables from each body's local signature. A
//! [`DebugInfoProvider`] names those slots; it cannot drop or retype them.

mod recover;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHasher};
use tracing::{debug, instrument};

use enc_diagnostic::ErrorCode;
use enc_ir::rows::MethodDefRow;
use enc_ir::{Handle, HeapSizes, MetadataImage, SharedInterner, TableIndex, TableRowCounts};

use crate::anonymous::AnonymousTypeRegistry;
use crate::locals::MethodSlots;
use crate::symbols::SymbolKey;
use crate::EmitError;

/// Source of generation-0 slot tables, implemented by the full writer.
pub trait DebugInfoProvider {
    fn method_slots(&self, method: Handle) -> Option<MethodSlots>;
}

impl DebugInfoProvider for FxHashMap<Handle, MethodSlots> {
    fn method_slots(&self, method: Handle) -> Option<MethodSlots> {
        self.get(&method).cloned()
    }
}

/// No debug information: slot tables come from local signatures alone.
pub struct NoDebugInfo;

impl DebugInfoProvider for NoDebugInfo {
    fn method_slots(&self, _: Handle) -> Option<MethodSlots> {
        None
    }
}

struct BaselineData {
    generation: u32,
    interner: SharedInterner,
    module_name: String,
    mvid: [u8; 16],
    enc_id: [u8; 16],
    origin: Arc<MetadataImage>,
    row_counts: TableRowCounts,
    heap_sizes: HeapSizes,
    symbols: FxHashMap<SymbolKey, Handle>,
    /// MethodDef rows written by deltas, latest version.
    added_methods: FxHashMap<Handle, MethodDefRow>,
    /// TypeDef -> PropertyMap / EventMap row.
    property_maps: FxHashMap<Handle, Handle>,
    event_maps: FxHashMap<Handle, Handle>,
    method_slots: FxHashMap<Handle, Arc<MethodSlots>>,
    anonymous_types: AnonymousTypeRegistry,
}

/// Immutable cumulative metadata state through one generation.
///
/// Cloning is cheap and yields the same baseline.
#[derive(Clone)]
pub struct Baseline(Arc<BaselineData>);

/// What one delta adds on top of a baseline.
#[derive(Default)]
pub(crate) struct BaselineUpdate {
    pub row_counts: TableRowCounts,
    pub heap_sizes: HeapSizes,
    pub symbols: Vec<(SymbolKey, Handle)>,
    pub methods: Vec<(Handle, MethodDefRow)>,
    pub property_maps: Vec<(Handle, Handle)>,
    pub event_maps: Vec<(Handle, Handle)>,
    pub method_slots: Vec<(Handle, MethodSlots)>,
    pub anonymous_types: AnonymousTypeRegistry,
}

impl Baseline {
    /// Build generation 0 from a full module image.
    #[instrument(level = "debug", skip_all, fields(bytes = image.len()))]
    pub fn initial(
        image: &[u8],
        interner: SharedInterner,
        debug_info: &dyn DebugInfoProvider,
    ) -> Result<Baseline, EmitError> {
        let origin = MetadataImage::read_from(image).map_err(|e| EmitError::unparseable(&e))?;
        if origin.delta {
            return Err(EmitError::internal(
                ErrorCode::E2001,
                "generation 0 must be a full module image, found a delta",
            ));
        }
        let module = origin
            .tables
            .module
            .get(1)
            .cloned()
            .ok_or_else(|| EmitError::internal(ErrorCode::E2001, "module image has no Module row"))?;
        let module_name = origin.string(module.name).map_err(|e| EmitError::unparseable(&e))?.to_owned();
        let mvid = origin.heaps.guids.get(module.mvid).map_err(|e| EmitError::unparseable(&e))?;

        let recovered = recover::recover(&origin, &interner)?;
        let mut method_slots: FxHashMap<Handle, Arc<MethodSlots>> = recovered
            .signature_slots
            .into_iter()
            .map(|(method, slots)| (method, Arc::new(slots)))
            .collect();
        for (method, _) in origin.tables.method_def.iter() {
            let Some(named) = debug_info.method_slots(method) else {
                continue;
            };
            let signature: MethodSlots = method_slots.get(&method).map(AsRef::as_ref).cloned().unwrap_or_default();
            let slots = signature.overlay(&named).map_err(|e| {
                EmitError::internal(
                    ErrorCode::E2003,
                    format!("debug information of method {method} disagrees with its locals: {e}"),
                )
            })?;
            method_slots.insert(method, Arc::new(slots));
        }

        debug!(
            module = %module_name,
            symbols = recovered.symbols.len(),
            templates = recovered.templates.len(),
            slot_tables = method_slots.len(),
            "recovered generation 0"
        );

        let row_counts = origin.tables.max_rows();
        let heap_sizes = origin.heaps.sizes();
        Ok(Baseline(Arc::new(BaselineData {
            generation: 0,
            interner,
            module_name,
            mvid,
            enc_id: [0; 16],
            origin: Arc::new(origin),
            row_counts,
            heap_sizes,
            symbols: recovered.symbols,
            added_methods: FxHashMap::default(),
            property_maps: recovered.property_maps,
            event_maps: recovered.event_maps,
            method_slots,
            anonymous_types: recovered.templates,
        })))
    }

    /// Successor produced by a committed delta.
    pub(crate) fn successor(&self, update: BaselineUpdate) -> Baseline {
        let data = &self.0;
        let generation = data.generation + 1;
        let mut row_counts = data.row_counts;
        for (table, count) in update.row_counts.iter() {
            if !matches!(table, TableIndex::Module | TableIndex::EncLog | TableIndex::EncMap) {
                row_counts.observe(table, count);
            }
        }

        let mut symbols = data.symbols.clone();
        symbols.extend(update.symbols);
        let mut added_methods = data.added_methods.clone();
        added_methods.extend(update.methods);
        let mut property_maps = data.property_maps.clone();
        property_maps.extend(update.property_maps);
        let mut event_maps = data.event_maps.clone();
        event_maps.extend(update.event_maps);
        let mut method_slots = data.method_slots.clone();
        method_slots.extend(update.method_slots.into_iter().map(|(m, s)| (m, Arc::new(s))));

        Baseline(Arc::new(BaselineData {
            generation,
            interner: data.interner.clone(),
            module_name: data.module_name.clone(),
            mvid: data.mvid,
            enc_id: enc_id_for(data.mvid, generation),
            origin: Arc::clone(&data.origin),
            row_counts,
            heap_sizes: update.heap_sizes,
            symbols,
            added_methods,
            property_maps,
            event_maps,
            method_slots,
            anonymous_types: update.anonymous_types,
        }))
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.0.generation
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.0.interner
    }

    pub fn module_name(&self) -> &str {
        &self.0.module_name
    }

    pub fn mvid(&self) -> [u8; 16] {
        self.0.mvid
    }

    /// EncId of this generation; nil for generation 0.
    pub fn enc_id(&self) -> [u8; 16] {
        self.0.enc_id
    }

    /// The full module the chain started from.
    pub fn origin(&self) -> &MetadataImage {
        &self.0.origin
    }

    pub fn row_counts(&self) -> TableRowCounts {
        self.0.row_counts
    }

    #[inline]
    pub fn row_count(&self, table: TableIndex) -> u32 {
        self.0.row_counts.get(table)
    }

    pub fn heap_sizes(&self) -> HeapSizes {
        self.0.heap_sizes
    }

    pub fn handle_of(&self, key: &SymbolKey) -> Option<Handle> {
        self.0.symbols.get(key).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&SymbolKey, Handle)> + '_ {
        self.0.symbols.iter().map(|(k, &h)| (k, h))
    }

    pub fn method_slots(&self, method: Handle) -> Option<&MethodSlots> {
        self.0.method_slots.get(&method).map(AsRef::as_ref)
    }

    /// Current version of a MethodDef row.
    pub fn method_row(&self, method: Handle) -> Result<MethodDefRow, EmitError> {
        if let Some(row) = self.0.added_methods.get(&method) {
            return Ok(row.clone());
        }
        self.0.origin.tables.method_def.get(method.row()).cloned().ok_or_else(|| {
            EmitError::internal(ErrorCode::E2003, format!("baseline has no method row {method}"))
        })
    }

    pub fn property_map(&self, owner: Handle) -> Option<Handle> {
        self.0.property_maps.get(&owner).copied()
    }

    pub fn event_map(&self, owner: Handle) -> Option<Handle> {
        self.0.event_maps.get(&owner).copied()
    }

    pub fn anonymous_types(&self) -> &AnonymousTypeRegistry {
        &self.0.anonymous_types
    }

    /// Whether two values are the same baseline.
    pub fn ptr_eq(&self, other: &Baseline) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Baseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Baseline")
            .field("generation", &self.0.generation)
            .field("module", &self.0.module_name)
            .field("row_counts", &self.0.row_counts)
            .field("symbols", &self.0.symbols.len())
            .field("templates", &self.0.anonymous_types.len())
            .finish_non_exhaustive()
    }
}

/// EncId of `generation`, derived from the module version id so every
/// chain built from the same module names its generations identically.
pub(crate) fn enc_id_for(mvid: [u8; 16], generation: u32) -> [u8; 16] {
    if generation == 0 {
        return [0; 16];
    }
    let mut id = [0u8; 16];
    for (lane, chunk) in id.chunks_exact_mut(8).enumerate() {
        let mut hasher = FxHasher::default();
        (mvid, generation, lane).hash(&mut hasher);
        chunk.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    id
}

#[cfg(test)]
mod tests;
