//! Metadata delta assembly.
//!
//! A classified batch becomes one delta in five passes:
//!
//! 1. **Lower** every edited body to symbolic code and allocate its local
//!    slots against the baseline's slot table. Slot conflicts reject the
//!    batch here, before any row exists.
//! 2. **Resolve** anonymous shapes, collecting the templates this
//!    generation must emit.
//! 3. **Allocate** definition rows in full-build order ([`rows`]).
//! 4. **Encode** bodies in handle order; reference rows are created on
//!    demand as tokens resolve ([`refs`]).
//! 5. **Write** definition rows, the Module row, then the log and map
//!    ([`log`]).
//!
//! The builder owns a fresh image whose heaps continue the baseline's
//! aggregate offsets; nothing the baseline holds is mutated.

mod debug;
mod log;
mod refs;
mod rows;

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::{debug, instrument, trace};

use enc_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode};
use enc_ir::rows::{MethodDefRow, ModuleRow};
use enc_ir::{EncLogEntry, GuidId, Handle, MetadataImage, TableIndex, TableRowCounts};

use crate::anonymous::{AnonymousTypeResolver, AnonymousTypeTemplate, PendingTemplate};
use crate::baseline::{enc_id_for, Baseline, BaselineUpdate};
use crate::body::{
    append_body, lower_method, lower_missing_method, lower_template_constructor, lower_template_getter,
    LoweredBody, MethodBody, TokenRef,
};
use crate::classify::{ClassifiedEdit, MemberOp};
use crate::edit::SemanticEdit;
use crate::locals::{AllocationError, SlotAllocation, SlotAllocator};
use crate::options::EmitOptions;
use crate::symbols::{
    AnonymousTypeKey, Compilation, EventId, FieldId, MethodId, PropertyId, SymbolKey, SymbolRef, TypeId,
};
use crate::EmitError;

pub use debug::{DeltaDebugInfo, LocalDebugInfo, MethodDebugInfo};

use self::refs::RefCache;
use self::rows::Layout;

/// One generation's output.
#[derive(Clone, Debug)]
pub struct Delta {
    /// Generation this delta produces.
    pub generation: u32,
    /// Tables and heaps, EncLog and EncMap included. Bodies live in `il`.
    pub image: MetadataImage,
    /// IL stream; `MethodDef.body_offset` values point into it.
    pub il: Vec<u8>,
    pub enc_log: Vec<EncLogEntry>,
    /// Touched-handle index, ascending by token.
    pub enc_map: Vec<Handle>,
    pub method_bodies: BTreeMap<Handle, MethodBody>,
    /// Present when debug information was requested.
    pub debug: Option<DeltaDebugInfo>,
    /// Warnings recorded while emitting.
    pub diagnostics: Vec<Diagnostic>,
}

impl Delta {
    /// Rows of `table` this delta adds beyond `baseline`.
    pub fn added_rows(&self, table: TableIndex, baseline: &Baseline) -> usize {
        let count = baseline.row_count(table);
        self.enc_map
            .iter()
            .filter(|h| h.table() == table && h.row() > count)
            .count()
    }

    /// Handles of rows this delta rewrites in place.
    pub fn updated_rows(&self, baseline: &Baseline) -> Vec<Handle> {
        self.enc_map
            .iter()
            .copied()
            .filter(|h| h.row() <= baseline.row_count(h.table()))
            .collect()
    }
}

pub(crate) struct DeltaInput<'a> {
    pub baseline: &'a Baseline,
    pub previous: &'a Compilation,
    pub current: &'a Compilation,
    pub edits: &'a [SemanticEdit],
    pub classified: &'a [ClassifiedEdit],
    pub options: &'a EmitOptions,
}

/// A built delta with everything its successor baseline needs.
pub(crate) struct Emitted {
    pub delta: Delta,
    pub update: BaselineUpdate,
    /// Symbols this delta adds to the module.
    pub added: Vec<SymbolKey>,
}

/// Anonymous template emitted by this generation.
struct PlannedTemplate {
    key: AnonymousTypeKey,
    index: u32,
    type_def: Handle,
    constructor: Handle,
    getters: Vec<Handle>,
    fields: Vec<Handle>,
}

/// Rows allocated for definitions of this generation.
#[derive(Default)]
struct Plan {
    types: FxHashMap<TypeId, Handle>,
    methods: FxHashMap<MethodId, Handle>,
    field_handles: FxHashMap<FieldId, Handle>,
    property_handles: FxHashMap<PropertyId, Handle>,
    event_handles: FxHashMap<EventId, Handle>,
    template_by_key: FxHashMap<AnonymousTypeKey, usize>,
    templates: Vec<PlannedTemplate>,
}

struct Builder<'a> {
    baseline: &'a Baseline,
    current: &'a Compilation,
    options: &'a EmitOptions,
    image: MetadataImage,
    /// Highest row used per table, this generation included.
    next: TableRowCounts,
    refs: RefCache,
    plan: Plan,
}

/// Method whose body a job emits.
#[derive(Copy, Clone, Debug)]
enum JobMethod {
    /// Inserted or updated method of the current compilation.
    Current(MethodId),
    /// Deleted baseline method.
    Deleted(Handle),
    TemplateConstructor(usize),
    TemplateGetter(usize, u16),
}

struct BodyJob {
    method: JobMethod,
    lowered: LoweredBody,
    /// `None` for template members, which have no locals.
    allocation: Option<SlotAllocation>,
}

/// Assemble the delta for a classified batch.
#[instrument(level = "debug", skip_all, fields(generation = input.baseline.generation() + 1))]
pub(crate) fn build(input: &DeltaInput<'_>) -> Result<Emitted, EmitError> {
    let baseline = input.baseline;
    let generation = baseline.generation() + 1;

    let (mut jobs, warnings) = lower_bodies(input)?;
    let pending = resolve_templates(input, &jobs)?;

    let mut builder = Builder {
        baseline,
        current: input.current,
        options: input.options,
        image: MetadataImage::new(true, baseline.heap_sizes()),
        next: baseline.row_counts(),
        refs: RefCache::default(),
        plan: Plan::default(),
    };
    builder.self_reference()?;
    let layout = builder.allocate_definitions(input.classified, pending)?;
    jobs.extend(template_jobs(&builder.plan)?);

    let (il, offsets, method_bodies, debug_info) = builder.encode_bodies(&jobs)?;
    let mut methods = builder.write_definitions(&layout, &offsets)?;
    methods.extend(builder.write_existing_methods(input.classified, &offsets)?);
    builder.write_module(generation)?;

    let previous_counts = baseline.row_counts();
    let (enc_log, enc_map) = log::write_log(&mut builder.image.tables, &previous_counts, &layout.owners)?;
    if input.options.verify_invariants {
        log::verify(&builder.image.tables, &previous_counts, &enc_log, &enc_map)?;
    }

    for (table, rows) in builder.image.tables.max_rows().iter() {
        let added = rows.saturating_sub(previous_counts.get(table));
        if added > 0 && !matches!(table, TableIndex::Module | TableIndex::EncLog | TableIndex::EncMap) {
            trace!(%table, added, "rows added");
        }
    }
    debug!(
        log = enc_log.len(),
        map = enc_map.len(),
        bodies = method_bodies.len(),
        templates = builder.plan.templates.len(),
        "assembled delta"
    );

    let (update, added) = builder.successor_update(&layout, &jobs, methods, generation);
    let debug = input.options.emit_debug_info.then_some(debug_info);
    Ok(Emitted {
        delta: Delta {
            generation,
            image: builder.image,
            il,
            enc_log,
            enc_map,
            method_bodies,
            debug,
            diagnostics: warnings,
        },
        update,
        added,
    })
}

/// Lower edited bodies and allocate their slots.
fn lower_bodies(input: &DeltaInput<'_>) -> Result<(Vec<BodyJob>, Vec<Diagnostic>), EmitError> {
    let DeltaInput {
        baseline,
        previous,
        current,
        edits,
        classified,
        options,
    } = *input;
    let registry = baseline.anonymous_types();
    let is_registered = |key: &AnonymousTypeKey| registry.contains(key);

    let mut jobs = Vec::new();
    let mut warnings = Vec::new();
    let mut queue = DiagnosticQueue::new();
    for edit in classified {
        let ClassifiedEdit::MethodEdit { method, op, edit } = *edit else {
            continue;
        };
        let (compilation, target, previous_slots) = match op {
            MemberOp::Insert => (current, JobMethod::Current(method), None),
            MemberOp::Update(handle) => (current, JobMethod::Current(method), baseline.method_slots(handle)),
            MemberOp::Delete(handle) => (previous, JobMethod::Deleted(handle), baseline.method_slots(handle)),
        };
        let mut lowered = match target {
            JobMethod::Deleted(_) => lower_missing_method(),
            _ if current.method(method).body.is_none() => continue,
            _ => lower_method(current, method, options.string_switch_helper_threshold)?,
        };
        warnings.append(&mut lowered.diagnostics);

        let source = edits.get(edit);
        let allocator = SlotAllocator::new(&is_registered)
            .previous(previous_slots)
            .syntax_map(
                source.and_then(|e| e.syntax_map.as_ref()),
                source.is_some_and(|e| e.preserve_locals),
            );
        match allocator.allocate(&lowered.requests) {
            Ok(allocation) => jobs.push(BodyJob {
                method: target,
                lowered,
                allocation: Some(allocation),
            }),
            Err(AllocationError::TooManySlots { requested }) => {
                return Err(EmitError::internal(
                    ErrorCode::E2005,
                    format!("{} needs {requested} local slots", compilation.describe(SymbolRef::Method(method))),
                ));
            }
            Err(AllocationError::UnreachableType { request, ordinal }) => {
                let interner = compilation.interner();
                let local = lowered
                    .requests
                    .get(request)
                    .and_then(|r| r.name)
                    .map_or("<temporary>", |name| interner.lookup(name));
                let symbol = SymbolRef::Method(method);
                queue.push(
                    Diagnostic::error(ErrorCode::E1005)
                        .with_message(format!(
                            "local `{local}` of {} maps to slot {ordinal}, whose anonymous type is no longer available",
                            compilation.describe(symbol)
                        ))
                        .with_label(compilation.span_of(symbol), "edited here")
                        .with_note("rebuild the module to reset this method's locals"),
                );
            }
        }
    }

    if queue.has_errors().is_some() {
        return Err(EmitError::from_diagnostics(queue.flush()));
    }
    if !warnings.is_empty() {
        debug!(warnings = warnings.len(), "bodies lowered with warnings");
    }
    Ok((jobs, warnings))
}

/// Resolve every anonymous shape the delta mentions, in first-use order.
fn resolve_templates(input: &DeltaInput<'_>, jobs: &[BodyJob]) -> Result<Vec<PendingTemplate>, EmitError> {
    let current = input.current;
    let mut resolver = AnonymousTypeResolver::new(input.baseline.anonymous_types());

    for job in jobs {
        let JobMethod::Current(method) = job.method else {
            continue;
        };
        for request in &job.lowered.requests {
            resolver.resolve_ty(&request.ty)?;
        }
        for token in job.lowered.code.tokens() {
            match token {
                TokenRef::Type(ty) => resolver.resolve_ty(ty)?,
                TokenRef::Method { type_args, .. } => {
                    for ty in type_args {
                        resolver.resolve_ty(ty)?;
                    }
                }
                TokenRef::AnonymousConstructor(key)
                | TokenRef::AnonymousGetter(key, _)
                | TokenRef::AnonymousField(key, _) => {
                    resolver.resolve(key)?;
                }
                _ => {}
            }
        }
        let symbol = current.method(method);
        for param in &symbol.params {
            resolver.resolve_ty(&param.ty)?;
        }
        resolver.resolve_ty(&symbol.ret)?;
    }

    for edit in input.classified {
        match *edit {
            ClassifiedEdit::MethodEdit {
                method,
                op: MemberOp::Insert,
                ..
            } => {
                let symbol = current.method(method);
                for param in &symbol.params {
                    resolver.resolve_ty(&param.ty)?;
                }
                resolver.resolve_ty(&symbol.ret)?;
            }
            ClassifiedEdit::FieldEdit {
                field,
                op: MemberOp::Insert,
            } => resolver.resolve_ty(&current.field(field).ty)?,
            ClassifiedEdit::PropertyEdit {
                property,
                op: MemberOp::Insert,
            } => resolver.resolve_ty(&current.property(property).ty)?,
            ClassifiedEdit::EventEdit {
                event,
                op: MemberOp::Insert,
            } => resolver.resolve_ty(&current.event(event).ty)?,
            ClassifiedEdit::TypeInsert(ty) => {
                if let Some(base) = &current.ty(ty).base {
                    resolver.resolve_ty(base)?;
                }
            }
            _ => {}
        }
    }

    let pending = resolver.into_pending();
    if !pending.is_empty() {
        debug!(new = pending.len(), "anonymous types created");
    }
    Ok(pending)
}

/// Constructor and getter bodies of every new template.
fn template_jobs(plan: &Plan) -> Result<Vec<BodyJob>, EmitError> {
    let mut jobs = Vec::new();
    for (t, template) in plan.templates.iter().enumerate() {
        jobs.push(BodyJob {
            method: JobMethod::TemplateConstructor(t),
            lowered: lower_template_constructor(&template.key)?,
            allocation: None,
        });
        for index in 0..template.getters.len() {
            let index = EmitError::narrow(index, "anonymous member")?;
            jobs.push(BodyJob {
                method: JobMethod::TemplateGetter(t, index),
                lowered: lower_template_getter(&template.key, index),
                allocation: None,
            });
        }
    }
    Ok(jobs)
}

type EncodedBodies = (Vec<u8>, FxHashMap<Handle, u32>, BTreeMap<Handle, MethodBody>, DeltaDebugInfo);

impl Builder<'_> {
    fn job_handle(&self, method: JobMethod) -> Result<Handle, EmitError> {
        let missing = || EmitError::internal(ErrorCode::E2005, format!("no row allocated for {method:?}"));
        match method {
            JobMethod::Current(id) => self.definition(SymbolRef::Method(id)),
            JobMethod::Deleted(handle) => Ok(handle),
            JobMethod::TemplateConstructor(t) => self.plan.templates.get(t).map(|t| t.constructor).ok_or_else(missing),
            JobMethod::TemplateGetter(t, i) => self
                .plan
                .templates
                .get(t)
                .and_then(|t| t.getters.get(usize::from(i)).copied())
                .ok_or_else(missing),
        }
    }

    /// Encode every body in handle order into a fresh IL stream.
    fn encode_bodies(&mut self, jobs: &[BodyJob]) -> Result<EncodedBodies, EmitError> {
        let mut ordered = jobs
            .iter()
            .map(|job| Ok((self.job_handle(job.method)?, job)))
            .collect::<Result<Vec<_>, EmitError>>()?;
        ordered.sort_by_key(|(handle, _)| *handle);

        let interner = self.current.interner().clone();
        let mut il = Vec::new();
        let mut offsets = FxHashMap::default();
        let mut bodies = BTreeMap::new();
        let mut debug_info = DeltaDebugInfo::default();
        for (handle, job) in ordered {
            let ordinals = job.allocation.as_ref().map_or(&[][..], |a| &a.ordinals[..]);
            let encoded = job.lowered.code.finish(ordinals, &mut |token| self.token(token))?;
            let local_signature = match &job.allocation {
                Some(allocation) => self.local_signature(&allocation.slots)?,
                None => None,
            };
            let body = MethodBody {
                max_stack: encoded.max_stack,
                local_signature,
                code: encoded.code,
                regions: encoded.regions,
            };
            let offset = append_body(&mut il, &body).map_err(|e| EmitError::encoding(&e))?;
            trace!(method = %handle, offset, size = body.code.len(), "encoded body");

            debug_info.methods.push(MethodDebugInfo {
                method: handle,
                locals: job
                    .allocation
                    .as_ref()
                    .map(|a| debug::method_locals(&interner, a, &job.lowered.local_scopes))
                    .unwrap_or_default(),
                sequence_points: encoded.sequence_points,
            });
            offsets.insert(handle, offset);
            bodies.insert(handle, body);
        }
        Ok((il, offsets, bodies, debug_info))
    }

    /// Re-emit the rows of updated and deleted methods with their new bodies.
    fn write_existing_methods(
        &mut self,
        classified: &[ClassifiedEdit],
        offsets: &FxHashMap<Handle, u32>,
    ) -> Result<Vec<(Handle, MethodDefRow)>, EmitError> {
        let mut written = Vec::new();
        for edit in classified {
            let ClassifiedEdit::MethodEdit {
                op: MemberOp::Update(handle) | MemberOp::Delete(handle),
                ..
            } = *edit
            else {
                continue;
            };
            let mut row = self.baseline.method_row(handle)?;
            row.body_offset = offsets.get(&handle).copied().unwrap_or(0);
            self.image.tables.method_def.insert(handle.row(), row.clone());
            written.push((handle, row));
        }
        Ok(written)
    }

    /// The delta's Module row, chaining this generation's EncId to the
    /// previous one.
    fn write_module(&mut self, generation: u32) -> Result<(), EmitError> {
        let number = u16::try_from(generation).map_err(|_| {
            EmitError::internal(ErrorCode::E2005, format!("generation {generation} does not fit the Module row"))
        })?;
        let baseline = self.baseline;
        let mvid = baseline.mvid();
        let name = self
            .image
            .heaps
            .strings
            .add(baseline.module_name())
            .map_err(|e| EmitError::encoding(&e))?;
        let guids = &mut self.image.heaps.guids;
        let mvid_id = guids.add(mvid).map_err(|e| EmitError::encoding(&e))?;
        let enc_id = guids.add(enc_id_for(mvid, generation)).map_err(|e| EmitError::encoding(&e))?;
        let enc_base_id = if baseline.enc_id() == [0; 16] {
            GuidId::EMPTY
        } else {
            guids.add(baseline.enc_id()).map_err(|e| EmitError::encoding(&e))?
        };
        self.image.tables.module.insert(
            1,
            ModuleRow {
                generation: number,
                name,
                mvid: mvid_id,
                enc_id,
                enc_base_id,
            },
        );
        Ok(())
    }

    fn successor_update(
        &self,
        layout: &Layout,
        jobs: &[BodyJob],
        methods: Vec<(Handle, MethodDefRow)>,
        generation: u32,
    ) -> (BaselineUpdate, Vec<SymbolKey>) {
        let current = self.current;
        let symbols: Vec<(SymbolKey, Handle)> = layout
            .symbols()
            .map(|(symbol, handle)| (current.key(symbol), handle))
            .collect();
        let added = symbols.iter().map(|(key, _)| *key).collect();

        let method_slots = jobs
            .iter()
            .filter_map(|job| {
                let allocation = job.allocation.as_ref()?;
                let handle = self.job_handle(job.method).ok()?;
                Some((handle, allocation.slots.clone()))
            })
            .collect();

        let mut anonymous_types = self.baseline.anonymous_types().clone();
        for template in &self.plan.templates {
            anonymous_types.register(AnonymousTypeTemplate {
                key: template.key.clone(),
                index: template.index,
                type_def: template.type_def,
                constructor: template.constructor,
                getters: template.getters.clone(),
                fields: template.fields.clone(),
                generation,
            });
        }

        let update = BaselineUpdate {
            row_counts: self.image.tables.max_rows(),
            heap_sizes: self.image.heaps.sizes(),
            symbols,
            methods,
            property_maps: layout.property_maps.clone(),
            event_maps: layout.event_maps.clone(),
            method_slots,
            anonymous_types,
        };
        (update, added)
    }
}
