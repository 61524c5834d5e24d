//! Generation chain manager.
//!
//! Entry point of the emitter. A [`GenerationChain`] turns a full module
//! into generation 0 and then each edit batch into one delta plus the
//! successor baseline. Emission is transactional: the delta is written to
//! the host sinks before the successor exists, and any failure leaves the
//! input baseline as the head of the chain.

use std::io::Write;

use tracing::{debug, instrument};

use enc_diagnostic::ErrorCode;
use enc_ir::SharedInterner;

use crate::baseline::{Baseline, DebugInfoProvider};
use crate::classify::classify;
use crate::delta::{self, Delta, DeltaInput};
use crate::edit::{EditSession, SemanticEdit};
use crate::options::EmitOptions;
use crate::symbols::Compilation;
use crate::EmitError;

/// Destinations for one delta's streams.
pub struct DeltaSinks<'w> {
    pub metadata: &'w mut dyn Write,
    pub il: &'w mut dyn Write,
    /// Written only when debug information is enabled.
    pub debug: &'w mut dyn Write,
}

/// A committed delta and the baseline the next batch starts from.
#[derive(Debug)]
pub struct EmitDifference {
    pub delta: Delta,
    pub baseline: Baseline,
}

/// Streams of a delta written to memory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeltaBytes {
    pub metadata: Vec<u8>,
    pub il: Vec<u8>,
    pub debug: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct GenerationChain {
    options: EmitOptions,
}

impl GenerationChain {
    pub fn new(options: EmitOptions) -> Self {
        GenerationChain { options }
    }

    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// Generation 0 from the bytes of a full module image.
    pub fn create_initial_baseline(
        &self,
        image: &[u8],
        interner: SharedInterner,
        debug_info: &dyn DebugInfoProvider,
    ) -> Result<Baseline, EmitError> {
        Baseline::initial(image, interner, debug_info)
    }

    /// Emit the delta for `edits` on top of `baseline` and commit it.
    ///
    /// `previous` is the compilation the baseline was built from and
    /// `current` the edited one; both must share the baseline's interner.
    /// On success every addition is recorded in `session` under the
    /// current module.
    #[instrument(
        level = "debug",
        skip_all,
        fields(generation = baseline.generation() + 1, edits = edits.len())
    )]
    pub fn emit_difference(
        &self,
        baseline: &Baseline,
        previous: &Compilation,
        current: &Compilation,
        edits: &[SemanticEdit],
        session: &mut EditSession,
        sinks: &mut DeltaSinks<'_>,
    ) -> Result<EmitDifference, EmitError> {
        for (which, compilation) in [("previous", previous), ("current", current)] {
            if !compilation.interner().same_as(baseline.interner()) {
                return Err(EmitError::internal(
                    ErrorCode::E2004,
                    format!("the {which} compilation does not share the baseline's interner"),
                ));
            }
        }

        let classified = classify(baseline, previous, current, edits, session)?;
        let emitted = delta::build(&DeltaInput {
            baseline,
            previous,
            current,
            edits,
            classified: &classified,
            options: &self.options,
        })?;

        emitted
            .delta
            .image
            .write_to(&mut sinks.metadata)
            .map_err(|e| EmitError::host_write(e, "metadata"))?;
        sinks
            .il
            .write_all(&emitted.delta.il)
            .map_err(|e| EmitError::host_write(e, "IL"))?;
        if let Some(debug_info) = &emitted.delta.debug {
            debug_info
                .write_to(&mut *sinks.debug)
                .map_err(|e| EmitError::host_write(e, "debug"))?;
        }

        let successor = baseline.successor(emitted.update);
        let module = current.module();
        for key in emitted.added {
            session.record(module, key);
        }
        debug!(
            generation = successor.generation(),
            log = emitted.delta.enc_log.len(),
            il = emitted.delta.il.len(),
            "committed delta"
        );
        Ok(EmitDifference {
            delta: emitted.delta,
            baseline: successor,
        })
    }

    /// [`GenerationChain::emit_difference`] into in-memory buffers.
    pub fn emit_difference_in_memory(
        &self,
        baseline: &Baseline,
        previous: &Compilation,
        current: &Compilation,
        edits: &[SemanticEdit],
        session: &mut EditSession,
    ) -> Result<(EmitDifference, DeltaBytes), EmitError> {
        let mut bytes = DeltaBytes::default();
        let result = self.emit_difference(
            baseline,
            previous,
            current,
            edits,
            session,
            &mut DeltaSinks {
                metadata: &mut bytes.metadata,
                il: &mut bytes.il,
                debug: &mut bytes.debug,
            },
        )?;
        Ok((result, bytes))
    }
}
