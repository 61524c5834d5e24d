//! Incremental edit-and-continue delta emission.
//!
//! Given the baseline of a module that is already loaded by a running host
//! and a batch of symbol-level edits, this crate produces a metadata delta
//! (appended table rows, re-emitted method bodies, the EncLog and EncMap)
//! plus the successor baseline for the next batch.
//!
//! # Pipeline
//!
//! 1. [`classify`]: every edit becomes an insert, update or delete of a
//!    definition row; illegal edits are rejected before anything is built.
//! 2. [`locals`]: re-emitted bodies keep the slot layout of live frames.
//! 3. [`anonymous`]: anonymous type shapes reuse templates from earlier
//!    generations.
//! 4. [`body`]: bodies are lowered to IL with symbolic tokens.
//! 5. [`delta`]: rows are allocated in full-build order, tokens resolved,
//!    and the log and map written.
//! 6. [`chain`]: the delta is written to the host and the baseline advanced.
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=enc_emit=debug`: one event per stage and generation.
//! - `RUST_LOG=enc_emit=trace`: per-row and per-slot detail.
//! - `ENC_EMIT_TRACE_TREE`: render spans as an indented tree.
//! - `ENC_EMIT_DEBUG_INFO`, `ENC_EMIT_VERIFY`: see [`EmitOptions::from_env`].

pub mod anonymous;
pub mod baseline;
pub mod body;
pub mod chain;
mod classify;
pub mod delta;
pub mod edit;
mod error;
pub mod locals;
pub mod options;
pub mod symbols;

#[cfg(test)]
mod test_helpers;

pub use baseline::{Baseline, DebugInfoProvider, NoDebugInfo};
pub use chain::{DeltaBytes, DeltaSinks, EmitDifference, GenerationChain};
pub use delta::{Delta, DeltaDebugInfo, LocalDebugInfo, MethodDebugInfo};
pub use edit::{EditKind, EditSession, SemanticEdit};
pub use error::EmitError;
pub use options::EmitOptions;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a tracing subscriber filtered by `RUST_LOG`.
///
/// No-op unless `RUST_LOG` is set; safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        let (flat, tree) = if std::env::var_os("ENC_EMIT_TRACE_TREE").is_some() {
            (None, Some(tracing_tree::HierarchicalLayer::new(2).with_targets(true)))
        } else {
            (Some(fmt::layer().with_target(true).with_level(true)), None)
        };
        tracing_subscriber::registry().with(flat).with(tree).with(filter).init();
    });
}
