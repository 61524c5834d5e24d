//! Diagnostics for the delta emitter.
//!
//! Every failure the emitter reports carries:
//! - An error code for searchability
//! - A message saying what was rejected
//! - A primary span at the offending declaration or expression
//! - Notes naming the symbol and generation involved
//!
//! # Error Guarantees
//!
//! `ErrorGuaranteed` is type-level proof that at least one error was
//! recorded. Validation returns it instead of a bare `bool`, so a rejected
//! batch can never be committed by accident.
//!
//! ```text
//! let mut queue = DiagnosticQueue::new();
//! validate(&edits, &mut queue);
//! if let Some(guarantee) = queue.has_errors() {
//!     return Err(...);
//! }
//! ```

mod diagnostic;
pub mod emitter;
mod error_code;
mod guarantee;
pub mod queue;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use guarantee::ErrorGuaranteed;
pub use queue::DiagnosticQueue;
