//! Emission failures.

use std::io;

use enc_diagnostic::emitter::{DiagnosticEmitter, TerminalEmitter};
use enc_diagnostic::{Diagnostic, ErrorCode, ErrorGuaranteed};
use enc_ir::ImageError;

/// Why `emit_difference` produced no delta.
///
/// In every case the input baseline is untouched and no successor exists.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The batch cannot be expressed as a delta. The caller may fix the
    /// edits and resubmit.
    #[error("edit batch rejected: {}", first_message(.diagnostics))]
    StructuralRejection { diagnostics: Vec<Diagnostic> },

    /// A collaborator broke its contract: unparseable module, unresolved
    /// symbol, mismatched interner. Not retryable.
    #[error("internal inconsistency: {}", first_message(.diagnostics))]
    InternalInconsistency { diagnostics: Vec<Diagnostic> },

    /// A sink refused the produced bytes.
    #[error("failed to write delta: {source}")]
    HostWriteFailure {
        diagnostics: Vec<Diagnostic>,
        #[source]
        source: io::Error,
    },
}

fn first_message(diagnostics: &[Diagnostic]) -> &str {
    diagnostics
        .iter()
        .find(|d| d.is_error())
        .map_or("no diagnostics", |d| d.message.as_str())
}

impl EmitError {
    pub(crate) fn internal(code: ErrorCode, message: impl Into<String>) -> Self {
        EmitError::InternalInconsistency {
            diagnostics: vec![Diagnostic::error(code).with_message(message)],
        }
    }

    /// Rejection carrying `diagnostics`. Any internal inconsistency among
    /// them outranks structural rejections.
    pub(crate) fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let structural = diagnostics
            .iter()
            .filter(|d| d.is_error())
            .all(|d| d.code.is_structural_rejection());
        if structural {
            EmitError::StructuralRejection { diagnostics }
        } else {
            EmitError::InternalInconsistency { diagnostics }
        }
    }

    pub(crate) fn host_write(source: io::Error, stream: &str) -> Self {
        let diagnostic = Diagnostic::error(ErrorCode::E3001)
            .with_message(format!("could not write the {stream} stream"))
            .with_note(source.to_string());
        EmitError::HostWriteFailure {
            diagnostics: vec![diagnostic],
            source,
        }
    }

    /// Malformed module bytes while building a baseline.
    pub(crate) fn unparseable(err: &ImageError) -> Self {
        Self::internal(ErrorCode::E2001, format!("module image cannot be parsed: {err}"))
    }

    /// Encoding failure while assembling a delta.
    pub(crate) fn encoding(err: &ImageError) -> Self {
        Self::internal(ErrorCode::E2005, format!("delta cannot be encoded: {err}"))
    }

    /// Narrow a count or position to a column width, failing instead of
    /// clamping.
    pub(crate) fn narrow<T: TryFrom<usize>>(value: usize, what: &str) -> Result<T, EmitError> {
        T::try_from(value).map_err(|_| {
            Self::internal(
                ErrorCode::E2005,
                format!("{what} {value} does not fit {} bits", std::mem::size_of::<T>() * 8),
            )
        })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            EmitError::StructuralRejection { diagnostics }
            | EmitError::InternalInconsistency { diagnostics }
            | EmitError::HostWriteFailure { diagnostics, .. } => diagnostics,
        }
    }

    pub fn error_guaranteed(&self) -> Option<ErrorGuaranteed> {
        ErrorGuaranteed::from_error_count(self.diagnostics().iter().filter(|d| d.is_error()).count())
    }

    /// First error code, for quick matching in callers and tests.
    pub fn code(&self) -> Option<ErrorCode> {
        self.diagnostics().iter().find(|d| d.is_error()).map(|d| d.code)
    }

    /// Plain-text rendering of every diagnostic.
    pub fn render(&self) -> String {
        let mut emitter = TerminalEmitter::new(Vec::new(), false);
        emitter.emit_all(self.diagnostics());
        let errors = self.diagnostics().iter().filter(|d| d.is_error()).count();
        emitter.emit_summary(errors, self.diagnostics().len() - errors);
        String::from_utf8_lossy(&emitter.into_inner()).into_owned()
    }
}

#[cfg(test)]
mod tests;
