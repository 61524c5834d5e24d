//! Diagnostic queue for collecting validation results.
//!
//! Validation walks every edit of a batch before deciding anything, so the
//! queue accumulates all rejections instead of stopping at the first.
//! Diagnostics keep batch order; exact duplicates (the same rejection
//! reached through two paths) are dropped.

use crate::{Diagnostic, ErrorGuaranteed, Severity};

#[derive(Default, Debug)]
pub struct DiagnosticQueue {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl DiagnosticQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic unless an identical one is already queued.
    pub fn push(&mut self, diag: Diagnostic) {
        if self.diagnostics.contains(&diag) {
            return;
        }
        if diag.is_error() {
            self.error_count += 1;
        }
        self.diagnostics.push(diag);
    }

    /// Record an error and return proof of it.
    pub fn emit_error(&mut self, diag: Diagnostic) -> Option<ErrorGuaranteed> {
        self.push(diag);
        self.has_errors()
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Proof that at least one error was queued.
    pub fn has_errors(&self) -> Option<ErrorGuaranteed> {
        ErrorGuaranteed::from_error_count(self.error_count)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn peek(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Take all queued diagnostics, leaving the queue empty.
    pub fn flush(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests;
