use pretty_assertions::assert_eq;

use super::*;
use crate::ErrorCode;
use enc_ir::Span;

fn rejection(code: ErrorCode, start: u32) -> Diagnostic {
    Diagnostic::error(code)
        .with_message("rejected")
        .with_label(Span::new(start, start + 1), "here")
}

#[test]
fn empty_queue_has_no_errors() {
    let queue = DiagnosticQueue::new();
    assert!(queue.is_empty());
    assert!(queue.has_errors().is_none());
}

#[test]
fn errors_produce_guarantee() {
    let mut queue = DiagnosticQueue::new();
    assert!(queue.emit_error(rejection(ErrorCode::E1001, 4)).is_some());
    assert_eq!(queue.error_count(), 1);
}

#[test]
fn warnings_do_not_produce_guarantee() {
    let mut queue = DiagnosticQueue::new();
    queue.push(Diagnostic::warning(ErrorCode::W1001).with_message("skipped"));
    assert!(queue.has_errors().is_none());
    assert_eq!(queue.warning_count(), 1);
}

#[test]
fn exact_duplicates_are_dropped() {
    let mut queue = DiagnosticQueue::new();
    queue.push(rejection(ErrorCode::E1002, 4));
    queue.push(rejection(ErrorCode::E1002, 4));
    queue.push(rejection(ErrorCode::E1002, 9));
    assert_eq!(queue.error_count(), 2);
}

#[test]
fn flush_keeps_batch_order_and_resets() {
    let mut queue = DiagnosticQueue::new();
    queue.push(rejection(ErrorCode::E1003, 50));
    queue.push(rejection(ErrorCode::E1001, 10));
    let codes: Vec<ErrorCode> = queue.flush().into_iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::E1003, ErrorCode::E1001]);
    assert!(queue.is_empty());
    assert!(queue.has_errors().is_none());
}
