use pretty_assertions::assert_eq;

use super::*;
use crate::ErrorCode;
use enc_ir::Span;

fn render(diagnostics: &[Diagnostic], colors: bool) -> String {
    let mut emitter = TerminalEmitter::new(Vec::new(), colors);
    emitter.emit_all(diagnostics);
    emitter.emit_summary(1, 0);
    String::from_utf8(emitter.into_inner()).unwrap()
}

#[test]
fn plain_output() {
    let diag = Diagnostic::error(ErrorCode::E1003)
        .with_message("member `X.M()` added during the current debug session can only be accessed from within its declaring module `LibA`")
        .with_label(Span::new(5, 12), "reference")
        .with_note("referencing module `LibB`");
    assert_eq!(
        render(&[diag], false),
        "error[E1003]: member `X.M()` added during the current debug session can only be accessed from within its declaring module `LibA`\n  --> 5..12: reference\n  = note: referencing module `LibB`\n1 error, 0 warnings\n"
    );
}

#[test]
fn colored_output_wraps_severity() {
    let diag = Diagnostic::error(ErrorCode::E2001).with_message("bad image");
    let out = render(&[diag], true);
    assert!(out.starts_with("\x1b[1;31merror\x1b[0m\x1b[1m[E2001]\x1b[0m: bad image"));
}

#[test]
fn empty_summary_is_silent() {
    let mut emitter = TerminalEmitter::new(Vec::new(), false);
    emitter.emit_summary(0, 0);
    assert!(emitter.into_inner().is_empty());
}
