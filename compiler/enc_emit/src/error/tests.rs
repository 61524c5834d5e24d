use std::io;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn internal_errors_carry_their_code() {
    let err = EmitError::internal(ErrorCode::E2004, "interner mismatch");
    assert_eq!(err.code(), Some(ErrorCode::E2004));
    assert!(err.error_guaranteed().is_some());
    assert_eq!(err.to_string(), "internal inconsistency: interner mismatch");
}

#[test]
fn host_write_keeps_io_source() {
    let err = EmitError::host_write(io::Error::other("disk full"), "metadata");
    assert_eq!(err.code(), Some(ErrorCode::E3001));
    assert_eq!(err.to_string(), "failed to write delta: disk full");
    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("disk full"));
}

#[test]
fn render_lists_diagnostics_and_summary() {
    let err = EmitError::StructuralRejection {
        diagnostics: vec![Diagnostic::error(ErrorCode::E1001).with_message("dynamic call in App.C::F")],
    };
    assert_eq!(
        err.render(),
        "error[E1001]: dynamic call in App.C::F\n1 error, 0 warnings\n"
    );
}

#[test]
fn narrowing_fails_instead_of_clamping() {
    assert_eq!(EmitError::narrow::<u16>(7, "local").ok(), Some(7));
    let err = EmitError::narrow::<u16>(usize::from(u16::MAX) + 1, "local")
        .err()
        .unwrap_or_else(|| panic!("65536 fit 16 bits"));
    assert_eq!(err.code(), Some(ErrorCode::E2005));
    assert_eq!(err.to_string(), "internal inconsistency: local 65536 does not fit 16 bits");
}

#[test]
fn internal_codes_outrank_structural_ones() {
    let rude = Diagnostic::error(ErrorCode::E1004).with_message("signature changed");
    let missing = Diagnostic::error(ErrorCode::E2002).with_message("unresolved");
    let hint = Diagnostic::warning(ErrorCode::W1001).with_message("sequential switch");

    let err = EmitError::from_diagnostics(vec![rude.clone(), hint]);
    assert!(matches!(err, EmitError::StructuralRejection { .. }));
    let err = EmitError::from_diagnostics(vec![rude, missing]);
    assert!(matches!(err, EmitError::InternalInconsistency { .. }));
    assert_eq!(err.code(), Some(ErrorCode::E1004));
}
