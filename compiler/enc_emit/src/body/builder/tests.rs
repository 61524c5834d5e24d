use pretty_assertions::assert_eq;

use enc_ir::opcode::disassemble;
use enc_ir::Span;

use super::*;

fn no_tokens(token: &TokenRef) -> Result<u32, EmitError> {
    Err(EmitError::internal(ErrorCode::E2005, format!("unexpected token {token:?}")))
}

fn listing(body: &EncodedBody) -> String {
    disassemble(&body.code).unwrap_or_else(|e| panic!("{e}"))
}

#[test]
fn locals_resolve_through_ordinals() {
    let mut code = CodeBuilder::new();
    code.emit_i4(5);
    code.emit_var(Opcode::StLoc, VarRef::Local(1));
    code.emit_var(Opcode::LdLoc, VarRef::Local(1));
    code.emit_ret(true);
    let body = code.finish(&[0, 7], &mut no_tokens).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        listing(&body),
        "IL_0000: ldc.i4 5\nIL_0005: stloc 7\nIL_0008: ldloc 7\nIL_000b: ret"
    );
    assert_eq!(body.max_stack, 1);
}

#[test]
fn branches_are_relative_to_next_instruction() {
    let mut code = CodeBuilder::new();
    let end = code.define_label();
    code.emit_i4(1);
    code.emit_branch(Opcode::BrTrue, end);
    code.emit(Opcode::Nop);
    code.mark(end);
    code.emit_ret(false);
    let body = code.finish(&[], &mut no_tokens).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(&body.code[6..10], &1i32.to_le_bytes());
    assert_eq!(
        listing(&body),
        "IL_0000: ldc.i4 1\nIL_0005: brtrue IL_000b\nIL_000a: nop\nIL_000b: ret"
    );
}

#[test]
fn tokens_are_resolved_in_order() {
    let mut code = CodeBuilder::new();
    code.emit_token(Opcode::LdStr, TokenRef::String(enc_ir::Name::EMPTY));
    code.emit_call(Opcode::NewObj, TokenRef::MissingMethodConstructor, 1, 1);
    code.emit(Opcode::Throw);
    let mut seen = Vec::new();
    let body = code
        .finish(&[], &mut |t| {
            seen.push(t.clone());
            Ok(0x0A00_0001 + u32::try_from(seen.len()).unwrap_or(0))
        })
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(seen.len(), 2);
    assert_eq!(&body.code[1..5], &0x0A00_0002u32.to_le_bytes());
    assert!(code.tokens().count() == 2);
}

#[test]
fn finally_regions_cover_handler() {
    let mut code = CodeBuilder::new();
    let try_start = code.define_label();
    let handler = code.define_label();
    let handler_end = code.define_label();
    let end = code.define_label();
    code.mark(try_start);
    code.emit(Opcode::Nop);
    code.emit_branch(Opcode::Leave, end);
    code.mark(handler);
    code.emit(Opcode::EndFinally);
    code.mark(handler_end);
    code.add_finally(try_start, handler, handler_end);
    code.mark(end);
    code.emit_ret(false);
    let body = code.finish(&[], &mut no_tokens).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        body.regions,
        vec![ExceptionRegion {
            try_offset: 0,
            try_length: 6,
            handler_offset: 6,
            handler_length: 1,
        }]
    );
}

#[test]
fn sequence_points_skip_dummy_spans() {
    let mut code = CodeBuilder::new();
    code.point(Span::DUMMY);
    code.point(Span::new(3, 9));
    code.emit_ret(false);
    let body = code.finish(&[], &mut no_tokens).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        body.sequence_points,
        vec![SequencePoint {
            il_offset: 0,
            span: Span::new(3, 9)
        }]
    );
}

#[test]
fn missing_ordinal_is_an_internal_error() {
    let mut code = CodeBuilder::new();
    code.emit_var(Opcode::LdLoc, VarRef::Local(3));
    let err = code.finish(&[], &mut no_tokens).err();
    assert_eq!(err.and_then(|e| e.code()), Some(ErrorCode::E2005));
}
