use pretty_assertions::assert_eq;

use super::*;

#[test]
fn opcode_bytes_are_unique() {
    for byte in 0..=u8::MAX {
        if let Some(op) = Opcode::from_byte(byte) {
            assert_eq!(op as u8, byte);
        }
    }
}

#[test]
fn disassembles_operands() {
    let mut code = vec![Opcode::LdcI4 as u8];
    code.extend_from_slice(&(-2i32).to_le_bytes());
    code.push(Opcode::StLoc as u8);
    code.extend_from_slice(&3u16.to_le_bytes());
    code.push(Opcode::LdStr as u8);
    code.extend_from_slice(&0x7000_0001u32.to_le_bytes());
    code.push(Opcode::Ret as u8);
    assert_eq!(
        disassemble(&code).unwrap(),
        "IL_0000: ldc.i4 -2\nIL_0005: stloc 3\nIL_0008: ldstr 0x70000001\nIL_000d: ret"
    );
}

#[test]
fn branch_targets_are_absolute() {
    // br +1 skips the nop.
    let mut code = vec![Opcode::Br as u8];
    code.extend_from_slice(&1i32.to_le_bytes());
    code.push(Opcode::Nop as u8);
    code.push(Opcode::Ret as u8);
    let decoded = decode(&code).unwrap();
    assert_eq!(decoded[0].operand, Operand::Target(6));
    assert_eq!(decoded[2].offset, 6);
}

#[test]
fn unknown_opcode() {
    assert_eq!(decode(&[0xEE]), Err(ImageError::UnknownOpcode(0xEE)));
}

#[test]
fn truncated_operand() {
    assert!(matches!(
        decode(&[Opcode::Call as u8, 1, 2]),
        Err(ImageError::Truncated { .. })
    ));
}
