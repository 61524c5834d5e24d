use pretty_assertions::assert_eq;

use super::*;

#[test]
fn local_sig_string_and_float() {
    let blob = encode_local_sig(&[TypeSig::String, TypeSig::R4]).unwrap();
    assert_eq!(blob, vec![0x07, 0x02, 0x0E, 0x0C]);
    assert_eq!(
        decode_local_sig(&blob).unwrap(),
        vec![TypeSig::String, TypeSig::R4]
    );
}

#[test]
fn class_uses_type_def_or_ref_coding() {
    let mut out = Vec::new();
    TypeSig::Class(Handle::new(TableIndex::TypeRef, 6))
        .encode(&mut out)
        .unwrap();
    assert_eq!(out, vec![0x12, (6 << 2) | 1]);

    let mut out = Vec::new();
    TypeSig::ValueType(Handle::new(TableIndex::TypeDef, 3))
        .encode(&mut out)
        .unwrap();
    assert_eq!(out, vec![0x11, 3 << 2]);
}

#[test]
fn member_handle_cannot_be_a_type() {
    let mut out = Vec::new();
    let err = TypeSig::Class(Handle::new(TableIndex::MethodDef, 1)).encode(&mut out);
    assert!(matches!(err, Err(ImageError::InvalidColumn { .. })));
}

#[test]
fn method_sig_round_trip() {
    let sig = MethodSig {
        has_this: true,
        generic_params: 0,
        ret: TypeSig::Void,
        params: vec![
            TypeSig::I4,
            TypeSig::GenericInst {
                value_type: false,
                base: Handle::new(TableIndex::TypeRef, 2),
                args: vec![TypeSig::String],
            },
            TypeSig::SzArray(Box::new(TypeSig::Object)),
        ],
    };
    let blob = sig.encode().unwrap();
    assert_eq!(blob[0], callconv::HAS_THIS);
    assert_eq!(blob[1], 3);
    assert_eq!(MethodSig::decode(&blob).unwrap(), sig);
}

#[test]
fn field_sig_requires_field_prefix() {
    let blob = encode_field_sig(&TypeSig::I8).unwrap();
    assert_eq!(blob, vec![0x06, 0x0A]);
    assert_eq!(decode_field_sig(&blob).unwrap(), TypeSig::I8);
    assert_eq!(
        decode_field_sig(&[0x07, 0x0A]),
        Err(ImageError::InvalidSignature(0x07))
    );
}

#[test]
fn unknown_element_is_rejected() {
    let mut reader = ByteReader::new(&[0x45]);
    assert_eq!(
        TypeSig::decode(&mut reader),
        Err(ImageError::InvalidSignature(0x45))
    );
}

#[test]
fn property_sig_layout() {
    assert_eq!(
        encode_property_sig(&TypeSig::I4).unwrap(),
        vec![0x28, 0x00, 0x08]
    );
}

#[test]
fn generic_method_sig_carries_its_arity() {
    let sig = MethodSig {
        has_this: false,
        generic_params: 2,
        ret: TypeSig::MVar(1),
        params: vec![TypeSig::MVar(0), TypeSig::Var(0)],
    };
    let blob = sig.encode().unwrap();
    assert_eq!(blob, vec![0x10, 0x02, 0x02, 0x1E, 0x01, 0x1E, 0x00, 0x13, 0x00]);
    assert_eq!(MethodSig::decode(&blob).unwrap(), sig);
    assert_eq!(
        MethodSig::decode(&[0x05, 0x00, 0x01]),
        Err(ImageError::InvalidSignature(0x05))
    );
}
