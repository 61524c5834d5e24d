use pretty_assertions::assert_eq;

use super::*;
use crate::{EncOperation, GuidId, Handle};

fn sample_full_image() -> MetadataImage {
    let mut image = MetadataImage::new(false, HeapSizes::default());
    let name = image.heaps.strings.add("C").unwrap();
    let module_name = image.heaps.strings.add("Lib.dll").unwrap();
    let mvid = image.heaps.guids.add([1; 16]).unwrap();
    let sig = image.heaps.blobs.add(&[0x00, 0x00, 0x01]).unwrap();
    let f = image.heaps.strings.add("F").unwrap();
    let t = image.heaps.strings.add("T").unwrap();
    image.tables.module.push(ModuleRow {
        generation: 0,
        name: module_name,
        mvid,
        enc_id: GuidId::EMPTY,
        enc_base_id: GuidId::EMPTY,
    });
    image.tables.type_def.push(TypeDefRow {
        flags: 0,
        name,
        namespace: StringId::EMPTY,
        extends: None,
        field_list: 1,
        method_list: 1,
    });
    image.tables.method_def.push(MethodDefRow {
        body_offset: 0,
        impl_flags: 0,
        flags: 0x0016,
        name: f,
        signature: sig,
        param_list: 1,
    });
    image.tables.method_impl.push(MethodImplRow {
        class: Handle::new(TableIndex::TypeDef, 1),
        body: Handle::new(TableIndex::MethodDef, 1),
        declaration: Handle::new(TableIndex::MemberRef, 3),
    });
    image.tables.generic_param.push(GenericParamRow {
        number: 0,
        flags: 0,
        owner: Handle::new(TableIndex::MethodDef, 1),
        name: t,
    });
    image.il = vec![0x0E];
    image
}

#[test]
fn full_image_round_trip() {
    let image = sample_full_image();
    let bytes = image.to_bytes().unwrap();
    let read = MetadataImage::read_from(&bytes).unwrap();
    assert!(!read.delta);
    assert_eq!(read.tables, image.tables);
    assert_eq!(read.il, vec![0x0E]);
    let method = read.tables.method_def.get(1).unwrap();
    assert_eq!(read.string(method.name).unwrap(), "F");
    assert_eq!(read.blob(method.signature).unwrap(), &[0x00, 0x00, 0x01]);
    let param = read.tables.generic_param.get(1).unwrap();
    assert_eq!(read.string(param.name).unwrap(), "T");
    assert_eq!(param.owner, Handle::new(TableIndex::MethodDef, 1));
}

#[test]
fn delta_image_keeps_sparse_row_numbers_and_heap_bases() {
    let previous = HeapSizes {
        strings: 20,
        blobs: 10,
        user_strings: 1,
        guids: 1,
    };
    let mut image = MetadataImage::new(true, previous);
    let name = image.heaps.strings.add("G").unwrap();
    image.tables.method_def.insert(
        2,
        MethodDefRow {
            body_offset: 0,
            impl_flags: 0,
            flags: 0,
            name,
            signature: crate::BlobId::EMPTY,
            param_list: 0,
        },
    );
    image.tables.enc_log.push(EncLogRow {
        token: Handle::new(TableIndex::MethodDef, 2),
        operation: EncOperation::Default,
    });

    let read = MetadataImage::read_from(&image.to_bytes().unwrap()).unwrap();
    assert!(read.delta);
    assert_eq!(read.heaps.bases(), previous);
    assert_eq!(read.tables.method_def.max_row(), 2);
    assert_eq!(read.string(StringId::new(21)).unwrap(), "G");
}

#[test]
fn write_to_sink_matches_to_bytes() {
    let image = sample_full_image();
    let mut sink = Vec::new();
    image.write_to(&mut sink).unwrap();
    assert_eq!(sink, image.to_bytes().unwrap());
}

#[test]
fn bad_magic() {
    let mut bytes = sample_full_image().to_bytes().unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        MetadataImage::read_from(&bytes),
        Err(ImageError::BadMagic { .. })
    ));
}

#[test]
fn unsupported_version() {
    let mut bytes = sample_full_image().to_bytes().unwrap();
    bytes[4] = 9;
    assert_eq!(
        MetadataImage::read_from(&bytes).map(|_| ()),
        Err(ImageError::UnsupportedVersion(9))
    );
}

#[test]
fn truncated_image() {
    let bytes = sample_full_image().to_bytes().unwrap();
    assert!(matches!(
        MetadataImage::read_from(&bytes[..bytes.len() - 3]),
        Err(ImageError::Truncated { .. })
    ));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = sample_full_image().to_bytes().unwrap();
    bytes.push(0);
    assert_eq!(
        MetadataImage::read_from(&bytes).map(|_| ()),
        Err(ImageError::TrailingData { trailing: 1 })
    );
}

#[test]
fn empty_input() {
    assert!(matches!(
        MetadataImage::read_from(&[]),
        Err(ImageError::Truncated { .. })
    ));
}
