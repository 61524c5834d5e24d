use pretty_assertions::assert_eq;

use super::*;

// ── Strings ──

#[test]
fn string_heap_starts_with_empty_item() {
    let mut heap = StringHeap::new(0);
    assert_eq!(heap.bytes(), &[0]);
    assert_eq!(heap.add("").unwrap(), StringId::EMPTY);
    let f = heap.add("F").unwrap();
    assert_eq!(f.offset(), 1);
    assert_eq!(heap.get(f).unwrap(), "F");
    assert_eq!(heap.get(StringId::EMPTY).unwrap(), "");
}

#[test]
fn string_heap_deduplicates_within_generation() {
    let mut heap = StringHeap::new(0);
    let a = heap.add("Main").unwrap();
    let b = heap.add("Main").unwrap();
    assert_eq!(a, b);
    assert_eq!(heap.bytes(), b"\0Main\0");
}

#[test]
fn delta_string_offsets_continue_after_base() {
    let mut heap = StringHeap::new(40);
    let id = heap.add("G").unwrap();
    assert_eq!(id.offset(), 41);
    assert_eq!(heap.get(id).unwrap(), "G");
    assert_eq!(heap.end(), 43);
}

#[test]
fn string_offset_from_earlier_generation_is_out_of_range() {
    let heap = StringHeap::new(40);
    assert!(matches!(
        heap.get(StringId::new(3)),
        Err(ImageError::HeapOffsetOutOfRange { .. })
    ));
}

// ── Blobs ──

#[test]
fn blob_heap_offsets_are_cumulative() {
    let mut gen0 = BlobHeap::new(0);
    let sig = gen0.add(&[0x07, 0x02, 0x0E, 0x0C]).unwrap();
    assert_eq!(sig.offset(), 1);
    assert_eq!(gen0.end(), 6);

    let mut gen1 = BlobHeap::new(gen0.end());
    let same = gen1.add(&[0x07, 0x02, 0x0E, 0x0C]).unwrap();
    // Not re-imported: the value is written again in the new generation.
    assert_eq!(same.offset(), 7);
    assert_eq!(gen1.get(same).unwrap(), &[0x07, 0x02, 0x0E, 0x0C]);
}

#[test]
fn empty_blob_is_offset_zero() {
    let mut heap = BlobHeap::new(12);
    assert_eq!(heap.add(&[]).unwrap(), BlobId::EMPTY);
    assert_eq!(heap.get(BlobId::EMPTY).unwrap(), &[] as &[u8]);
}

// ── User strings ──

#[test]
fn user_string_round_trips_non_ascii() {
    let mut heap = UserStringHeap::new(0);
    let id = heap.add("héllo \u{4e16}").unwrap();
    assert_eq!(id.offset(), 1);
    assert_eq!(heap.get(id).unwrap(), "héllo \u{4e16}");
}

#[test]
fn user_string_trailing_flag() {
    let mut heap = UserStringHeap::new(0);
    heap.add("a").unwrap();
    // length 3 (two bytes of UTF-16 plus flag), 'a', 0, flag 0
    assert_eq!(heap.bytes(), &[0, 3, b'a', 0, 0]);
}

// ── GUIDs ──

#[test]
fn guid_ids_are_one_based_and_cumulative() {
    let mut heap = GuidHeap::new(2);
    let id = heap.add([7; 16]).unwrap();
    assert_eq!(id.offset(), 3);
    assert_eq!(heap.get(id).unwrap(), [7; 16]);
    assert_eq!(heap.end(), 3);
}

#[test]
fn heaps_report_bases_and_sizes() {
    let previous = HeapSizes {
        strings: 10,
        blobs: 20,
        user_strings: 30,
        guids: 1,
    };
    let mut heaps = Heaps::new(previous);
    heaps.strings.add("x").unwrap();
    assert_eq!(heaps.bases(), previous);
    assert_eq!(
        heaps.sizes(),
        HeapSizes {
            strings: 13,
            blobs: 21,
            user_strings: 31,
            guids: 1,
        }
    );
}
