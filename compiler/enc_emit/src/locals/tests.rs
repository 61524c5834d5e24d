use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use enc_ir::StringInterner;

use super::*;

fn syntax(n: u32) -> SyntaxId {
    SyntaxId::from_raw(n)
}

fn identity() -> SyntaxMap {
    Arc::new(|old: SyntaxId| Some(old))
}

fn all_registered(_: &AnonymousTypeKey) -> bool {
    true
}

fn none_registered(_: &AnonymousTypeKey) -> bool {
    false
}

fn user(interner: &StringInterner, name: &str, ty: Ty, decl: u32) -> SlotRequest {
    SlotRequest::user(interner.intern(name), ty, syntax(decl))
}

fn first_generation(requests: &[SlotRequest]) -> MethodSlots {
    let registered = all_registered;
    SlotAllocator::new(&registered)
        .allocate(requests)
        .map(|a| a.slots)
        .unwrap_or_default()
}

#[test]
fn fresh_method_numbers_in_request_order() {
    let i = StringInterner::new();
    let requests = [user(&i, "a", Ty::I4, 1), user(&i, "b", Ty::STRING, 2)];
    let registered = all_registered;
    let allocation = SlotAllocator::new(&registered).allocate(&requests);
    let allocation = allocation.unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(allocation.ordinals, vec![0, 1]);
    assert_eq!(allocation.fresh, 2);
    assert_eq!(allocation.slots.get(1).and_then(|s| s.name), Some(i.intern("b")));
}

#[test]
fn removed_local_leaves_placeholder_and_later_ordinals_stay() {
    let i = StringInterner::new();
    let gen0 = first_generation(&[
        user(&i, "x", Ty::I4, 1),
        user(&i, "y", Ty::STRING, 2),
        user(&i, "z", Ty::I4, 3),
    ]);

    // `y` was deleted; x and z keep their declarators.
    let map: SyntaxMap = Arc::new(|old: SyntaxId| (old != syntax(2)).then_some(old));
    let registered = all_registered;
    let allocation = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&map), true)
        .allocate(&[user(&i, "x", Ty::I4, 1), user(&i, "z", Ty::I4, 3)])
        .unwrap_or_else(|e| panic!("{e:?}"));

    assert_eq!(allocation.ordinals, vec![0, 2]);
    let y = allocation.slots.get(1).cloned();
    assert_eq!(
        y,
        Some(LocalSlot {
            ordinal: 1,
            ty: SlotType::Known(Ty::STRING),
            name: None,
            kind: SlotKind::UserDeclared,
            declarator: None,
            placeholder: true,
        })
    );
    assert!(allocation.slots.extends(&gen0));
}

#[test]
fn vacated_slot_is_never_reused() {
    let i = StringInterner::new();
    let gen0 = first_generation(&[user(&i, "x", Ty::I4, 1), user(&i, "y", Ty::I4, 2)]);
    let registered = all_registered;

    let drop_x: SyntaxMap = Arc::new(|old: SyntaxId| (old != syntax(1)).then_some(old));
    let gen1 = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&drop_x), true)
        .allocate(&[user(&i, "y", Ty::I4, 2)])
        .unwrap_or_else(|e| panic!("{e:?}"));

    let gen2 = SlotAllocator::new(&registered)
        .previous(Some(&gen1.slots))
        .syntax_map(Some(&identity()), true)
        .allocate(&[user(&i, "y", Ty::I4, 2), user(&i, "w", Ty::I4, 9)])
        .unwrap_or_else(|e| panic!("{e:?}"));

    assert_eq!(gen2.ordinals, vec![1, 2]);
    assert_eq!(gen2.slots.len(), 3);
    assert!(gen2.slots.get(0).is_some_and(|s| s.placeholder));
}

#[test]
fn changed_type_gets_fresh_slot() {
    let i = StringInterner::new();
    let gen0 = first_generation(&[user(&i, "x", Ty::I4, 1)]);
    let registered = all_registered;
    let allocation = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&identity()), true)
        .allocate(&[user(&i, "x", Ty::STRING, 1)])
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(allocation.ordinals, vec![1]);
    assert_eq!(allocation.placeholders, 1);
}

#[test]
fn without_preserve_every_local_is_fresh() {
    let i = StringInterner::new();
    let gen0 = first_generation(&[user(&i, "x", Ty::I4, 1)]);
    let registered = all_registered;
    let allocation = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&identity()), false)
        .allocate(&[user(&i, "x", Ty::I4, 1)])
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(allocation.ordinals, vec![1]);
    assert!(allocation.slots.get(0).is_some_and(|s| s.placeholder));
}

#[test]
fn short_lived_temporaries_are_always_fresh() {
    let gen0 = first_generation(&[SlotRequest::temporary(TempKind::Scratch, Ty::I4, Some(syntax(4)))]);
    let registered = all_registered;
    let allocation = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&identity()), true)
        .allocate(&[SlotRequest::temporary(TempKind::Scratch, Ty::I4, Some(syntax(4)))])
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(allocation.ordinals, vec![1]);
}

#[test]
fn long_lived_temporaries_match_through_their_syntax() {
    let gen0 = first_generation(&[SlotRequest::temporary(TempKind::UsingResource, Ty::OBJECT, Some(syntax(7)))]);
    let registered = all_registered;
    let allocation = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&identity()), true)
        .allocate(&[SlotRequest::temporary(TempKind::UsingResource, Ty::OBJECT, Some(syntax(7)))])
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(allocation.ordinals, vec![0]);
    assert_eq!(allocation.matched, 1);
}

#[test]
fn unreachable_anonymous_slot_degrades_when_unmapped() {
    let i = StringInterner::new();
    let shape = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let gen0 = first_generation(&[user(&i, "a", Ty::Anonymous(shape), 1)]);
    let registered = none_registered;
    let nothing: SyntaxMap = Arc::new(|_| None);
    let allocation = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&nothing), true)
        .allocate(&[])
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(allocation.slots.get(0).map(|s| s.ty.clone()), Some(SlotType::Unresolved));
    assert!(allocation.slots.extends(&gen0));
}

#[test]
fn unreachable_anonymous_slot_rejects_live_local() {
    let i = StringInterner::new();
    let shape = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let gen0 = first_generation(&[user(&i, "a", Ty::Anonymous(shape.clone()), 1)]);
    let registered = none_registered;
    let result = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&identity()), true)
        .allocate(&[user(&i, "a", Ty::Anonymous(shape), 1)]);
    assert_eq!(result.err(), Some(AllocationError::UnreachableType { request: 0, ordinal: 0 }));
}

#[test]
fn registered_anonymous_slot_matches() {
    let i = StringInterner::new();
    let shape = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let request = user(&i, "a", Ty::Anonymous(shape), 1);
    assert_eq!(request.kind, SlotKind::AnonymousTypeBound);
    let gen0 = first_generation(std::slice::from_ref(&request));
    let registered = all_registered;
    let allocation = SlotAllocator::new(&registered)
        .previous(Some(&gen0))
        .syntax_map(Some(&identity()), true)
        .allocate(&[request])
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(allocation.slots, gen0);
}

/// What a local signature alone yields: typed, unnamed placeholders.
fn signature(types: &[Ty]) -> MethodSlots {
    MethodSlots::from_slots(
        types
            .iter()
            .enumerate()
            .map(|(n, ty)| LocalSlot {
                ordinal: u16::try_from(n).unwrap_or_else(|e| panic!("{e}")),
                ty: SlotType::Known(ty.clone()),
                name: None,
                kind: SlotKind::UserDeclared,
                declarator: None,
                placeholder: true,
            })
            .collect(),
    )
}

#[test]
fn debug_names_cover_a_prefix_of_the_signature() {
    let i = StringInterner::new();
    let named = first_generation(&[user(&i, "x", Ty::I4, 1)]);
    let slots = signature(&[Ty::I4, Ty::I4])
        .overlay(&named)
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(slots.len(), 2);
    assert_eq!(slots.get(0).and_then(|s| s.name), Some(i.intern("x")));
    assert!(slots.get(1).is_some_and(|s| s.placeholder && s.ty == SlotType::Known(Ty::I4)));

    // A later local never takes the unnamed scratch ordinal.
    let registered = all_registered;
    let gen1 = SlotAllocator::new(&registered)
        .previous(Some(&slots))
        .syntax_map(Some(&identity()), true)
        .allocate(&[user(&i, "x", Ty::I4, 1), user(&i, "w", Ty::STRING, 2)])
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(gen1.ordinals, vec![0, 2]);
    assert!(gen1.slots.extends(&slots));
}

#[test]
fn debug_slots_must_agree_with_the_signature() {
    let i = StringInterner::new();
    let base = signature(&[Ty::I4]);

    let mut gap = first_generation(&[user(&i, "x", Ty::I4, 1)]);
    gap = MethodSlots::from_slots(gap.slots().iter().cloned().map(|s| LocalSlot { ordinal: 3, ..s }).collect());
    assert_eq!(base.overlay(&gap), Err(SlotMismatch::Ordinal { index: 0, ordinal: 3 }));

    let retyped = first_generation(&[user(&i, "x", Ty::STRING, 1)]);
    assert_eq!(
        base.overlay(&retyped),
        Err(SlotMismatch::Type {
            ordinal: 0,
            signature: SlotType::Known(Ty::I4),
            named: SlotType::Known(Ty::STRING),
        })
    );

    let longer = first_generation(&[user(&i, "x", Ty::I4, 1), user(&i, "y", Ty::I4, 2)]);
    assert_eq!(base.overlay(&longer), Err(SlotMismatch::Missing { ordinal: 1 }));
}

#[test]
fn object_signature_slot_may_carry_an_anonymous_shape() {
    let i = StringInterner::new();
    let shape = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let named = first_generation(&[user(&i, "a", Ty::Anonymous(shape.clone()), 1)]);
    let slots = signature(&[Ty::OBJECT])
        .overlay(&named)
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(slots.get(0).map(|s| s.ty.clone()), Some(SlotType::Known(Ty::Anonymous(shape))));
}

#[test]
fn ordinals_past_u16_are_refused() {
    let i = StringInterner::new();
    let full = signature(&vec![Ty::I4; usize::from(u16::MAX) + 1]);
    let registered = all_registered;
    let result = SlotAllocator::new(&registered)
        .previous(Some(&full))
        .allocate(&[user(&i, "x", Ty::I4, 1)]);
    assert_eq!(
        result.err(),
        Some(AllocationError::TooManySlots {
            requested: usize::from(u16::MAX) + 2,
        })
    );
}

fn arb_request() -> impl Strategy<Value = (u8, bool, bool)> {
    // (type selector, user-declared vs using temp, named)
    (0u8..3, any::<bool>(), any::<bool>())
}

proptest! {
    #[test]
    fn identity_map_reproduces_slots(shape in proptest::collection::vec(arb_request(), 0..12)) {
        let i = StringInterner::new();
        let requests: Vec<SlotRequest> = shape
            .iter()
            .enumerate()
            .map(|(n, &(ty, user_declared, _))| {
                let ty = match ty {
                    0 => Ty::I4,
                    1 => Ty::STRING,
                    _ => Ty::OBJECT,
                };
                let decl = SyntaxId::from_raw(u32::try_from(n).unwrap_or(0) + 1);
                if user_declared {
                    SlotRequest::user(i.intern(&format!("v{n}")), ty, decl)
                } else {
                    SlotRequest::temporary(TempKind::UsingResource, ty, Some(decl))
                }
            })
            .collect();
        let gen0 = first_generation(&requests);
        let registered = all_registered;
        let map = identity();
        let gen1 = SlotAllocator::new(&registered)
            .previous(Some(&gen0))
            .syntax_map(Some(&map), true)
            .allocate(&requests)
            .map_err(|e| TestCaseError::fail(format!("{e:?}")))?;
        prop_assert_eq!(gen1.slots, gen0);
    }

    #[test]
    fn slot_tables_only_grow(
        keep in proptest::collection::vec(any::<bool>(), 1..10),
        added in 0usize..4,
    ) {
        let i = StringInterner::new();
        let requests: Vec<SlotRequest> = (0..keep.len())
            .map(|n| user(&i, &format!("v{n}"), Ty::I4, u32::try_from(n).unwrap_or(0) + 1))
            .collect();
        let gen0 = first_generation(&requests);
        let kept: Vec<u32> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(n, _)| u32::try_from(n).unwrap_or(0) + 1)
            .collect();
        let kept_set = kept.clone();
        let map: SyntaxMap = Arc::new(move |old: SyntaxId| kept_set.contains(&old.raw()).then_some(old));
        let mut next: Vec<SlotRequest> = kept.iter().map(|&d| user(&i, &format!("v{}", d - 1), Ty::I4, d)).collect();
        next.extend((0..added).map(|n| user(&i, &format!("new{n}"), Ty::I4, 100 + u32::try_from(n).unwrap_or(0))));
        let registered = all_registered;
        let gen1 = SlotAllocator::new(&registered)
            .previous(Some(&gen0))
            .syntax_map(Some(&map), true)
            .allocate(&next)
            .map_err(|e| TestCaseError::fail(format!("{e:?}")))?;
        prop_assert!(gen1.slots.extends(&gen0));
        for (request, ordinal) in next.iter().zip(&gen1.ordinals).take(kept.len()) {
            let d = request.declarator.map_or(0, SyntaxId::raw);
            prop_assert_eq!(u32::from(*ordinal), d - 1);
        }
        for ordinal in &gen1.ordinals[kept.len()..] {
            prop_assert!(usize::from(*ordinal) >= gen0.len());
        }
    }
}
