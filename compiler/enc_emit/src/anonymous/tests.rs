use pretty_assertions::assert_eq;
use proptest::prelude::*;

use enc_diagnostic::ErrorCode;
use enc_ir::{Handle, StringInterner, TableIndex};

use super::*;

fn resolve<'r>(resolver: &mut AnonymousTypeResolver<'r>, key: &AnonymousTypeKey) -> ResolvedTemplate<'r> {
    resolver.resolve(key).unwrap_or_else(|e| panic!("{}", e.render()))
}

fn template(key: AnonymousTypeKey, index: u32, row: u32) -> AnonymousTypeTemplate {
    AnonymousTypeTemplate {
        key,
        index,
        type_def: Handle::new(TableIndex::TypeDef, row),
        constructor: Handle::new(TableIndex::MethodDef, row),
        getters: Vec::new(),
        fields: Vec::new(),
        generation: 0,
    }
}

#[test]
fn template_names_round_trip() {
    assert_eq!(template_name(3), "<>f__AnonymousType3");
    assert_eq!(parse_template_index("<>f__AnonymousType12"), Some(12));
    assert_eq!(parse_template_index("<>f__AnonymousType"), None);
    assert_eq!(parse_template_index("<>f__AnonymousType1x"), None);
    assert_eq!(parse_template_index("Widget"), None);
    assert_eq!(parse_template_field_name(&template_field_name("Name")), Some("Name"));
}

#[test]
fn registered_shape_is_reused() {
    let i = StringInterner::new();
    let key = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let mut registry = AnonymousTypeRegistry::default();
    registry.register(template(key.clone(), 0, 5));

    let mut resolver = AnonymousTypeResolver::new(&registry);
    match resolve(&mut resolver, &key) {
        ResolvedTemplate::Existing(t) => assert_eq!(t.type_def, Handle::new(TableIndex::TypeDef, 5)),
        ResolvedTemplate::Pending(_) => panic!("expected reuse"),
    }
    assert!(resolver.pending().is_empty());
}

#[test]
fn misses_are_numbered_after_highest_index() {
    let i = StringInterner::new();
    let a = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let b = AnonymousTypeKey::new([(i.intern("B"), Ty::I4)]);
    let c = AnonymousTypeKey::new([(i.intern("C"), Ty::I4)]);
    let mut registry = AnonymousTypeRegistry::default();
    registry.register(template(a, 4, 1));
    assert_eq!(registry.next_index(), 5);

    let mut resolver = AnonymousTypeResolver::new(&registry);
    resolve(&mut resolver, &b);
    resolve(&mut resolver, &c);
    resolve(&mut resolver, &b);
    let pending: Vec<u32> = resolver.into_pending().iter().map(|p| p.index).collect();
    assert_eq!(pending, vec![5, 6]);
}

#[test]
fn nested_shapes_resolve_first() {
    let i = StringInterner::new();
    let inner = AnonymousTypeKey::new([(i.intern("X"), Ty::I4)]);
    let outer = AnonymousTypeKey::new([(i.intern("Inner"), Ty::Anonymous(inner.clone()))]);
    let registry = AnonymousTypeRegistry::default();
    let mut resolver = AnonymousTypeResolver::new(&registry);
    resolve(&mut resolver, &outer);
    let keys: Vec<AnonymousTypeKey> = resolver.into_pending().into_iter().map(|p| p.key).collect();
    assert_eq!(keys, vec![inner, outer]);
}

#[test]
fn exhausted_indices_are_reported() {
    let i = StringInterner::new();
    let last = AnonymousTypeKey::new([(i.intern("A"), Ty::I4)]);
    let mut registry = AnonymousTypeRegistry::default();
    registry.register(template(last.clone(), u32::MAX, 1));

    let mut resolver = AnonymousTypeResolver::new(&registry);
    assert!(matches!(resolve(&mut resolver, &last), ResolvedTemplate::Existing(_)));
    let fresh = AnonymousTypeKey::new([(i.intern("B"), Ty::I4)]);
    let err = resolver
        .resolve(&fresh)
        .err()
        .unwrap_or_else(|| panic!("index past u32::MAX handed out"));
    assert_eq!(err.code(), Some(ErrorCode::E2005));
    assert!(resolver.pending().is_empty());
}

proptest! {
    #[test]
    fn identical_shapes_share_templates(
        names in proptest::collection::vec(0u8..3, 1..4),
        other in proptest::collection::vec(0u8..3, 1..4),
    ) {
        let i = StringInterner::new();
        let shape = |names: &[u8]| {
            AnonymousTypeKey::new(names.iter().map(|n| (i.intern(&format!("M{n}")), Ty::I4)))
        };
        let registry = AnonymousTypeRegistry::default();
        let mut resolver = AnonymousTypeResolver::new(&registry);
        let first = resolve(&mut resolver, &shape(&names));
        let again = resolve(&mut resolver, &shape(&names));
        let different = resolve(&mut resolver, &shape(&other));
        let index = |r: ResolvedTemplate<'_>| match r {
            ResolvedTemplate::Existing(t) => t.index,
            ResolvedTemplate::Pending(i) => i,
        };
        prop_assert_eq!(index(first), index(again));
        prop_assert_eq!(index(first) == index(different), names == other);
    }
}
