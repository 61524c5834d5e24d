use super::*;

#[test]
fn empty_string_is_pre_interned() {
    let interner = StringInterner::new();
    assert_eq!(interner.intern(""), Name::EMPTY);
    assert_eq!(interner.lookup(Name::EMPTY), "");
}

#[test]
fn interning_is_idempotent() {
    let interner = StringInterner::new();
    let a = interner.intern("System.Console");
    let b = interner.intern("System.Console");
    assert_eq!(a, b);
    assert_eq!(interner.lookup(a), "System.Console");
    assert_eq!(interner.len(), 2);
}

#[test]
fn distinct_strings_get_distinct_names() {
    let interner = StringInterner::new();
    let a = interner.intern("get_A");
    let b = interner.intern("get_B");
    assert_ne!(a, b);
}

#[test]
fn get_does_not_insert() {
    let interner = StringInterner::new();
    assert_eq!(interner.get("missing"), None);
    assert_eq!(interner.len(), 1);
}

#[test]
fn shared_interner_identity() {
    let a = SharedInterner::new();
    let b = a.clone();
    let c = SharedInterner::new();
    assert!(a.same_as(&b));
    assert!(!a.same_as(&c));
    let name = b.intern("x");
    assert_eq!(a.lookup(name), "x");
}

#[test]
fn unknown_name_resolves_empty() {
    let interner = StringInterner::new();
    assert_eq!(interner.lookup(Name::from_raw(99)), "");
}
