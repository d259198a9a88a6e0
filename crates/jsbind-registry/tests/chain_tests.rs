//! Prototype chain tests over a three-level catalog.

use jsbind_registry::{Category, ClassId, TypeDecl, TypeRegistry};

#[allow(dead_code)]
struct Base {
    id: u32,
}

#[allow(dead_code)]
struct Child {
    flags: u16,
    base: Base,
}

#[allow(dead_code)]
struct Grandchild {
    child: *mut Child,
    extra: u64,
}

/// Declared leaf-first so that ids and prototype order differ.
fn registry() -> TypeRegistry {
    TypeRegistry::build(&[
        TypeDecl::of::<Grandchild>("Grandchild").points_to::<Child>(0),
        TypeDecl::of::<Child>("Child").embeds::<Base>(std::mem::offset_of!(Child, base)),
        TypeDecl::of::<Base>("Base").category(Category::Node),
    ])
    .expect("catalog builds")
}

#[test]
fn test_chain_walks_nearest_first() {
    let registry = registry();
    let names: Vec<&str> = registry
        .chain(ClassId(0))
        .map(|t| t.name)
        .collect();
    assert_eq!(names, ["Grandchild", "Child", "Base"]);
    assert_eq!(registry.depth(ClassId(0)), 2);
    assert_eq!(registry.depth(ClassId(2)), 0);
}

#[test]
fn test_subtype_is_reflexive_and_directional() {
    let registry = registry();
    let grandchild = registry.lookup("Grandchild").unwrap();
    let base = registry.lookup("Base").unwrap();
    assert!(registry.is_subtype(grandchild, base));
    assert!(registry.is_subtype(base, base));
    assert!(!registry.is_subtype(base, grandchild));
}

#[test]
fn test_prototype_table_matches_types() {
    let registry = registry();
    let table = registry.prototype_table();
    assert_eq!(table.len(), 3);
    assert_eq!(table[0], (ClassId(1), -1));
    assert_eq!(table[1], (ClassId(2), std::mem::offset_of!(Child, base) as isize));
    assert_eq!(table[2], (ClassId(2), 0));
}

#[test]
fn test_unknown_id_has_empty_chain() {
    let registry = registry();
    assert_eq!(registry.chain(ClassId(9)).count(), 0);
    assert!(registry.get(ClassId(9)).is_none());
}
