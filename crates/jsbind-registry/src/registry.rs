//! TypeRegistry - the flattened type catalog.
//!
//! [`TypeRegistry::build`] turns a list of [`TypeDecl`]s into a dense table:
//!
//! - every type gets a [`ClassId`] equal to its position in the catalog
//! - every type records the id of its nearest prototype, or its own id when it
//!   has none
//! - every type records the signed byte offset to its prototype's storage
//!   (see [`RegisteredType::prototype_offset`])
//!
//! The registry is built once at startup and is read-only afterwards; it is
//! shared by every execution context created from the same environment.
//!
//! # Example
//!
//! ```
//! use jsbind_registry::{TypeDecl, TypeRegistry};
//!
//! struct EventTarget { _listeners: u32 }
//! struct Node { target: EventTarget, _depth: u32 }
//!
//! let registry = TypeRegistry::build(&[
//!     TypeDecl::of::<EventTarget>("EventTarget"),
//!     TypeDecl::of::<Node>("Node")
//!         .embeds::<EventTarget>(std::mem::offset_of!(Node, target)),
//! ])
//! .unwrap();
//!
//! let node = registry.lookup("Node").unwrap();
//! let target = registry.lookup("EventTarget").unwrap();
//! assert!(registry.is_subtype(node, target));
//! ```

use std::any::TypeId;

use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::xxh64;

use crate::decl::{Category, ClassId, ProtoLink, TypeDecl};
use crate::error::RegistryError;

/// Maximum number of types in one catalog.
pub const MAX_TYPES: usize = u16::MAX as usize;

/// A type after flattening.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisteredType {
    pub id: ClassId,
    pub name: &'static str,
    pub rust_type: TypeId,
    pub rust_name: &'static str,
    pub size: usize,
    /// Nearest prototype, or `id` itself for a root.
    pub prototype: ClassId,
    pub link: Option<ProtoLink>,
    pub category: Option<Category>,
}

impl RegisteredType {
    /// Zero-sized types carry no native storage.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn has_prototype(&self) -> bool {
        self.prototype != self.id
    }

    /// Signed offset to the prototype's storage.
    ///
    /// Non-negative values are embedded sub-objects: add the offset to the
    /// instance address. Negative values mean the prototype sits behind one
    /// pointer stored at byte `-(offset + 1)`. The `+ 1` bias keeps an
    /// indirection at byte 0 distinct from embedding at byte 0.
    pub fn prototype_offset(&self) -> isize {
        match self.link {
            None => 0,
            Some(ProtoLink::Embedded { offset }) => offset as isize,
            Some(ProtoLink::Indirect { offset }) => -(offset as isize) - 1,
        }
    }
}

/// Flattened, immutable catalog.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<RegisteredType>,
    by_name: FxHashMap<&'static str, ClassId>,
    by_rust_type: FxHashMap<TypeId, ClassId>,
    fingerprint: u64,
}

impl TypeRegistry {
    /// Flatten `decls` into a registry.
    pub fn build(decls: &[TypeDecl]) -> Result<Self, RegistryError> {
        if decls.len() > MAX_TYPES {
            return Err(RegistryError::TooManyTypes {
                count: decls.len(),
                limit: MAX_TYPES,
            });
        }

        let mut by_name = FxHashMap::default();
        let mut by_rust_type: FxHashMap<TypeId, ClassId> = FxHashMap::default();
        for (idx, decl) in decls.iter().enumerate() {
            let id = ClassId(idx as u16);
            if by_name.insert(decl.name, id).is_some() {
                return Err(RegistryError::DuplicateType { name: decl.name });
            }
            if let Some(first) = by_rust_type.insert(decl.rust_type, id) {
                return Err(RegistryError::DuplicateRustType {
                    rust_name: decl.rust_name,
                    first: decls[first.index()].name,
                    second: decl.name,
                });
            }
        }

        let mut types = Vec::with_capacity(decls.len());
        for (idx, decl) in decls.iter().enumerate() {
            let id = ClassId(idx as u16);
            let (prototype, link) = match &decl.prototype {
                None => (id, None),
                Some(proto) => {
                    let proto_id = *by_rust_type.get(&proto.rust_type).ok_or(
                        RegistryError::UnknownPrototype {
                            type_name: decl.name,
                            prototype: proto.rust_name,
                        },
                    )?;
                    if proto_id == id {
                        return Err(RegistryError::PrototypeCycle {
                            type_name: decl.name,
                        });
                    }
                    if let ProtoLink::Embedded { offset } = proto.link {
                        if offset + proto.size > decl.size {
                            return Err(RegistryError::InvalidPrototypeLink {
                                type_name: decl.name,
                                offset,
                                proto_size: proto.size,
                                size: decl.size,
                            });
                        }
                    }
                    (proto_id, Some(proto.link))
                }
            };
            types.push(RegisteredType {
                id,
                name: decl.name,
                rust_type: decl.rust_type,
                rust_name: decl.rust_name,
                size: decl.size,
                prototype,
                link,
                category: decl.category,
            });
        }

        let registry = Self {
            fingerprint: fingerprint(&types),
            types,
            by_name,
            by_rust_type,
        };
        registry.check_cycles()?;
        Ok(registry)
    }

    fn check_cycles(&self) -> Result<(), RegistryError> {
        for ty in &self.types {
            let mut current = *ty;
            let mut steps = 0;
            while current.has_prototype() {
                steps += 1;
                if steps > self.types.len() {
                    return Err(RegistryError::PrototypeCycle { type_name: ty.name });
                }
                current = self.types[current.prototype.index()];
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: ClassId) -> Option<&RegisteredType> {
        self.types.get(id.index())
    }

    /// Look up by script name.
    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Look up by Rust type.
    pub fn id_of<T: 'static>(&self) -> Option<ClassId> {
        self.id_of_type(TypeId::of::<T>())
    }

    pub fn id_of_type(&self, rust_type: TypeId) -> Option<ClassId> {
        self.by_rust_type.get(&rust_type).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredType> {
        self.types.iter()
    }

    /// `id` followed by each of its prototypes, nearest first.
    pub fn chain(&self, id: ClassId) -> Chain<'_> {
        Chain {
            registry: self,
            next: self.get(id).map(|t| t.id),
        }
    }

    /// Whether `ancestor` is `id` or one of its prototypes.
    pub fn is_subtype(&self, id: ClassId, ancestor: ClassId) -> bool {
        self.chain(id).any(|t| t.id == ancestor)
    }

    /// Number of prototypes above `id`.
    pub fn depth(&self, id: ClassId) -> usize {
        self.chain(id).count().saturating_sub(1)
    }

    /// The `(prototype id, signed offset)` table indexed by class id.
    pub fn prototype_table(&self) -> Vec<(ClassId, isize)> {
        self.types
            .iter()
            .map(|t| (t.prototype, t.prototype_offset()))
            .collect()
    }

    /// xxh64 over names, prototype links, offsets, sizes and categories.
    ///
    /// Two processes that declare the same catalog compute the same value;
    /// snapshots use it to refuse a blob built for a different catalog.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

fn fingerprint(types: &[RegisteredType]) -> u64 {
    let mut text = String::new();
    for t in types {
        text.push_str(&format!(
            "{}|{}|{}|{}|{}\n",
            t.name,
            t.prototype.0,
            t.prototype_offset(),
            t.size,
            Category::to_tag(t.category)
        ));
    }
    xxh64(text.as_bytes(), 0)
}

/// Iterator over a prototype chain.
pub struct Chain<'a> {
    registry: &'a TypeRegistry,
    next: Option<ClassId>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a RegisteredType;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.registry.get(self.next?)?;
        self.next = current.has_prototype().then_some(current.prototype);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    struct Base {
        value: u32,
    }
    #[allow(dead_code)]
    struct Child {
        pad: u64,
        base: Base,
    }
    #[allow(dead_code)]
    struct Indirect {
        base: *const Base,
    }
    struct Marker;

    fn decls() -> Vec<TypeDecl> {
        vec![
            TypeDecl::of::<Base>("Base"),
            TypeDecl::of::<Child>("Child").embeds::<Base>(std::mem::offset_of!(Child, base)),
            TypeDecl::of::<Indirect>("Indirect").points_to::<Base>(0),
            TypeDecl::of::<Marker>("Marker").category(Category::Iterator),
        ]
    }

    #[test]
    fn ids_follow_declaration_order() {
        let registry = TypeRegistry::build(&decls()).unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.lookup("Base"), Some(ClassId(0)));
        assert_eq!(registry.id_of::<Marker>(), Some(ClassId(3)));
        assert_eq!(registry.lookup("Nope"), None);
    }

    #[test]
    fn roots_point_at_themselves() {
        let registry = TypeRegistry::build(&decls()).unwrap();
        let base = registry.get(ClassId(0)).unwrap();
        assert_eq!(base.prototype, base.id);
        assert_eq!(base.prototype_offset(), 0);
        assert!(!base.has_prototype());
    }

    #[test]
    fn offsets_are_signed_by_link_kind() {
        let registry = TypeRegistry::build(&decls()).unwrap();
        let child = registry.get(ClassId(1)).unwrap();
        assert_eq!(child.prototype, ClassId(0));
        assert_eq!(child.prototype_offset(), std::mem::offset_of!(Child, base) as isize);

        let indirect = registry.get(ClassId(2)).unwrap();
        assert_eq!(indirect.prototype_offset(), -1);
    }

    #[test]
    fn empty_types_and_categories() {
        let registry = TypeRegistry::build(&decls()).unwrap();
        let marker = registry.get(ClassId(3)).unwrap();
        assert!(marker.is_empty());
        assert_eq!(marker.category, Some(Category::Iterator));
        assert!(!registry.get(ClassId(0)).unwrap().is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = TypeRegistry::build(&[
            TypeDecl::of::<Base>("Same"),
            TypeDecl::of::<Child>("Same"),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateType { name: "Same" });
    }

    #[test]
    fn unknown_prototype_is_rejected() {
        let err = TypeRegistry::build(&[TypeDecl::of::<Child>("Child").embeds::<Base>(8)])
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownPrototype { type_name: "Child", .. }));
    }

    #[test]
    fn embedded_prototype_must_fit() {
        let err = TypeRegistry::build(&[
            TypeDecl::of::<Base>("Base"),
            TypeDecl::of::<Marker>("Marker").embeds::<Base>(0),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPrototypeLink { size: 0, .. }));
    }

    #[test]
    fn cycles_are_rejected() {
        #[allow(dead_code)]
        struct A(*const u8);
        #[allow(dead_code)]
        struct B(*const u8);
        let err = TypeRegistry::build(&[
            TypeDecl::of::<A>("A").points_to::<B>(0),
            TypeDecl::of::<B>("B").points_to::<A>(0),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::PrototypeCycle { .. }));

        let err = TypeRegistry::build(&[TypeDecl::of::<A>("A").points_to::<A>(0)]).unwrap_err();
        assert_eq!(err, RegistryError::PrototypeCycle { type_name: "A" });
    }

    #[test]
    fn fingerprint_tracks_layout() {
        let a = TypeRegistry::build(&decls()).unwrap();
        let b = TypeRegistry::build(&decls()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let mut changed = decls();
        changed[3] = TypeDecl::of::<Marker>("Marker");
        let c = TypeRegistry::build(&changed).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
