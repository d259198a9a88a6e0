//! Class template generation.
//!
//! Turns the erased class definitions of every installed module into engine
//! templates plus the runtime tables the dispatcher reads.
//!
//! # Data Words
//!
//! Every engine callback is one of a fixed set of trampolines (see
//! [`crate::dispatch`]). What a trampoline does is selected by its data word:
//!
//! ```text
//! construct            data = class id
//! call                 data = index into the binding table
//! iterator_self        data = class id
//! indexed / named      data = id of the class that declared the handler
//! ```
//!
//! # Internal Fields
//!
//! Non-empty instances reserve field 0 for the tagged handle, then one field
//! per type in the prototype chain that declares cached getters. The field
//! of a declaring type is `1 + (number of its strict ancestors with cached
//! getters)`, so it is the same in every subclass.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use xxhash_rust::xxh64::xxh64;

use jsbind_core::{
    BoundCallback, Constant, FunctionTemplate, IndexedHandlers, NamedHandlers, PropertyAttributes,
    PropertyKey, Symbol, TemplateFlags, TemplateId, TemplateMember, TemplateProperty,
};
use jsbind_registry::{Category, ClassId, TypeRegistry};

use crate::dispatch::{
    CALL, CONSTRUCT, INDEXED_GET, INDEXED_SET, ITERATOR_SELF, NAMED_DELETE, NAMED_GET, NAMED_SET,
};
use crate::error::EnvError;
use crate::module::{
    AttachFn, ClassDef, ExceptionFn, FinalizeFn, GlobalDef, IndexedDef, MemberKey, MemberKind,
    MostDerivedFn, NamedDef,
};
use crate::native_fn::{ConstructFn, NativeFn};

// =============================================================================
// Runtime tables
// =============================================================================

/// Per-class runtime data, indexed by class id.
pub(crate) struct ClassRuntime {
    pub name: &'static str,
    pub constructor: Option<ConstructFn>,
    pub exception: Option<ExceptionFn>,
    pub on_attach: Option<AttachFn>,
    pub finalizer: Option<FinalizeFn>,
    pub most_derived: Option<MostDerivedFn>,
    pub indexed: Option<IndexedDef>,
    pub named: Option<NamedDef>,
    pub hidden: bool,
}

pub(crate) enum BindingKind {
    Function(NativeFn),
    Getter(NativeFn),
    Setter(NativeFn),
    CachedGetter {
        f: NativeFn,
        slot: usize,
        key: Rc<str>,
    },
}

impl BindingKind {
    fn tag(&self) -> &'static str {
        match self {
            BindingKind::Function(_) => "fn",
            BindingKind::Getter(_) => "get",
            BindingKind::Setter(_) => "set",
            BindingKind::CachedGetter { .. } => "cached",
        }
    }
}

/// One callable entry point.
pub(crate) struct Binding {
    pub class: Option<ClassId>,
    /// Qualified name for diagnostics, e.g. `Node.appendChild`.
    pub name: Rc<str>,
    pub kind: BindingKind,
}

pub(crate) enum GlobalEntry {
    Function {
        name: Rc<str>,
        binding: u32,
        length: u32,
    },
    Constant {
        name: Rc<str>,
        value: Constant,
    },
}

/// Output of [`generate`].
pub(crate) struct Generated {
    pub templates: Vec<FunctionTemplate>,
    pub classes: Vec<ClassRuntime>,
    pub bindings: Vec<Binding>,
    pub globals: Vec<GlobalEntry>,
}

impl Generated {
    /// xxh64 over the ordered binding names and kinds. Snapshots built
    /// against a different binding table are refused.
    pub(crate) fn binding_fingerprint(bindings: &[Binding]) -> u64 {
        let mut text = String::new();
        for b in bindings {
            text.push_str(b.kind.tag());
            text.push(' ');
            text.push_str(&b.name);
            text.push('\n');
        }
        xxh64(text.as_bytes(), 0)
    }
}

// =============================================================================
// Generation
// =============================================================================

fn template_id(id: ClassId) -> TemplateId {
    TemplateId(u32::from(id.0))
}

/// Internal field of the cache slot owned by `declaring`.
fn cache_slot(registry: &TypeRegistry, caching: &[bool], declaring: ClassId) -> usize {
    1 + registry
        .chain(declaring)
        .skip(1)
        .filter(|t| caching[t.id.index()])
        .count()
}

fn field_count(registry: &TypeRegistry, caching: &[bool], id: ClassId) -> u32 {
    match registry.get(id) {
        Some(ty) if !ty.is_empty() => {
            1 + registry.chain(id).filter(|t| caching[t.id.index()]).count() as u32
        }
        _ => 0,
    }
}

/// Build templates, runtime tables and the binding table.
///
/// `defs` must be in registry order: class id `i` is `defs[i]`.
pub(crate) fn generate(
    registry: &TypeRegistry,
    defs: Vec<ClassDef>,
    globals: Vec<GlobalDef>,
) -> Result<Generated, EnvError> {
    let caching: Vec<bool> = defs.iter().map(ClassDef::has_cached_getters).collect();
    let indexed_owner = nearest_declaring(registry, &defs, |d| d.indexed.is_some());
    let named_owner = nearest_declaring(registry, &defs, |d| d.named.is_some());

    let mut templates = Vec::with_capacity(defs.len());
    let mut classes = Vec::with_capacity(defs.len());
    let mut bindings = Vec::new();

    for (ty, def) in registry.iter().zip(defs) {
        let id = ty.id;
        let index = id.index();
        let name = ty.name;

        let mut template = FunctionTemplate::new(name).constructor(CONSTRUCT, index as u32);
        template.length = def.constructor.as_ref().map_or(0, |(_, arity)| *arity);
        if ty.has_prototype() {
            template.inherit(template_id(ty.prototype));
        }
        template.flags = TemplateFlags::DEFAULT_TO_STRING_TAG;
        template.instance.internal_field_count = field_count(registry, &caching, id);

        let mut bind = |kind: BindingKind, member: &str| -> BoundCallback {
            let data = bindings.len() as u32;
            bindings.push(Binding {
                class: Some(id),
                name: Rc::from(format!("{name}.{member}")),
                kind,
            });
            BoundCallback {
                callback: CALL,
                data,
            }
        };

        let mut cached_names = FxHashSet::default();
        for member in def.members {
            let shown = member.key.to_string();
            match (member.key, member.kind) {
                (MemberKey::Name(key), MemberKind::Method { f, length }) => {
                    let cb = bind(BindingKind::Function(f), &key);
                    template.prototype_method(&key, cb, length);
                }
                (MemberKey::Symbol(symbol), MemberKind::Method { f, .. }) => {
                    let cb = bind(BindingKind::Function(f), &shown);
                    template.prototype_symbol_method(symbol, cb);
                }
                (key, MemberKind::Accessor { getter, setter }) => {
                    let getter = getter.map(|f| bind(BindingKind::Getter(f), &shown));
                    let setter = setter.map(|f| bind(BindingKind::Setter(f), &shown));
                    template.prototype.push(TemplateProperty {
                        key: property_key(key),
                        member: TemplateMember::Accessor { getter, setter },
                        attrs: PropertyAttributes::empty(),
                    });
                }
                (key, MemberKind::CachedGetter { f }) => {
                    if !cached_names.insert(shown.clone()) {
                        return Err(EnvError::DuplicateCachedGetter { class: name, name: shown });
                    }
                    let slot = cache_slot(registry, &caching, id);
                    let getter = bind(
                        BindingKind::CachedGetter {
                            f,
                            slot,
                            key: Rc::from(shown.as_str()),
                        },
                        &shown,
                    );
                    template.prototype.push(TemplateProperty {
                        key: property_key(key),
                        member: TemplateMember::Accessor {
                            getter: Some(getter),
                            setter: None,
                        },
                        attrs: PropertyAttributes::empty(),
                    });
                }
                (key, MemberKind::Constant(value)) => {
                    template.prototype_constant(property_key(key), value);
                }
            }
        }

        for member in def.statics {
            match (member.key, member.kind) {
                (MemberKey::Name(key), MemberKind::Method { f, length }) => {
                    let cb = bind(BindingKind::Function(f), &key);
                    template.static_method(&key, cb, length);
                }
                (MemberKey::Name(key), MemberKind::Constant(value)) => {
                    template.static_constant(&key, value);
                }
                _ => {}
            }
        }

        if let Some(tag) = &def.to_string_tag {
            template.prototype.push(TemplateProperty {
                key: PropertyKey::Symbol(Symbol::ToStringTag),
                member: TemplateMember::Constant(Constant::String(tag.clone())),
                attrs: PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_ENUM,
            });
        }

        let iterator_key = PropertyKey::Symbol(Symbol::Iterator);
        if ty.category == Some(Category::Iterator) && !template.has_prototype_key(&iterator_key) {
            template.prototype_symbol_method(
                Symbol::Iterator,
                BoundCallback {
                    callback: ITERATOR_SELF,
                    data: index as u32,
                },
            );
        }

        if let Some(owner) = indexed_owner[index] {
            template.instance.indexed = Some(IndexedHandlers {
                getter: owner.indexed.0.then_some(INDEXED_GET),
                setter: owner.indexed.1.then_some(INDEXED_SET),
                data: u32::from(owner.id.0),
            });
        }
        if let Some(owner) = named_owner[index] {
            template.instance.named = Some(NamedHandlers {
                getter: owner.named.0.then_some(NAMED_GET),
                setter: owner.named.1.then_some(NAMED_SET),
                deleter: owner.named.2.then_some(NAMED_DELETE),
                data: u32::from(owner.id.0),
            });
        }

        templates.push(template);
        classes.push(ClassRuntime {
            name,
            constructor: def.constructor.map(|(f, _)| f),
            exception: def.exception,
            on_attach: def.on_attach,
            finalizer: def.finalizer,
            most_derived: def.most_derived,
            indexed: def.indexed,
            named: def.named,
            hidden: def.hidden,
        });
    }

    let globals = bind_globals(registry, &classes, globals, &mut bindings)?;
    Ok(Generated {
        templates,
        classes,
        bindings,
        globals,
    })
}

fn property_key(key: MemberKey) -> PropertyKey {
    match key {
        MemberKey::Name(name) => PropertyKey::from(&*name),
        MemberKey::Symbol(symbol) => PropertyKey::Symbol(symbol),
    }
}

/// Which handlers a declaring class provides, captured before its
/// definition is consumed.
#[derive(Clone, Copy)]
struct HandlerOwner {
    id: ClassId,
    indexed: (bool, bool),
    named: (bool, bool, bool),
}

/// For every class, the nearest class in its chain (itself included) that
/// declares handlers of one kind. Instances inherit interceptors this way.
fn nearest_declaring(
    registry: &TypeRegistry,
    defs: &[ClassDef],
    declares: impl Fn(&ClassDef) -> bool,
) -> Vec<Option<HandlerOwner>> {
    (0..defs.len())
        .map(|index| {
            registry
                .chain(ClassId(index as u16))
                .find(|t| declares(&defs[t.id.index()]))
                .map(|t| {
                    let def = &defs[t.id.index()];
                    HandlerOwner {
                        id: t.id,
                        indexed: def
                            .indexed
                            .as_ref()
                            .map_or((false, false), |h| (h.getter.is_some(), h.setter.is_some())),
                        named: def.named.as_ref().map_or((false, false, false), |h| {
                            (h.getter.is_some(), h.setter.is_some(), h.deleter.is_some())
                        }),
                    }
                })
        })
        .collect()
}

fn bind_globals(
    registry: &TypeRegistry,
    classes: &[ClassRuntime],
    globals: Vec<GlobalDef>,
    bindings: &mut Vec<Binding>,
) -> Result<Vec<GlobalEntry>, EnvError> {
    let mut seen: FxHashSet<Rc<str>> = registry
        .iter()
        .zip(classes)
        .filter(|(_, rt)| !rt.hidden)
        .map(|(ty, _)| Rc::from(ty.name))
        .collect();

    let mut entries = Vec::with_capacity(globals.len());
    for global in globals {
        if !seen.insert(global.name().clone()) {
            return Err(EnvError::DuplicateGlobal {
                name: global.name().to_string(),
            });
        }
        entries.push(match global {
            GlobalDef::Function { name, f, length } => {
                let binding = bindings.len() as u32;
                bindings.push(Binding {
                    class: None,
                    name: name.clone(),
                    kind: BindingKind::Function(f),
                });
                GlobalEntry::Function {
                    name,
                    binding,
                    length,
                }
            }
            GlobalDef::Constant { name, value } => GlobalEntry::Constant { name, value },
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsbind_registry::TypeDecl;

    use crate::module::MemberDef;
    use crate::native_fn::Invocation;

    struct Base {
        _a: u32,
    }
    struct Child {
        _base: Base,
        _b: u32,
    }
    struct Leaf {
        _child: Child,
    }
    struct Marker;

    fn decls() -> Vec<TypeDecl> {
        vec![
            TypeDecl::of::<Base>("Base"),
            TypeDecl::of::<Child>("Child").embeds::<Base>(0),
            TypeDecl::of::<Leaf>("Leaf").embeds::<Child>(0),
            TypeDecl::of::<Marker>("Marker"),
        ]
    }

    fn cached(def: &mut ClassDef, name: &str) {
        def.members.push(MemberDef {
            key: MemberKey::Name(Rc::from(name)),
            kind: MemberKind::CachedGetter {
                f: Rc::new(|_: &Invocation<'_>| Ok(jsbind_core::Value::Undefined)),
            },
        });
    }

    #[test]
    fn slots_follow_caching_ancestors() {
        let registry = TypeRegistry::build(&decls()).unwrap();
        let caching = [true, false, true, false];
        assert_eq!(field_count(&registry, &caching, ClassId(0)), 2);
        assert_eq!(field_count(&registry, &caching, ClassId(1)), 2);
        assert_eq!(field_count(&registry, &caching, ClassId(2)), 3);
        assert_eq!(field_count(&registry, &caching, ClassId(3)), 0);
        assert_eq!(cache_slot(&registry, &caching, ClassId(0)), 1);
        assert_eq!(cache_slot(&registry, &caching, ClassId(2)), 2);
    }

    #[test]
    fn generates_templates_in_registry_order() {
        let decls = decls();
        let registry = TypeRegistry::build(&decls).unwrap();
        let mut defs: Vec<ClassDef> = decls.iter().map(|d| ClassDef::new(*d)).collect();
        cached(&mut defs[0], "tokens");
        defs[3].hidden = true;

        let generated = generate(&registry, defs, Vec::new()).unwrap();
        assert_eq!(generated.templates.len(), 4);
        assert_eq!(generated.templates[2].parent, Some(TemplateId(1)));
        assert_eq!(generated.templates[0].instance.internal_field_count, 2);
        assert_eq!(generated.templates[3].instance.internal_field_count, 0);
        assert!(generated.classes[3].hidden);
        assert_eq!(&*generated.bindings[0].name, "Base.tokens");
    }

    #[test]
    fn duplicate_cached_getter_is_rejected() {
        let decls = decls();
        let registry = TypeRegistry::build(&decls).unwrap();
        let mut defs: Vec<ClassDef> = decls.iter().map(|d| ClassDef::new(*d)).collect();
        cached(&mut defs[1], "style");
        cached(&mut defs[1], "style");
        let err = generate(&registry, defs, Vec::new()).err();
        assert!(matches!(
            err,
            Some(EnvError::DuplicateCachedGetter { class: "Child", .. })
        ));
    }

    #[test]
    fn globals_may_not_shadow_classes() {
        let decls = decls();
        let registry = TypeRegistry::build(&decls).unwrap();
        let defs: Vec<ClassDef> = decls.iter().map(|d| ClassDef::new(*d)).collect();
        let globals = vec![GlobalDef::Constant {
            name: Rc::from("Base"),
            value: Constant::Int(1),
        }];
        assert!(matches!(
            generate(&registry, defs, globals),
            Err(EnvError::DuplicateGlobal { .. })
        ));
    }
}
