//! Identity & prototype resolution.
//!
//! Every script object bound to a non-empty native instance carries a
//! [`TaggedHandle`] in internal field 0: the pointer to the most-derived
//! instance, its class id and its category. The identity map keeps one
//! persisted script object per native address and class, so returning the
//! same instance twice yields the same object. An address can carry several
//! views (a record and the base embedded at offset 0); each is mapped under
//! its own class. Zero-sized instances have no meaningful address and are
//! never mapped.
//!
//! # Prototype Walk
//!
//! Resolving an object as an ancestor type walks the registry from the
//! handle's class towards the target:
//!
//! ```text
//! offset >= 0   embedded     acc += offset
//! offset <  0   indirect     base = *(base + acc + (-offset - 1)); acc = 0
//! ```
//!
//! and returns `base + acc` once the target is reached.

use std::ptr::NonNull;

use rustc_hash::FxHashMap;

use jsbind_core::{Global, InternalField, ObjectRef, TemplateId, Value};
use jsbind_registry::{Category, ClassId, TypeRegistry};

use crate::class::{AnyRef, Class, Ref};
use crate::context::{Attached, ExecutionContext};
use crate::error::{ConversionError, NativeError};

/// Bound on most-derived hops, in case resolvers form a cycle.
const MAX_DERIVED_HOPS: usize = 32;

/// Payload of internal field 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TaggedHandle {
    pub ptr: NonNull<u8>,
    pub class: ClassId,
    pub category: Option<Category>,
}

/// Persisted script objects by native address and class.
#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    by_address: FxHashMap<usize, Vec<(ClassId, Global)>>,
    len: usize,
}

impl IdentityMap {
    /// Object mapped for `addr` viewed as `class`: the exact view if there
    /// is one, otherwise a view of a subclass.
    pub fn find(&self, registry: &TypeRegistry, addr: usize, class: ClassId) -> Option<Global> {
        let views = self.by_address.get(&addr)?;
        views
            .iter()
            .find(|(mapped, _)| *mapped == class)
            .or_else(|| views.iter().find(|(mapped, _)| registry.is_subtype(*mapped, class)))
            .map(|(_, global)| *global)
    }

    pub fn insert(&mut self, addr: usize, class: ClassId, global: Global) {
        self.by_address.entry(addr).or_default().push((class, global));
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Global> + '_ {
        self.len = 0;
        self.by_address
            .drain()
            .flat_map(|(_, views)| views.into_iter().map(|(_, global)| global))
    }
}

fn is_empty(registry: &TypeRegistry, class: ClassId) -> bool {
    registry.get(class).is_some_and(|ty| ty.is_empty())
}

pub(crate) fn template_id(class: ClassId) -> TemplateId {
    TemplateId(u32::from(class.0))
}

/// Follow prototype links from `from` until `to`, adjusting `ptr` at every
/// hop. `None` if `to` is not on the chain.
pub(crate) fn project(
    registry: &TypeRegistry,
    ptr: NonNull<u8>,
    from: ClassId,
    to: ClassId,
) -> Option<NonNull<u8>> {
    let mut base = ptr.as_ptr();
    let mut acc = 0usize;
    let mut current = from;
    while current != to {
        let ty = registry.get(current)?;
        if !ty.has_prototype() {
            return None;
        }
        let offset = ty.prototype_offset();
        if offset < 0 {
            let at = (-offset - 1) as usize;
            // SAFETY: the registry records a pointer-sized field at `at`
            // bytes into the current record; `base + acc` is that record.
            base = unsafe { base.add(acc + at).cast::<*mut u8>().read_unaligned() };
            acc = 0;
        } else {
            acc += offset as usize;
        }
        current = ty.prototype;
    }
    NonNull::new(base.wrapping_add(acc))
}

impl ExecutionContext {
    /// Script object for a native instance, created on first use.
    pub fn wrap<T: Class>(&self, instance: Ref<T>) -> Result<Value, NativeError> {
        self.wrap_any(AnyRef::from(instance))
    }

    pub(crate) fn wrap_any(&self, instance: AnyRef) -> Result<Value, NativeError> {
        let (instance, class) = self.most_derived(instance)?;
        let registry = self.env().registry();
        let mapped = !is_empty(registry, class);
        if mapped {
            let existing = self.identity.borrow().find(registry, instance.addr(), class);
            if let Some(value) = existing.and_then(|g| self.realm().persistent(g)) {
                return Ok(value);
            }
        }
        let obj = self.instantiate(class)?;
        self.attach(obj, class, instance.ptr(), mapped)?;
        Ok(Value::Object(obj))
    }

    /// Attach the instance a bound constructor produced. The receiver the
    /// engine allocated is used when the instance is exactly of the
    /// constructed class; otherwise the instance keeps its own object.
    pub(crate) fn attach_constructed(
        &self,
        this: &Value,
        class: ClassId,
        instance: AnyRef,
    ) -> Result<Value, NativeError> {
        let registry = self.env().registry();
        let own = registry
            .id_of_type(instance.type_id())
            .ok_or(ConversionError::NotRegistered {
                type_name: instance.type_name(),
            })?;
        let mapped = !is_empty(registry, own);
        if mapped {
            let existing = self.identity.borrow().find(registry, instance.addr(), own);
            if let Some(value) = existing.and_then(|g| self.realm().persistent(g)) {
                return Ok(value);
            }
        }
        if own != class {
            return self.wrap_any(instance);
        }
        let Some(obj) = this.as_object() else {
            return Err(NativeError::IllegalConstructor);
        };
        self.attach(obj, class, instance.ptr(), mapped)?;
        Ok(this.clone())
    }

    /// Resolve a script object as a `T`, walking prototype links when the
    /// object is of a derived class.
    pub fn resolve<T: Class>(&self, value: &Value) -> Result<Ref<T>, NativeError> {
        let registry = self.env().registry();
        let target = registry.id_of::<T>().ok_or(ConversionError::NotRegistered {
            type_name: T::NAME,
        })?;
        let wrong_class = || ConversionError::WrongClass {
            expected: T::NAME,
            found: self.describe(value),
        };
        let Some(obj) = value.as_object() else {
            return Err(wrong_class().into());
        };
        let Some(class) = self.realm().template_of(obj).map(|t| ClassId(t.0 as u16)) else {
            return Err(wrong_class().into());
        };
        if !registry.is_subtype(class, target) {
            return Err(wrong_class().into());
        }
        if registry.get(target).is_some_and(|ty| ty.is_empty()) {
            // SAFETY: zero-sized types are valid at any aligned address.
            return Ok(unsafe { Ref::from_raw(NonNull::dangling()) });
        }

        let handle = self
            .handle(obj)
            .ok_or(ConversionError::Detached { class: T::NAME })?;
        let ptr = project(registry, handle.ptr, handle.class, target).ok_or_else(wrong_class)?;
        // SAFETY: the handle was tagged with `handle.class`, and `project`
        // followed the registry links from it to `T`'s record.
        Ok(unsafe { Ref::from_raw(ptr.cast::<T>()) })
    }

    /// The tagged handle stored in an object, if any.
    pub(crate) fn handle(&self, obj: ObjectRef) -> Option<TaggedHandle> {
        match self.realm().internal_field(obj, 0)? {
            InternalField::External(p) => {
                // SAFETY: field 0 only ever holds handles allocated in this
                // context's arena, which outlives the realm's objects.
                Some(unsafe { *p.cast::<TaggedHandle>().as_ptr() })
            }
            _ => None,
        }
    }

    /// Replace `instance` by the most-derived object it is a view of.
    fn most_derived(&self, mut instance: AnyRef) -> Result<(AnyRef, ClassId), NativeError> {
        let env = self.env();
        for _ in 0..MAX_DERIVED_HOPS {
            let class = env
                .registry()
                .id_of_type(instance.type_id())
                .ok_or(ConversionError::NotRegistered {
                    type_name: instance.type_name(),
                })?;
            let derived = env
                .class(class)
                .and_then(|rt| rt.most_derived.as_ref())
                .and_then(|resolve| resolve(instance.ptr()));
            match derived {
                Some(next) if next != instance => instance = next,
                _ => return Ok((instance, class)),
            }
        }
        Err(ConversionError::NotRegistered {
            type_name: instance.type_name(),
        }
        .into())
    }

    fn instantiate(&self, class: ClassId) -> Result<ObjectRef, NativeError> {
        Ok(self.realm().new_instance(template_id(class))?)
    }

    /// Tag `obj`, persist it and run the post-attach hook. A mapped object's
    /// identity entry exists before the hook runs.
    fn attach(
        &self,
        obj: ObjectRef,
        class: ClassId,
        ptr: NonNull<u8>,
        mapped: bool,
    ) -> Result<(), NativeError> {
        let env = self.env().clone();
        let registry = env.registry();
        if let Some(ty) = registry.get(class).filter(|ty| !ty.is_empty()) {
            let handle = self.arena.alloc(TaggedHandle {
                ptr,
                class,
                category: ty.category,
            });
            self.realm().set_internal_field(
                obj,
                0,
                InternalField::External(NonNull::from(handle).cast()),
            );
        }

        let global = self.realm().persist(Value::Object(obj));
        if mapped {
            self.identity
                .borrow_mut()
                .insert(ptr.as_ptr() as usize, class, global);
        } else {
            self.persistent.borrow_mut().push(global);
        }
        self.attached.borrow_mut().push(Attached { ptr, class });

        if let Some(hook) = env.class(class).and_then(|rt| rt.on_attach.as_ref()) {
            hook(ptr, obj, self)?;
        }
        Ok(())
    }
}
