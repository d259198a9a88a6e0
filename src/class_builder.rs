//! ClassBuilder for binding a native type as a script class.
//!
//! ClassBuilder provides a fluent API for declaring everything a class
//! exposes: constructor, methods, accessors, statics, interceptors, the
//! iterator protocol and lifecycle hooks.
//!
//! # Example
//!
//! ```ignore
//! module.class::<Element>()
//!     .constructor(|| Element::detached("div"))
//!     .method("getAttribute", Element::get_attribute)
//!     .accessor("id", Element::id, Element::set_id)
//!     .cached_getter("classList", Element::class_list)
//!     .indexed_getter(|el: &Element, i| el.child_at(i))
//!     .exception(|err, ctx| DomException::from_domain(err, ctx))
//!     .build();
//! ```

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use jsbind_core::{Constant, ObjectRef, Symbol, Value};

use crate::class::{AnyRef, Class, Ref};
use crate::context::ExecutionContext;
use crate::error::{DomainError, NativeError};
use crate::marshal::{FromScript, ToScript};
use crate::module::{
    ClassDef, IndexedDef, MemberDef, MemberKey, MemberKind, Module, NamedDef,
};
use crate::native_fn::{IntoConstructor, IntoMethod, IntoNativeFn, Invocation};

/// Outcome of a setter or deleter interceptor: whether it handled the
/// access.
pub trait InterceptOutcome {
    fn into_outcome(self) -> Result<bool, NativeError>;
}

impl InterceptOutcome for bool {
    fn into_outcome(self) -> Result<bool, NativeError> {
        Ok(self)
    }
}

impl<E: Into<NativeError>> InterceptOutcome for Result<bool, E> {
    fn into_outcome(self) -> Result<bool, NativeError> {
        self.map_err(Into::into)
    }
}

/// Builder for one class registration.
///
/// Created by [`Module::class`]. Nothing is registered until
/// [`ClassBuilder::build`] is called.
pub struct ClassBuilder<'m, T: Class> {
    module: &'m mut Module,
    def: ClassDef,
    _marker: PhantomData<T>,
}

/// Borrow the native instance behind an erased pointer.
///
/// # Safety
///
/// `ptr` must come from a handle tagged with `T`'s class id.
unsafe fn typed<T: Class>(ptr: NonNull<u8>) -> Ref<T> {
    // SAFETY: guaranteed by the caller.
    unsafe { Ref::from_raw(ptr.cast::<T>()) }
}

impl<'m, T: Class> ClassBuilder<'m, T> {
    pub(crate) fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            def: ClassDef::new(T::declaration()),
            _marker: PhantomData,
        }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Make the class constructible with `new`.
    ///
    /// Without a constructor, `new Class()` throws `TypeError: Illegal
    /// constructor`. The constructor may return an owned `T` (moved into the
    /// context arena) or a `Ref<T>` to an existing instance.
    pub fn constructor<F, M>(mut self, f: F) -> Self
    where
        F: IntoConstructor<T, M>,
    {
        self.def.constructor = Some((f.into_constructor(), F::ARITY));
        self
    }

    // =========================================================================
    // Prototype members
    // =========================================================================

    pub fn method<F, M>(mut self, name: &str, f: F) -> Self
    where
        F: IntoMethod<T, M>,
    {
        self.push(
            MemberKey::Name(Rc::from(name)),
            MemberKind::Method {
                f: f.into_method(),
                length: F::ARITY,
            },
        );
        self
    }

    /// A method that reads its own receiver and arguments.
    pub fn method_raw<F>(mut self, name: &str, length: u32, f: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, NativeError> + 'static,
    {
        self.push(
            MemberKey::Name(Rc::from(name)),
            MemberKind::Method {
                f: Rc::new(f),
                length,
            },
        );
        self
    }

    /// Read-only attribute.
    pub fn getter<F, M>(mut self, name: &str, get: F) -> Self
    where
        F: IntoMethod<T, M>,
    {
        self.push(
            MemberKey::Name(Rc::from(name)),
            MemberKind::Accessor {
                getter: Some(get.into_method()),
                setter: None,
            },
        );
        self
    }

    /// Read-write attribute.
    pub fn accessor<G, GM, S, SM>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: IntoMethod<T, GM>,
        S: IntoMethod<T, SM>,
    {
        self.push(
            MemberKey::Name(Rc::from(name)),
            MemberKind::Accessor {
                getter: Some(get.into_method()),
                setter: Some(set.into_method()),
            },
        );
        self
    }

    /// Attribute computed once per instance. The first result is kept in an
    /// internal slot and returned on every later read.
    pub fn cached_getter<F, M>(mut self, name: &str, get: F) -> Self
    where
        F: IntoMethod<T, M>,
    {
        self.push(
            MemberKey::Name(Rc::from(name)),
            MemberKind::CachedGetter {
                f: get.into_method(),
            },
        );
        self
    }

    /// `[Symbol.iterator]()`. The method returns the iterator object.
    pub fn iterator<F, M>(mut self, f: F) -> Self
    where
        F: IntoMethod<T, M>,
    {
        self.push(
            MemberKey::Symbol(Symbol::Iterator),
            MemberKind::Method {
                f: f.into_method(),
                length: 0,
            },
        );
        self
    }

    /// Override the default `Symbol.toStringTag` (the class name).
    pub fn to_string_tag(mut self, tag: &str) -> Self {
        self.def.to_string_tag = Some(Rc::from(tag));
        self
    }

    // =========================================================================
    // Statics
    // =========================================================================

    pub fn static_method<F, M>(mut self, name: &str, f: F) -> Self
    where
        F: IntoNativeFn<M>,
    {
        self.def.statics.push(MemberDef {
            key: MemberKey::Name(Rc::from(name)),
            kind: MemberKind::Method {
                f: f.into_native_fn(),
                length: F::ARITY,
            },
        });
        self
    }

    /// Read-only value, installed on both the constructor and the prototype.
    pub fn constant(mut self, name: &str, value: Constant) -> Self {
        let key = MemberKey::Name(Rc::from(name));
        self.def.statics.push(MemberDef {
            key: key.clone(),
            kind: MemberKind::Constant(value.clone()),
        });
        self.push(key, MemberKind::Constant(value));
        self
    }

    // =========================================================================
    // Interceptors
    // =========================================================================

    /// `obj[index]`. Returning `None` falls through to ordinary lookup.
    pub fn indexed_getter<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&T, u32) -> Option<R> + 'static,
        R: ToScript,
    {
        let getter = move |ctx: &ExecutionContext, this: &Value, index: u32| {
            let this = ctx.resolve::<T>(this)?;
            f(&this, index).map(|r| r.to_script(ctx)).transpose()
        };
        self.def.indexed.get_or_insert_with(IndexedDef::default).getter = Some(Rc::new(getter));
        self
    }

    /// `obj[index] = value`. Returning `false` stores an ordinary property.
    pub fn indexed_setter<F, V, R>(mut self, f: F) -> Self
    where
        F: Fn(&T, u32, V) -> R + 'static,
        V: FromScript,
        R: InterceptOutcome,
    {
        let setter = move |ctx: &ExecutionContext, this: &Value, index: u32, value: &Value| {
            let this = ctx.resolve::<T>(this)?;
            let value = V::from_script(value, ctx)?;
            f(&this, index, value).into_outcome()
        };
        self.def.indexed.get_or_insert_with(IndexedDef::default).setter = Some(Rc::new(setter));
        self
    }

    /// `obj.name` for names not found on the object or its prototypes.
    pub fn named_getter<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&T, &str) -> Option<R> + 'static,
        R: ToScript,
    {
        let getter = move |ctx: &ExecutionContext, this: &Value, name: &str| {
            let this = ctx.resolve::<T>(this)?;
            f(&this, name).map(|r| r.to_script(ctx)).transpose()
        };
        self.def.named.get_or_insert_with(NamedDef::default).getter = Some(Rc::new(getter));
        self
    }

    pub fn named_setter<F, V, R>(mut self, f: F) -> Self
    where
        F: Fn(&T, &str, V) -> R + 'static,
        V: FromScript,
        R: InterceptOutcome,
    {
        let setter = move |ctx: &ExecutionContext, this: &Value, name: &str, value: &Value| {
            let this = ctx.resolve::<T>(this)?;
            let value = V::from_script(value, ctx)?;
            f(&this, name, value).into_outcome()
        };
        self.def.named.get_or_insert_with(NamedDef::default).setter = Some(Rc::new(setter));
        self
    }

    pub fn named_deleter<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&T, &str) -> R + 'static,
        R: InterceptOutcome,
    {
        let deleter = move |ctx: &ExecutionContext, this: &Value, name: &str| {
            let this = ctx.resolve::<T>(this)?;
            f(&this, name).into_outcome()
        };
        self.def.named.get_or_insert_with(NamedDef::default).deleter = Some(Rc::new(deleter));
        self
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    /// Map domain errors raised by this class (and its subclasses) to a
    /// structured script value. `None` falls back to the generic mapping.
    pub fn exception<F, X>(mut self, f: F) -> Self
    where
        F: Fn(&DomainError, &ExecutionContext) -> Option<X> + 'static,
        X: ToScript,
    {
        self.def.exception = Some(Rc::new(move |err: &DomainError, ctx: &ExecutionContext| {
            f(err, ctx).map(|x| x.to_script(ctx)).transpose()
        }));
        self
    }

    /// Run after an instance is first wrapped. The identity map already
    /// holds the new object, so the hook may wrap other instances, including
    /// this one.
    pub fn on_attach<F>(mut self, f: F) -> Self
    where
        F: Fn(Ref<T>, ObjectRef, &ExecutionContext) -> Result<(), NativeError> + 'static,
    {
        self.def.on_attach = Some(Rc::new(
            move |ptr: NonNull<u8>, obj: ObjectRef, ctx: &ExecutionContext| {
                // SAFETY: hooks run for handles tagged with this class.
                f(unsafe { typed::<T>(ptr) }, obj, ctx)
            },
        ));
        self
    }

    /// Run at context teardown for every wrapped instance of this class,
    /// before arena memory is released.
    pub fn finalizer<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        self.def.finalizer = Some(Rc::new(move |ptr: NonNull<u8>| {
            // SAFETY: finalizers run for handles tagged with this class,
            // before the arena is dropped.
            let this = unsafe { typed::<T>(ptr) };
            f(&this)
        }));
        self
    }

    /// Resolve an instance to the most-derived object it is a view of, so
    /// that wrapping a base view yields the derived script object.
    pub fn most_derived<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Option<AnyRef> + 'static,
    {
        self.def.most_derived = Some(Rc::new(move |ptr: NonNull<u8>| {
            // SAFETY: resolvers run for pointers registered as this class.
            let this = unsafe { typed::<T>(ptr) };
            f(&this)
        }));
        self
    }

    /// Keep the constructor off the global object.
    pub fn hidden(mut self) -> Self {
        self.def.hidden = true;
        self
    }

    /// Finish the registration.
    pub fn build(self) -> &'m mut Module {
        let ClassBuilder { module, def, .. } = self;
        module.push_class(def);
        module
    }

    fn push(&mut self, key: MemberKey, kind: MemberKind) {
        self.def.members.push(MemberDef { key, kind });
    }
}
