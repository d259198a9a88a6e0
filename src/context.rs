//! Execution contexts.
//!
//! An [`ExecutionContext`] is one script execution unit (a page). It owns
//! the realm, the arenas native instances live in, the identity map and
//! every persisted handle.
//!
//! # Memory
//!
//! ```text
//! arena        context lifetime     native instances, tagged handles
//! call arena   outermost call       scratch memory of native calls,
//!                                   reset when call depth returns to 0
//! ```
//!
//! # Teardown
//!
//! Dropping the context runs, in order: class finalizers for every wrapped
//! instance (reverse attach order), release of every persisted handle, and
//! destructors of arena values (reverse allocation order).
//!
//! # Example
//!
//! ```ignore
//! let env = Env::builder().install(dom_module()).build()?;
//! let ctx = env.create_context(ContextOptions::default())?;
//! let document = ctx.wrap(ctx.alloc(Document::new()))?;
//! ctx.define_global("document", document);
//! let title = ctx.eval("document.title")?;
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::mem;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use bumpalo::Bump;
use rustc_hash::FxHashSet;

use jsbind_core::{Global, ObjectRef, PropertyAttributes, PropertyKey, Realm, Value};
use jsbind_registry::ClassId;

use crate::class::Ref;
use crate::env::{ContextOptions, Env};
use crate::error::{ConversionError, NativeError};
use crate::identity::{IdentityMap, project};
use crate::inspect::RemoteObject;
use crate::marshal::{FromScript, PromiseResolver, record_object};

/// An instance that was given a script object.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Attached {
    pub ptr: NonNull<u8>,
    pub class: ClassId,
}

struct DropEntry {
    ptr: NonNull<u8>,
    drop: unsafe fn(NonNull<u8>),
}

unsafe fn drop_erased<T>(ptr: NonNull<u8>) {
    // SAFETY: registered by `alloc::<T>` for a value it moved into the arena.
    unsafe { ptr::drop_in_place(ptr.cast::<T>().as_ptr()) }
}

/// One script execution unit.
pub struct ExecutionContext {
    env: Rc<Env>,
    realm: Rc<Realm>,
    options: ContextOptions,
    pub(crate) arena: Bump,
    call_arena: RefCell<Bump>,
    pub(crate) depth: Cell<u32>,
    resets: Cell<u64>,
    pub(crate) identity: RefCell<IdentityMap>,
    pub(crate) attached: RefCell<Vec<Attached>>,
    pub(crate) persistent: RefCell<Vec<Global>>,
    drops: RefCell<Vec<DropEntry>>,
    host: Option<Box<dyn Any>>,
}

impl ExecutionContext {
    pub(crate) fn new(env: Rc<Env>, realm: Rc<Realm>, options: ContextOptions) -> Self {
        Self {
            env,
            realm,
            arena: Bump::with_capacity(options.arena_capacity),
            call_arena: RefCell::new(Bump::with_capacity(options.call_arena_retain)),
            options,
            depth: Cell::new(0),
            resets: Cell::new(0),
            identity: RefCell::new(IdentityMap::default()),
            attached: RefCell::new(Vec::new()),
            persistent: RefCell::new(Vec::new()),
            drops: RefCell::new(Vec::new()),
            host: None,
        }
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn env(&self) -> &Rc<Env> {
        &self.env
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    // =========================================================================
    // Host object
    // =========================================================================

    /// Attach the host object (the page) handed to context-aware functions.
    pub fn set_host<H: Any>(&mut self, host: H) {
        self.host = Some(Box::new(host));
    }

    pub fn host<H: Any>(&self) -> Option<&H> {
        self.host.as_ref()?.downcast_ref::<H>()
    }

    // =========================================================================
    // Arenas
    // =========================================================================

    /// Move a native value into the context arena. It lives until the
    /// context is dropped.
    pub fn alloc<T: 'static>(&self, value: T) -> Ref<T> {
        let ptr = NonNull::from(self.arena.alloc(value));
        if mem::needs_drop::<T>() {
            self.drops.borrow_mut().push(DropEntry {
                ptr: ptr.cast(),
                drop: drop_erased::<T>,
            });
        }
        // SAFETY: the arena keeps the value alive for the context lifetime.
        unsafe { Ref::from_raw(ptr) }
    }

    /// Run `f` with the call arena. Memory allocated there is released when
    /// the outermost native call returns.
    pub fn with_call_arena<R>(&self, f: impl FnOnce(&Bump) -> R) -> R {
        let arena = self.call_arena.borrow();
        f(&*arena)
    }

    pub(crate) fn reset_call_arena(&self) {
        let Ok(mut arena) = self.call_arena.try_borrow_mut() else {
            return;
        };
        let retain = self.options.call_arena_retain;
        if arena.allocated_bytes() > retain {
            *arena = Bump::with_capacity(retain);
        } else {
            arena.reset();
        }
        self.resets.set(self.resets.get() + 1);
    }

    pub fn call_arena_allocated(&self) -> usize {
        self.call_arena.borrow().allocated_bytes()
    }

    /// Number of call-arena resets so far.
    pub fn call_arena_resets(&self) -> u64 {
        self.resets.get()
    }

    /// Depth of native calls currently on the stack.
    pub fn call_depth(&self) -> u32 {
        self.depth.get()
    }

    pub fn identity_count(&self) -> usize {
        self.identity.borrow().len()
    }

    /// Handles this context keeps alive, mapped or not.
    pub fn persistent_count(&self) -> usize {
        self.identity.borrow().len() + self.persistent.borrow().len()
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Short description of a value for error messages: the class name of
    /// objects, the type of everything else.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Object(_) if self.realm.is_callable(value) => "function".to_string(),
            Value::Object(obj) => self.realm.class_name(*obj).to_string(),
            other => other.type_name().to_string(),
        }
    }

    pub fn new_object(&self) -> Result<ObjectRef, NativeError> {
        Ok(self.realm.new_object()?)
    }

    /// Define an ordinary enumerable data property.
    pub fn define_field(&self, obj: ObjectRef, key: &str, value: Value) {
        self.realm.define(obj, key, value, PropertyAttributes::empty());
    }

    /// Accept a record argument. `undefined` and `null` are an empty record.
    pub fn expect_record(
        &self,
        value: &Value,
        record: &'static str,
    ) -> Result<Option<ObjectRef>, NativeError> {
        record_object(value, record, self)
    }

    /// Read and convert one field of a record argument.
    pub fn record_field<T: FromScript>(
        &self,
        obj: Option<ObjectRef>,
        key: &'static str,
        record: &'static str,
    ) -> Result<T, NativeError> {
        let value = match obj {
            Some(obj) => self.get(obj, key)?,
            None => Value::Undefined,
        };
        if value.is_undefined() && !T::OPTIONAL {
            return Err(ConversionError::MissingField { record, field: key }.into());
        }
        T::from_script(&value, self)
    }

    /// Describe a value for a debugger front-end.
    pub fn inspect(&self, value: &Value) -> RemoteObject {
        RemoteObject::describe(self, value)
    }

    // =========================================================================
    // Script entry points
    // =========================================================================

    pub fn global(&self) -> ObjectRef {
        self.realm.global()
    }

    /// Read a property of the global object.
    pub fn global_value(&self, name: &str) -> Result<Value, NativeError> {
        self.get(self.realm.global(), name)
    }

    /// Install a non-enumerable global binding.
    pub fn define_global(&self, name: &str, value: Value) {
        self.realm
            .define(self.realm.global(), name, value, PropertyAttributes::DONT_ENUM);
    }

    /// Evaluate a classic script in the global scope. Microtasks queued by
    /// the script run before this returns.
    pub fn eval(&self, source: &str) -> Result<Value, NativeError> {
        Ok(self.realm.eval(self, source)?)
    }

    pub fn call(&self, f: &Value, this: Value, args: &[Value]) -> Result<Value, NativeError> {
        Ok(self.realm.call(self, f, this, args)?)
    }

    pub fn construct(&self, f: &Value, args: &[Value]) -> Result<Value, NativeError> {
        Ok(self.realm.construct(self, f, args)?)
    }

    pub fn call_method(
        &self,
        obj: ObjectRef,
        name: &str,
        args: &[Value],
    ) -> Result<Value, NativeError> {
        Ok(self.realm.call_method(self, obj, name, args)?)
    }

    pub fn get(&self, obj: ObjectRef, key: impl Into<PropertyKey>) -> Result<Value, NativeError> {
        Ok(self.realm.get(self, obj, key)?)
    }

    pub fn set(
        &self,
        obj: ObjectRef,
        key: impl Into<PropertyKey>,
        value: Value,
    ) -> Result<(), NativeError> {
        Ok(self.realm.set(self, obj, key, value)?)
    }

    pub fn delete(&self, obj: ObjectRef, key: impl Into<PropertyKey>) -> Result<bool, NativeError> {
        Ok(self.realm.delete(self, obj, key)?)
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Keep a value alive until [`release`](Self::release) or teardown.
    pub fn persist(&self, value: Value) -> Global {
        let handle = self.realm.persist(value);
        self.persistent.borrow_mut().push(handle);
        handle
    }

    pub fn release(&self, handle: Global) {
        let mut persistent = self.persistent.borrow_mut();
        if let Some(pos) = persistent.iter().rposition(|h| *h == handle) {
            persistent.swap_remove(pos);
            self.realm.release(handle);
        }
    }

    /// A pending promise and the resolver that settles it.
    pub fn promise_resolver(&self) -> Result<PromiseResolver, NativeError> {
        let promise = self.realm.new_promise()?;
        let handle = self.persist(Value::Object(promise));
        Ok(PromiseResolver::new(promise, handle))
    }

    /// Run queued promise reactions now. A no-op while script is running;
    /// the outermost engine entry drains the queue when it returns.
    pub fn run_microtasks(&self) {
        self.realm.perform_microtask_checkpoint(self);
    }

    // =========================================================================
    // Engine control
    // =========================================================================

    /// Make every subsequent engine entry fail until
    /// [`cancel_termination`](Self::cancel_termination).
    pub fn terminate(&self) {
        self.realm.terminate_execution();
    }

    pub fn cancel_termination(&self) {
        self.realm.cancel_termination();
    }

    /// Run the engine's collector over objects no handle keeps alive.
    pub fn collect_garbage(&self) {
        self.realm.run_gc();
    }

    fn run_finalizers(&self) {
        let attached = mem::take(&mut *self.attached.borrow_mut());
        let registry = self.env.registry();
        let mut seen = FxHashSet::default();
        for Attached { ptr, class } in attached.into_iter().rev() {
            if !seen.insert((ptr, class)) {
                continue;
            }
            let Some((owner, finalize)) = registry.chain(class).find_map(|ty| {
                let rt = self.env.class(ty.id)?;
                Some((ty.id, rt.finalizer.clone()?))
            }) else {
                continue;
            };
            if let Some(view) = project(registry, ptr, class, owner) {
                finalize(view);
            }
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        let attached = self.attached.borrow().len();
        self.run_finalizers();

        for handle in self.identity.get_mut().drain() {
            self.realm.release(handle);
        }
        for handle in self.persistent.get_mut().drain(..) {
            self.realm.release(handle);
        }

        let drops = mem::take(self.drops.get_mut());
        let dropped = drops.len();
        for entry in drops.into_iter().rev() {
            // SAFETY: each entry was registered once by `alloc` and the
            // arena has not been released yet.
            unsafe { (entry.drop)(entry.ptr) };
        }
        tracing::debug!(
            target: "jsbind",
            attached,
            dropped,
            resets = self.resets.get(),
            "execution context torn down"
        );
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("depth", &self.depth.get())
            .field("identity", &self.identity.borrow().len())
            .field("persistent", &self.persistent.borrow().len())
            .finish_non_exhaustive()
    }
}
