//! Call dispatcher: the engine-facing trampolines.
//!
//! The engine only ever calls the flat callbacks registered here. Each one
//! recovers the [`ExecutionContext`] from the embedder slot of the callback
//! info, enters a [`CallGuard`], runs the bound native function selected by
//! its data word, and either sets the return value or throws.
//!
//! # Call Lifecycle
//!
//! ```text
//! engine ──► trampoline
//!              ├── CallGuard::enter      depth += 1
//!              ├── bind arguments        FromScript (marshal)
//!              ├── native function
//!              ├── result                ToScript ──► return value
//!              │   or error              NativeError ──► thrown value
//!              └── CallGuard::drop       depth -= 1,
//!                                        reset call arena at depth 0
//! ```
//!
//! No native error propagates past a trampoline. Values the engine hands a
//! trampoline stay valid until it returns; the realm releases them after.

use std::backtrace::Backtrace;

use jsbind_core::{
    CallbackInfo, CallbackRef, ErrorKind, ExternalCallback, ExternalReferences, InternalField,
    Intercepted, PropertyAttributes, PropertyCallbackInfo, Realm, Value,
};
use jsbind_registry::ClassId;

use crate::context::ExecutionContext;
use crate::error::{ConversionError, DomainError, NativeError};
use crate::native_fn::Invocation;
use crate::template::BindingKind;

// =============================================================================
// External reference table
// =============================================================================

pub(crate) const CONSTRUCT: CallbackRef = CallbackRef(0);
pub(crate) const CALL: CallbackRef = CallbackRef(1);
pub(crate) const ITERATOR_SELF: CallbackRef = CallbackRef(2);
pub(crate) const INDEXED_GET: CallbackRef = CallbackRef(3);
pub(crate) const INDEXED_SET: CallbackRef = CallbackRef(4);
pub(crate) const NAMED_GET: CallbackRef = CallbackRef(5);
pub(crate) const NAMED_SET: CallbackRef = CallbackRef(6);
pub(crate) const NAMED_DELETE: CallbackRef = CallbackRef(7);

/// The positionally stable callback table every isolate is built with.
pub(crate) fn external_references() -> ExternalReferences {
    ExternalReferences::new()
        .with("jsbind.construct", ExternalCallback::Function(construct_trampoline))
        .with("jsbind.call", ExternalCallback::Function(call_trampoline))
        .with("jsbind.iterator_self", ExternalCallback::Function(iterator_self))
        .with("jsbind.indexed_get", ExternalCallback::IndexedGetter(indexed_get))
        .with("jsbind.indexed_set", ExternalCallback::IndexedSetter(indexed_set))
        .with("jsbind.named_get", ExternalCallback::NamedGetter(named_get))
        .with("jsbind.named_set", ExternalCallback::NamedSetter(named_set))
        .with("jsbind.named_delete", ExternalCallback::NamedDeleter(named_delete))
}

// =============================================================================
// Call guard
// =============================================================================

/// Scope of one trampoline invocation.
pub(crate) struct CallGuard<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> CallGuard<'a> {
    pub(crate) fn enter(ctx: &'a ExecutionContext) -> Self {
        ctx.depth.set(ctx.depth.get() + 1);
        Self { ctx }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let depth = self.ctx.depth.get().saturating_sub(1);
        self.ctx.depth.set(depth);
        if depth == 0 {
            self.ctx.reset_call_arena();
        }
    }
}

// =============================================================================
// Trampolines
// =============================================================================

fn context<'a>(
    realm: &Realm,
    embedder: Option<&'a ExecutionContext>,
) -> Option<&'a ExecutionContext> {
    if embedder.is_none() {
        realm.throw_error(
            ErrorKind::Error,
            "native callback invoked without an execution context",
        );
    }
    embedder
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn construct_trampoline(info: &mut CallbackInfo<'_>) {
    let Some(ctx) = context(info.realm(), info.embedder_as::<ExecutionContext>()) else {
        return;
    };
    let class = ClassId(info.data() as u16);
    let this = info.this().clone();
    let args = info.args();
    let _guard = CallGuard::enter(ctx);

    match construct(ctx, class, &this, args, info.is_construct_call()) {
        Ok(value) => info.set_return_value(value),
        Err(err) => {
            let name = ctx.env().class_name(class);
            fail(ctx, err, Some(class), name, args);
        }
    }
}

fn construct(
    ctx: &ExecutionContext,
    class: ClassId,
    this: &Value,
    args: &[Value],
    is_construct_call: bool,
) -> Result<Value, NativeError> {
    let ctor = ctx
        .env()
        .class(class)
        .and_then(|rt| rt.constructor.clone())
        .ok_or(NativeError::IllegalConstructor)?;
    if !is_construct_call {
        return Err(NativeError::IllegalConstructor);
    }
    let instance = ctor(&Invocation::new(ctx, this, args, true))?;
    ctx.attach_constructed(this, class, instance)
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn call_trampoline(info: &mut CallbackInfo<'_>) {
    let Some(ctx) = context(info.realm(), info.embedder_as::<ExecutionContext>()) else {
        return;
    };
    let env = ctx.env().clone();
    let Some(binding) = env.binding(info.data()) else {
        info.realm().throw_error(ErrorKind::TypeError, "unknown native binding");
        return;
    };
    let this = info.this().clone();
    let args = info.args();
    let _guard = CallGuard::enter(ctx);

    let result = match &binding.kind {
        BindingKind::Function(f) | BindingKind::Getter(f) => {
            f(&Invocation::new(ctx, &this, args, false))
        }
        BindingKind::Setter(f) => {
            f(&Invocation::new(ctx, &this, args, false)).map(|_| Value::Undefined)
        }
        BindingKind::CachedGetter { f, slot, key } => {
            let compute = || f(&Invocation::new(ctx, &this, args, false));
            cached_get(ctx, &this, binding.class, *slot, key, compute)
        }
    };
    match result {
        Ok(value) => info.set_return_value(value),
        Err(err) => fail(ctx, err, binding.class, &binding.name, args),
    }
}

/// Serve a cached getter from the declaring type's cache object, computing
/// and storing the value on first read. Object receivers must be instances
/// of the declaring class. Receivers without the slot (empty types) are
/// computed every time.
fn cached_get(
    ctx: &ExecutionContext,
    this: &Value,
    class: Option<ClassId>,
    slot: usize,
    key: &str,
    compute: impl FnOnce() -> Result<Value, NativeError>,
) -> Result<Value, NativeError> {
    let realm = ctx.realm();
    let Some(obj) = this.as_object() else {
        return compute();
    };
    if let Some(class) = class {
        let own = realm.template_of(obj).map(|t| ClassId(t.0 as u16));
        if !own.is_some_and(|own| ctx.env().registry().is_subtype(own, class)) {
            return Err(ConversionError::WrongClass {
                expected: ctx.env().class_name(class),
                found: ctx.describe(this),
            }
            .into());
        }
    }
    if realm.internal_field_count(obj) <= slot {
        return compute();
    }
    let cache = match realm.internal_field(obj, slot) {
        Some(InternalField::Value(Value::Object(cache))) => cache,
        _ => {
            let cache = realm.new_object_with_prototype(None)?;
            realm.set_internal_field(obj, slot, InternalField::Value(Value::Object(cache)));
            cache
        }
    };
    if let Some(hit) = realm.get_data(cache, key) {
        return Ok(hit);
    }
    let value = compute()?;
    realm.define(cache, key, value.clone(), PropertyAttributes::empty());
    Ok(value)
}

fn iterator_self(info: &mut CallbackInfo<'_>) {
    let this = info.this().clone();
    info.set_return_value(this);
}

macro_rules! interceptor_context {
    ($info:expr) => {
        match $info.embedder_as::<ExecutionContext>() {
            Some(ctx) => ctx,
            None => return Intercepted::No,
        }
    };
}

fn indexed_get(index: u32, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    let ctx = interceptor_context!(info);
    let class = ClassId(info.data() as u16);
    let env = ctx.env().clone();
    let Some(handler) = env.class(class).and_then(|rt| rt.indexed.as_ref()?.getter.clone()) else {
        return Intercepted::No;
    };
    let holder = info.holder().clone();
    let _guard = CallGuard::enter(ctx);
    match handler(ctx, &holder, index) {
        Ok(Some(value)) => {
            info.set_return_value(value);
            Intercepted::Yes
        }
        Ok(None) => Intercepted::No,
        Err(err) => {
            fail(ctx, err, Some(class), "indexed getter", &[]);
            Intercepted::Yes
        }
    }
}

fn indexed_set(index: u32, value: Value, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    let ctx = interceptor_context!(info);
    let class = ClassId(info.data() as u16);
    let env = ctx.env().clone();
    let Some(handler) = env.class(class).and_then(|rt| rt.indexed.as_ref()?.setter.clone()) else {
        return Intercepted::No;
    };
    let holder = info.holder().clone();
    let _guard = CallGuard::enter(ctx);
    outcome(ctx, class, "indexed setter", &[value.clone()], handler(ctx, &holder, index, &value))
}

fn named_get(name: &str, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    let ctx = interceptor_context!(info);
    let class = ClassId(info.data() as u16);
    let env = ctx.env().clone();
    let Some(handler) = env.class(class).and_then(|rt| rt.named.as_ref()?.getter.clone()) else {
        return Intercepted::No;
    };
    let holder = info.holder().clone();
    let _guard = CallGuard::enter(ctx);
    match handler(ctx, &holder, name) {
        Ok(Some(value)) => {
            info.set_return_value(value);
            Intercepted::Yes
        }
        Ok(None) => Intercepted::No,
        Err(err) => {
            fail(ctx, err, Some(class), "named getter", &[]);
            Intercepted::Yes
        }
    }
}

fn named_set(name: &str, value: Value, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    let ctx = interceptor_context!(info);
    let class = ClassId(info.data() as u16);
    let env = ctx.env().clone();
    let Some(handler) = env.class(class).and_then(|rt| rt.named.as_ref()?.setter.clone()) else {
        return Intercepted::No;
    };
    let holder = info.holder().clone();
    let _guard = CallGuard::enter(ctx);
    outcome(ctx, class, "named setter", &[value.clone()], handler(ctx, &holder, name, &value))
}

fn named_delete(name: &str, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    let ctx = interceptor_context!(info);
    let class = ClassId(info.data() as u16);
    let env = ctx.env().clone();
    let Some(handler) = env.class(class).and_then(|rt| rt.named.as_ref()?.deleter.clone()) else {
        return Intercepted::No;
    };
    let holder = info.holder().clone();
    let _guard = CallGuard::enter(ctx);
    match handler(ctx, &holder, name) {
        Ok(true) => {
            info.set_return_value(Value::Bool(true));
            Intercepted::Yes
        }
        Ok(false) => Intercepted::No,
        Err(err) => {
            fail(ctx, err, Some(class), "named deleter", &[]);
            Intercepted::Yes
        }
    }
}

fn outcome(
    ctx: &ExecutionContext,
    class: ClassId,
    what: &str,
    args: &[Value],
    result: Result<bool, NativeError>,
) -> Intercepted {
    match result {
        Ok(true) => Intercepted::Yes,
        Ok(false) => Intercepted::No,
        Err(err) => {
            fail(ctx, err, Some(class), what, args);
            Intercepted::Yes
        }
    }
}

// =============================================================================
// Error conversion
// =============================================================================

/// Log a failed call and throw the script value it maps to.
fn fail(
    ctx: &ExecutionContext,
    err: NativeError,
    class: Option<ClassId>,
    name: &str,
    args: &[Value],
) {
    match &err {
        NativeError::Exception(_) | NativeError::Terminated => {
            tracing::debug!(
                target: "jsbind",
                function = name,
                "script exception passed through native call"
            );
        }
        _ => {
            tracing::warn!(target: "jsbind", function = name, error = %err, "native call failed");
            if cfg!(debug_assertions) && ctx.env().config().debug_dumps {
                dump_failure(ctx, name, args);
            }
        }
    }
    if let Some(value) = to_exception(ctx, err, class, name) {
        ctx.realm().throw_exception(value);
    }
}

fn dump_failure(ctx: &ExecutionContext, name: &str, args: &[Value]) {
    let described: Vec<_> = args.iter().map(|a| ctx.inspect(a)).collect();
    let args_json = serde_json::to_string(&described).unwrap_or_default();
    let backtrace = Backtrace::force_capture();
    tracing::debug!(
        target: "jsbind",
        function = name,
        args = %args_json,
        backtrace = %backtrace,
        "native call failure dump"
    );
}

/// Map a native error to the value thrown into script. `None` for
/// termination, which the engine is already unwinding.
pub(crate) fn to_exception(
    ctx: &ExecutionContext,
    err: NativeError,
    class: Option<ClassId>,
    name: &str,
) -> Option<Value> {
    let realm = ctx.realm();
    let error = |kind: ErrorKind, message: &str| realm.error(kind, message).value().cloned();
    match err {
        NativeError::InvalidArgument(e) => error(ErrorKind::TypeError, &format!("{name}: {e}")),
        NativeError::OutOfMemory => error(ErrorKind::Error, "out of memory"),
        NativeError::IllegalConstructor => error(ErrorKind::TypeError, "Illegal constructor"),
        NativeError::Domain(e) => Some(domain_exception(ctx, &e, class)),
        NativeError::Exception(value) => Some(value),
        NativeError::Terminated => None,
    }
}

/// A domain error goes through the nearest exception mapping along the
/// class chain, or becomes an `Error` named after the failure.
fn domain_exception(ctx: &ExecutionContext, err: &DomainError, class: Option<ClassId>) -> Value {
    let env = ctx.env();
    if let Some(class) = class {
        for ty in env.registry().chain(class) {
            let Some(mapper) = env.class(ty.id).and_then(|rt| rt.exception.as_ref()) else {
                continue;
            };
            match mapper(err, ctx) {
                Ok(Some(value)) => return value,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "jsbind", error = %e, "exception mapping failed");
                }
            }
        }
    }
    let realm = ctx.realm();
    let Ok(obj) = realm.new_error(ErrorKind::Error, &err.message) else {
        return Value::string(err.to_string());
    };
    realm.define(
        obj,
        "name",
        Value::string(&err.name),
        PropertyAttributes::DONT_ENUM,
    );
    Value::Object(obj)
}
