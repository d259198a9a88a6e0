//! Realm: one QuickJS runtime and context, its handle table and the
//! per-realm template cache.
//!
//! # Entering the engine
//!
//! Every operation that may run native or script code ([`Realm::get`],
//! [`Realm::set`], [`Realm::call`], [`Realm::construct`], [`Realm::eval`],
//! ...) takes an explicit `embedder` handle. The engine never interprets
//! it; it is handed unchanged to every callback reached from that entry,
//! which is how native callbacks find their execution context without
//! global state. The outermost entry drains the microtask queue before it
//! returns.
//!
//! # Borrowing
//!
//! The realm is used through `&self` from re-entrant callbacks. Interior
//! state lives in `RefCell`s, and no borrow is ever held while script runs.
//! QuickJS contexts cannot be entered twice, so while any engine frame is
//! on the stack the realm reuses that frame's `Ctx` instead of entering.
//!
//! # Template instantiation
//!
//! Templates are instantiated once per realm, parents before children, so
//! every instantiated prototype is linked to its parent's prototype.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use rquickjs::{
    Array as JsArray, ArrayBuffer, Context, Ctx, Function as JsFunction, IntoJs,
    Object as JsObject, Persistent, Runtime, Value as JsValue,
};

use crate::callback::{
    CallbackInfo, CallbackRef, ExternalCallback, Intercepted, PropertyCallbackInfo,
};
use crate::error::{EngineError, Exception};
use crate::handle::{Global, Handles, Instance, slot_of};
use crate::isolate::Isolate;
use crate::object::{
    ErrorKind, InternalField, ObjectKind, ObjectRef, PromiseState, Property, PropertyAttributes,
    TypedArrayKind,
};
use crate::template::{
    BoundCallback, FunctionTemplate, TemplateFlags, TemplateId, TemplateMember, TemplateProperty,
};
use crate::value::{PropertyKey, Symbol, Value, number_to_string};

const BOOTSTRAP: &str = include_str!("bootstrap.js");

/// Upper bound for microtasks drained by one engine entry.
const MAX_MICROTASKS: usize = 10_000;

type Stored = Persistent<JsValue<'static>>;

/// Constructor and prototype of an instantiated template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instantiated {
    pub constructor: ObjectRef,
    pub prototype: ObjectRef,
}

/// Position in the handle scope stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeMark(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trap {
    IndexedGet,
    IndexedSet,
    NamedGet,
    NamedSet,
    NamedDelete,
}

#[derive(Clone, Copy, Debug)]
struct Interceptor {
    trap: Trap,
    callback: CallbackRef,
    data: u32,
}

/// One global environment.
pub struct Realm {
    isolate: Rc<Isolate>,
    this: Weak<Realm>,
    handles: RefCell<Handles<Stored>>,
    templates: RefCell<Vec<Option<Instantiated>>>,
    interceptors: RefCell<Vec<Option<ObjectRef>>>,
    helpers: Persistent<JsObject<'static>>,
    global: ObjectRef,
    pending_exception: RefCell<Option<Value>>,
    terminating: Rc<Cell<bool>>,
    embedder: Cell<Option<NonNull<dyn Any>>>,
    active: RefCell<Option<Ctx<'static>>>,
    // Declared last: everything above holds engine references.
    context: Context,
    runtime: Runtime,
}

struct ActiveGuard<'a> {
    realm: &'a Realm,
    previous: Option<Ctx<'static>>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let current = self.realm.active.replace(self.previous.take());
        drop(current);
    }
}

struct EmbedderGuard<'a> {
    realm: &'a Realm,
    previous: Option<NonNull<dyn Any>>,
}

impl Drop for EmbedderGuard<'_> {
    fn drop(&mut self) {
        self.realm.embedder.set(self.previous);
    }
}

fn upgrade(realm: &Weak<Realm>) -> rquickjs::Result<Rc<Realm>> {
    realm.upgrade().ok_or_else(|| {
        rquickjs::Error::new_from_js_message("native", "function", "realm has been dropped")
    })
}

fn is_object_like(value: &JsValue<'_>) -> bool {
    value.as_object().is_some() || value.is_function()
}

fn js_index(key: &JsValue<'_>) -> u32 {
    key.as_int()
        .and_then(|i| u32::try_from(i).ok())
        .or_else(|| key.as_float().map(|n| n as u32))
        .unwrap_or(0)
}

fn js_name(key: &JsValue<'_>) -> rquickjs::Result<String> {
    match key.as_string() {
        Some(s) => s.to_string(),
        None => Ok(String::new()),
    }
}

/// Look up or allocate the handle of an engine value.
fn intern_with<'js>(
    handles: &RefCell<Handles<Stored>>,
    helpers: &JsObject<'js>,
    ctx: &Ctx<'js>,
    value: JsValue<'js>,
) -> rquickjs::Result<ObjectRef> {
    let key: f64 = helpers
        .get::<_, JsFunction>("handleOf")?
        .call((value.clone(),))?;
    if let Some(r) = ObjectRef::from_key(key).filter(|r| handles.borrow().is_live(*r)) {
        return Ok(r);
    }
    let r = handles
        .borrow_mut()
        .allocate(Persistent::save(ctx, value.clone()));
    helpers
        .get::<_, JsFunction>("bindHandle")?
        .call::<_, ()>((value, r.key()))?;
    Ok(r)
}

fn bootstrap<'js>(
    ctx: &Ctx<'js>,
    handles: &RefCell<Handles<Stored>>,
) -> rquickjs::Result<(Persistent<JsObject<'static>>, ObjectRef)> {
    let helpers: JsObject = ctx.eval(BOOTSTRAP)?;
    let global: JsValue = helpers.get("global")?;
    let global = intern_with(handles, &helpers, ctx, global)?;
    handles.borrow_mut().pin(global);
    Ok((Persistent::save(ctx, helpers), global))
}

fn startup_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> EngineError {
    match err {
        rquickjs::Error::Exception => EngineError::Runtime(format!("{:?}", ctx.catch())),
        other => EngineError::Runtime(other.to_string()),
    }
}

impl Realm {
    /// Start a runtime for `isolate`. Templates are instantiated on demand.
    pub fn new(isolate: Rc<Isolate>) -> Result<Rc<Self>, EngineError> {
        let runtime = Runtime::new().map_err(|e| EngineError::Runtime(e.to_string()))?;
        let terminating = Rc::new(Cell::new(false));
        let flag = terminating.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || flag.get())));
        let context = Context::full(&runtime).map_err(|e| EngineError::Runtime(e.to_string()))?;

        let handles = RefCell::new(Handles::new());
        let (helpers, global) = context
            .with(|ctx| bootstrap(&ctx, &handles).map_err(|e| startup_error(&ctx, e)))?;

        let template_count = isolate.templates().len();
        tracing::debug!(templates = template_count, "realm started");
        Ok(Rc::new_cyclic(|this| Realm {
            isolate,
            this: this.clone(),
            handles,
            templates: RefCell::new(vec![None; template_count]),
            interceptors: RefCell::new(vec![None; template_count]),
            helpers,
            global,
            pending_exception: RefCell::new(None),
            terminating,
            embedder: Cell::new(None),
            active: RefCell::new(None),
            context,
            runtime,
        }))
    }

    pub fn isolate(&self) -> &Rc<Isolate> {
        &self.isolate
    }

    pub fn global(&self) -> ObjectRef {
        self.global
    }

    pub fn is_live(&self, obj: ObjectRef) -> bool {
        self.handles.borrow().is_live(obj)
    }

    // ========================================================================
    // Engine frames
    // ========================================================================

    fn activate<'js>(&self, ctx: &Ctx<'js>) -> ActiveGuard<'_> {
        // SAFETY: the lifetime is erased only while the guard lives, and the
        // guard never outlives the engine frame `ctx` belongs to. Callers
        // only see the context through `with_ctx`, whose closure cannot
        // leak values tied to it.
        let ctx = unsafe { std::mem::transmute::<Ctx<'js>, Ctx<'static>>(ctx.clone()) };
        let previous = self.active.replace(Some(ctx));
        ActiveGuard {
            realm: self,
            previous,
        }
    }

    fn with_ctx<R>(&self, f: impl for<'js> FnOnce(&Ctx<'js>) -> R) -> R {
        let active = self.active.borrow().clone();
        match active {
            Some(ctx) => f(&ctx),
            None => self.context.with(|ctx| {
                let _active = self.activate(&ctx);
                f(&ctx)
            }),
        }
    }

    fn run<T>(
        &self,
        f: impl for<'js> FnOnce(&Ctx<'js>) -> rquickjs::Result<T>,
    ) -> Result<T, Exception> {
        self.with_ctx(|ctx| f(ctx).map_err(|e| self.exception(ctx, e)))
    }

    fn bind_embedder<'a>(&'a self, embedder: &'a dyn Any) -> EmbedderGuard<'a> {
        let previous = self.embedder.replace(Some(NonNull::from(embedder)));
        EmbedderGuard {
            realm: self,
            previous,
        }
    }

    fn embedder_ref(&self) -> &dyn Any {
        match self.embedder.get() {
            // SAFETY: bound by `enter` for the duration of the engine entry
            // that reached this callback.
            Some(ptr) => unsafe { ptr.as_ref() },
            None => &(),
        }
    }

    /// Run script-reaching work with `embedder` bound.
    fn enter<T>(
        &self,
        embedder: &dyn Any,
        f: impl for<'js> FnOnce(&Ctx<'js>) -> rquickjs::Result<T>,
    ) -> Result<T, Exception> {
        if self.terminating.get() {
            return Err(Exception::Terminated);
        }
        let outermost = self.active.borrow().is_none();
        let _embedder = self.bind_embedder(embedder);
        let result = self.run(f);
        if self.terminating.get() {
            return Err(Exception::Terminated);
        }
        if outermost {
            self.run_microtasks();
        }
        result
    }

    fn run_microtasks(&self) {
        let mut executed = 0;
        while self.runtime.is_job_pending() && !self.terminating.get() {
            match self.runtime.execute_pending_job() {
                Ok(true) => {
                    executed += 1;
                    if executed >= MAX_MICROTASKS {
                        tracing::warn!(limit = MAX_MICROTASKS, "microtask queue not drained");
                        break;
                    }
                }
                Ok(false) => break,
                Err(err) => tracing::warn!("microtask failed: {err:?}"),
            }
        }
    }

    /// Drain pending microtasks unless an engine entry is already running.
    pub fn perform_microtask_checkpoint(&self, embedder: &dyn Any) {
        if self.active.borrow().is_some() || self.terminating.get() {
            return;
        }
        let _embedder = self.bind_embedder(embedder);
        self.run_microtasks();
    }

    fn exception<'js>(&self, ctx: &Ctx<'js>, err: rquickjs::Error) -> Exception {
        let thrown = matches!(err, rquickjs::Error::Exception).then(|| ctx.catch());
        if self.terminating.get() {
            return Exception::Terminated;
        }
        let value = match thrown {
            Some(value) => self.from_js(ctx, value),
            None => self
                .new_error_js(ctx, ErrorKind::Error, &err.to_string())
                .and_then(|e| self.from_js(ctx, e)),
        };
        Exception::Thrown(value.unwrap_or_else(|e| Value::string(e.to_string())))
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    fn helper<'js>(&self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<JsFunction<'js>> {
        self.helpers.clone().restore(ctx)?.get(name)
    }

    fn intern<'js>(&self, ctx: &Ctx<'js>, value: JsValue<'js>) -> rquickjs::Result<ObjectRef> {
        let helpers = self.helpers.clone().restore(ctx)?;
        intern_with(&self.handles, &helpers, ctx, value)
    }

    fn restore<'js>(&self, ctx: &Ctx<'js>, obj: ObjectRef) -> rquickjs::Result<JsValue<'js>> {
        let stored = self.handles.borrow().value(obj);
        match stored {
            Some(stored) => stored.restore(ctx),
            None => Err(self.throw_js(ctx, ErrorKind::TypeError, "object has been released")),
        }
    }

    fn from_js<'js>(&self, ctx: &Ctx<'js>, value: JsValue<'js>) -> rquickjs::Result<Value> {
        if value.is_undefined() {
            return Ok(Value::Undefined);
        }
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(b) = value.as_bool() {
            return Ok(Value::Bool(b));
        }
        if let Some(i) = value.as_int() {
            return Ok(Value::Int(i));
        }
        if let Some(n) = value.as_float() {
            return Ok(Value::Number(n));
        }
        if let Some(s) = value.as_string() {
            return Ok(Value::String(Rc::from(s.to_string()?)));
        }
        if value.is_symbol() {
            let code: i32 = self.helper(ctx, "symbolCode")?.call((value.clone(),))?;
            return Ok(Value::Symbol(
                match u8::try_from(code).ok().and_then(Symbol::from_code) {
                    Some(symbol) => symbol,
                    None => Symbol::Script(self.intern(ctx, value)?),
                },
            ));
        }
        if is_object_like(&value) {
            return Ok(Value::Object(self.intern(ctx, value)?));
        }
        let text: Option<String> = self.helper(ctx, "bigintText")?.call((value.clone(),))?;
        match text {
            Some(text) => Ok(text
                .parse::<i128>()
                .map(Value::BigInt)
                .unwrap_or_else(|_| Value::Number(text.parse().unwrap_or(f64::NAN)))),
            None => Ok(Value::Object(self.intern(ctx, value)?)),
        }
    }

    fn to_js<'js>(&self, ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
        match value {
            Value::Undefined => Ok(JsValue::new_undefined(ctx.clone())),
            Value::Null => Ok(JsValue::new_null(ctx.clone())),
            Value::Bool(b) => Ok(JsValue::new_bool(ctx.clone(), *b)),
            Value::Int(i) => Ok(JsValue::new_int(ctx.clone(), *i)),
            Value::Number(n) => Ok(JsValue::new_float(ctx.clone(), *n)),
            Value::BigInt(b) => self.helper(ctx, "bigint")?.call((b.to_string(),)),
            Value::String(s) => (&**s).into_js(ctx),
            Value::Object(r) | Value::Symbol(Symbol::Script(r)) => self.restore(ctx, *r),
            Value::Symbol(s) => self.helper(ctx, "wellKnown")?.call((s.code(),)),
        }
    }

    fn key_to_js<'js>(&self, ctx: &Ctx<'js>, key: &PropertyKey) -> rquickjs::Result<JsValue<'js>> {
        match key {
            PropertyKey::String(s) => (&**s).into_js(ctx),
            PropertyKey::Index(i) => Ok(JsValue::new_float(ctx.clone(), f64::from(*i))),
            PropertyKey::Symbol(s) => self.to_js(ctx, &Value::Symbol(*s)),
        }
    }

    fn array_js<'js>(&self, ctx: &Ctx<'js>, items: &[Value]) -> rquickjs::Result<JsArray<'js>> {
        let array = JsArray::new(ctx.clone())?;
        for (i, item) in items.iter().enumerate() {
            array.set(i, self.to_js(ctx, item)?)?;
        }
        Ok(array)
    }

    fn optional_js<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: JsValue<'js>,
    ) -> rquickjs::Result<Option<Value>> {
        if value.is_undefined() {
            Ok(None)
        } else {
            self.from_js(ctx, value).map(Some)
        }
    }

    fn new_error_js<'js>(
        &self,
        ctx: &Ctx<'js>,
        kind: ErrorKind,
        message: &str,
    ) -> rquickjs::Result<JsValue<'js>> {
        self.helper(ctx, "newError")?
            .call((i32::from(u8::from(kind)), message))
    }

    fn throw_js(&self, ctx: &Ctx<'_>, kind: ErrorKind, message: &str) -> rquickjs::Error {
        match self.new_error_js(ctx, kind, message) {
            Ok(error) => ctx.throw(error),
            Err(err) => err,
        }
    }

    fn define_js<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: &JsValue<'js>,
        key: JsValue<'js>,
        value: JsValue<'js>,
        attrs: PropertyAttributes,
    ) -> rquickjs::Result<bool> {
        self.helper(ctx, "define")?
            .call((target.clone(), key, value, i32::from(attrs.bits())))
    }

    // ========================================================================
    // Native entry points
    // ========================================================================

    /// Throw the pending exception, or a termination error, into script.
    fn check_pending(&self, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let pending = self.pending_exception.borrow_mut().take();
        if let Some(exception) = pending {
            let value = self.to_js(ctx, &exception)?;
            return Err(ctx.throw(value));
        }
        if self.terminating.get() {
            return Err(self.throw_js(ctx, ErrorKind::Error, "execution terminated"));
        }
        Ok(())
    }

    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        bound: BoundCallback,
        this: JsValue<'js>,
        args: JsArray<'js>,
        new_target: Option<JsValue<'js>>,
    ) -> rquickjs::Result<JsValue<'js>> {
        let _active = self.activate(ctx);
        self.check_pending(ctx)?;
        let scope = self.open_scope();
        let result = self.invoke_scoped(ctx, bound, this, args, new_target);
        self.close_scope(scope);
        result
    }

    fn invoke_scoped<'js>(
        &self,
        ctx: &Ctx<'js>,
        bound: BoundCallback,
        this: JsValue<'js>,
        args: JsArray<'js>,
        new_target: Option<JsValue<'js>>,
    ) -> rquickjs::Result<JsValue<'js>> {
        let Some(ExternalCallback::Function(callback)) = self.isolate.callback(bound.callback)
        else {
            let message = "callback is not a function callback";
            return Err(self.throw_js(ctx, ErrorKind::TypeError, message));
        };
        let this = self.from_js(ctx, this)?;
        let args = (0..args.len())
            .map(|i| args.get::<JsValue>(i).and_then(|v| self.from_js(ctx, v)))
            .collect::<rquickjs::Result<Vec<_>>>()?;
        let new_target = new_target.map(|v| self.from_js(ctx, v)).transpose()?;

        let embedder = self.embedder_ref();
        let mut info = CallbackInfo::new(self, embedder, this, &args, new_target, bound.data);
        callback(&mut info);
        let returned = info.take_return_value();
        self.check_pending(ctx)?;
        self.to_js(ctx, &returned.unwrap_or_default())
    }

    fn construct_native<'js>(
        &self,
        ctx: &Ctx<'js>,
        template: TemplateId,
        new_target: JsValue<'js>,
        this: JsValue<'js>,
        args: JsArray<'js>,
    ) -> rquickjs::Result<JsValue<'js>> {
        let _active = self.activate(ctx);
        let Some(bound) = self.isolate.template(template).and_then(|t| t.constructor) else {
            return Err(self.throw_js(ctx, ErrorKind::TypeError, "Illegal constructor"));
        };
        if new_target.is_undefined() {
            return self.invoke(ctx, bound, this, args, None);
        }
        let (instance, _) = self.instance_js(ctx, template, &new_target)?;
        let result = self.invoke(ctx, bound, instance.clone(), args, Some(new_target))?;
        Ok(if is_object_like(&result) { result } else { instance })
    }

    fn intercept<'js>(
        &self,
        ctx: &Ctx<'js>,
        interceptor: Interceptor,
        holder: JsValue<'js>,
        key: JsValue<'js>,
        value: JsValue<'js>,
    ) -> rquickjs::Result<JsValue<'js>> {
        let _active = self.activate(ctx);
        self.check_pending(ctx)?;
        let scope = self.open_scope();
        let result = self.intercept_scoped(ctx, interceptor, holder, key, value);
        self.close_scope(scope);
        result
    }

    fn intercept_scoped<'js>(
        &self,
        ctx: &Ctx<'js>,
        interceptor: Interceptor,
        holder: JsValue<'js>,
        key: JsValue<'js>,
        value: JsValue<'js>,
    ) -> rquickjs::Result<JsValue<'js>> {
        let holder = self.from_js(ctx, holder)?;
        let embedder = self.embedder_ref();
        let mut info = PropertyCallbackInfo::new(self, embedder, holder, interceptor.data);
        let outcome = match (interceptor.trap, self.isolate.callback(interceptor.callback)) {
            (Trap::IndexedGet, Some(ExternalCallback::IndexedGetter(f))) => {
                f(js_index(&key), &mut info)
            }
            (Trap::IndexedSet, Some(ExternalCallback::IndexedSetter(f))) => {
                f(js_index(&key), self.from_js(ctx, value)?, &mut info)
            }
            (Trap::NamedGet, Some(ExternalCallback::NamedGetter(f))) => {
                f(&js_name(&key)?, &mut info)
            }
            (Trap::NamedSet, Some(ExternalCallback::NamedSetter(f))) => {
                f(&js_name(&key)?, self.from_js(ctx, value)?, &mut info)
            }
            (Trap::NamedDelete, Some(ExternalCallback::NamedDeleter(f))) => {
                f(&js_name(&key)?, &mut info)
            }
            _ => Intercepted::No,
        };
        let returned = info.take_return_value();
        self.check_pending(ctx)?;

        let hit = outcome == Intercepted::Yes;
        match interceptor.trap {
            Trap::IndexedSet | Trap::NamedSet => Ok(JsValue::new_bool(ctx.clone(), hit)),
            _ if hit => {
                let boxed = JsArray::new(ctx.clone())?;
                boxed.set(0, self.to_js(ctx, &returned.unwrap_or_default())?)?;
                Ok(boxed.into_value())
            }
            _ => Ok(JsValue::new_undefined(ctx.clone())),
        }
    }

    fn native_function<'js>(
        &self,
        ctx: &Ctx<'js>,
        name: &str,
        length: u32,
        bound: BoundCallback,
    ) -> rquickjs::Result<JsValue<'js>> {
        let realm = self.this.clone();
        let native = JsFunction::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, this: JsValue<'js>, args: JsArray<'js>| {
                upgrade(&realm)?.invoke(&ctx, bound, this, args, None)
            },
        )?;
        self.helper(ctx, "makeFunction")?.call((name, length, native))
    }

    fn interceptor_function<'js>(
        &self,
        ctx: &Ctx<'js>,
        interceptor: Interceptor,
    ) -> rquickjs::Result<JsValue<'js>> {
        let realm = self.this.clone();
        let native = JsFunction::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, holder: JsValue<'js>, key: JsValue<'js>, value: JsValue<'js>| {
                upgrade(&realm)?.intercept(&ctx, interceptor, holder, key, value)
            },
        )?;
        Ok(native.into_value())
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    pub fn new_object(&self) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let obj: JsValue = self.helper(ctx, "create")?.call(())?;
            self.intern(ctx, obj)
        })
    }

    /// Create an ordinary object; `None` gives it a null prototype.
    pub fn new_object_with_prototype(
        &self,
        prototype: Option<ObjectRef>,
    ) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let prototype = match prototype {
                Some(p) => self.restore(ctx, p)?,
                None => JsValue::new_null(ctx.clone()),
            };
            let obj: JsValue = self.helper(ctx, "create")?.call((prototype,))?;
            self.intern(ctx, obj)
        })
    }

    pub fn new_array(&self, items: Vec<Value>) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let array = self.array_js(ctx, &items)?;
            self.intern(ctx, array.into_value())
        })
    }

    /// Create an error object of `kind` with an own `message`.
    pub fn new_error(&self, kind: ErrorKind, message: &str) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let error = self.new_error_js(ctx, kind, message)?;
            self.intern(ctx, error)
        })
    }

    /// Create a typed array over a copy of `bytes` (little-endian elements).
    pub fn new_typed_array(
        &self,
        kind: TypedArrayKind,
        bytes: Vec<u8>,
    ) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let buffer = ArrayBuffer::new(ctx.clone(), bytes)?;
            let array: JsValue = self
                .helper(ctx, "newTypedArray")?
                .call((i32::from(u8::from(kind)), buffer))?;
            self.intern(ctx, array)
        })
    }

    pub fn new_array_buffer(&self, bytes: Vec<u8>) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let buffer = ArrayBuffer::new(ctx.clone(), bytes)?;
            let buffer = buffer.into_js(ctx)?;
            self.intern(ctx, buffer)
        })
    }

    pub fn new_promise(&self) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let promise: JsValue = self.helper(ctx, "newPromise")?.call(())?;
            self.intern(ctx, promise)
        })
    }

    /// Settle a promise created by [`Realm::new_promise`]. Returns false if
    /// it was already settled. Reactions run at the next microtask
    /// checkpoint.
    pub fn settle_promise(&self, promise: ObjectRef, state: PromiseState) -> bool {
        let (fulfilled, value) = match state {
            PromiseState::Pending => return false,
            PromiseState::Fulfilled(v) => (true, v),
            PromiseState::Rejected(v) => (false, v),
        };
        self.run(|ctx| {
            let promise = self.restore(ctx, promise)?;
            let value = self.to_js(ctx, &value)?;
            self.helper(ctx, "settlePromise")?
                .call((promise, fulfilled, value))
        })
        .unwrap_or(false)
    }

    /// Settlement state of a promise; `None` if `promise` is not one.
    pub fn promise_state(&self, promise: ObjectRef) -> Option<PromiseState> {
        self.run(|ctx| {
            let promise = self.restore(ctx, promise)?;
            let record: Option<JsArray> = self.helper(ctx, "promiseState")?.call((promise,))?;
            let Some(record) = record else {
                return Ok(None);
            };
            let state: i32 = record.get(0)?;
            let value = self.from_js(ctx, record.get(1)?)?;
            Ok(Some(match state {
                1 => PromiseState::Fulfilled(value),
                2 => PromiseState::Rejected(value),
                _ => PromiseState::Pending,
            }))
        })
        .ok()
        .flatten()
    }

    /// Create a function backed by a registered callback.
    pub fn new_function(
        &self,
        name: &str,
        callback: CallbackRef,
        data: u32,
        length: u32,
    ) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let f = self.native_function(ctx, name, length, BoundCallback { callback, data })?;
            self.intern(ctx, f)
        })
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Define (or redefine) an own data property without running setters.
    pub fn define(
        &self,
        obj: ObjectRef,
        key: impl Into<PropertyKey>,
        value: Value,
        attrs: PropertyAttributes,
    ) -> bool {
        let key = key.into();
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let key = self.key_to_js(ctx, &key)?;
            let value = self.to_js(ctx, &value)?;
            self.define_js(ctx, &target, key, value, attrs)
        })
        .unwrap_or(false)
    }

    pub fn define_accessor(
        &self,
        obj: ObjectRef,
        key: impl Into<PropertyKey>,
        getter: Option<Value>,
        setter: Option<Value>,
        attrs: PropertyAttributes,
    ) -> bool {
        let key = key.into();
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let key = self.key_to_js(ctx, &key)?;
            let getter = self.to_js(ctx, &getter.unwrap_or_default())?;
            let setter = self.to_js(ctx, &setter.unwrap_or_default())?;
            self.helper(ctx, "defineAccessor")?
                .call((target, key, getter, setter, i32::from(attrs.bits())))
        })
        .unwrap_or(false)
    }

    pub fn get_own_property(&self, obj: ObjectRef, key: &PropertyKey) -> Option<Property> {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let key = self.key_to_js(ctx, key)?;
            let descriptor: Option<JsArray> =
                self.helper(ctx, "ownProperty")?.call((target, key))?;
            let Some(descriptor) = descriptor else {
                return Ok(None);
            };
            let flags: i32 = descriptor.get(0)?;
            let attrs = PropertyAttributes::from_bits_truncate(flags as u8);
            if descriptor.len() == 2 {
                return Ok(Some(Property::Data {
                    value: self.from_js(ctx, descriptor.get(1)?)?,
                    attrs,
                }));
            }
            Ok(Some(Property::Accessor {
                getter: self.optional_js(ctx, descriptor.get(1)?)?,
                setter: self.optional_js(ctx, descriptor.get(2)?)?,
                attrs,
            }))
        })
        .ok()
        .flatten()
    }

    /// Own enumerable string keys, integer keys first.
    pub fn own_keys(&self, obj: ObjectRef) -> Vec<PropertyKey> {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let keys: Vec<String> = self.helper(ctx, "ownKeys")?.call((target,))?;
            Ok(keys.into_iter().map(PropertyKey::from).collect())
        })
        .unwrap_or_default()
    }

    /// `obj[key]`, running interceptors and accessors.
    pub fn get(
        &self,
        embedder: &dyn Any,
        obj: ObjectRef,
        key: impl Into<PropertyKey>,
    ) -> Result<Value, Exception> {
        let key = key.into();
        self.enter(embedder, |ctx| {
            let target = self.restore(ctx, obj)?;
            let key = self.key_to_js(ctx, &key)?;
            let value = self.helper(ctx, "get")?.call((target, key))?;
            self.from_js(ctx, value)
        })
    }

    /// `obj[key] = value`, running interceptors and setters. Writes to
    /// read-only properties are ignored.
    pub fn set(
        &self,
        embedder: &dyn Any,
        obj: ObjectRef,
        key: impl Into<PropertyKey>,
        value: Value,
    ) -> Result<(), Exception> {
        let key = key.into();
        self.enter(embedder, |ctx| {
            let target = self.restore(ctx, obj)?;
            let key = self.key_to_js(ctx, &key)?;
            let value = self.to_js(ctx, &value)?;
            self.helper(ctx, "set")?.call::<_, ()>((target, key, value))
        })
    }

    /// `delete obj[key]`.
    pub fn delete(
        &self,
        embedder: &dyn Any,
        obj: ObjectRef,
        key: impl Into<PropertyKey>,
    ) -> Result<bool, Exception> {
        let key = key.into();
        self.enter(embedder, |ctx| {
            let target = self.restore(ctx, obj)?;
            let key = self.key_to_js(ctx, &key)?;
            self.helper(ctx, "deleteProperty")?.call((target, key))
        })
    }

    // ========================================================================
    // Calls and evaluation
    // ========================================================================

    /// Call `f` with receiver `this`.
    pub fn call(
        &self,
        embedder: &dyn Any,
        f: &Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Exception> {
        self.enter(embedder, |ctx| {
            let f = self.to_js(ctx, f)?;
            let this = self.to_js(ctx, &this)?;
            let args = self.array_js(ctx, args)?;
            let result = self.helper(ctx, "apply")?.call((f, this, args))?;
            self.from_js(ctx, result)
        })
    }

    /// `new f(...args)`.
    pub fn construct(
        &self,
        embedder: &dyn Any,
        f: &Value,
        args: &[Value],
    ) -> Result<Value, Exception> {
        self.enter(embedder, |ctx| {
            let f = self.to_js(ctx, f)?;
            let args = self.array_js(ctx, args)?;
            let result = self.helper(ctx, "construct")?.call((f, args))?;
            self.from_js(ctx, result)
        })
    }

    /// `obj[name](...args)`.
    pub fn call_method(
        &self,
        embedder: &dyn Any,
        obj: ObjectRef,
        name: &str,
        args: &[Value],
    ) -> Result<Value, Exception> {
        self.enter(embedder, |ctx| {
            let target = self.restore(ctx, obj)?;
            let f: JsValue = self.helper(ctx, "get")?.call((target.clone(), name))?;
            let args = self.array_js(ctx, args)?;
            let result = self.helper(ctx, "apply")?.call((f, target, args))?;
            self.from_js(ctx, result)
        })
    }

    /// Evaluate a classic script in the global scope.
    pub fn eval(&self, embedder: &dyn Any, source: &str) -> Result<Value, Exception> {
        self.enter(embedder, |ctx| {
            let result: JsValue = ctx.eval(source)?;
            self.from_js(ctx, result)
        })
    }

    // ========================================================================
    // Prototypes and internal fields
    // ========================================================================

    pub fn get_prototype(&self, obj: ObjectRef) -> Option<ObjectRef> {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let proto: JsValue = self.helper(ctx, "getPrototypeOf")?.call((target,))?;
            if proto.is_null() {
                return Ok(None);
            }
            self.intern(ctx, proto).map(Some)
        })
        .ok()
        .flatten()
    }

    /// Set `obj.[[Prototype]]`. Refuses to create cycles.
    pub fn set_prototype(&self, obj: ObjectRef, prototype: Option<ObjectRef>) -> bool {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let prototype = match prototype {
                Some(p) => self.restore(ctx, p)?,
                None => JsValue::new_null(ctx.clone()),
            };
            self.helper(ctx, "setPrototypeOf")?.call((target, prototype))
        })
        .unwrap_or(false)
    }

    pub fn internal_field_count(&self, obj: ObjectRef) -> usize {
        self.handles
            .borrow()
            .instance(obj)
            .map_or(0, |i| i.fields.len())
    }

    pub fn internal_field(&self, obj: ObjectRef, index: usize) -> Option<InternalField> {
        self.handles
            .borrow()
            .instance(obj)
            .and_then(|i| i.fields.get(index).cloned())
    }

    /// Store into an existing internal field. Returns false when out of
    /// range. A stored value stays alive as long as the instance does.
    pub fn set_internal_field(&self, obj: ObjectRef, index: usize, field: InternalField) -> bool {
        let mut handles = self.handles.borrow_mut();
        if !handles
            .instance(obj)
            .is_some_and(|i| index < i.fields.len())
        {
            return false;
        }
        if let InternalField::Value(v) = &field {
            if let Some(r) = slot_of(v) {
                handles.retain(r);
            }
        }
        let previous = match handles.instance_mut(obj).and_then(|i| i.fields.get_mut(index)) {
            Some(slot) => std::mem::replace(slot, field),
            None => return false,
        };
        if let InternalField::Value(v) = &previous {
            if let Some(r) = slot_of(v) {
                handles.release(r);
            }
        }
        true
    }

    // ========================================================================
    // Templates
    // ========================================================================

    /// Already-instantiated constructor/prototype pair, without instantiating.
    pub fn instantiated(&self, template: TemplateId) -> Option<Instantiated> {
        self.templates
            .borrow()
            .get(template.0 as usize)
            .copied()
            .flatten()
    }

    /// Instantiate `template` (and its ancestors) in this realm if needed.
    pub fn instantiate(&self, template: TemplateId) -> Result<Instantiated, Exception> {
        self.run(|ctx| self.instantiate_js(ctx, template))
    }

    fn instantiate_js<'js>(
        &self,
        ctx: &Ctx<'js>,
        template: TemplateId,
    ) -> rquickjs::Result<Instantiated> {
        if let Some(done) = self.instantiated(template) {
            return Ok(done);
        }
        let isolate = self.isolate.clone();
        let Some(t) = isolate.template(template) else {
            return Err(self.throw_js(ctx, ErrorKind::TypeError, "unknown template"));
        };
        let parent = match t.parent {
            Some(parent) => Some(self.instantiate_js(ctx, parent)?),
            None => None,
        };

        let realm = self.this.clone();
        let native = JsFunction::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, new_target: JsValue<'js>, this: JsValue<'js>, args: JsArray<'js>| {
                upgrade(&realm)?.construct_native(&ctx, template, new_target, this, args)
            },
        )?;
        let constructor: JsValue = self
            .helper(ctx, "makeClass")?
            .call((&*t.class_name, t.length, native))?;
        let prototype: JsValue = self.helper(ctx, "create")?.call(())?;
        let (parent_constructor, parent_prototype) = match parent {
            Some(p) => (
                Some(self.restore(ctx, p.constructor)?),
                Some(self.restore(ctx, p.prototype)?),
            ),
            None => (None, None),
        };
        self.helper(ctx, "linkClass")?.call::<_, ()>((
            constructor.clone(),
            prototype.clone(),
            parent_constructor,
            parent_prototype,
        ))?;

        for prop in &t.prototype {
            self.install_member(ctx, &prototype, prop)?;
        }
        for prop in &t.statics {
            self.install_member(ctx, &constructor, prop)?;
        }
        let tag = PropertyKey::Symbol(Symbol::ToStringTag);
        if t.flags.contains(TemplateFlags::DEFAULT_TO_STRING_TAG) && !t.has_prototype_key(&tag) {
            let key = self.key_to_js(ctx, &tag)?;
            let name = (&*t.class_name).into_js(ctx)?;
            self.define_js(
                ctx,
                &prototype,
                key,
                name,
                PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_ENUM,
            )?;
        }

        let interceptors = self.interceptors_js(ctx, t)?;
        let done = Instantiated {
            constructor: self.intern(ctx, constructor)?,
            prototype: self.intern(ctx, prototype)?,
        };
        {
            let mut handles = self.handles.borrow_mut();
            handles.pin(done.constructor);
            handles.pin(done.prototype);
        }
        if let Some(slot) = self.templates.borrow_mut().get_mut(template.0 as usize) {
            *slot = Some(done);
        }
        if let Some(slot) = self.interceptors.borrow_mut().get_mut(template.0 as usize) {
            *slot = interceptors;
        }
        Ok(done)
    }

    fn interceptors_js<'js>(
        &self,
        ctx: &Ctx<'js>,
        t: &FunctionTemplate,
    ) -> rquickjs::Result<Option<ObjectRef>> {
        let (indexed, named) = (t.instance.indexed, t.instance.named);
        if indexed.is_none() && named.is_none() {
            return Ok(None);
        }
        let indexed_data = indexed.map_or(0, |h| h.data);
        let named_data = named.map_or(0, |h| h.data);
        let traps = [
            (Trap::IndexedGet, indexed.and_then(|h| h.getter), indexed_data),
            (Trap::IndexedSet, indexed.and_then(|h| h.setter), indexed_data),
            (Trap::NamedGet, named.and_then(|h| h.getter), named_data),
            (Trap::NamedSet, named.and_then(|h| h.setter), named_data),
            (Trap::NamedDelete, named.and_then(|h| h.deleter), named_data),
        ];
        let handlers = JsArray::new(ctx.clone())?;
        for (i, (trap, callback, data)) in traps.into_iter().enumerate() {
            let handler = match callback {
                Some(callback) => self.interceptor_function(
                    ctx,
                    Interceptor {
                        trap,
                        callback,
                        data,
                    },
                )?,
                None => JsValue::new_undefined(ctx.clone()),
            };
            handlers.set(i, handler)?;
        }
        let handlers = self.intern(ctx, handlers.into_value())?;
        self.handles.borrow_mut().pin(handlers);
        Ok(Some(handlers))
    }

    fn install_member<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: &JsValue<'js>,
        prop: &TemplateProperty,
    ) -> rquickjs::Result<()> {
        let name = match &prop.key {
            PropertyKey::Symbol(s) => format!("[{}]", s.description()),
            other => other.to_string(),
        };
        let key = self.key_to_js(ctx, &prop.key)?;
        match &prop.member {
            TemplateMember::Method { callback, length } => {
                let f = self.native_function(ctx, &name, *length, *callback)?;
                self.define_js(ctx, target, key, f, prop.attrs)?;
            }
            TemplateMember::Accessor { getter, setter } => {
                let make = |bound: &Option<BoundCallback>, prefix: &str, length| match bound {
                    Some(bound) => {
                        self.native_function(ctx, &format!("{prefix} {name}"), length, *bound)
                    }
                    None => Ok(JsValue::new_undefined(ctx.clone())),
                };
                let getter = make(getter, "get", 0)?;
                let setter = make(setter, "set", 1)?;
                self.helper(ctx, "defineAccessor")?.call::<_, ()>((
                    target.clone(),
                    key,
                    getter,
                    setter,
                    i32::from(prop.attrs.bits()),
                ))?;
            }
            TemplateMember::Constant(constant) => {
                let value = self.to_js(ctx, &constant.to_value())?;
                self.define_js(ctx, target, key, value, prop.attrs)?;
            }
        }
        Ok(())
    }

    pub fn constructor_for(&self, template: TemplateId) -> Result<ObjectRef, Exception> {
        self.instantiate(template).map(|i| i.constructor)
    }

    pub fn prototype_for(&self, template: TemplateId) -> Result<ObjectRef, Exception> {
        self.instantiate(template).map(|i| i.prototype)
    }

    fn instance_js<'js>(
        &self,
        ctx: &Ctx<'js>,
        template: TemplateId,
        new_target: &JsValue<'js>,
    ) -> rquickjs::Result<(JsValue<'js>, ObjectRef)> {
        let done = self.instantiate_js(ctx, template)?;
        let field_count = self
            .isolate
            .template(template)
            .map_or(0, |t| t.instance.internal_field_count as usize);
        let handlers = self
            .interceptors
            .borrow()
            .get(template.0 as usize)
            .copied()
            .flatten();
        let handlers = match handlers {
            Some(h) => self.restore(ctx, h)?,
            None => JsValue::new_undefined(ctx.clone()),
        };
        let fallback = self.restore(ctx, done.prototype)?;
        let instance: JsValue = self
            .helper(ctx, "instantiate")?
            .call((new_target.clone(), fallback, handlers))?;

        let r = self.intern(ctx, instance.clone())?;
        let mut handles = self.handles.borrow_mut();
        handles.pin(r);
        handles.set_instance(
            r,
            Instance {
                template,
                fields: vec![InternalField::Empty; field_count],
            },
        );
        Ok((instance, r))
    }

    /// Allocate an uninitialized instance of `template`.
    pub fn new_instance(&self, template: TemplateId) -> Result<ObjectRef, Exception> {
        self.run(|ctx| {
            let undefined = JsValue::new_undefined(ctx.clone());
            self.instance_js(ctx, template, &undefined).map(|(_, r)| r)
        })
    }

    /// Template an object was instantiated from.
    pub fn template_of(&self, obj: ObjectRef) -> Option<TemplateId> {
        self.handles.borrow().instance(obj).map(|i| i.template)
    }

    // ========================================================================
    // Exceptions and termination
    // ========================================================================

    /// Schedule `value` to be thrown when the current callback returns.
    pub fn throw_exception(&self, value: Value) {
        *self.pending_exception.borrow_mut() = Some(value);
    }

    /// Create and schedule an error of `kind`.
    pub fn throw_error(&self, kind: ErrorKind, message: &str) {
        let error = self.error(kind, message);
        if let Exception::Thrown(value) = error {
            self.throw_exception(value);
        }
    }

    /// Create an error of `kind` as an `Exception`, without scheduling it.
    pub fn error(&self, kind: ErrorKind, message: &str) -> Exception {
        match self.new_error(kind, message) {
            Ok(error) => Exception::Thrown(Value::Object(error)),
            Err(Exception::Thrown(_)) => Exception::Thrown(Value::string(message)),
            Err(Exception::Terminated) => Exception::Terminated,
        }
    }

    pub fn has_pending_exception(&self) -> bool {
        self.pending_exception.borrow().is_some()
    }

    pub fn take_exception(&self) -> Option<Value> {
        self.pending_exception.borrow_mut().take()
    }

    /// Interrupt running script and make every subsequent engine entry fail
    /// with [`Exception::Terminated`].
    pub fn terminate_execution(&self) {
        self.terminating.set(true);
    }

    pub fn cancel_termination(&self) {
        self.terminating.set(false);
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.get()
    }

    // ========================================================================
    // Handles and collection
    // ========================================================================

    pub fn persist(&self, value: Value) -> Global {
        self.handles.borrow_mut().add_global(value)
    }

    pub fn persistent(&self, handle: Global) -> Option<Value> {
        self.handles.borrow().global(handle).cloned()
    }

    pub fn release(&self, handle: Global) {
        self.handles.borrow_mut().remove_global(handle);
    }

    pub fn persistent_count(&self) -> usize {
        self.handles.borrow().global_count()
    }

    /// Number of engine objects currently held by the handle table.
    pub fn live_handles(&self) -> usize {
        self.handles.borrow().live_count()
    }

    /// Open a handle scope. Objects first seen after this mark are released
    /// by [`Realm::close_scope`] unless something else holds them.
    pub fn open_scope(&self) -> ScopeMark {
        ScopeMark(self.handles.borrow().scope_len())
    }

    pub fn close_scope(&self, mark: ScopeMark) {
        self.handles.borrow_mut().close_scope(mark.0);
    }

    /// Run the engine's collector. Skipped while script is on the stack.
    pub fn run_gc(&self) {
        if self.active.borrow().is_none() {
            self.runtime.run_gc();
        }
    }

    // ========================================================================
    // Inspection helpers
    // ========================================================================

    /// `typeof value`.
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Object(_) if self.is_callable(value) => "function",
            other => other.type_name(),
        }
    }

    fn test_object(&self, value: &Value, helper: &str) -> bool {
        let Value::Object(obj) = value else {
            return false;
        };
        self.run(|ctx| {
            let target = self.restore(ctx, *obj)?;
            self.helper(ctx, helper)?.call((target,))
        })
        .unwrap_or(false)
    }

    pub fn is_callable(&self, value: &Value) -> bool {
        self.test_object(value, "isCallable")
    }

    pub fn is_array(&self, value: &Value) -> bool {
        self.test_object(value, "isArray")
    }

    /// Copy of an array's elements.
    pub fn array_elements(&self, obj: ObjectRef) -> Option<Vec<Value>> {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let items: Option<JsArray> = self.helper(ctx, "elements")?.call((target,))?;
            let Some(items) = items else {
                return Ok(None);
            };
            (0..items.len())
                .map(|i| items.get::<JsValue>(i).and_then(|v| self.from_js(ctx, v)))
                .collect::<rquickjs::Result<Vec<_>>>()
                .map(Some)
        })
        .ok()
        .flatten()
    }

    /// Element kind and a copy of the viewed bytes of a typed array.
    pub fn typed_array(&self, obj: ObjectRef) -> Option<(TypedArrayKind, Vec<u8>)> {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let kind: i32 = self.helper(ctx, "typedArrayKind")?.call((target.clone(),))?;
            let Some(kind) = u8::try_from(kind)
                .ok()
                .and_then(|k| TypedArrayKind::try_from(k).ok())
            else {
                return Ok(None);
            };
            let buffer: ArrayBuffer = self.helper(ctx, "typedArrayBytes")?.call((target,))?;
            Ok(Some((kind, buffer.as_bytes().map(<[u8]>::to_vec).unwrap_or_default())))
        })
        .ok()
        .flatten()
    }

    pub fn array_buffer(&self, obj: ObjectRef) -> Option<Vec<u8>> {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let buffer: Option<ArrayBuffer> = self.helper(ctx, "arrayBuffer")?.call((target,))?;
            Ok(buffer.map(|b| b.as_bytes().map(<[u8]>::to_vec).unwrap_or_default()))
        })
        .ok()
        .flatten()
    }

    pub fn error_kind(&self, value: &Value) -> Option<ErrorKind> {
        let Value::Object(obj) = value else {
            return None;
        };
        self.run(|ctx| {
            let target = self.restore(ctx, *obj)?;
            self.helper(ctx, "errorKind")?.call::<_, i32>((target,))
        })
        .ok()
        .and_then(|code| u8::try_from(code).ok())
        .and_then(|code| ErrorKind::try_from(code).ok())
    }

    /// `value instanceof constructor`, without running user code.
    pub fn instance_of(&self, value: &Value, constructor: ObjectRef) -> bool {
        let Value::Object(obj) = value else {
            return false;
        };
        self.run(|ctx| {
            let target = self.restore(ctx, *obj)?;
            let constructor = self.restore(ctx, constructor)?;
            self.helper(ctx, "instanceOf")?.call((target, constructor))
        })
        .unwrap_or(false)
    }

    /// Data-property lookup along the chain that never runs code.
    pub fn get_data(&self, obj: ObjectRef, key: impl Into<PropertyKey>) -> Option<Value> {
        let key = key.into();
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let key = self.key_to_js(ctx, &key)?;
            let found: Option<JsArray> = self.helper(ctx, "dataLookup")?.call((target, key))?;
            match found {
                Some(found) => self.from_js(ctx, found.get(0)?).map(Some),
                None => Ok(None),
            }
        })
        .ok()
        .flatten()
    }

    /// What kind of object `obj` is.
    pub fn object_kind(&self, obj: ObjectRef) -> Option<ObjectKind> {
        self.run(|ctx| {
            let target = self.restore(ctx, obj)?;
            let d: JsArray = self.helper(ctx, "describe")?.call((target,))?;
            let tag: i32 = d.get(0)?;
            let text = |i: usize| -> rquickjs::Result<Rc<str>> {
                let s: Option<String> = d.get(i)?;
                Ok(Rc::from(s.unwrap_or_default()))
            };
            let number = |i: usize| -> rquickjs::Result<f64> { d.get::<f64>(i) };
            Ok(match tag {
                1 => ObjectKind::Array {
                    length: number(1)? as u32,
                },
                2 => ObjectKind::Function { name: text(1)? },
                3 => ObjectKind::Error(
                    u8::try_from(d.get::<i32>(1)?)
                        .ok()
                        .and_then(|k| ErrorKind::try_from(k).ok())
                        .unwrap_or(ErrorKind::Error),
                ),
                4 => ObjectKind::ArrayBuffer {
                    byte_length: number(1)? as usize,
                },
                5 => match u8::try_from(d.get::<i32>(1)?)
                    .ok()
                    .and_then(|k| TypedArrayKind::try_from(k).ok())
                {
                    Some(kind) => ObjectKind::TypedArray {
                        kind,
                        length: number(2)? as usize,
                    },
                    None => ObjectKind::Ordinary { constructor: None },
                },
                6 => ObjectKind::Promise,
                7 => ObjectKind::Date(number(1)?),
                8 => ObjectKind::RegExp {
                    source: text(1)?,
                    flags: text(2)?,
                },
                9 => ObjectKind::Map {
                    size: number(1)? as usize,
                },
                10 => ObjectKind::Set {
                    size: number(1)? as usize,
                },
                _ => ObjectKind::Ordinary {
                    constructor: Some(text(1)?).filter(|name| !name.is_empty()),
                },
            })
        })
        .ok()
    }

    /// Class name of an object: the template's class name, or the built-in
    /// kind's constructor name.
    pub fn class_name(&self, obj: ObjectRef) -> Rc<str> {
        if let Some(t) = self.template_of(obj).and_then(|t| self.isolate.template(t)) {
            return t.class_name.clone();
        }
        self.object_kind(obj)
            .map(|kind| kind.class_name())
            .unwrap_or_else(|| Rc::from("Object"))
    }

    /// ToString. Primitives convert natively; symbols throw; objects go
    /// through the engine and may run `toString` methods.
    pub fn to_string(&self, value: &Value) -> Result<Rc<str>, Exception> {
        Ok(match value {
            Value::Undefined => Rc::from("undefined"),
            Value::Null => Rc::from("null"),
            Value::Bool(b) => Rc::from(if *b { "true" } else { "false" }),
            Value::Int(i) => Rc::from(i.to_string()),
            Value::Number(n) => Rc::from(number_to_string(*n)),
            Value::BigInt(b) => Rc::from(b.to_string()),
            Value::String(s) => s.clone(),
            Value::Symbol(_) => {
                return Err(self.error(
                    ErrorKind::TypeError,
                    "Cannot convert a Symbol value to a string",
                ));
            }
            Value::Object(obj) => {
                let text = self.run(|ctx| {
                    let target = self.restore(ctx, *obj)?;
                    self.helper(ctx, "toString")?.call::<_, String>((target,))
                })?;
                Rc::from(text)
            }
        })
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("live_handles", &self.live_handles())
            .field("terminating", &self.terminating.get())
            .finish_non_exhaustive()
    }
}
