//! Bridge behavior tests: identity, prototype resolution, marshaling,
//! dispatch, error mapping and context teardown.
//!
//! The catalog is a three-level hierarchy. `Child` embeds `Base` after a
//! padding field (non-zero offset); `Grandchild` holds its `Child` behind a
//! box, so resolving a `Grandchild` object as a `Base` takes one pointer hop
//! followed by one offset. `Overlay` embeds `Base` at offset 0, so both
//! views share one address.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::ptr::NonNull;
use std::rc::Rc;

use jsbind::engine::{ErrorKind, PromiseState};
use jsbind::{
    Class, ContextOptions, DomainError, Enumeration, Env, EnvConfig, ExecutionContext, FromScript,
    Function, Module, NativeError, ObjectRef, Promise, PropertyKey, Record, Ref, ToScript,
    TypedArray, Union, Value,
};

// ============================================================================
// Catalog
// ============================================================================

#[derive(Class)]
struct Base {
    value: Cell<i32>,
}

impl Base {
    fn new(value: i32) -> Self {
        Self {
            value: Cell::new(value),
        }
    }

    fn value(&self) -> i32 {
        self.value.get()
    }

    fn set_value(&self, value: i32) {
        self.value.set(value);
    }

    fn fail(&self, name: String) -> Result<(), DomainError> {
        Err(DomainError::new(name, format!("value is {}", self.value.get())))
    }
}

#[derive(Class)]
struct Child {
    pad: [u64; 3],
    #[jsbind(proto)]
    base: Base,
    extra: Cell<u32>,
}

impl Child {
    fn new(value: i32, extra: u32) -> Self {
        Self {
            pad: [0xAA; 3],
            base: Base::new(value),
            extra: Cell::new(extra),
        }
    }

    fn extra(&self) -> u32 {
        self.extra.get()
    }
}

#[derive(Class)]
struct Grandchild {
    tag: String,
    #[jsbind(proto)]
    child: Box<Child>,
}

#[derive(Class)]
#[repr(C)]
struct Overlay {
    #[jsbind(proto)]
    base: Base,
    depth: u32,
}

/// Shares the `snapshot` cached getter name with `Bag`.
#[derive(Class, Default)]
struct Ledger {
    entries: Cell<u32>,
}

#[derive(Class)]
struct Unrelated {
    n: i32,
}

/// Zero-sized; every instance shares one address.
#[derive(Class)]
struct Marker;

#[derive(Class, Default)]
#[jsbind(category = "map")]
struct Bag {
    items: RefCell<Vec<(String, Value)>>,
    slots: RefCell<Vec<i32>>,
    computed: Cell<u32>,
}

#[derive(Enumeration, Debug, Clone, Copy, PartialEq)]
enum Shape {
    Circle,
    RoundedRect,
    #[jsbind(rename = "sq")]
    Square,
}

#[derive(Record, Debug, PartialEq)]
struct Point {
    x: f64,
    y: f64,
    label_text: Option<String>,
}

#[derive(Union, Debug, PartialEq)]
enum StrOrInt {
    Str(String),
    Int(i32),
}

#[derive(Union, Debug, PartialEq)]
enum BaseOrString {
    Base(Ref<Base>),
    Text(String),
}

#[derive(Union, Debug, PartialEq)]
enum BaseOrPoint {
    Base(Ref<Base>),
    Point(Point),
}

fn catalog(log: Rc<RefCell<Vec<String>>>) -> Module {
    let mut module = Module::new();

    let finalized = log.clone();
    module
        .class::<Base>()
        .constructor(|value: Option<i32>| Base::new(value.unwrap_or(0)))
        .accessor("value", Base::value, Base::set_value)
        .method("fail", Base::fail)
        .static_method("make", |value: i32, ctx: &ExecutionContext| ctx.alloc(Base::new(value)))
        .constant("LIMIT", jsbind::Constant::Int(10))
        .exception(|err: &DomainError, ctx: &ExecutionContext| -> Option<Value> {
            if err.name != "Mapped" {
                return None;
            }
            let obj = ctx.new_object().ok()?;
            ctx.define_field(obj, "mapped", Value::string(&err.message));
            Some(Value::Object(obj))
        })
        .finalizer(move |base: &Base| {
            finalized.borrow_mut().push(format!("base {}", base.value()));
        })
        .build();

    module
        .class::<Child>()
        .constructor(|value: i32, extra: u32| Child::new(value, extra))
        .getter("extra", Child::extra)
        .getter("pad", |c: &Child| c.pad[1] as u32)
        .build();

    module
        .class::<Grandchild>()
        .constructor(|tag: String, value: i32| Grandchild {
            tag,
            child: Box::new(Child::new(value, 7)),
        })
        .getter("tag", |g: &Grandchild| g.tag.clone())
        .build();

    module
        .class::<Overlay>()
        .getter("depth", |o: &Overlay| o.depth)
        .build();

    module
        .class::<Ledger>()
        .constructor(Ledger::default)
        .cached_getter("snapshot", |ledger: &Ledger| ledger.entries.get() + 100)
        .build();

    module
        .class::<Unrelated>()
        .getter("n", |u: &Unrelated| u.n)
        .build();

    module
        .class::<Marker>()
        .constructor(|| Marker)
        .method("ping", |_: &Marker| "pong")
        .build();

    module
        .class::<Bag>()
        .constructor(Bag::default)
        .cached_getter("snapshot", |bag: &Bag| {
            bag.computed.set(bag.computed.get() + 1);
            bag.items.borrow().len() as u32
        })
        .getter("computed", |bag: &Bag| bag.computed.get())
        .indexed_getter(|bag: &Bag, index| bag.slots.borrow().get(index as usize).copied())
        .indexed_setter(|bag: &Bag, index, value: i32| {
            let mut slots = bag.slots.borrow_mut();
            if index as usize >= slots.len() {
                return false;
            }
            slots[index as usize] = value;
            true
        })
        .named_getter(|bag: &Bag, name: &str| {
            bag.items
                .borrow()
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
        .named_setter(|bag: &Bag, name: &str, value: Value| {
            if !name.starts_with("item") {
                return Ok(false);
            }
            if value.is_nullish() {
                return Err(DomainError::new("DataError", "items cannot be empty"));
            }
            bag.items.borrow_mut().push((name.to_string(), value));
            Ok(true)
        })
        .named_deleter(|bag: &Bag, name: &str| {
            let mut items = bag.items.borrow_mut();
            let before = items.len();
            items.retain(|(k, _)| k != name);
            items.len() != before
        })
        .method("push", |bag: &Bag, slot: i32| bag.slots.borrow_mut().push(slot))
        .build();

    module.function("echo", |base: Ref<Base>| base);
    module.function("sum", |values: Vec<i32>| values.iter().sum::<i32>());
    module.function("join", |sep: String, parts: Vec<String>| parts.join(&sep));
    module.function("add", |a: i32, b: Option<i32>| a + b.unwrap_or(1));
    module.function("byte", |b: u8| b);
    module.function("index", |i: u32| i);
    module.function("shape", |s: Shape| s);
    module.function("norm", |p: Point| (p.x * p.x + p.y * p.y).sqrt());
    module.function("point", |x: f64, y: f64| Point { x, y, label_text: Some("p".into()) });
    module.function("kind", |v: StrOrInt| match v {
        StrOrInt::Str(s) => format!("str:{s}"),
        StrOrInt::Int(i) => format!("int:{i}"),
    });
    module.function("which", |v: BaseOrPoint| match v {
        BaseOrPoint::Base(_) => "base",
        BaseOrPoint::Point(_) => "point",
    });
    module.function("label", |v: BaseOrString| match v {
        BaseOrString::Base(base) => format!("base {}", base.value()),
        BaseOrString::Text(text) => text,
    });
    module.function("bytes", |data: TypedArray<u8>| data.0.len() as u32);
    module.function("invoke", |f: Function, arg: Value, ctx: &ExecutionContext| {
        f.call(ctx, &[arg])
    });
    module.function("scratch", |n: u32, ctx: &ExecutionContext| {
        ctx.with_call_arena(|arena| {
            let v = bumpalo::collections::Vec::from_iter_in(0..n, arena);
            v.iter().sum::<u32>()
        })
    });
    module.function("stash", |n: u32, f: Function, ctx: &ExecutionContext| {
        ctx.with_call_arena(|arena| -> Result<u32, NativeError> {
            let kept = bumpalo::collections::Vec::from_iter_in((0..n).map(|i| i * 3), arena);
            f.call(ctx, &[])?;
            Ok(kept.iter().sum())
        })
    });
    module.function("depth", |ctx: &ExecutionContext| ctx.call_depth());
    module.function("wide", |v: i64| v);
    module.function("defer", |ctx: &ExecutionContext| -> Result<Promise, NativeError> {
        let resolver = ctx.promise_resolver()?;
        let promise = resolver.promise();
        resolver.resolve(ctx, 42)?;
        Ok(promise)
    });
    module.function("host", |ctx: &ExecutionContext| {
        ctx.host::<String>().cloned().unwrap_or_default()
    });
    module.function_raw("argc", 0, |inv| Ok(Value::Int(inv.len() as i32)));
    module.constant("VERSION", jsbind::Constant::Int(3));
    module
}

// ============================================================================
// Helpers
// ============================================================================

fn create_context() -> ExecutionContext {
    create_context_with_log().0
}

fn create_context_with_log() -> (ExecutionContext, Rc<RefCell<Vec<String>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let env = Env::builder()
        .install(catalog(log.clone()))
        .build()
        .expect("Failed to build environment");
    let ctx = env
        .create_context(ContextOptions::default())
        .expect("Failed to create context");
    (ctx, log)
}

fn ctor(ctx: &ExecutionContext, name: &str) -> Value {
    ctx.global_value(name).expect("Failed to read constructor")
}

fn construct(ctx: &ExecutionContext, name: &str, args: &[Value]) -> ObjectRef {
    ctx.construct(&ctor(ctx, name), args)
        .unwrap_or_else(|e| panic!("new {name} failed: {e}"))
        .as_object()
        .expect("constructor returned a non-object")
}

fn call_global(ctx: &ExecutionContext, name: &str, args: &[Value]) -> Result<Value, NativeError> {
    let f = ctx.global_value(name).expect("Failed to read global");
    ctx.call(&f, Value::Undefined, args)
}

/// Kind and message of a thrown script error.
fn thrown(ctx: &ExecutionContext, err: NativeError) -> (Option<ErrorKind>, String) {
    let NativeError::Exception(value) = err else {
        panic!("expected a script exception, got {err}");
    };
    let message = value
        .as_object()
        .and_then(|obj| ctx.realm().get_data(obj, "message"))
        .and_then(|m| m.as_str().map(str::to_string))
        .unwrap_or_default();
    (ctx.realm().error_kind(&value), message)
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_wrap_returns_same_object() {
    let ctx = create_context();
    let base = ctx.alloc(Base::new(1));
    let first = ctx.wrap(base).expect("wrap");
    let second = ctx.wrap(base).expect("wrap");
    assert_eq!(first, second);
    assert_eq!(ctx.identity_count(), 1);

    let echoed = call_global(&ctx, "echo", &[first.clone()]).expect("echo");
    assert_eq!(echoed, first);
}

#[test]
fn test_constructed_object_round_trips() {
    let ctx = create_context();
    let obj = construct(&ctx, "Base", &[Value::Int(5)]);
    let native = ctx.resolve::<Base>(&Value::Object(obj)).expect("resolve");
    assert_eq!(native.value(), 5);
    assert_eq!(ctx.wrap(native).expect("wrap"), Value::Object(obj));
}

#[test]
fn test_base_view_at_offset_zero_keeps_derived_identity() {
    let ctx = create_context();
    let overlay = ctx.alloc(Overlay {
        base: Base::new(2),
        depth: 5,
    });
    // SAFETY: `base` lives in the context arena alongside `overlay`.
    let base_view: Ref<Base> = unsafe { Ref::from_raw(NonNull::from(&overlay.base)) };
    assert_eq!(base_view.addr(), overlay.addr());

    let as_base = ctx.wrap(base_view).expect("Failed to wrap base view");
    let first = ctx.wrap(overlay).expect("Failed to wrap overlay");
    let second = ctx.wrap(overlay).expect("Failed to wrap overlay");
    assert_eq!(first, second);
    assert_ne!(first, as_base);
    assert_eq!(ctx.wrap(base_view).expect("Failed to wrap base view"), as_base);
    assert_eq!(ctx.identity_count(), 2);

    let obj = first.as_object().expect("object");
    assert_eq!(ctx.get(obj, "depth").expect("depth"), Value::Int(5));
    assert_eq!(ctx.get(obj, "value").expect("value"), Value::Int(2));
}

#[test]
fn test_empty_types_are_not_mapped() {
    let ctx = create_context();
    let a = construct(&ctx, "Marker", &[]);
    let b = construct(&ctx, "Marker", &[]);
    assert_ne!(a, b);
    assert_eq!(ctx.identity_count(), 0);
    assert_eq!(
        ctx.call_method(b, "ping", &[]).expect("ping").as_str(),
        Some("pong")
    );

    let distinct = ctx
        .eval("new Marker() !== new Marker()")
        .expect("Failed to construct from script");
    assert_eq!(distinct, Value::Bool(true));
    assert_eq!(ctx.identity_count(), 0);

    let marker = ctx.alloc(Marker);
    let first = ctx.wrap(marker).expect("Failed to wrap marker");
    let second = ctx.wrap(marker).expect("Failed to wrap marker");
    assert_ne!(first, second);
    assert_eq!(ctx.identity_count(), 0);
}

// ============================================================================
// Prototype resolution
// ============================================================================

#[test]
fn test_embedded_prototype_at_offset() {
    let ctx = create_context();
    let child = construct(&ctx, "Child", &[Value::Int(9), Value::Int(4)]);
    assert_eq!(ctx.get(child, "value").expect("value"), Value::Int(9));
    assert_eq!(ctx.get(child, "extra").expect("extra"), Value::Int(4));
    assert_eq!(ctx.get(child, "pad").expect("pad"), Value::Int(0xAA));

    ctx.set(child, "value", Value::Int(11)).expect("set value");
    let native = ctx.resolve::<Child>(&Value::Object(child)).expect("resolve");
    assert_eq!(native.base.value(), 11);

    let as_base = ctx.resolve::<Base>(&Value::Object(child)).expect("resolve as Base");
    assert_eq!(as_base.addr(), native.addr() + std::mem::offset_of!(Child, base));
}

#[test]
fn test_indirect_prototype() {
    let ctx = create_context();
    let g = construct(&ctx, "Grandchild", &[Value::string("g"), Value::Int(21)]);
    assert_eq!(ctx.get(g, "value").expect("value"), Value::Int(21));
    assert_eq!(ctx.get(g, "extra").expect("extra"), Value::Int(7));
    assert_eq!(ctx.get(g, "tag").expect("tag").as_str(), Some("g"));

    let native = ctx.resolve::<Grandchild>(&Value::Object(g)).expect("resolve");
    let base = ctx.resolve::<Base>(&Value::Object(g)).expect("resolve as Base");
    assert!(std::ptr::eq(&*base, &native.child.base));

    let echoed = call_global(&ctx, "echo", &[Value::Object(g)]).expect("echo");
    assert_eq!(echoed, Value::Object(g));
}

#[test]
fn test_instance_of_follows_hierarchy() {
    let ctx = create_context();
    let g = Value::Object(construct(&ctx, "Grandchild", &[Value::string("g"), Value::Int(1)]));
    for name in ["Grandchild", "Child", "Base"] {
        let c = ctor(&ctx, name).as_object().expect("constructor");
        assert!(ctx.realm().instance_of(&g, c), "{name}");
    }
    let unrelated = ctor(&ctx, "Unrelated").as_object().expect("constructor");
    assert!(!ctx.realm().instance_of(&g, unrelated));
}

#[test]
fn test_wrong_receiver() {
    let ctx = create_context();
    let marker = construct(&ctx, "Marker", &[]);
    let base = construct(&ctx, "Base", &[]);
    let getter_owner = ctx.realm().get_prototype(base).expect("prototype");
    let fail = ctx.get(getter_owner, "fail").expect("method");

    let err = ctx
        .call(&fail, Value::Object(marker), &[Value::string("X")])
        .expect_err("wrong receiver accepted");
    let (kind, message) = thrown(&ctx, err);
    assert_eq!(kind, Some(ErrorKind::TypeError));
    assert!(message.contains("not a Base"), "{message}");

    let err = ctx
        .call(&fail, Value::Int(3), &[Value::string("X")])
        .expect_err("primitive receiver accepted");
    assert_eq!(thrown(&ctx, err).0, Some(ErrorKind::TypeError));
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_illegal_constructor() {
    let ctx = create_context();
    let err = ctx
        .construct(&ctor(&ctx, "Unrelated"), &[])
        .expect_err("constructed");
    assert_eq!(
        thrown(&ctx, err),
        (Some(ErrorKind::TypeError), "Illegal constructor".to_string())
    );

    let err = ctx
        .call(&ctor(&ctx, "Base"), Value::Undefined, &[])
        .expect_err("called without new");
    assert_eq!(thrown(&ctx, err).1, "Illegal constructor");
}

#[test]
fn test_statics_and_constants() {
    let ctx = create_context();
    let base_ctor = ctor(&ctx, "Base").as_object().expect("constructor");
    let made = ctx.call_method(base_ctor, "make", &[Value::Int(8)]).expect("make");
    let made = made.as_object().expect("object");
    assert_eq!(ctx.get(made, "value").expect("value"), Value::Int(8));

    assert_eq!(ctx.get(base_ctor, "LIMIT").expect("LIMIT"), Value::Int(10));
    assert_eq!(ctx.get(made, "LIMIT").expect("LIMIT"), Value::Int(10));
    assert_eq!(ctx.global_value("VERSION").expect("VERSION"), Value::Int(3));

    let length = ctx.get(base_ctor, "length").expect("length");
    assert_eq!(length, Value::Int(1));
}

// ============================================================================
// Marshaling
// ============================================================================

#[test]
fn test_variadic_arguments() {
    let ctx = create_context();
    let args: Vec<Value> = (1..=4).map(Value::Int).collect();
    assert_eq!(call_global(&ctx, "sum", &args).expect("sum"), Value::Int(10));
    assert_eq!(call_global(&ctx, "sum", &[]).expect("sum"), Value::Int(0));
    assert_eq!(
        call_global(&ctx, "join", &[Value::string("-"), Value::string("a"), Value::Int(2)])
            .expect("join")
            .as_str(),
        Some("a-2")
    );
    let array = ctx
        .realm()
        .new_array(vec![Value::Int(5), Value::Int(6)])
        .expect("Failed to create array");
    assert_eq!(
        call_global(&ctx, "sum", &[Value::Object(array)]).expect("sum"),
        Value::Int(11)
    );
    assert_eq!(
        call_global(&ctx, "argc", &[Value::Null, Value::Null]).expect("argc"),
        Value::Int(2)
    );
}

#[test]
fn test_optional_and_missing_arguments() {
    let ctx = create_context();
    assert_eq!(call_global(&ctx, "add", &[Value::Int(2)]).expect("add"), Value::Int(3));
    assert_eq!(
        call_global(&ctx, "add", &[Value::Int(2), Value::Undefined]).expect("add"),
        Value::Int(3)
    );
    assert_eq!(
        call_global(&ctx, "add", &[Value::Int(2), Value::Int(5)]).expect("add"),
        Value::Int(7)
    );

    let err = call_global(&ctx, "add", &[]).expect_err("missing argument accepted");
    let (kind, message) = thrown(&ctx, err);
    assert_eq!(kind, Some(ErrorKind::TypeError));
    assert!(message.contains("missing required argument 0"), "{message}");
}

#[test]
fn test_integer_ranges() {
    let ctx = create_context();
    assert_eq!(call_global(&ctx, "byte", &[Value::Int(255)]).expect("byte"), Value::Int(255));
    let err = call_global(&ctx, "byte", &[Value::Int(256)]).expect_err("256 accepted as u8");
    assert!(thrown(&ctx, err).1.contains("out of range"));

    for value in [Value::Number(4294967295.0), Value::BigInt(4294967295)] {
        assert_eq!(
            call_global(&ctx, "index", &[value]).expect("index"),
            Value::Number(4294967295.0)
        );
    }
    for value in [Value::Int(-1), Value::Number(4294967296.0), Value::BigInt(1 << 40)] {
        let err = call_global(&ctx, "index", &[value]).expect_err("out of range accepted");
        assert_eq!(thrown(&ctx, err).0, Some(ErrorKind::TypeError));
    }
}

fn round_trip<T>(ctx: &ExecutionContext, identity: &Value, value: T) -> T
where
    T: ToScript + FromScript,
{
    let script = value.to_script(ctx).expect("Failed to convert to script");
    let back = ctx
        .call(identity, Value::Undefined, &[script])
        .expect("Failed to call identity function");
    T::from_script(&back, ctx).expect("Failed to convert from script")
}

fn assert_round_trips<T>(ctx: &ExecutionContext, identity: &Value, values: &[T])
where
    T: ToScript + FromScript + Copy + PartialEq + Debug,
{
    for &value in values {
        assert_eq!(round_trip(ctx, identity, value), value);
    }
}

#[test]
fn test_integer_extremes_round_trip_through_script() {
    let ctx = create_context();
    let identity = ctx.eval("(x) => x").expect("Failed to compile identity");

    assert_round_trips(&ctx, &identity, &[i8::MIN, -1, 0, i8::MAX]);
    assert_round_trips(&ctx, &identity, &[i16::MIN, i16::MAX]);
    assert_round_trips(&ctx, &identity, &[i32::MIN, i32::MAX]);
    assert_round_trips(&ctx, &identity, &[i64::MIN, -1, i64::MAX]);
    assert_round_trips(&ctx, &identity, &[u16::MIN, u16::MAX]);
    assert_round_trips(&ctx, &identity, &[u32::MIN, u32::MAX]);
    assert_round_trips(&ctx, &identity, &[u64::MIN, u64::MAX]);
    assert_round_trips(&ctx, &identity, &[usize::MIN, usize::MAX]);
    assert_round_trips(&ctx, &identity, &[isize::MIN, isize::MAX]);
    assert_round_trips(&ctx, &identity, &[i128::MIN, i128::MAX]);

    let wide = ctx
        .eval("wide(-9223372036854775808n) === -9223372036854775808n && wide(7) === 7")
        .expect("Failed to call wide");
    assert_eq!(wide, Value::Bool(true));
}

#[test]
fn test_float_bits_round_trip_through_script() {
    let ctx = create_context();
    let identity = ctx.eval("(x) => x").expect("Failed to compile identity");

    let doubles = [
        0.0,
        -0.0,
        0.1,
        f64::from_bits(1),
        f64::MIN_POSITIVE,
        f64::MAX,
        f64::MIN,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    for value in doubles {
        assert_eq!(round_trip(&ctx, &identity, value).to_bits(), value.to_bits(), "{value:e}");
    }
    let singles = [
        -0.0f32,
        0.1,
        f32::from_bits(1),
        f32::MIN_POSITIVE,
        f32::MAX,
        f32::NEG_INFINITY,
    ];
    for value in singles {
        assert_eq!(round_trip(&ctx, &identity, value).to_bits(), value.to_bits(), "{value:e}");
    }
    assert!(round_trip(&ctx, &identity, f64::NAN).is_nan());
    assert!(round_trip(&ctx, &identity, f32::NAN).is_nan());
}

#[test]
fn test_enumeration_values() {
    let ctx = create_context();
    for name in ["circle", "rounded-rect", "sq"] {
        let out = call_global(&ctx, "shape", &[Value::string(name)]).expect("shape");
        assert_eq!(out.as_str(), Some(name));
    }
    let err = call_global(&ctx, "shape", &[Value::string("square")]).expect_err("accepted");
    assert!(thrown(&ctx, err).1.contains("not a valid value"));
}

#[test]
fn test_records() {
    let ctx = create_context();
    let p = ctx.new_object().expect("Failed to create object");
    ctx.define_field(p, "x", Value::Int(3));
    ctx.define_field(p, "y", Value::Number(4.0));
    assert_eq!(
        call_global(&ctx, "norm", &[Value::Object(p)]).expect("norm"),
        Value::Int(5)
    );

    let partial = ctx.new_object().expect("Failed to create object");
    ctx.define_field(partial, "x", Value::Int(3));
    let err = call_global(&ctx, "norm", &[Value::Object(partial)]).expect_err("accepted");
    assert!(thrown(&ctx, err).1.contains("missing required field 'y'"));

    let out = call_global(&ctx, "point", &[Value::Int(1), Value::Int(2)]).expect("point");
    let out = out.as_object().expect("record object");
    assert_eq!(ctx.get(out, "labelText").expect("label").as_str(), Some("p"));
    let expected: Vec<PropertyKey> = vec!["x".into(), "y".into(), "labelText".into()];
    assert_eq!(ctx.realm().own_keys(out), expected);
}

#[test]
fn test_union_precedence() {
    let ctx = create_context();
    let kind = |v: Value| {
        call_global(&ctx, "kind", &[v])
            .expect("kind")
            .as_str()
            .map(str::to_string)
            .expect("string result")
    };
    assert_eq!(kind(Value::string("7")), "str:7");
    assert_eq!(kind(Value::Int(7)), "int:7");
    assert_eq!(kind(Value::Number(7.0)), "int:7");
    assert_eq!(kind(Value::Number(7.5)), "str:7.5");
    assert_eq!(kind(Value::Bool(true)), "str:true");

    let base = construct(&ctx, "Child", &[Value::Int(1), Value::Int(1)]);
    let which = |v: Value| call_global(&ctx, "which", &[v]).expect("which");
    assert_eq!(which(Value::Object(base)).as_str(), Some("base"));
    let plain = ctx.new_object().expect("Failed to create object");
    ctx.define_field(plain, "x", Value::Int(0));
    ctx.define_field(plain, "y", Value::Int(0));
    assert_eq!(which(Value::Object(plain)).as_str(), Some("point"));

    let base = construct(&ctx, "Base", &[Value::Int(4)]);
    let label = |v: Value| call_global(&ctx, "label", &[v]).expect("label");
    assert_eq!(label(Value::Object(base)).as_str(), Some("base 4"));
    let empty = ctx.new_object().expect("Failed to create object");
    assert_eq!(label(Value::Object(empty)).as_str(), Some("[object Object]"));

    let err = call_global(&ctx, "kind", &[Value::Symbol(jsbind::Symbol::Iterator)])
        .expect_err("symbol accepted");
    assert!(thrown(&ctx, err).1.contains("no variant of StrOrInt"));
}

#[test]
fn test_typed_arrays() {
    let ctx = create_context();
    let typed = ctx
        .realm()
        .new_typed_array(jsbind::engine::TypedArrayKind::Uint8, vec![1, 2, 3])
        .expect("Failed to create typed array");
    assert_eq!(
        call_global(&ctx, "bytes", &[Value::Object(typed)]).expect("bytes"),
        Value::Int(3)
    );
    let array = ctx
        .realm()
        .new_array(vec![Value::Int(1), Value::Int(2)])
        .expect("Failed to create array");
    assert_eq!(
        call_global(&ctx, "bytes", &[Value::Object(array)]).expect("bytes"),
        Value::Int(2)
    );
}

#[test]
fn test_promises() {
    let ctx = create_context();
    let promise = call_global(&ctx, "defer", &[]).expect("defer");
    let promise = promise.as_object().expect("promise object");
    assert!(matches!(
        Promise(promise).state(&ctx),
        Some(PromiseState::Fulfilled(Value::Int(42)))
    ));
    assert_eq!(ctx.persistent_count(), 0);
}

#[test]
fn test_host_object() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let env = Env::builder().install(catalog(log)).build().expect("build");
    let mut ctx = env
        .create_context(ContextOptions::default())
        .expect("Failed to create context");
    assert_eq!(call_global(&ctx, "host", &[]).expect("host").as_str(), Some(""));
    ctx.set_host(String::from("page-1"));
    assert_eq!(call_global(&ctx, "host", &[]).expect("host").as_str(), Some("page-1"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_domain_errors() {
    let ctx = create_context();
    let child = construct(&ctx, "Child", &[Value::Int(3), Value::Int(0)]);

    let err = ctx
        .call_method(child, "fail", &[Value::string("Mapped")])
        .expect_err("no error");
    let NativeError::Exception(mapped) = err else {
        panic!("expected a script exception");
    };
    let mapped = mapped.as_object().expect("mapped object");
    assert_eq!(
        ctx.get(mapped, "mapped").expect("mapped").as_str(),
        Some("value is 3")
    );

    let err = ctx
        .call_method(child, "fail", &[Value::string("QuotaExceededError")])
        .expect_err("no error");
    let NativeError::Exception(value) = err else {
        panic!("expected a script exception");
    };
    let obj = value.as_object().expect("error object");
    assert_eq!(ctx.realm().error_kind(&value), Some(ErrorKind::Error));
    assert_eq!(
        ctx.get(obj, "name").expect("name").as_str(),
        Some("QuotaExceededError")
    );
}

#[test]
fn test_script_exceptions_pass_through() {
    let ctx = create_context();
    let thrower = ctx.eval("(x) => { throw x; }").expect("Failed to compile thrower");
    let err = call_global(&ctx, "invoke", &[thrower, Value::Int(99)])
        .expect_err("exception swallowed");
    assert!(matches!(err, NativeError::Exception(Value::Int(99))));
    assert_eq!(ctx.call_depth(), 0);
}

#[test]
fn test_termination() {
    let count = Rc::new(Cell::new(0));
    let seen = count.clone();
    let stop = move |ctx: &ExecutionContext| {
        seen.set(seen.get() + 1);
        ctx.terminate();
    };
    let mut module = Module::new();
    module.function("stop", stop);
    let env = Env::builder()
        .install(catalog(Rc::default()))
        .install(module)
        .build()
        .expect("Failed to build environment");
    let ctx = env
        .create_context(ContextOptions::default())
        .expect("Failed to create context");

    let sum = ctx.global_value("sum").expect("Failed to read global");
    let err = ctx
        .eval("invoke(stop, null); sum(1)")
        .expect_err("terminated script completed");
    assert!(err.is_termination());
    let err = ctx.call(&sum, Value::Undefined, &[]).expect_err("ran while terminating");
    assert!(err.is_termination());

    ctx.cancel_termination();
    assert_eq!(call_global(&ctx, "sum", &[Value::Int(1)]).expect("sum"), Value::Int(1));
    assert_eq!(count.get(), 1);
}

// ============================================================================
// Dispatch resources
// ============================================================================

#[test]
fn test_call_arena_resets_after_outermost_call() {
    let ctx = create_context();
    let resets = ctx.call_arena_resets();
    assert_eq!(call_global(&ctx, "scratch", &[Value::Int(4)]).expect("scratch"), Value::Int(6));
    assert_eq!(ctx.call_arena_resets(), resets + 1);

    let before = ctx.call_arena_resets();
    let out = ctx
        .eval("invoke(() => [depth(), scratch(3)], null)")
        .expect("Failed to run nested calls");
    let out = ctx.realm().array_elements(out.as_object().expect("array")).expect("elements");
    assert_eq!(out, vec![Value::Int(2), Value::Int(3)]);
    assert_eq!(ctx.call_arena_resets(), before + 1);
    assert_eq!(ctx.call_depth(), 0);
}

#[test]
fn test_call_arena_survives_reentrant_calls() {
    let ctx = create_context();
    let before = ctx.call_arena_resets();
    let out = ctx
        .eval("var inner = 0; [stash(4, () => { inner = scratch(1000); return inner; }), inner]")
        .expect("Failed to run reentrant call");
    let out = ctx.realm().array_elements(out.as_object().expect("array")).expect("elements");
    assert_eq!(out, vec![Value::Int(18), Value::Int(499500)]);
    assert_eq!(ctx.call_arena_resets(), before + 1);
    assert_eq!(ctx.call_depth(), 0);
}

#[test]
fn test_cached_getter_computes_once() {
    let ctx = create_context();
    let bag = construct(&ctx, "Bag", &[]);
    let first = ctx.get(bag, "snapshot").expect("snapshot");
    let second = ctx.get(bag, "snapshot").expect("snapshot");
    assert_eq!(first, second);
    assert_eq!(ctx.get(bag, "computed").expect("computed"), Value::Int(1));

    let other = construct(&ctx, "Bag", &[]);
    let _ = ctx.get(other, "snapshot").expect("snapshot");
    assert_eq!(ctx.get(other, "computed").expect("computed"), Value::Int(1));
}

#[test]
fn test_cached_getter_checks_receiver_class() {
    let ctx = create_context();
    let ledger = ctx
        .eval("new Ledger().snapshot")
        .expect("Failed to read ledger snapshot");
    assert_eq!(ledger, Value::Int(100));

    let err = ctx
        .eval(
            "const bag = new Bag(); bag.snapshot; \
             Object.getOwnPropertyDescriptor(Ledger.prototype, 'snapshot').get.call(bag)",
        )
        .expect_err("foreign receiver accepted");
    let (kind, message) = thrown(&ctx, err);
    assert_eq!(kind, Some(ErrorKind::TypeError));
    assert!(message.contains("Ledger"), "{message}");

    assert_eq!(ctx.eval("bag.snapshot").expect("Failed to read bag snapshot"), Value::Int(0));
}

#[test]
fn test_interceptors() {
    let ctx = create_context();
    let bag = construct(&ctx, "Bag", &[]);
    ctx.call_method(bag, "push", &[Value::Int(5)]).expect("push");

    assert_eq!(ctx.get(bag, 0u32).expect("index 0"), Value::Int(5));
    assert_eq!(ctx.get(bag, 1u32).expect("index 1"), Value::Undefined);
    ctx.set(bag, 0u32, Value::Int(6)).expect("set index 0");
    assert_eq!(ctx.get(bag, 0u32).expect("index 0"), Value::Int(6));
    ctx.set(bag, 3u32, Value::Int(9)).expect("set index 3");
    assert_eq!(ctx.get(bag, 3u32).expect("index 3"), Value::Int(9));

    ctx.set(bag, "item1", Value::Int(1)).expect("set item1");
    assert_eq!(ctx.get(bag, "item1").expect("item1"), Value::Int(1));
    assert!(ctx.realm().get_own_property(bag, &"item1".into()).is_none());
    ctx.set(bag, "other", Value::Int(2)).expect("set other");
    assert!(ctx.realm().get_own_property(bag, &"other".into()).is_some());

    assert!(ctx.delete(bag, "item1").expect("delete"));
    assert_eq!(ctx.get(bag, "item1").expect("item1"), Value::Undefined);

    let err = ctx.set(bag, "item2", Value::Null).expect_err("empty item accepted");
    let (_, message) = thrown(&ctx, err);
    assert_eq!(message, "items cannot be empty");

    let err = ctx.set(bag, 0u32, Value::string("x")).expect_err("string slot accepted");
    assert_eq!(thrown(&ctx, err).0, Some(ErrorKind::TypeError));
}

// ============================================================================
// Teardown and inspection
// ============================================================================

#[test]
fn test_finalizers_run_in_reverse_attach_order() {
    let (ctx, log) = create_context_with_log();
    for value in 1..=3 {
        construct(&ctx, "Base", &[Value::Int(value)]);
    }
    construct(&ctx, "Child", &[Value::Int(4), Value::Int(0)]);
    ctx.wrap(ctx.alloc(Base::new(5))).expect("wrap");
    let _ = ctx.alloc(Base::new(6));
    drop(ctx);
    assert_eq!(
        *log.borrow(),
        vec!["base 5", "base 4", "base 3", "base 2", "base 1"]
    );
}

#[test]
fn test_retained_functions_are_released() {
    let ctx = create_context();
    let f = ctx.eval("() => undefined").expect("Failed to compile function");
    let retained = Function::from_script(&f, &ctx)
        .expect("Failed to convert function")
        .retain(&ctx);
    assert!(retained.is_retained());
    assert_eq!(ctx.persistent_count(), 1);
    drop(ctx);
}

#[test]
fn test_inspect() {
    let ctx = create_context();
    let remote = ctx.inspect(&Value::Int(3));
    assert_eq!(remote.kind, "number");
    assert_eq!(remote.value, Some(serde_json::json!(3)));

    let bag = Value::Object(construct(&ctx, "Bag", &[]));
    let remote = ctx.inspect(&bag);
    assert_eq!(remote.subtype.as_deref(), Some("map"));
    assert_eq!(remote.class_name.as_deref(), Some("Bag"));

    let err = ctx.eval("new RangeError('bad')").expect("Failed to create error");
    let remote = ctx.inspect(&err);
    assert_eq!(remote.subtype.as_deref(), Some("error"));
    assert_eq!(remote.description.as_deref(), Some("RangeError: bad"));

    let json = ctx.inspect(&Value::Null).to_json();
    assert_eq!(json, r#"{"type":"object","subtype":"null","value":null}"#);
}

// ============================================================================
// Environment
// ============================================================================

#[test]
fn test_duplicate_class_rejected() {
    let mut extra = Module::new();
    extra.declare::<Unrelated>();
    let err = Env::builder()
        .install(catalog(Rc::default()))
        .install(extra)
        .build()
        .expect_err("duplicate accepted");
    assert!(matches!(err, jsbind::EnvError::DuplicateClass { name: "Unrelated" }));
}

#[test]
fn test_debug_dumps_config() {
    let env = Env::builder()
        .with_config(EnvConfig::default().with_debug_dumps(false))
        .install(catalog(Rc::default()))
        .build()
        .expect("build");
    assert!(!env.config().debug_dumps);
    let ctx = env
        .create_context(ContextOptions::default().with_call_arena_retain(256))
        .expect("Failed to create context");
    let err = call_global(&ctx, "byte", &[Value::Int(-1)]).expect_err("accepted");
    assert_eq!(thrown(&ctx, err).0, Some(ErrorKind::TypeError));
    assert_eq!(ctx.options().call_arena_retain, 256);
}
