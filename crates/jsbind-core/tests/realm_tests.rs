//! Realm behavior tests.
//!
//! These run real script against the engine boundary the binding layer is
//! built on: template instantiation, subclassing, interceptors, accessors,
//! exceptions, termination, promises and handle lifetimes.

use std::cell::Cell;
use std::rc::Rc;

use jsbind_core::{
    BoundCallback, CallbackInfo, CallbackRef, ErrorKind, Exception, ExternalCallback,
    ExternalReferences, FunctionTemplate, IndexedHandlers, Intercepted, InternalField, Isolate,
    NamedHandlers, PromiseState, PropertyAttributes, PropertyCallbackInfo, Realm, Symbol,
    TemplateFlags, TemplateId, TypedArrayKind, Value,
};

// ============================================================================
// Callbacks
// ============================================================================

fn construct(info: &mut CallbackInfo<'_>) {
    if !info.is_construct_call() {
        info.realm().throw_error(ErrorKind::TypeError, "needs new");
        return;
    }
    if let Some(obj) = info.this().as_object() {
        info.realm()
            .set_internal_field(obj, 0, InternalField::Value(info.arg(0)));
    }
}

fn field(info: &mut CallbackInfo<'_>) {
    let value = info
        .this()
        .as_object()
        .and_then(|o| info.realm().internal_field(o, 0));
    if let Some(InternalField::Value(v)) = value {
        info.set_return_value(v);
    }
}

fn data_word(info: &mut CallbackInfo<'_>) {
    info.set_return_value(Value::Int(info.data() as i32));
}

fn fail(info: &mut CallbackInfo<'_>) {
    info.realm().throw_error(ErrorKind::RangeError, "boom");
}

fn double_index(index: u32, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    match index {
        0..3 => info.set_return_value(Value::Int(index as i32 * 2)),
        9 => info.set_return_value(info.holder().clone()),
        _ => return Intercepted::No,
    }
    Intercepted::Yes
}

fn echo_name(name: &str, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    if name.starts_with("item") {
        info.set_return_value(Value::string(name));
        Intercepted::Yes
    } else {
        Intercepted::No
    }
}

fn counter(info: &mut CallbackInfo<'_>) {
    if let Some(cell) = info.embedder_as::<Cell<u32>>() {
        cell.set(cell.get() + 1);
        info.set_return_value(Value::Int(cell.get() as i32));
    }
}

fn forget(name: &str, info: &mut PropertyCallbackInfo<'_>) -> Intercepted {
    if name == "locked" {
        info.set_return_value(Value::Bool(false));
        Intercepted::Yes
    } else {
        Intercepted::No
    }
}

fn stop(info: &mut CallbackInfo<'_>) {
    info.realm().terminate_execution();
}

fn references() -> ExternalReferences {
    ExternalReferences::new()
        .with("construct", ExternalCallback::Function(construct))
        .with("field", ExternalCallback::Function(field))
        .with("data_word", ExternalCallback::Function(data_word))
        .with("fail", ExternalCallback::Function(fail))
        .with("double_index", ExternalCallback::IndexedGetter(double_index))
        .with("echo_name", ExternalCallback::NamedGetter(echo_name))
        .with("counter", ExternalCallback::Function(counter))
        .with("forget", ExternalCallback::NamedDeleter(forget))
        .with("stop", ExternalCallback::Function(stop))
}

fn bound(callback: u32, data: u32) -> BoundCallback {
    BoundCallback {
        callback: CallbackRef(callback),
        data,
    }
}

/// `Base` (0) and `Derived` (1, child of Base).
fn isolate() -> Rc<Isolate> {
    let mut base = FunctionTemplate::new("Base").constructor(CallbackRef(0), 0);
    base.prototype_method("field", bound(1, 0), 0);
    base.prototype_accessor("tag", Some(bound(2, 42)), None);
    base.prototype_method("fail", bound(3, 0), 0);
    base.static_method("count", bound(6, 0), 0);
    base.instance.internal_field_count = 1;
    base.flags = TemplateFlags::DEFAULT_TO_STRING_TAG;

    let mut derived = FunctionTemplate::new("Derived").constructor(CallbackRef(0), 0);
    derived.inherit(TemplateId(0));
    derived.instance.internal_field_count = 1;
    derived.instance.indexed = Some(IndexedHandlers {
        getter: Some(CallbackRef(4)),
        setter: None,
        data: 0,
    });
    derived.instance.named = Some(NamedHandlers {
        getter: Some(CallbackRef(5)),
        deleter: Some(CallbackRef(7)),
        ..NamedHandlers::default()
    });

    Isolate::new(references(), vec![base, derived]).expect("Failed to build isolate")
}

fn realm() -> Rc<Realm> {
    Realm::new(isolate()).expect("Failed to start realm")
}

/// Expose both template constructors to script.
fn install_classes(realm: &Realm) {
    for (name, id) in [("Base", 0), ("Derived", 1)] {
        let ctor = realm
            .constructor_for(TemplateId(id))
            .expect("Failed to instantiate template");
        realm.define(realm.global(), name, Value::Object(ctor), PropertyAttributes::DONT_ENUM);
    }
}

fn install_function(realm: &Realm, name: &str, callback: u32) {
    let f = realm
        .new_function(name, CallbackRef(callback), 0, 0)
        .expect("Failed to create function");
    realm.define(realm.global(), name, Value::Object(f), PropertyAttributes::DONT_ENUM);
}

fn eval(realm: &Realm, source: &str) -> Value {
    realm.eval(NONE, source).expect("Failed to evaluate script")
}

fn elements(realm: &Realm, value: Value) -> Vec<Value> {
    let array = value.as_object().expect("Expected an array");
    realm.array_elements(array).expect("Expected an array")
}

const NONE: &() = &();

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_construct_and_call_method_from_script() {
    let realm = realm();
    install_classes(&realm);
    let result = eval(
        &realm,
        "const b = new Base(7); \
         [b.field(), b.tag, String(b), b instanceof Base, Base.name, \
          Base.prototype.constructor === Base]",
    );
    assert_eq!(
        elements(&realm, result),
        vec![
            Value::Int(7),
            Value::Int(42),
            Value::string("[object Base]"),
            Value::Bool(true),
            Value::string("Base"),
            Value::Bool(true),
        ]
    );

    let obj = eval(&realm, "b").as_object().expect("Expected an object");
    assert_eq!(realm.template_of(obj), Some(TemplateId(0)));
    assert_eq!(realm.call_method(NONE, obj, "field", &[]), Ok(Value::Int(7)));
}

#[test]
fn test_call_without_new_reaches_callback() {
    let realm = realm();
    install_classes(&realm);
    let result = eval(
        &realm,
        "try { Base(); 'no error' } catch (e) { e instanceof TypeError && e.message }",
    );
    assert_eq!(result, Value::string("needs new"));
}

#[test]
fn test_template_without_constructor_is_illegal() {
    let t = FunctionTemplate::new("Abstract");
    let isolate = Isolate::new(references(), vec![t]).expect("Failed to build isolate");
    let realm = Realm::new(isolate).expect("Failed to start realm");
    let ctor = Value::Object(realm.constructor_for(TemplateId(0)).expect("Failed to instantiate"));
    let Err(Exception::Thrown(err)) = realm.construct(NONE, &ctor, &[]) else {
        panic!("construction should fail");
    };
    let message = realm.get_data(err.as_object().expect("Expected an error object"), "message");
    assert_eq!(message, Some(Value::string("Illegal constructor")));
}

#[test]
fn test_parent_link_independent_of_instantiation_order() {
    let realm = realm();
    let derived_proto = realm.prototype_for(TemplateId(1)).expect("Failed to instantiate");
    let base_proto = realm.prototype_for(TemplateId(0)).expect("Failed to instantiate");
    assert_eq!(realm.get_prototype(derived_proto), Some(base_proto));

    install_classes(&realm);
    let result = eval(
        &realm,
        "const d = new Derived(3); \
         [Object.getPrototypeOf(Derived) === Base, d instanceof Base, d.field()]",
    );
    assert_eq!(
        elements(&realm, result),
        vec![Value::Bool(true), Value::Bool(true), Value::Int(3)]
    );
}

#[test]
fn test_script_subclass_constructs_native_instance() {
    let realm = realm();
    install_classes(&realm);
    let value = eval(
        &realm,
        "class Sub extends Base { \
           constructor() { super(5); } \
           extra() { return this.field() + 1; } \
         } \
         globalThis.sub = new Sub(); sub.extra()",
    );
    assert_eq!(value, Value::Int(6));

    let sub = eval(&realm, "sub").as_object().expect("Expected an object");
    assert_eq!(realm.template_of(sub), Some(TemplateId(0)));
    assert_eq!(&*realm.class_name(sub), "Base");
}

#[test]
fn test_prototype_cycles_are_refused() {
    let realm = realm();
    let a = realm.new_object().expect("Failed to create object");
    let b = realm
        .new_object_with_prototype(Some(a))
        .expect("Failed to create object");
    assert!(!realm.set_prototype(a, Some(b)));
    assert!(!realm.set_prototype(a, Some(a)));
}

#[test]
fn test_interceptors_from_script() {
    let realm = realm();
    install_classes(&realm);
    let result = eval(
        &realm,
        "const d = new Derived(0); d.item1 = true; \
         [d[2], d[5], d.item7, d.other, d.item1, d[9] === d, delete d.locked, delete d.other]",
    );
    assert_eq!(
        elements(&realm, result),
        vec![
            Value::Int(4),
            Value::Undefined,
            Value::string("item7"),
            Value::Undefined,
            Value::Bool(true),
            Value::Bool(true),
            Value::Bool(false),
            Value::Bool(true),
        ]
    );
}

#[test]
fn test_exception_from_callback_surfaces() {
    let realm = realm();
    install_classes(&realm);
    let caught = eval(
        &realm,
        "try { new Base(0).fail(); 'no error' } catch (e) { e instanceof RangeError && e.message }",
    );
    assert_eq!(caught, Value::string("boom"));

    let obj = realm.new_instance(TemplateId(0)).expect("Failed to create instance");
    let err = realm
        .call_method(NONE, obj, "fail", &[])
        .expect_err("Expected the callback to throw");
    assert_eq!(
        realm.error_kind(err.value().expect("Expected a thrown value")),
        Some(ErrorKind::RangeError)
    );
    assert!(!realm.has_pending_exception());
}

#[test]
fn test_script_errors_become_exceptions() {
    let realm = realm();
    let Err(Exception::Thrown(err)) = realm.eval(NONE, "null.x") else {
        panic!("expected a thrown value");
    };
    assert_eq!(realm.error_kind(&err), Some(ErrorKind::TypeError));

    let Err(Exception::Thrown(err)) = realm.eval(NONE, "let let = 1") else {
        panic!("expected a thrown value");
    };
    assert_eq!(realm.error_kind(&err), Some(ErrorKind::SyntaxError));
}

#[test]
fn test_embedder_reaches_callbacks() {
    let realm = realm();
    install_classes(&realm);
    let hits = Cell::new(0u32);
    realm
        .eval(&hits, "Base.count()")
        .expect("Failed to evaluate script");
    let second = realm
        .eval(&hits, "Base.count()")
        .expect("Failed to evaluate script");
    assert_eq!(second, Value::Int(2));
    assert_eq!(hits.get(), 2);
}

#[test]
fn test_script_callbacks_reenter_native_code() {
    let realm = realm();
    let obj = realm.new_instance(TemplateId(0)).expect("Failed to create instance");
    realm.set_internal_field(obj, 0, InternalField::Value(Value::string("inner")));
    let outer = eval(&realm, "(function outer(o) { return o.field(); })");
    let result = realm
        .call(NONE, &outer, Value::Undefined, &[Value::Object(obj)])
        .expect("Failed to call script function");
    assert_eq!(result, Value::string("inner"));
}

#[test]
fn test_termination_blocks_entry_until_cancelled() {
    let realm = realm();
    let obj = realm.new_instance(TemplateId(0)).expect("Failed to create instance");
    realm.terminate_execution();
    assert_eq!(
        realm.call_method(NONE, obj, "field", &[]),
        Err(Exception::Terminated)
    );
    realm.cancel_termination();
    assert!(realm.call_method(NONE, obj, "field", &[]).is_ok());
}

#[test]
fn test_termination_interrupts_running_script() {
    let realm = realm();
    install_function(&realm, "stop", 8);
    let result = realm.eval(NONE, "try { stop(); } catch (e) {} while (true) {}");
    assert_eq!(result, Err(Exception::Terminated));
    assert!(realm.is_terminating());

    realm.cancel_termination();
    assert_eq!(realm.eval(NONE, "1 + 1"), Ok(Value::Int(2)));
}

#[test]
fn test_accessor_and_readonly_properties() {
    let realm = realm();
    let pair = eval(
        &realm,
        "const store = {}; [store, function (v) { store.seen = v; }]",
    );
    let [store, setter] = <[Value; 2]>::try_from(elements(&realm, pair))
        .expect("Expected two elements");
    let store = store.as_object().expect("Expected an object");

    let obj = realm.new_object().expect("Failed to create object");
    realm.define_accessor(obj, "x", None, Some(setter), PropertyAttributes::empty());
    realm.set(NONE, obj, "x", Value::Int(3)).expect("Failed to set");
    assert_eq!(realm.get(NONE, store, "seen"), Ok(Value::Int(3)));
    assert_eq!(realm.get(NONE, obj, "x"), Ok(Value::Undefined));

    realm.define(obj, "fixed", Value::Int(1), PropertyAttributes::READ_ONLY);
    realm.set(NONE, obj, "fixed", Value::Int(2)).expect("Failed to set");
    assert_eq!(realm.get(NONE, obj, "fixed"), Ok(Value::Int(1)));
}

#[test]
fn test_arrays_and_typed_arrays() {
    let realm = realm();
    let arr = realm
        .new_array(vec![Value::Int(1)])
        .expect("Failed to create array");
    realm.set(NONE, arr, 2u32, Value::Int(3)).expect("Failed to set");
    assert_eq!(realm.get(NONE, arr, "length"), Ok(Value::Int(3)));
    assert_eq!(&*realm.to_string(&Value::Object(arr)).expect("Failed to convert"), "1,,3");

    let bytes = realm
        .new_typed_array(TypedArrayKind::Uint16, vec![0; 4])
        .expect("Failed to create typed array");
    realm.set(NONE, bytes, 1u32, Value::Int(513)).expect("Failed to set");
    assert_eq!(realm.get(NONE, bytes, 1u32), Ok(Value::Int(513)));
    assert_eq!(realm.get(NONE, bytes, "length"), Ok(Value::Int(2)));
    assert_eq!(
        realm.typed_array(bytes),
        Some((TypedArrayKind::Uint16, vec![0, 0, 1, 2]))
    );
}

#[test]
fn test_objects_keep_identity_across_lookups() {
    let realm = realm();
    eval(&realm, "globalThis.o = {}");
    let first = realm.get(NONE, realm.global(), "o").expect("Failed to get");
    let second = eval(&realm, "o");
    assert_eq!(first, second);
}

#[test]
fn test_scopes_and_persistent_handles() {
    let realm = realm();
    let mark = realm.open_scope();
    let kept = realm.new_object().expect("Failed to create object");
    let dropped = realm.new_object().expect("Failed to create object");
    let handle = realm.persist(Value::Object(kept));
    realm.close_scope(mark);

    assert!(realm.is_live(kept));
    assert!(!realm.is_live(dropped));
    let stale = realm
        .get(NONE, dropped, "x")
        .expect_err("Expected a released object to throw");
    let stale = stale.value().expect("Expected a value");
    assert_eq!(realm.error_kind(stale), Some(ErrorKind::TypeError));

    realm.release(handle);
    assert_eq!(realm.persistent_count(), 0);
    assert!(!realm.is_live(kept));
    realm.run_gc();
}

#[test]
fn test_promises_settle_and_run_reactions() {
    let realm = realm();
    let promise = realm.new_promise().expect("Failed to create promise");
    realm.define(realm.global(), "p", Value::Object(promise), PropertyAttributes::empty());
    eval(&realm, "globalThis.seen = 0; p.then(v => { seen = v; })");

    assert_eq!(realm.promise_state(promise), Some(PromiseState::Pending));
    assert!(realm.settle_promise(promise, PromiseState::Fulfilled(Value::Int(5))));
    assert!(!realm.settle_promise(promise, PromiseState::Rejected(Value::Null)));
    assert_eq!(
        realm.promise_state(promise),
        Some(PromiseState::Fulfilled(Value::Int(5)))
    );

    realm.perform_microtask_checkpoint(NONE);
    assert_eq!(eval(&realm, "seen"), Value::Int(5));
}

#[test]
fn test_symbol_keys_and_to_string_tag() {
    let realm = realm();
    let proto = realm.prototype_for(TemplateId(0)).expect("Failed to instantiate");
    assert_eq!(
        realm.get(NONE, proto, Symbol::ToStringTag),
        Ok(Value::string("Base"))
    );
    assert!(realm.to_string(&Value::Symbol(Symbol::Iterator)).is_err());

    let Value::Symbol(symbol @ Symbol::Script(_)) = eval(&realm, "globalThis.k = Symbol('k')")
    else {
        panic!("expected a script symbol");
    };
    let obj = realm.new_object().expect("Failed to create object");
    realm.define(obj, symbol, Value::Int(1), PropertyAttributes::empty());
    let read = eval(&realm, "(o) => o[k]");
    assert_eq!(
        realm.call(NONE, &read, Value::Undefined, &[Value::Object(obj)]),
        Ok(Value::Int(1))
    );
}
