//! Native callback ABI.
//!
//! Every native entry point the engine can invoke is a flat `fn` pointer.
//! Callbacks are never stored directly in templates or function objects;
//! they are registered once in an [`ExternalReferences`] table and referred
//! to by position ([`CallbackRef`]). That table is what makes the template
//! graph serializable: a snapshot records positions, and the loading process
//! supplies the same table again.

use std::any::Any;

use crate::realm::Realm;
use crate::value::Value;

/// Position of a callback in the external reference table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackRef(pub u32);

/// Result of a property interceptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intercepted {
    /// The interceptor handled the access; the engine stops the lookup.
    Yes,
    /// The engine continues with the ordinary lookup.
    No,
}

/// Function and constructor callback.
pub type FunctionCallback = fn(&mut CallbackInfo<'_>);
/// `obj[index]` getter.
pub type IndexedGetter = fn(u32, &mut PropertyCallbackInfo<'_>) -> Intercepted;
/// `obj[index] = value` setter.
pub type IndexedSetter = fn(u32, Value, &mut PropertyCallbackInfo<'_>) -> Intercepted;
/// `obj.name` getter.
pub type NamedGetter = fn(&str, &mut PropertyCallbackInfo<'_>) -> Intercepted;
/// `obj.name = value` setter.
pub type NamedSetter = fn(&str, Value, &mut PropertyCallbackInfo<'_>) -> Intercepted;
/// `delete obj.name`; the return value slot receives the boolean result.
pub type NamedDeleter = fn(&str, &mut PropertyCallbackInfo<'_>) -> Intercepted;

/// Invocation info handed to a [`FunctionCallback`].
pub struct CallbackInfo<'a> {
    realm: &'a Realm,
    embedder: &'a dyn Any,
    this: Value,
    args: &'a [Value],
    new_target: Option<Value>,
    data: u32,
    return_value: Option<Value>,
}

impl<'a> CallbackInfo<'a> {
    pub(crate) fn new(
        realm: &'a Realm,
        embedder: &'a dyn Any,
        this: Value,
        args: &'a [Value],
        new_target: Option<Value>,
        data: u32,
    ) -> Self {
        Self {
            realm,
            embedder,
            this,
            args,
            new_target,
            data,
            return_value: None,
        }
    }

    pub fn realm(&self) -> &'a Realm {
        self.realm
    }

    /// The embedder handle the caller passed when entering the engine.
    pub fn embedder(&self) -> &'a dyn Any {
        self.embedder
    }

    /// Downcast the embedder handle.
    pub fn embedder_as<T: Any>(&self) -> Option<&'a T> {
        self.embedder.downcast_ref::<T>()
    }

    /// Number of positional arguments.
    pub fn length(&self) -> usize {
        self.args.len()
    }

    /// Positional argument, `undefined` when absent.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// The receiver. For construct calls this is the freshly allocated,
    /// not yet initialized instance.
    pub fn this(&self) -> &Value {
        &self.this
    }

    /// `new.target`; `None` for plain calls.
    pub fn new_target(&self) -> Option<&Value> {
        self.new_target.as_ref()
    }

    pub fn is_construct_call(&self) -> bool {
        self.new_target.is_some()
    }

    /// Data word attached to the function when it was created.
    pub fn data(&self) -> u32 {
        self.data
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = Some(value);
    }

    pub(crate) fn take_return_value(&mut self) -> Option<Value> {
        self.return_value.take()
    }
}

/// Invocation info handed to property interceptors.
pub struct PropertyCallbackInfo<'a> {
    realm: &'a Realm,
    embedder: &'a dyn Any,
    holder: Value,
    data: u32,
    return_value: Option<Value>,
}

impl<'a> PropertyCallbackInfo<'a> {
    pub(crate) fn new(realm: &'a Realm, embedder: &'a dyn Any, holder: Value, data: u32) -> Self {
        Self {
            realm,
            embedder,
            holder,
            data,
            return_value: None,
        }
    }

    pub fn realm(&self) -> &'a Realm {
        self.realm
    }

    pub fn embedder(&self) -> &'a dyn Any {
        self.embedder
    }

    pub fn embedder_as<T: Any>(&self) -> Option<&'a T> {
        self.embedder.downcast_ref::<T>()
    }

    /// The object carrying the interceptor.
    pub fn holder(&self) -> &Value {
        &self.holder
    }

    pub fn data(&self) -> u32 {
        self.data
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = Some(value);
    }

    pub(crate) fn take_return_value(&mut self) -> Option<Value> {
        self.return_value.take()
    }
}

/// A registered native entry point.
#[derive(Clone, Copy)]
pub enum ExternalCallback {
    Function(FunctionCallback),
    IndexedGetter(IndexedGetter),
    IndexedSetter(IndexedSetter),
    NamedGetter(NamedGetter),
    NamedSetter(NamedSetter),
    NamedDeleter(NamedDeleter),
}

impl ExternalCallback {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExternalCallback::Function(_) => "function",
            ExternalCallback::IndexedGetter(_) => "indexed-getter",
            ExternalCallback::IndexedSetter(_) => "indexed-setter",
            ExternalCallback::NamedGetter(_) => "named-getter",
            ExternalCallback::NamedSetter(_) => "named-setter",
            ExternalCallback::NamedDeleter(_) => "named-deleter",
        }
    }
}

/// Positionally stable table of every native callback.
///
/// Each entry carries a stable symbolic name. The names (and their order)
/// are fingerprinted into snapshots, so a blob produced by one process can
/// only be loaded by a process registering the same table.
#[derive(Clone, Default)]
pub struct ExternalReferences {
    entries: Vec<(&'static str, ExternalCallback)>,
}

impl ExternalReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback, returning its position.
    pub fn register(&mut self, name: &'static str, callback: ExternalCallback) -> CallbackRef {
        self.entries.push((name, callback));
        CallbackRef(self.entries.len() as u32 - 1)
    }

    /// Builder-style registration.
    pub fn with(mut self, name: &'static str, callback: ExternalCallback) -> Self {
        self.register(name, callback);
        self
    }

    pub fn get(&self, r: CallbackRef) -> Option<ExternalCallback> {
        self.entries.get(r.0 as usize).map(|(_, cb)| *cb)
    }

    pub fn find(&self, name: &str) -> Option<CallbackRef> {
        self.entries
            .iter()
            .position(|(n, _)| *n == name)
            .map(|pos| CallbackRef(pos as u32))
    }

    pub fn name(&self, r: CallbackRef) -> Option<&'static str> {
        self.entries.get(r.0 as usize).map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// xxh64 over the ordered `name:kind` list.
    pub fn fingerprint(&self) -> u64 {
        let mut text = String::new();
        for (name, cb) in &self.entries {
            text.push_str(name);
            text.push(':');
            text.push_str(cb.kind_name());
            text.push('\n');
        }
        xxhash_rust::xxh64::xxh64(text.as_bytes(), 0)
    }
}

impl std::fmt::Debug for ExternalReferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(n, cb)| (n, cb.kind_name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut CallbackInfo<'_>) {}
    fn no_index(_: u32, _: &mut PropertyCallbackInfo<'_>) -> Intercepted {
        Intercepted::No
    }

    #[test]
    fn positions_are_stable() {
        let refs = ExternalReferences::new()
            .with("a", ExternalCallback::Function(noop))
            .with("b", ExternalCallback::IndexedGetter(no_index));
        assert_eq!(refs.find("b"), Some(CallbackRef(1)));
        assert_eq!(refs.name(CallbackRef(0)), Some("a"));
        assert!(refs.get(CallbackRef(2)).is_none());
    }

    #[test]
    fn fingerprint_depends_on_order_and_kind() {
        let ab = ExternalReferences::new()
            .with("a", ExternalCallback::Function(noop))
            .with("b", ExternalCallback::Function(noop));
        let ba = ExternalReferences::new()
            .with("b", ExternalCallback::Function(noop))
            .with("a", ExternalCallback::Function(noop));
        let kinds = ExternalReferences::new()
            .with("a", ExternalCallback::Function(noop))
            .with("b", ExternalCallback::IndexedGetter(no_index));
        assert_ne!(ab.fingerprint(), ba.fingerprint());
        assert_ne!(ab.fingerprint(), kinds.fingerprint());
        assert_eq!(ab.fingerprint(), ab.clone().fingerprint());
    }
}
