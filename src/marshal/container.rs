//! Conversions for wrappers and compound values: optionals, sequences,
//! typed arrays, class references, callables, promises, iterator results.

use jsbind_core::{Global, ObjectRef, PromiseState, TypedArrayKind, Value};

use super::{FromScript, Probe, ToScript, convert_argument, is_sequence};
use crate::class::{Class, Ref};
use crate::context::ExecutionContext;
use crate::error::{ConversionError, NativeError};

// =============================================================================
// Passthrough
// =============================================================================

impl ToScript for Value {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(self)
    }
}

impl FromScript for Value {
    const OPTIONAL: bool = true;

    fn from_script(value: &Value, _ctx: &ExecutionContext) -> Result<Self, NativeError> {
        Ok(value.clone())
    }

    fn probe(_value: &Value, _ctx: &ExecutionContext) -> Probe {
        Probe::Exact
    }
}

impl ToScript for ObjectRef {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::Object(self))
    }
}

impl FromScript for ObjectRef {
    const EXPECTED: &'static str = "object";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        value
            .as_object()
            .ok_or_else(|| ConversionError::type_mismatch("object", ctx.describe(value)).into())
    }

    fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
        if value.as_object().is_some() {
            Probe::Exact
        } else {
            Probe::Invalid
        }
    }
}

// =============================================================================
// Optional, fallible
// =============================================================================

impl<T: ToScript> ToScript for Option<T> {
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError> {
        match self {
            Some(inner) => inner.to_script(ctx),
            None => Ok(Value::Null),
        }
    }
}

impl<T: FromScript> FromScript for Option<T> {
    const OPTIONAL: bool = true;
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_script(value, ctx).map(Some)
        }
    }

    fn probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        if value.is_nullish() {
            Probe::Exact
        } else {
            T::probe(value, ctx)
        }
    }
}

impl<T, E> ToScript for Result<T, E>
where
    T: ToScript,
    E: Into<NativeError>,
{
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError> {
        self.map_err(Into::into)?.to_script(ctx)
    }
}

// =============================================================================
// Sequences
// =============================================================================

impl<T: ToScript> ToScript for Vec<T> {
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError> {
        T::vec_to_script(self, ctx)
    }
}

impl<T: ToScript + Clone> ToScript for &[T] {
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError> {
        T::vec_to_script(self.to_vec(), ctx)
    }
}

impl<T: FromScript> FromScript for Vec<T> {
    const EXPECTED: &'static str = "sequence";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        T::vec_from_script(value, ctx)
    }

    fn probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        T::vec_probe(value, ctx)
    }

    /// Trailing sequences collect the surplus arguments, unless the first
    /// remaining argument is itself an array or typed array.
    fn from_rest(
        rest: &[Value],
        index: usize,
        ctx: &ExecutionContext,
    ) -> Result<Self, NativeError> {
        match rest.first() {
            None => Ok(Vec::new()),
            Some(first) if is_sequence(first, ctx) => {
                T::vec_from_script(first, ctx).map_err(|e| e.at_argument(index))
            }
            Some(_) => rest
                .iter()
                .enumerate()
                .map(|(offset, item)| convert_argument(Some(item), index + offset, ctx))
                .collect(),
        }
    }
}

/// Element of a typed array.
pub trait TypedElement: Copy + 'static {
    const KIND: TypedArrayKind;

    fn write_le(self, out: &mut Vec<u8>);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_typed_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl TypedElement for $ty {
                const KIND: TypedArrayKind = TypedArrayKind::$kind;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_typed_element! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    f32 => Float32,
    f64 => Float64,
    i64 => BigInt64,
    u64 => BigUint64,
}

/// A numeric sequence marshaled as a typed array instead of an array.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedArray<T>(pub Vec<T>);

impl<T: TypedElement> ToScript for TypedArray<T> {
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError> {
        let mut bytes = Vec::with_capacity(self.0.len() * T::KIND.element_size());
        for item in self.0 {
            item.write_le(&mut bytes);
        }
        Ok(Value::Object(ctx.realm().new_typed_array(T::KIND, bytes)?))
    }
}

impl<T: TypedElement + FromScript> FromScript for TypedArray<T> {
    const EXPECTED: &'static str = "typed array";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        if let Some(obj) = value.as_object() {
            if let Some((kind, bytes)) = ctx.realm().typed_array(obj) {
                if kind == T::KIND {
                    let items = bytes
                        .chunks_exact(kind.element_size())
                        .map(T::read_le)
                        .collect();
                    return Ok(TypedArray(items));
                }
            }
        }
        let items = super::sequence_items(value, ctx)
            .ok_or_else(|| ConversionError::type_mismatch(T::KIND.name(), ctx.describe(value)))?;
        items
            .iter()
            .map(|item| T::from_script(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(TypedArray)
    }

    fn probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        match value.as_object().and_then(|obj| ctx.realm().typed_array(obj)) {
            Some((kind, _)) if kind == T::KIND => Probe::Exact,
            Some(_) => Probe::Compatible,
            None if ctx.realm().is_array(value) => Probe::Coercible,
            None => Probe::Invalid,
        }
    }
}

// =============================================================================
// Class references
// =============================================================================

impl<T: Class> ToScript for Ref<T> {
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError> {
        ctx.wrap(self)
    }
}

impl<T: Class> FromScript for Ref<T> {
    const EXPECTED: &'static str = T::NAME;

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        ctx.resolve::<T>(value)
    }

    fn probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        if ctx.resolve::<T>(value).is_ok() {
            Probe::Exact
        } else {
            Probe::Invalid
        }
    }
}

// =============================================================================
// Callables
// =============================================================================

/// A script function received as an argument.
///
/// Valid for the duration of the call that received it. Use
/// [`Function::retain`] to keep it across calls; retained functions are
/// released when the execution context ends.
#[derive(Debug, Clone)]
pub struct Function {
    value: Value,
    handle: Option<Global>,
}

impl Function {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_retained(&self) -> bool {
        self.handle.is_some()
    }

    /// Call with `undefined` as receiver.
    pub fn call(&self, ctx: &ExecutionContext, args: &[Value]) -> Result<Value, NativeError> {
        ctx.call(&self.value, Value::Undefined, args)
    }

    pub fn call_with_this(
        &self,
        ctx: &ExecutionContext,
        this: Value,
        args: &[Value],
    ) -> Result<Value, NativeError> {
        ctx.call(&self.value, this, args)
    }

    /// Keep the function alive until the execution context ends.
    pub fn retain(mut self, ctx: &ExecutionContext) -> Self {
        if self.handle.is_none() {
            self.handle = Some(ctx.persist(self.value.clone()));
        }
        self
    }
}

impl ToScript for Function {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(self.value)
    }
}

impl FromScript for Function {
    const EXPECTED: &'static str = "function";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        if ctx.realm().is_callable(value) {
            Ok(Function {
                value: value.clone(),
                handle: None,
            })
        } else {
            Err(ConversionError::type_mismatch("function", ctx.describe(value)).into())
        }
    }

    fn probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        if ctx.realm().is_callable(value) {
            Probe::Exact
        } else {
            Probe::Invalid
        }
    }
}

// =============================================================================
// Promises
// =============================================================================

/// A script promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promise(pub ObjectRef);

impl Promise {
    pub fn state(&self, ctx: &ExecutionContext) -> Option<PromiseState> {
        ctx.realm().promise_state(self.0)
    }
}

impl ToScript for Promise {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::Object(self.0))
    }
}

impl FromScript for Promise {
    const EXPECTED: &'static str = "Promise";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        match value.as_object() {
            Some(obj) if ctx.realm().promise_state(obj).is_some() => Ok(Promise(obj)),
            _ => Err(ConversionError::type_mismatch("Promise", ctx.describe(value)).into()),
        }
    }

    fn probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        match value.as_object() {
            Some(obj) if ctx.realm().promise_state(obj).is_some() => Probe::Exact,
            _ => Probe::Invalid,
        }
    }
}

/// Settles a promise later. Created by
/// [`ExecutionContext::promise_resolver`]; the promise stays alive until
/// it is settled or the context ends.
#[derive(Debug)]
pub struct PromiseResolver {
    promise: ObjectRef,
    handle: Global,
}

impl PromiseResolver {
    pub(crate) fn new(promise: ObjectRef, handle: Global) -> Self {
        Self { promise, handle }
    }

    pub fn promise(&self) -> Promise {
        Promise(self.promise)
    }

    pub fn resolve<T: ToScript>(self, ctx: &ExecutionContext, value: T) -> Result<(), NativeError> {
        let value = value.to_script(ctx)?;
        self.settle(ctx, PromiseState::Fulfilled(value));
        Ok(())
    }

    pub fn reject<T: ToScript>(self, ctx: &ExecutionContext, reason: T) -> Result<(), NativeError> {
        let reason = reason.to_script(ctx)?;
        self.settle(ctx, PromiseState::Rejected(reason));
        Ok(())
    }

    /// Reactions run right away when no script is on the stack, otherwise
    /// when the running engine entry returns.
    fn settle(self, ctx: &ExecutionContext, state: PromiseState) {
        ctx.realm().settle_promise(self.promise, state);
        ctx.release(self.handle);
        ctx.run_microtasks();
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// One step of the iterator protocol, marshaled as `{ value, done }`.
#[derive(Debug, Clone, PartialEq)]
pub struct IterResult<T> {
    pub value: Option<T>,
    pub done: bool,
}

impl<T> IterResult<T> {
    pub fn next(value: T) -> Self {
        Self {
            value: Some(value),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            value: None,
            done: true,
        }
    }
}

impl<T> From<Option<T>> for IterResult<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::done, Self::next)
    }
}

impl<T: ToScript> ToScript for IterResult<T> {
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError> {
        let obj = ctx.new_object()?;
        let value = match self.value {
            Some(value) => value.to_script(ctx)?,
            None => Value::Undefined,
        };
        ctx.define_field(obj, "value", value);
        ctx.define_field(obj, "done", Value::Bool(self.done));
        Ok(Value::Object(obj))
    }
}
