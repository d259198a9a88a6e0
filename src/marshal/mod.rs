//! Value marshaling between native types and script values.
//!
//! [`ToScript`] converts return values, thrown values and attribute values;
//! [`FromScript`] converts arguments. Every `FromScript` type also
//! classifies values without converting them ([`FromScript::probe`]), which
//! is what union resolution runs on.
//!
//! # Probing
//!
//! ```text
//! Exact       the value already has the parameter's type
//! Compatible  same family, lossless (integral double for an integer)
//! Coercible   convertible with a lossy or generic coercion
//! Invalid     conversion would fail
//! ```
//!
//! A union picks the first exact variant, else the first compatible, else
//! the first coercible, in declaration order.

mod container;
mod primitive;

pub use container::{Function, IterResult, Promise, PromiseResolver, TypedArray, TypedElement};
pub use primitive::integer_to_value;

use jsbind_core::{ObjectRef, Value};

use crate::class::Enumeration;
use crate::context::ExecutionContext;
use crate::error::{ConversionError, NativeError};

/// Classification of a script value against a native parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Probe {
    Invalid,
    Coercible,
    Compatible,
    Exact,
}

impl Probe {
    pub fn is_valid(self) -> bool {
        self != Probe::Invalid
    }
}

/// Signature of [`FromScript::probe`], used by derived unions.
pub type ProbeFn = fn(&Value, &ExecutionContext) -> Probe;

/// Convert a native value into a script value.
pub trait ToScript {
    fn to_script(self, ctx: &ExecutionContext) -> Result<Value, NativeError>;

    /// Convert a sequence of `Self`. Byte sequences override this to map to
    /// strings.
    fn vec_to_script(items: Vec<Self>, ctx: &ExecutionContext) -> Result<Value, NativeError>
    where
        Self: Sized,
    {
        let values = items
            .into_iter()
            .map(|item| item.to_script(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Object(ctx.realm().new_array(values)?))
    }
}

/// Convert a script value into a native value.
pub trait FromScript: Sized {
    /// Whether an absent argument or missing field converts from `undefined`
    /// instead of failing.
    const OPTIONAL: bool = false;

    /// Short description for missing-argument errors.
    const EXPECTED: &'static str = "value";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError>;

    fn probe(value: &Value, ctx: &ExecutionContext) -> Probe;

    /// Convert the last parameter from every remaining argument. Only
    /// sequences use more than the first.
    fn from_rest(
        rest: &[Value],
        index: usize,
        ctx: &ExecutionContext,
    ) -> Result<Self, NativeError> {
        convert_argument(rest.first(), index, ctx)
    }

    /// Convert a script sequence into `Vec<Self>`.
    fn vec_from_script(value: &Value, ctx: &ExecutionContext) -> Result<Vec<Self>, NativeError> {
        let items = sequence_items(value, ctx)
            .ok_or_else(|| ConversionError::type_mismatch("array", ctx.describe(value)))?;
        items
            .iter()
            .map(|item| Self::from_script(item, ctx))
            .collect()
    }

    fn vec_probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        if sequence_items(value, ctx).is_some() {
            Probe::Compatible
        } else {
            Probe::Invalid
        }
    }
}

/// Convert one positional argument, honoring optionality.
pub(crate) fn convert_argument<T: FromScript>(
    value: Option<&Value>,
    index: usize,
    ctx: &ExecutionContext,
) -> Result<T, NativeError> {
    match value {
        Some(value) => T::from_script(value, ctx).map_err(|e| e.at_argument(index)),
        None if T::OPTIONAL => T::from_script(&Value::Undefined, ctx),
        None => Err(ConversionError::MissingArgument {
            index,
            expected: T::EXPECTED,
        }
        .into()),
    }
}

/// Elements of an array or typed array.
pub(crate) fn sequence_items(value: &Value, ctx: &ExecutionContext) -> Option<Vec<Value>> {
    let obj = value.as_object()?;
    let realm = ctx.realm();
    if let Some(items) = realm.array_elements(obj) {
        return Some(items);
    }
    let (kind, bytes) = realm.typed_array(obj)?;
    let len = bytes.len() / kind.element_size();
    (0..len).map(|i| kind.read(&bytes, i)).collect()
}

/// Whether a value is an array or typed array.
pub(crate) fn is_sequence(value: &Value, ctx: &ExecutionContext) -> bool {
    value.as_object().is_some_and(|obj| {
        let realm = ctx.realm();
        realm.is_array(value) || realm.typed_array(obj).is_some()
    })
}

/// Pick a union variant: first exact, else first compatible, else first
/// coercible.
pub fn select_variant(probes: &[ProbeFn], value: &Value, ctx: &ExecutionContext) -> Option<usize> {
    let mut compatible = None;
    let mut coercible = None;
    for (index, probe) in probes.iter().enumerate() {
        match probe(value, ctx) {
            Probe::Exact => return Some(index),
            Probe::Compatible => {
                compatible.get_or_insert(index);
            }
            Probe::Coercible => {
                coercible.get_or_insert(index);
            }
            Probe::Invalid => {}
        }
    }
    compatible.or(coercible)
}

/// Probe for a plain record: any non-callable object that is not a bound
/// class instance matches; class instances still coerce.
pub fn probe_record(value: &Value, ctx: &ExecutionContext) -> Probe {
    let Some(obj) = value.as_object() else {
        return Probe::Invalid;
    };
    let realm = ctx.realm();
    if realm.is_callable(value) {
        Probe::Invalid
    } else if realm.template_of(obj).is_some() {
        Probe::Coercible
    } else {
        Probe::Compatible
    }
}

pub fn enumeration_from_script<E: Enumeration>(value: &Value) -> Result<E, NativeError> {
    let Value::String(s) = value else {
        return Err(ConversionError::type_mismatch(E::NAME, value.type_name()).into());
    };
    E::from_str_value(s).ok_or_else(|| {
        ConversionError::InvalidEnumValue {
            enumeration: E::NAME,
            value: s.to_string(),
        }
        .into()
    })
}

pub fn probe_enumeration<E: Enumeration>(value: &Value) -> Probe {
    match value {
        Value::String(s) if E::VALUES.contains(&&**s) => Probe::Exact,
        _ => Probe::Invalid,
    }
}

/// Object argument accepted by record conversion.
pub(crate) fn record_object(
    value: &Value,
    record: &'static str,
    ctx: &ExecutionContext,
) -> Result<Option<ObjectRef>, NativeError> {
    match value {
        Value::Undefined | Value::Null => Ok(None),
        Value::Object(obj) if !ctx.realm().is_callable(value) => Ok(Some(*obj)),
        other => Err(ConversionError::type_mismatch(record, ctx.describe(other)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_ordering() {
        assert!(Probe::Exact > Probe::Compatible);
        assert!(Probe::Compatible > Probe::Coercible);
        assert!(Probe::Coercible > Probe::Invalid);
        assert!(!Probe::Invalid.is_valid());
    }
}
