//! Primitive conversions: booleans, integers, floats, strings.

use std::borrow::Cow;
use std::rc::Rc;

use jsbind_core::Value;

use super::{FromScript, Probe, ToScript};
use crate::context::ExecutionContext;
use crate::error::{ConversionError, NativeError};

// =============================================================================
// Integers
// =============================================================================

/// Map a native integer to a script value: engine integers where they fit,
/// numbers up to `u32::MAX`, big integers beyond.
pub fn integer_to_value(n: i128) -> Value {
    if let Ok(small) = i32::try_from(n) {
        Value::Int(small)
    } else if (0..=i128::from(u32::MAX)).contains(&n) {
        Value::Number(n as f64)
    } else {
        Value::BigInt(n)
    }
}

fn probe_integer(value: &Value, min: i128, max: i128) -> Probe {
    let in_range = |n: i128| n >= min && n <= max;
    match value {
        Value::Int(i) if in_range(i128::from(*i)) => Probe::Exact,
        Value::Number(f) if f.is_finite() && in_range(f.trunc() as i128) => {
            if f.fract() == 0.0 {
                Probe::Compatible
            } else {
                Probe::Coercible
            }
        }
        Value::BigInt(b) if in_range(*b) => Probe::Compatible,
        _ => Probe::Invalid,
    }
}

/// Range-checked integer extraction, uniform over every numeric
/// representation. Doubles truncate toward zero.
fn integer_from(
    value: &Value,
    min: i128,
    max: i128,
    target: &'static str,
    ctx: &ExecutionContext,
) -> Result<i128, ConversionError> {
    let out_of_range = |shown: String| ConversionError::OutOfRange {
        value: shown,
        target,
    };
    let n = match value {
        Value::Int(i) => i128::from(*i),
        Value::Number(f) if f.is_finite() => f.trunc() as i128,
        Value::Number(f) => return Err(out_of_range(jsbind_core::value::number_to_string(*f))),
        Value::BigInt(b) => *b,
        other => return Err(ConversionError::type_mismatch(target, ctx.describe(other))),
    };
    if n < min || n > max {
        let shown = match value {
            Value::Number(f) => jsbind_core::value::number_to_string(*f),
            _ => n.to_string(),
        };
        return Err(out_of_range(shown));
    }
    Ok(n)
}

macro_rules! impl_integer {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl ToScript for $ty {
                fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
                    Ok(integer_to_value(self as i128))
                }
            }

            impl FromScript for $ty {
                const EXPECTED: &'static str = $name;

                fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
                    let (min, max) = (<$ty>::MIN as i128, <$ty>::MAX as i128);
                    let n = integer_from(value, min, max, $name, ctx)?;
                    Ok(n as $ty)
                }

                fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
                    probe_integer(value, <$ty>::MIN as i128, <$ty>::MAX as i128)
                }
            }
        )*
    };
}

impl_integer! {
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    usize => "usize",
    isize => "isize",
    i128 => "i128",
}

// u8 is written out: byte sequences marshal as strings.

impl ToScript for u8 {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::Int(i32::from(self)))
    }

    fn vec_to_script(items: Vec<Self>, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::string(String::from_utf8_lossy(&items)))
    }
}

impl FromScript for u8 {
    const EXPECTED: &'static str = "u8";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        let n = integer_from(value, 0, 255, "u8", ctx)?;
        Ok(n as u8)
    }

    fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
        probe_integer(value, 0, 255)
    }

    fn vec_from_script(value: &Value, ctx: &ExecutionContext) -> Result<Vec<Self>, NativeError> {
        if let Value::String(s) = value {
            return Ok(s.as_bytes().to_vec());
        }
        let realm = ctx.realm();
        if let Some(obj) = value.as_object() {
            if let Some((jsbind_core::TypedArrayKind::Uint8, bytes)) = realm.typed_array(obj) {
                return Ok(bytes);
            }
            if let Some(bytes) = realm.array_buffer(obj) {
                return Ok(bytes);
            }
        }
        let items = super::sequence_items(value, ctx)
            .ok_or_else(|| ConversionError::type_mismatch("bytes", ctx.describe(value)))?;
        items.iter().map(|item| Self::from_script(item, ctx)).collect()
    }

    fn vec_probe(value: &Value, ctx: &ExecutionContext) -> Probe {
        match value {
            Value::String(_) => Probe::Exact,
            Value::Object(obj) => match ctx.realm().typed_array(*obj) {
                Some((jsbind_core::TypedArrayKind::Uint8, _)) => Probe::Exact,
                Some(_) => Probe::Compatible,
                None if ctx.realm().is_array(value) => Probe::Compatible,
                None if ctx.realm().array_buffer(*obj).is_some() => Probe::Compatible,
                None => Probe::Invalid,
            },
            _ => Probe::Invalid,
        }
    }
}

// =============================================================================
// Floats
// =============================================================================

fn probe_float(value: &Value) -> Probe {
    match value {
        Value::Number(_) => Probe::Exact,
        Value::Int(_) => Probe::Compatible,
        Value::BigInt(_) => Probe::Coercible,
        _ => Probe::Invalid,
    }
}

fn float_from(
    value: &Value,
    target: &'static str,
    ctx: &ExecutionContext,
) -> Result<f64, ConversionError> {
    match value {
        Value::Number(f) => Ok(*f),
        Value::Int(i) => Ok(f64::from(*i)),
        Value::BigInt(b) => Ok(*b as f64),
        other => Err(ConversionError::type_mismatch(target, ctx.describe(other))),
    }
}

impl ToScript for f64 {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::Number(self))
    }
}

impl FromScript for f64 {
    const EXPECTED: &'static str = "number";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        Ok(float_from(value, "number", ctx)?)
    }

    fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
        probe_float(value)
    }
}

impl ToScript for f32 {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::Number(f64::from(self)))
    }
}

impl FromScript for f32 {
    const EXPECTED: &'static str = "number";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        Ok(float_from(value, "f32", ctx)? as f32)
    }

    fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
        probe_float(value)
    }
}

// =============================================================================
// Booleans and unit
// =============================================================================

impl ToScript for bool {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::Bool(self))
    }
}

impl FromScript for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_script(value: &Value, _ctx: &ExecutionContext) -> Result<Self, NativeError> {
        Ok(value.truthy())
    }

    fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
        match value {
            Value::Bool(_) => Probe::Exact,
            _ => Probe::Coercible,
        }
    }
}

impl ToScript for () {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::Undefined)
    }
}

// =============================================================================
// Strings
// =============================================================================

fn probe_string(value: &Value) -> Probe {
    match value {
        Value::String(_) => Probe::Exact,
        Value::Symbol(_) => Probe::Invalid,
        _ => Probe::Coercible,
    }
}

fn string_from(value: &Value, ctx: &ExecutionContext) -> Result<Rc<str>, NativeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Symbol(_) => Err(ConversionError::Symbol { target: "string" }.into()),
        other => Ok(ctx.realm().to_string(other)?),
    }
}

impl ToScript for String {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::from(self))
    }
}

impl ToScript for &str {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::from(self))
    }
}

impl ToScript for Rc<str> {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::String(self))
    }
}

impl ToScript for Cow<'_, str> {
    fn to_script(self, _ctx: &ExecutionContext) -> Result<Value, NativeError> {
        Ok(Value::string(self))
    }
}

impl FromScript for String {
    const EXPECTED: &'static str = "string";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        Ok(string_from(value, ctx)?.to_string())
    }

    fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
        probe_string(value)
    }
}

impl FromScript for Rc<str> {
    const EXPECTED: &'static str = "string";

    fn from_script(value: &Value, ctx: &ExecutionContext) -> Result<Self, NativeError> {
        string_from(value, ctx)
    }

    fn probe(value: &Value, _ctx: &ExecutionContext) -> Probe {
        probe_string(value)
    }
}
