//! Object-side types shared by the realm and its embedders.
//!
//! Objects live in the engine; the native side addresses them through an
//! [`ObjectRef`] into the realm's handle table. This module also carries the
//! small descriptive types the realm reports about objects (property
//! descriptors, error and typed array kinds, promise states) and the
//! internal fields embedders use to attach native state.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::value::Value;

/// Generational reference to an engine object.
///
/// A reference whose slot has been released and reused no longer resolves,
/// because the generation stored in the reference is stale.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjectRef {
    /// Slot index, stable for the lifetime of the object.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Key under which the engine side remembers this handle.
    pub(crate) fn key(self) -> f64 {
        f64::from(self.generation) * 4_294_967_296.0 + f64::from(self.index)
    }

    pub(crate) fn from_key(key: f64) -> Option<Self> {
        if !(0.0..9_007_199_254_740_992.0).contains(&key) || key.fract() != 0.0 {
            return None;
        }
        let key = key as u64;
        Some(Self {
            index: (key & 0xFFFF_FFFF) as u32,
            generation: (key >> 32) as u32,
        })
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}@{})", self.index, self.generation)
    }
}

bitflags! {
    /// Property attributes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PropertyAttributes: u8 {
        const READ_ONLY = 1 << 0;
        const DONT_ENUM = 1 << 1;
        const DONT_DELETE = 1 << 2;
    }
}

/// An own property.
#[derive(Clone, Debug)]
pub enum Property {
    Data {
        value: Value,
        attrs: PropertyAttributes,
    },
    Accessor {
        getter: Option<Value>,
        setter: Option<Value>,
        attrs: PropertyAttributes,
    },
}

impl Property {
    pub fn attrs(&self) -> PropertyAttributes {
        match self {
            Property::Data { attrs, .. } | Property::Accessor { attrs, .. } => *attrs,
        }
    }
}

/// Content of one internal field.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum InternalField {
    #[default]
    Empty,
    /// Opaque embedder pointer. The engine never dereferences it.
    External(NonNull<c_void>),
    Value(Value),
}

/// Script error constructors known to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ErrorKind {
    Error = 0,
    TypeError = 1,
    RangeError = 2,
    ReferenceError = 3,
    SyntaxError = 4,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
        }
    }
}

/// Element type of a typed array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TypedArrayKind {
    Int8 = 0,
    Uint8 = 1,
    Uint8Clamped = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Float32 = 7,
    Float64 = 8,
    BigInt64 = 9,
    BigUint64 = 10,
}

impl TypedArrayKind {
    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 | TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => 8,
        }
    }

    /// Script constructor name.
    pub fn name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
            TypedArrayKind::BigInt64 => "BigInt64Array",
            TypedArrayKind::BigUint64 => "BigUint64Array",
        }
    }

    /// Decode element `index` from little-endian storage.
    pub fn read(self, bytes: &[u8], index: usize) -> Option<Value> {
        let size = self.element_size();
        let chunk = bytes.get(index * size..(index + 1) * size)?;
        let value = match self {
            TypedArrayKind::Int8 => Value::Int(i32::from(chunk[0] as i8)),
            TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => Value::Int(i32::from(chunk[0])),
            TypedArrayKind::Int16 => {
                Value::Int(i32::from(i16::from_le_bytes([chunk[0], chunk[1]])))
            }
            TypedArrayKind::Uint16 => {
                Value::Int(i32::from(u16::from_le_bytes([chunk[0], chunk[1]])))
            }
            TypedArrayKind::Int32 => Value::Int(i32::from_le_bytes(chunk.try_into().ok()?)),
            TypedArrayKind::Uint32 => {
                Value::Number(f64::from(u32::from_le_bytes(chunk.try_into().ok()?)))
            }
            TypedArrayKind::Float32 => {
                Value::Number(f64::from(f32::from_le_bytes(chunk.try_into().ok()?)))
            }
            TypedArrayKind::Float64 => Value::Number(f64::from_le_bytes(chunk.try_into().ok()?)),
            TypedArrayKind::BigInt64 => {
                Value::BigInt(i128::from(i64::from_le_bytes(chunk.try_into().ok()?)))
            }
            TypedArrayKind::BigUint64 => {
                Value::BigInt(i128::from(u64::from_le_bytes(chunk.try_into().ok()?)))
            }
        };
        Some(value)
    }
}

/// Settlement state of a promise.
#[derive(Clone, Debug, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// What kind of engine object a reference denotes, with the little state
/// inspection needs.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectKind {
    Ordinary { constructor: Option<Rc<str>> },
    Array { length: u32 },
    Function { name: Rc<str> },
    Error(ErrorKind),
    ArrayBuffer { byte_length: usize },
    TypedArray { kind: TypedArrayKind, length: usize },
    Promise,
    /// Milliseconds since the Unix epoch.
    Date(f64),
    RegExp { source: Rc<str>, flags: Rc<str> },
    Map { size: usize },
    Set { size: usize },
}

impl ObjectKind {
    /// Constructor name of a built-in kind; ordinary objects report their
    /// prototype's constructor.
    pub fn class_name(&self) -> Rc<str> {
        match self {
            ObjectKind::Ordinary { constructor } => {
                constructor.clone().unwrap_or_else(|| Rc::from("Object"))
            }
            ObjectKind::Array { .. } => Rc::from("Array"),
            ObjectKind::Function { .. } => Rc::from("Function"),
            ObjectKind::Error(kind) => Rc::from(kind.name()),
            ObjectKind::ArrayBuffer { .. } => Rc::from("ArrayBuffer"),
            ObjectKind::TypedArray { kind, .. } => Rc::from(kind.name()),
            ObjectKind::Promise => Rc::from("Promise"),
            ObjectKind::Date(_) => Rc::from("Date"),
            ObjectKind::RegExp { .. } => Rc::from("RegExp"),
            ObjectKind::Map { .. } => Rc::from("Map"),
            ObjectKind::Set { .. } => Rc::from("Set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_keys_survive_a_double() {
        let r = ObjectRef {
            index: u32::MAX - 1,
            generation: (1 << 20) - 1,
        };
        assert_eq!(ObjectRef::from_key(r.key()), Some(r));
        assert_eq!(ObjectRef::from_key(-1.0), None);
        assert_eq!(ObjectRef::from_key(0.5), None);
    }

    #[test]
    fn typed_array_element_codec() {
        let bytes = [0xFE, 0xFF, 0x02, 0x00];
        assert_eq!(TypedArrayKind::Int16.read(&bytes, 0), Some(Value::Int(-2)));
        assert_eq!(TypedArrayKind::Uint16.read(&bytes, 1), Some(Value::Int(2)));
        assert_eq!(TypedArrayKind::Float64.read(&bytes, 0), None);
    }

    #[test]
    fn typed_array_kind_tag_decodes() {
        assert_eq!(TypedArrayKind::try_from(8u8), Ok(TypedArrayKind::Float64));
        assert!(TypedArrayKind::try_from(42u8).is_err());
    }

    #[test]
    fn ordinary_objects_report_their_constructor() {
        let plain = ObjectKind::Ordinary { constructor: None };
        let named = ObjectKind::Ordinary {
            constructor: Some(Rc::from("Point")),
        };
        assert_eq!(&*plain.class_name(), "Object");
        assert_eq!(&*named.class_name(), "Point");
        assert_eq!(&*ObjectKind::Error(ErrorKind::SyntaxError).class_name(), "SyntaxError");
    }
}
