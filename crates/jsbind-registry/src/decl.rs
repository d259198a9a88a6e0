//! Type declarations: what a catalog hands to the registry.

use std::any::TypeId;
use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Dense, zero-based identifier of a registered type.
///
/// Identifiers follow declaration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u16);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Script-visible category of a type.
///
/// Debuggers use it as the object subtype, and the marshaler uses it to pick
/// special handling (iterators, errors).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Category {
    Array = 1,
    Map = 2,
    Set = 3,
    WeakMap = 4,
    WeakSet = 5,
    Promise = 6,
    Iterator = 7,
    Generator = 8,
    Date = 9,
    RegExp = 10,
    Error = 11,
    TypedArray = 12,
    ArrayBuffer = 13,
    DataView = 14,
    Proxy = 15,
    Node = 16,
}

impl Category {
    pub const ALL: [Category; 16] = [
        Category::Array,
        Category::Map,
        Category::Set,
        Category::WeakMap,
        Category::WeakSet,
        Category::Promise,
        Category::Iterator,
        Category::Generator,
        Category::Date,
        Category::RegExp,
        Category::Error,
        Category::TypedArray,
        Category::ArrayBuffer,
        Category::DataView,
        Category::Proxy,
        Category::Node,
    ];

    /// Lowercase subtype name, as debuggers print it.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Array => "array",
            Category::Map => "map",
            Category::Set => "set",
            Category::WeakMap => "weakmap",
            Category::WeakSet => "weakset",
            Category::Promise => "promise",
            Category::Iterator => "iterator",
            Category::Generator => "generator",
            Category::Date => "date",
            Category::RegExp => "regexp",
            Category::Error => "error",
            Category::TypedArray => "typedarray",
            Category::ArrayBuffer => "arraybuffer",
            Category::DataView => "dataview",
            Category::Proxy => "proxy",
            Category::Node => "node",
        }
    }

    /// Parse a subtype name. Dashes and case are ignored, so `typed-array`
    /// and `TypedArray` both resolve.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL.into_iter().find(|c| c.as_str() == normalized)
    }

    /// Encode an optional category as a tag byte (0 = none).
    pub fn to_tag(category: Option<Self>) -> u8 {
        category.map_or(0, u8::from)
    }

    /// Decode a tag byte. Unknown tags decode as no category.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::try_from(tag).ok()
    }
}

/// How a type reaches its prototype's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtoLink {
    /// The prototype record is a field of the type at `offset` bytes.
    Embedded { offset: usize },
    /// A pointer to the prototype record is stored at `offset` bytes.
    Indirect { offset: usize },
}

/// Prototype half of a declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrototypeDecl {
    pub rust_type: TypeId,
    pub rust_name: &'static str,
    /// Size of the prototype record, for embedded-link validation.
    pub size: usize,
    pub link: ProtoLink,
}

/// One entry of a type catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeDecl {
    /// Script class name.
    pub name: &'static str,
    pub rust_type: TypeId,
    pub rust_name: &'static str,
    /// `size_of` the Rust type. Zero marks an empty type.
    pub size: usize,
    pub prototype: Option<PrototypeDecl>,
    pub category: Option<Category>,
}

impl TypeDecl {
    /// Declaration for `T` without prototype or category.
    pub fn of<T: 'static>(name: &'static str) -> Self {
        Self {
            name,
            rust_type: TypeId::of::<T>(),
            rust_name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            prototype: None,
            category: None,
        }
    }

    /// Prototype `P` embedded at `offset`.
    pub fn embeds<P: 'static>(mut self, offset: usize) -> Self {
        self.prototype = Some(PrototypeDecl {
            rust_type: TypeId::of::<P>(),
            rust_name: std::any::type_name::<P>(),
            size: std::mem::size_of::<P>(),
            link: ProtoLink::Embedded { offset },
        });
        self
    }

    /// Prototype `P` behind a pointer stored at `offset`.
    pub fn points_to<P: 'static>(mut self, offset: usize) -> Self {
        self.prototype = Some(PrototypeDecl {
            rust_type: TypeId::of::<P>(),
            rust_name: std::any::type_name::<P>(),
            size: std::mem::size_of::<P>(),
            link: ProtoLink::Indirect { offset },
        });
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}
