//! Function templates: the engine-side description of a class.
//!
//! A template is realm-independent data. Each realm instantiates a template
//! on first use into a constructor function and a prototype object (see
//! `Realm::constructor_for`), instantiating its parent first so the two
//! prototype chains are always linked. Templates only reference callbacks through
//! [`CallbackRef`], which keeps the whole graph serializable.

use std::rc::Rc;

use bitflags::bitflags;

use crate::callback::CallbackRef;
use crate::object::PropertyAttributes;
use crate::value::{PropertyKey, Symbol, Value};

/// Position of a template in its isolate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub u32);

/// Serializable constant value.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Undefined,
    Null,
    Bool(bool),
    Int(i32),
    Number(f64),
    String(Rc<str>),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Undefined => Value::Undefined,
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Number(n) => Value::Number(*n),
            Constant::String(s) => Value::String(s.clone()),
        }
    }

    /// Primitive values only; objects cannot be template constants.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Undefined => Constant::Undefined,
            Value::Null => Constant::Null,
            Value::Bool(b) => Constant::Bool(*b),
            Value::Int(i) => Constant::Int(*i),
            Value::Number(n) => Constant::Number(*n),
            Value::String(s) => Constant::String(s.clone()),
            _ => return None,
        })
    }
}

/// Native callback plus its data word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundCallback {
    pub callback: CallbackRef,
    pub data: u32,
}

/// What a template property installs.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateMember {
    Method {
        callback: BoundCallback,
        length: u32,
    },
    Accessor {
        getter: Option<BoundCallback>,
        setter: Option<BoundCallback>,
    },
    Constant(Constant),
}

/// A property installed on the prototype or on the constructor.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateProperty {
    pub key: PropertyKey,
    pub member: TemplateMember,
    pub attrs: PropertyAttributes,
}

/// Indexed property handlers of an instance template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct IndexedHandlers {
    pub getter: Option<CallbackRef>,
    pub setter: Option<CallbackRef>,
    pub data: u32,
}

/// Named property handlers of an instance template.
///
/// Named interceptors do not mask own or inherited properties: they are
/// consulted only when the ordinary lookup misses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NamedHandlers {
    pub getter: Option<CallbackRef>,
    pub setter: Option<CallbackRef>,
    pub deleter: Option<CallbackRef>,
    pub data: u32,
}

/// Shape of the objects created from a template.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct InstanceTemplate {
    pub internal_field_count: u32,
    pub indexed: Option<IndexedHandlers>,
    pub named: Option<NamedHandlers>,
}

bitflags! {
    /// Template flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TemplateFlags: u8 {
        /// Install `Symbol.toStringTag = class_name` on the prototype unless
        /// a member already defines it.
        const DEFAULT_TO_STRING_TAG = 1 << 0;
    }
}

/// Engine-side class template.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionTemplate {
    pub class_name: Rc<str>,
    /// Constructor callback. `None` produces a constructor that always throws.
    pub constructor: Option<BoundCallback>,
    pub length: u32,
    pub parent: Option<TemplateId>,
    pub prototype: Vec<TemplateProperty>,
    pub statics: Vec<TemplateProperty>,
    pub instance: InstanceTemplate,
    pub flags: TemplateFlags,
}

impl FunctionTemplate {
    pub fn new(class_name: impl Into<Rc<str>>) -> Self {
        Self {
            class_name: class_name.into(),
            constructor: None,
            length: 0,
            parent: None,
            prototype: Vec::new(),
            statics: Vec::new(),
            instance: InstanceTemplate::default(),
            flags: TemplateFlags::empty(),
        }
    }

    pub fn constructor(mut self, callback: CallbackRef, data: u32) -> Self {
        self.constructor = Some(BoundCallback { callback, data });
        self
    }

    pub fn inherit(&mut self, parent: TemplateId) {
        self.parent = Some(parent);
    }

    pub fn prototype_method(&mut self, name: &str, callback: BoundCallback, length: u32) {
        self.prototype.push(TemplateProperty {
            key: name.into(),
            member: TemplateMember::Method { callback, length },
            attrs: PropertyAttributes::DONT_ENUM,
        });
    }

    pub fn prototype_symbol_method(&mut self, symbol: Symbol, callback: BoundCallback) {
        self.prototype.push(TemplateProperty {
            key: PropertyKey::Symbol(symbol),
            member: TemplateMember::Method {
                callback,
                length: 0,
            },
            attrs: PropertyAttributes::DONT_ENUM,
        });
    }

    pub fn prototype_accessor(
        &mut self,
        name: &str,
        getter: Option<BoundCallback>,
        setter: Option<BoundCallback>,
    ) {
        self.prototype.push(TemplateProperty {
            key: name.into(),
            member: TemplateMember::Accessor { getter, setter },
            attrs: PropertyAttributes::empty(),
        });
    }

    pub fn prototype_constant(&mut self, key: PropertyKey, value: Constant) {
        self.prototype.push(TemplateProperty {
            key,
            member: TemplateMember::Constant(value),
            attrs: PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_DELETE,
        });
    }

    pub fn static_method(&mut self, name: &str, callback: BoundCallback, length: u32) {
        self.statics.push(TemplateProperty {
            key: name.into(),
            member: TemplateMember::Method { callback, length },
            attrs: PropertyAttributes::DONT_ENUM,
        });
    }

    pub fn static_constant(&mut self, name: &str, value: Constant) {
        self.statics.push(TemplateProperty {
            key: name.into(),
            member: TemplateMember::Constant(value),
            attrs: PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_DELETE,
        });
    }

    /// Whether the prototype already carries `key`.
    pub fn has_prototype_key(&self, key: &PropertyKey) -> bool {
        self.prototype.iter().any(|p| &p.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_reject_objects_and_symbols() {
        assert_eq!(Constant::from_value(&Value::Int(4)), Some(Constant::Int(4)));
        assert_eq!(Constant::from_value(&Value::Symbol(Symbol::Iterator)), None);
        assert_eq!(Constant::String("x".into()).to_value(), Value::string("x"));
    }

    #[test]
    fn builder_collects_members() {
        let cb = BoundCallback {
            callback: CallbackRef(0),
            data: 7,
        };
        let mut t = FunctionTemplate::new("Node").constructor(CallbackRef(1), 3);
        t.prototype_method("appendChild", cb, 1);
        t.prototype_constant(
            PropertyKey::Symbol(Symbol::ToStringTag),
            Constant::String("Node".into()),
        );
        t.static_constant("ELEMENT_NODE", Constant::Int(1));
        assert_eq!(t.constructor.map(|c| c.data), Some(3));
        assert!(t.has_prototype_key(&"appendChild".into()));
        assert!(t.has_prototype_key(&PropertyKey::Symbol(Symbol::ToStringTag)));
        assert_eq!(t.statics.len(), 1);
    }
}
