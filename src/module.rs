//! Modules: the unit a binding catalog is installed from.
//!
//! A [`Module`] collects class registrations and global functions/values.
//! Nothing is validated here; [`EnvBuilder::build`](crate::EnvBuilder::build)
//! seals every installed module into one registry and template graph.
//!
//! # Example
//!
//! ```ignore
//! let mut module = Module::new();
//! module.class::<Node>()
//!     .method("appendChild", Node::append_child)
//!     .getter("firstChild", Node::first_child)
//!     .build();
//! module.function("atob", atob);
//! ```

use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use jsbind_core::{Constant, ObjectRef, Symbol, Value};
use jsbind_registry::TypeDecl;

use crate::class::{AnyRef, Class};
use crate::class_builder::ClassBuilder;
use crate::context::ExecutionContext;
use crate::error::{DomainError, NativeError};
use crate::native_fn::{ConstructFn, IntoNativeFn, Invocation, NativeFn};

// =============================================================================
// Erased class definition
// =============================================================================

pub(crate) type IndexedGetFn =
    Rc<dyn Fn(&ExecutionContext, &Value, u32) -> Result<Option<Value>, NativeError>>;
pub(crate) type IndexedSetFn =
    Rc<dyn Fn(&ExecutionContext, &Value, u32, &Value) -> Result<bool, NativeError>>;
pub(crate) type NamedGetFn =
    Rc<dyn Fn(&ExecutionContext, &Value, &str) -> Result<Option<Value>, NativeError>>;
pub(crate) type NamedSetFn =
    Rc<dyn Fn(&ExecutionContext, &Value, &str, &Value) -> Result<bool, NativeError>>;
pub(crate) type NamedDeleteFn =
    Rc<dyn Fn(&ExecutionContext, &Value, &str) -> Result<bool, NativeError>>;
pub(crate) type ExceptionFn =
    Rc<dyn Fn(&DomainError, &ExecutionContext) -> Result<Option<Value>, NativeError>>;
pub(crate) type AttachFn =
    Rc<dyn Fn(NonNull<u8>, ObjectRef, &ExecutionContext) -> Result<(), NativeError>>;
pub(crate) type FinalizeFn = Rc<dyn Fn(NonNull<u8>)>;
pub(crate) type MostDerivedFn = Rc<dyn Fn(NonNull<u8>) -> Option<AnyRef>>;

/// Property key of a class member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemberKey {
    Name(Rc<str>),
    Symbol(Symbol),
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKey::Name(name) => f.write_str(name),
            MemberKey::Symbol(symbol) => write!(f, "[{}]", symbol.description()),
        }
    }
}

pub(crate) enum MemberKind {
    Method {
        f: NativeFn,
        length: u32,
    },
    Accessor {
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
    },
    /// Getter whose result is stored in the declaring type's cache slot.
    CachedGetter {
        f: NativeFn,
    },
    Constant(Constant),
}

pub(crate) struct MemberDef {
    pub key: MemberKey,
    pub kind: MemberKind,
}

#[derive(Default)]
pub(crate) struct IndexedDef {
    pub getter: Option<IndexedGetFn>,
    pub setter: Option<IndexedSetFn>,
}

#[derive(Default)]
pub(crate) struct NamedDef {
    pub getter: Option<NamedGetFn>,
    pub setter: Option<NamedSetFn>,
    pub deleter: Option<NamedDeleteFn>,
}

/// Everything a [`ClassBuilder`] declared, with the Rust type erased.
pub(crate) struct ClassDef {
    pub decl: TypeDecl,
    pub constructor: Option<(ConstructFn, u32)>,
    pub members: Vec<MemberDef>,
    pub statics: Vec<MemberDef>,
    pub indexed: Option<IndexedDef>,
    pub named: Option<NamedDef>,
    pub to_string_tag: Option<Rc<str>>,
    pub exception: Option<ExceptionFn>,
    pub on_attach: Option<AttachFn>,
    pub finalizer: Option<FinalizeFn>,
    pub most_derived: Option<MostDerivedFn>,
    /// Do not expose the constructor on the global object.
    pub hidden: bool,
}

impl ClassDef {
    pub(crate) fn new(decl: TypeDecl) -> Self {
        Self {
            decl,
            constructor: None,
            members: Vec::new(),
            statics: Vec::new(),
            indexed: None,
            named: None,
            to_string_tag: None,
            exception: None,
            on_attach: None,
            finalizer: None,
            most_derived: None,
            hidden: false,
        }
    }

    pub(crate) fn has_cached_getters(&self) -> bool {
        self.members
            .iter()
            .any(|m| matches!(m.kind, MemberKind::CachedGetter { .. }))
    }
}

// =============================================================================
// Module
// =============================================================================

pub(crate) enum GlobalDef {
    Function {
        name: Rc<str>,
        f: NativeFn,
        length: u32,
    },
    Constant {
        name: Rc<str>,
        value: Constant,
    },
}

impl GlobalDef {
    pub(crate) fn name(&self) -> &Rc<str> {
        match self {
            GlobalDef::Function { name, .. } | GlobalDef::Constant { name, .. } => name,
        }
    }
}

/// A set of class registrations and globals.
#[derive(Default)]
pub struct Module {
    pub(crate) classes: Vec<ClassDef>,
    pub(crate) globals: Vec<GlobalDef>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start registering class `T`. Call [`ClassBuilder::build`] to finish.
    pub fn class<T: Class>(&mut self) -> ClassBuilder<'_, T> {
        ClassBuilder::new(self)
    }

    /// Register `T` with no members beyond its declaration.
    pub fn declare<T: Class>(&mut self) -> &mut Self {
        self.class::<T>().build();
        self
    }

    /// Bind a global function.
    pub fn function<F, M>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: IntoNativeFn<M>,
    {
        self.globals.push(GlobalDef::Function {
            name: Rc::from(name),
            f: f.into_native_fn(),
            length: F::ARITY,
        });
        self
    }

    /// Bind a global function that reads its own arguments.
    pub fn function_raw<F>(&mut self, name: &str, length: u32, f: F) -> &mut Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, NativeError> + 'static,
    {
        self.globals.push(GlobalDef::Function {
            name: Rc::from(name),
            f: Rc::new(f),
            length,
        });
        self
    }

    /// Define a read-only global value.
    pub fn constant(&mut self, name: &str, value: Constant) -> &mut Self {
        self.globals.push(GlobalDef::Constant {
            name: Rc::from(name),
            value,
        });
        self
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub(crate) fn push_class(&mut self, def: ClassDef) {
        self.classes.push(def);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field(
                "classes",
                &self.classes.iter().map(|c| c.decl.name).collect::<Vec<_>>(),
            )
            .field(
                "globals",
                &self.globals.iter().map(GlobalDef::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
