//! Error types for the bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! NativeError                  - raised by a bound native function
//! ├── InvalidArgument          - wrong shape, type or range (TypeError)
//! │   └── ConversionError
//! ├── OutOfMemory              - allocation failure (Error)
//! ├── IllegalConstructor       - no constructor, or called without `new` (TypeError)
//! ├── Domain                   - any other native failure (mapped or Error)
//! ├── Exception                - a script exception passing through
//! └── Terminated               - execution was terminated by the host
//!
//! EnvError                     - building an environment or a context
//! ├── Registry
//! ├── Engine
//! ├── Setup                    - the realm threw while a context was set up
//! ├── Snapshot
//! ├── SnapshotMismatch
//! └── Duplicate*                - classes, globals or cached getters declared twice
//! ```

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use jsbind_core::{EngineError, Exception, SnapshotError, Value};
use jsbind_registry::RegistryError;

/// A script value could not be converted into the requested native type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("missing required argument {index} ({expected})")]
    MissingArgument {
        index: usize,
        expected: &'static str,
    },

    #[error("missing required field '{field}' in {record}")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("no variant of {union} accepts {found}")]
    NoMatchingVariant {
        union: &'static str,
        found: &'static str,
    },

    #[error("'{value}' is not a valid value for enumeration {enumeration}")]
    InvalidEnumValue {
        enumeration: &'static str,
        value: String,
    },

    #[error("object is not a {expected} (it is a {found})")]
    WrongClass {
        expected: &'static str,
        found: String,
    },

    #[error("{class} instance is not attached to a native object")]
    Detached { class: &'static str },

    #[error("type {type_name} is not registered in this environment")]
    NotRegistered { type_name: &'static str },

    #[error("cannot convert a Symbol value to {target}")]
    Symbol { target: &'static str },

    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    pub fn type_mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        ConversionError::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    /// Attach an argument position. Already-positioned errors are kept.
    pub fn at_argument(self, index: usize) -> Self {
        match self {
            e @ ConversionError::Argument { .. } => e,
            e @ ConversionError::MissingArgument { .. } => e,
            e => ConversionError::Argument {
                index,
                source: Box::new(e),
            },
        }
    }
}

/// A native failure with a symbolic name, e.g. `HierarchyRequestError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainError {
    pub name: Cow<'static, str>,
    pub message: String,
}

impl DomainError {
    pub fn new(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for DomainError {}

/// Errors returned by bound native functions.
#[derive(Debug, Clone, Error)]
pub enum NativeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ConversionError),

    #[error("out of memory")]
    OutOfMemory,

    #[error("Illegal constructor")]
    IllegalConstructor,

    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("uncaught script exception")]
    Exception(Value),

    #[error("execution terminated")]
    Terminated,
}

impl NativeError {
    pub fn domain(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        NativeError::Domain(DomainError::new(name, message))
    }

    /// Wrap a conversion failure with an argument position.
    pub(crate) fn at_argument(self, index: usize) -> Self {
        match self {
            NativeError::InvalidArgument(e) => NativeError::InvalidArgument(e.at_argument(index)),
            other => other,
        }
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, NativeError::Terminated)
    }
}

impl From<Exception> for NativeError {
    fn from(e: Exception) -> Self {
        match e {
            Exception::Thrown(value) => NativeError::Exception(value),
            Exception::Terminated => NativeError::Terminated,
        }
    }
}

/// Errors from building an [`Env`](crate::Env) or creating a context.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("context setup failed: {0}")]
    Setup(#[from] Exception),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("snapshots are disabled in this environment")]
    SnapshotsDisabled,

    #[error("snapshot does not match this build: {what} differs")]
    SnapshotMismatch { what: &'static str },

    #[error("class {name} is installed twice")]
    DuplicateClass { name: &'static str },

    #[error("global '{name}' is defined twice")]
    DuplicateGlobal { name: String },

    #[error("{class} declares cached getter '{name}' twice")]
    DuplicateCachedGetter { class: &'static str, name: String },
}
