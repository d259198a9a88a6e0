//! Engine error types.
//!
//! ## Error Hierarchy
//!
//! ```text
//! Exception       - abrupt completion of an engine entry (thrown value or termination)
//! EngineError     - invalid template graph, or a runtime that failed to start
//! SnapshotError   - snapshot blob rejected at load time
//! ```

use thiserror::Error;

use crate::value::Value;

// ============================================================================
// Exceptions
// ============================================================================

/// Abrupt completion of a call into the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Exception {
    /// A script value was thrown and not caught.
    #[error("uncaught exception: {0:?}")]
    Thrown(Value),

    /// Execution was terminated by the host.
    #[error("execution terminated")]
    Terminated,
}

impl Exception {
    /// The thrown value, if this is not a termination.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Exception::Thrown(v) => Some(v),
            Exception::Terminated => None,
        }
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, Exception::Terminated)
    }
}

// ============================================================================
// Engine Errors
// ============================================================================

/// Errors raised while setting up an isolate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A template refers to a callback position outside the reference table.
    #[error("template '{template}' refers to unknown callback #{callback}")]
    UnknownCallback { template: String, callback: u32 },

    /// A template refers to a callback of the wrong kind.
    #[error("template '{template}' expects a {expected} callback, '{name}' is a {found}")]
    CallbackKind {
        template: String,
        name: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// A template's parent id is out of range or refers to itself.
    #[error("template '{template}' has invalid parent #{parent}")]
    InvalidParent { template: String, parent: u32 },

    /// Following parent links from a template leads back to it.
    #[error("template '{template}' inherits from itself")]
    ParentCycle { template: String },

    /// A template property is keyed by a symbol that only exists in one realm.
    #[error("template '{template}' uses a realm-bound symbol as a property key")]
    RealmBoundKey { template: String },

    /// The engine runtime could not be created or bootstrapped.
    #[error("engine runtime: {0}")]
    Runtime(String),
}

// ============================================================================
// Snapshot Errors
// ============================================================================

/// Reasons a snapshot blob is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("not a snapshot blob (bad magic)")]
    BadMagic,

    #[error("snapshot version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("snapshot was built against {expected} external references, {found} registered")]
    ReferenceCount { expected: u32, found: u32 },

    #[error("external reference table does not match the snapshot")]
    ReferenceMismatch,

    #[error("snapshot checksum mismatch")]
    Checksum,

    #[error("snapshot truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("malformed snapshot: {0}")]
    Malformed(String),
}
