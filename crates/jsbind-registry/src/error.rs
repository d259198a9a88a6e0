//! Registry build errors.

use thiserror::Error;

/// Errors raised while flattening a type catalog.
///
/// These are configuration errors: a catalog that builds once always builds,
/// so there is no runtime error path after startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two declarations share a script name.
    #[error("type '{name}' is declared more than once")]
    DuplicateType { name: &'static str },

    /// The same Rust type is declared under two names.
    #[error("Rust type '{rust_name}' is declared as both '{first}' and '{second}'")]
    DuplicateRustType {
        rust_name: &'static str,
        first: &'static str,
        second: &'static str,
    },

    /// A prototype refers to a Rust type that is not in the catalog.
    #[error("type '{type_name}' declares prototype '{prototype}', which is not registered")]
    UnknownPrototype {
        type_name: &'static str,
        prototype: &'static str,
    },

    /// Following prototypes from this type never reaches a root.
    #[error("prototype chain of '{type_name}' is cyclic")]
    PrototypeCycle { type_name: &'static str },

    /// An embedded prototype does not fit inside its owner.
    #[error(
        "type '{type_name}' embeds its prototype at offset {offset} (+{proto_size} bytes) \
         but is only {size} bytes"
    )]
    InvalidPrototypeLink {
        type_name: &'static str,
        offset: usize,
        proto_size: usize,
        size: usize,
    },

    /// Identifiers are 16 bits wide.
    #[error("catalog declares {count} types, the limit is {limit}")]
    TooManyTypes { count: usize, limit: usize },
}
