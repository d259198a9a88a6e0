//! Type registry for script-exposed native types.
//!
//! A catalog is a static list of [`TypeDecl`]s, usually produced by
//! `#[derive(Class)]`. The registry flattens it into dense [`ClassId`]s and
//! a prototype table that the binding layer consults at runtime.

mod decl;
mod error;
mod registry;

pub use decl::{Category, ClassId, ProtoLink, PrototypeDecl, TypeDecl};
pub use error::RegistryError;
pub use registry::{Chain, MAX_TYPES, RegisteredType, TypeRegistry};
