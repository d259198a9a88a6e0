//! jsbind Proc Macros
//!
//! Static registration for native types bound into a script engine. Each
//! derive expands to plain trait impls against the `jsbind` crate; nothing
//! is discovered at run time.
//!
//! # Macros
//!
//! - `#[derive(Class)]` - Declare a registered class and its prototype link
//! - `#[derive(Record)]` - Marshal a struct as a plain script object
//! - `#[derive(Union)]` - Marshal an enum of single-value variants by probing
//! - `#[derive(Enumeration)]` - Marshal a field-less enum as strings
//!
//! # Example
//!
//! ```ignore
//! use jsbind::{Class, Ref};
//!
//! #[derive(Class)]
//! #[jsbind(name = "Element", category = "node")]
//! pub struct Element {
//!     #[jsbind(proto)]
//!     node: Node,
//!     tag: String,
//! }
//! ```

use proc_macro::TokenStream;

mod attrs;
mod class;
mod enumeration;
mod record;
mod union;

/// Derive `jsbind::Class` for a struct.
///
/// # Attributes
///
/// - `#[jsbind(name = "...")]` - Script class name (default: struct name)
/// - `#[jsbind(category = "...")]` - Debugger subtype (`node`, `iterator`, `error`, ...)
/// - `#[jsbind(proto)]` on one field - The prototype record. By value means
///   embedded; `Ref<P>`, `NonNull<P>`, `Box<P>`, `*mut P` or `*const P` means
///   reached through a pointer.
#[proc_macro_derive(Class, attributes(jsbind))]
pub fn derive_class(input: TokenStream) -> TokenStream {
    class::derive_class_impl(input)
}

/// Derive `ToScript`/`FromScript` for a struct of named fields.
///
/// Fields map to camelCase properties; `#[jsbind(rename = "...")]` overrides.
/// `Option` fields may be absent on the script side.
#[proc_macro_derive(Record, attributes(jsbind))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record_impl(input)
}

/// Derive `ToScript`/`FromScript` for an enum whose variants each wrap one
/// value. Script values pick the best-matching variant; ties go to the
/// earliest declared.
#[proc_macro_derive(Union, attributes(jsbind))]
pub fn derive_union(input: TokenStream) -> TokenStream {
    union::derive_union_impl(input)
}

/// Derive `Enumeration`, `ToScript` and `FromScript` for a field-less enum.
///
/// Variant names map to kebab-case strings; `#[jsbind(rename = "...")]`
/// overrides.
#[proc_macro_derive(Enumeration, attributes(jsbind))]
pub fn derive_enumeration(input: TokenStream) -> TokenStream {
    enumeration::derive_enumeration_impl(input)
}
