//! jsbind - native class bindings for an embedded JavaScript engine.
//!
//! Native record types are declared once (`#[derive(Class)]`), registered in
//! a [`Module`] with the members scripts may use, and sealed into an
//! [`Env`]. Every [`ExecutionContext`] created from the environment runs its
//! own QuickJS realm, with the classes installed as ordinary script
//! constructors with working prototype chains.
//!
//! # Architecture
//!
//! ```text
//! #[derive(Class)] ──► TypeDecl ──► TypeRegistry (jsbind-registry)
//!                                        │
//! Module / ClassBuilder ─────────────────┤
//!                                        ▼
//!                              template generation ──► Isolate (jsbind-core)
//!                                        │
//!                                        ▼
//! script call ──► dispatch ──► marshal ──► native fn ──► marshal ──► result
//!                     │
//!                     └── identity: tagged handles, prototype walk
//! ```
//!
//! # Example
//!
//! ```ignore
//! use jsbind::{Class, ContextOptions, Env, Module};
//!
//! #[derive(Class)]
//! struct Counter {
//!     count: std::cell::Cell<i32>,
//! }
//!
//! let mut module = Module::new();
//! module
//!     .class::<Counter>()
//!     .constructor(|| Counter { count: Default::default() })
//!     .method("increment", |c: &Counter| {
//!         c.count.set(c.count.get() + 1);
//!         c.count.get()
//!     })
//!     .build();
//!
//! let env = Env::builder().install(module).build()?;
//! let ctx = env.create_context(ContextOptions::default())?;
//! let count = ctx.eval("const c = new Counter(); c.increment(); c.increment()")?;
//! ```

extern crate self as jsbind;

pub mod class;
pub mod class_builder;
pub mod context;
mod dispatch;
pub mod env;
pub mod error;
mod identity;
pub mod inspect;
pub mod marshal;
pub mod module;
pub mod native_fn;
mod template;

pub use jsbind_core as engine;
pub use jsbind_registry as registry;

pub use jsbind_core::{Constant, Global, ObjectRef, PropertyKey, Symbol, Value};
pub use jsbind_macros::{Class, Enumeration, Record, Union};

pub use class::{AnyRef, Class, Enumeration, IntoInstance, Ref};
pub use class_builder::{ClassBuilder, InterceptOutcome};
pub use context::ExecutionContext;
pub use env::{ContextOptions, Env, EnvBuilder, EnvConfig};
pub use error::{ConversionError, DomainError, EnvError, NativeError};
pub use inspect::RemoteObject;
pub use marshal::{
    FromScript, Function, IterResult, Probe, Promise, PromiseResolver, ToScript, TypedArray,
};
pub use module::Module;
pub use native_fn::{Invocation, NativeFn};
