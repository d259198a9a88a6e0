//! Host script engine model.
//!
//! This crate is the engine side of the binding boundary. It runs script on
//! QuickJS (through `rquickjs`) and exposes it as values, generational
//! object handles, function templates, the flat native callback ABI,
//! exceptions, persistent handles and the snapshot codec. Everything above
//! it (type registry, marshaling, dispatch) only talks to the engine through
//! the types re-exported here.
//!
//! ## Overview
//!
//! ```text
//! Isolate (templates + external references, shared)
//!   └── Realm (QuickJS runtime, handle table, template cache)
//!         ├── eval                 -> script
//!         ├── get / set / delete   -> interceptors, accessors
//!         ├── call / construct     -> FunctionCallback(CallbackInfo)
//!         └── persist / scopes     -> handle lifetimes
//! ```

pub mod callback;
pub mod error;
pub mod handle;
pub mod isolate;
pub mod object;
pub mod realm;
pub mod snapshot;
pub mod template;
pub mod value;

pub use callback::{
    CallbackInfo, CallbackRef, ExternalCallback, ExternalReferences, FunctionCallback,
    IndexedGetter, IndexedSetter, Intercepted, NamedDeleter, NamedGetter, NamedSetter,
    PropertyCallbackInfo,
};
pub use error::{EngineError, Exception, SnapshotError};
pub use handle::Global;
pub use isolate::Isolate;
pub use object::{
    ErrorKind, InternalField, ObjectKind, ObjectRef, PromiseState, Property, PropertyAttributes,
    TypedArrayKind,
};
pub use realm::{Instantiated, Realm, ScopeMark};
pub use snapshot::{SnapshotData, create_snapshot, load_isolate, read_snapshot};
pub use template::{
    BoundCallback, Constant, FunctionTemplate, IndexedHandlers, InstanceTemplate, NamedHandlers,
    TemplateFlags, TemplateId, TemplateMember, TemplateProperty,
};
pub use value::{PropertyKey, Symbol, Value};
