//! The top-level binding environment.
//!
//! An [`Env`] is built once from every installed [`Module`]: the class
//! declarations are flattened into a [`TypeRegistry`], the class templates
//! and binding table are generated, and the template graph is frozen into
//! an isolate. Execution contexts are created from it as often as needed.
//!
//! # Example
//!
//! ```ignore
//! let env = Env::builder()
//!     .install(dom_module())
//!     .install(console_module())
//!     .build()?;
//!
//! let blob = env.create_snapshot()?;
//! let warm = Env::builder()
//!     .install(dom_module())
//!     .install(console_module())
//!     .build_from_snapshot(&blob)?;
//! ```
//!
//! # Snapshots
//!
//! A snapshot stores the template graph plus the positionally stable table
//! of external callbacks. Loading one succeeds only if the catalog declared
//! by this process produces the same registry, binding table and templates.

use std::rc::Rc;

use jsbind_core::{Isolate, PropertyAttributes, Realm, Value, create_snapshot, load_isolate};
use jsbind_registry::{ClassId, TypeRegistry};

use crate::class::Class;
use crate::context::ExecutionContext;
use crate::dispatch::{CALL, external_references};
use crate::error::EnvError;
use crate::identity::template_id;
use crate::module::{ClassDef, GlobalDef, Module};
use crate::template::{Binding, ClassRuntime, Generated, GlobalEntry, generate};

/// Embedder data layout: registry fingerprint, binding fingerprint, binding
/// count.
const EMBEDDER_DATA_LEN: usize = 8 + 8 + 4;

// =============================================================================
// Configuration
// =============================================================================

/// Environment-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// Allow creating and loading snapshots.
    pub snapshots: bool,
    /// Log the arguments and a backtrace of failed native calls. Only
    /// honored in debug builds.
    pub debug_dumps: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            snapshots: true,
            debug_dumps: cfg!(debug_assertions),
        }
    }
}

impl EnvConfig {
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.snapshots = enabled;
        self
    }

    pub fn with_debug_dumps(mut self, enabled: bool) -> Self {
        self.debug_dumps = enabled;
        self
    }
}

/// Per-context settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Capacity the call arena keeps across resets. A call arena that grew
    /// past this is replaced by a fresh one of this size.
    pub call_arena_retain: usize,
    /// Initial capacity of the long-lived arena.
    pub arena_capacity: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            call_arena_retain: 16 * 1024,
            arena_capacity: 64 * 1024,
        }
    }
}

impl ContextOptions {
    pub fn with_call_arena_retain(mut self, bytes: usize) -> Self {
        self.call_arena_retain = bytes;
        self
    }

    pub fn with_arena_capacity(mut self, bytes: usize) -> Self {
        self.arena_capacity = bytes;
        self
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects modules until the environment is sealed.
#[derive(Debug, Default)]
pub struct EnvBuilder {
    config: EnvConfig,
    modules: Vec<Module>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EnvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn install(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Seal every installed module into a fresh environment.
    pub fn build(self) -> Result<Rc<Env>, EnvError> {
        let config = self.config.clone();
        let (registry, generated) = self.seal()?;
        let isolate = Isolate::new(external_references(), generated.templates)?;
        tracing::debug!(
            target: "jsbind",
            classes = registry.len(),
            bindings = generated.bindings.len(),
            "environment built"
        );
        Ok(Rc::new(Env {
            config,
            registry,
            isolate,
            classes: generated.classes,
            bindings: generated.bindings,
            globals: generated.globals,
            from_snapshot: false,
        }))
    }

    /// Seal the installed modules and take the template graph from a
    /// snapshot built by an identical catalog.
    pub fn build_from_snapshot(self, blob: &[u8]) -> Result<Rc<Env>, EnvError> {
        if !self.config.snapshots {
            return Err(EnvError::SnapshotsDisabled);
        }
        let config = self.config.clone();
        let (registry, generated) = self.seal()?;
        let (isolate, data) = load_isolate(blob, external_references())?;

        let expected = embedder_data(&registry, &generated.bindings);
        if data.len() != EMBEDDER_DATA_LEN {
            return Err(EnvError::SnapshotMismatch {
                what: "embedder data",
            });
        }
        if data[..8] != expected[..8] {
            return Err(EnvError::SnapshotMismatch {
                what: "type catalog",
            });
        }
        if data[8..] != expected[8..] {
            return Err(EnvError::SnapshotMismatch {
                what: "binding table",
            });
        }
        if isolate.templates() != generated.templates.as_slice() {
            return Err(EnvError::SnapshotMismatch {
                what: "class templates",
            });
        }

        tracing::info!(
            target: "jsbind",
            classes = registry.len(),
            bytes = blob.len(),
            "environment loaded from snapshot"
        );
        Ok(Rc::new(Env {
            config,
            registry,
            isolate,
            classes: generated.classes,
            bindings: generated.bindings,
            globals: generated.globals,
            from_snapshot: true,
        }))
    }

    fn seal(self) -> Result<(TypeRegistry, Generated), EnvError> {
        let mut defs: Vec<ClassDef> = Vec::new();
        let mut globals: Vec<GlobalDef> = Vec::new();
        for module in self.modules {
            for def in module.classes {
                if defs.iter().any(|d| d.decl.rust_type == def.decl.rust_type) {
                    return Err(EnvError::DuplicateClass {
                        name: def.decl.name,
                    });
                }
                defs.push(def);
            }
            globals.extend(module.globals);
        }
        let decls: Vec<_> = defs.iter().map(|d| d.decl).collect();
        let registry = TypeRegistry::build(&decls)?;
        let generated = generate(&registry, defs, globals)?;
        Ok((registry, generated))
    }
}

fn embedder_data(registry: &TypeRegistry, bindings: &[Binding]) -> Vec<u8> {
    let mut data = Vec::with_capacity(EMBEDDER_DATA_LEN);
    data.extend_from_slice(&registry.fingerprint().to_le_bytes());
    data.extend_from_slice(&Generated::binding_fingerprint(bindings).to_le_bytes());
    data.extend_from_slice(&(bindings.len() as u32).to_le_bytes());
    data
}

// =============================================================================
// Env
// =============================================================================

/// A sealed binding environment.
pub struct Env {
    config: EnvConfig,
    registry: TypeRegistry,
    isolate: Rc<Isolate>,
    classes: Vec<ClassRuntime>,
    bindings: Vec<Binding>,
    globals: Vec<GlobalEntry>,
    from_snapshot: bool,
}

impl Env {
    pub fn builder() -> EnvBuilder {
        EnvBuilder::new()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn isolate(&self) -> &Rc<Isolate> {
        &self.isolate
    }

    pub fn is_from_snapshot(&self) -> bool {
        self.from_snapshot
    }

    pub fn class_id<T: Class>(&self) -> Option<ClassId> {
        self.registry.id_of::<T>()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub(crate) fn class(&self, id: ClassId) -> Option<&ClassRuntime> {
        self.classes.get(id.index())
    }

    pub(crate) fn class_name(&self, id: ClassId) -> &'static str {
        self.class(id).map_or("<unknown>", |rt| rt.name)
    }

    pub(crate) fn binding(&self, index: u32) -> Option<&Binding> {
        self.bindings.get(index as usize)
    }

    /// Serialize the template graph for a later [`EnvBuilder::build_from_snapshot`].
    pub fn create_snapshot(&self) -> Result<Vec<u8>, EnvError> {
        if !self.config.snapshots {
            return Err(EnvError::SnapshotsDisabled);
        }
        let data = embedder_data(&self.registry, &self.bindings);
        Ok(create_snapshot(&self.isolate, &data))
    }

    /// Create an execution context: a fresh realm with every class
    /// instantiated and every visible constructor and global installed.
    pub fn create_context(
        self: &Rc<Self>,
        options: ContextOptions,
    ) -> Result<ExecutionContext, EnvError> {
        let realm = Realm::new(self.isolate.clone())?;
        for ty in self.registry.iter() {
            realm.instantiate(template_id(ty.id))?;
        }
        self.install_globals(&realm)?;

        tracing::debug!(
            target: "jsbind",
            classes = self.registry.len(),
            globals = self.globals.len(),
            "execution context created"
        );
        Ok(ExecutionContext::new(self.clone(), realm, options))
    }

    fn install_globals(&self, realm: &Realm) -> Result<(), EnvError> {
        let global = realm.global();
        for (ty, rt) in self.registry.iter().zip(&self.classes) {
            if rt.hidden {
                continue;
            }
            let ctor = realm.constructor_for(template_id(ty.id))?;
            realm.define(global, ty.name, Value::Object(ctor), PropertyAttributes::DONT_ENUM);
        }
        for entry in &self.globals {
            match entry {
                GlobalEntry::Function {
                    name,
                    binding,
                    length,
                } => {
                    let f = realm.new_function(name, CALL, *binding, *length)?;
                    realm.define(global, &**name, Value::Object(f), PropertyAttributes::DONT_ENUM);
                }
                GlobalEntry::Constant { name, value } => {
                    realm.define(
                        global,
                        &**name,
                        value.to_value(),
                        PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_DELETE,
                    );
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("config", &self.config)
            .field("classes", &self.registry.len())
            .field("bindings", &self.bindings.len())
            .field("from_snapshot", &self.from_snapshot)
            .finish()
    }
}
