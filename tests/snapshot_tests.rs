//! Snapshot creation and loading.

use std::cell::Cell;

use jsbind::{Class, ContextOptions, Env, EnvBuilder, EnvConfig, EnvError, Module, Value};

#[derive(Class)]
struct Counter {
    count: Cell<u32>,
}

impl Counter {
    fn new(start: Option<u32>) -> Self {
        Self {
            count: Cell::new(start.unwrap_or(0)),
        }
    }

    fn increment(&self) -> u32 {
        self.count.set(self.count.get() + 1);
        self.count.get()
    }
}

#[derive(Class)]
#[jsbind(category = "set")]
struct Tags {
    names: Vec<String>,
}

fn counter_module(with_reset: bool) -> Module {
    let mut module = Module::new();
    let builder = module
        .class::<Counter>()
        .constructor(Counter::new)
        .method("increment", Counter::increment)
        .getter("count", |c: &Counter| c.count.get());
    if with_reset {
        builder.method("reset", |c: &Counter| c.count.set(0)).build();
    } else {
        builder.build();
    }
    module.function("twice", |n: i32| n * 2);
    module
}

fn tags_module() -> Module {
    let mut module = Module::new();
    module
        .class::<Tags>()
        .getter("size", |t: &Tags| t.names.len() as u32)
        .build();
    module
}

fn builder() -> EnvBuilder {
    Env::builder().install(counter_module(false)).install(tags_module())
}

fn create_snapshot() -> Vec<u8> {
    builder()
        .build()
        .expect("Failed to build environment")
        .create_snapshot()
        .expect("Failed to create snapshot")
}

#[test]
fn test_snapshot_round_trip() {
    let blob = create_snapshot();
    let env = builder()
        .build_from_snapshot(&blob)
        .expect("Failed to load snapshot");
    assert!(env.is_from_snapshot());

    let ctx = env
        .create_context(ContextOptions::default())
        .expect("Failed to create context");
    let ctor = ctx.global_value("Counter").expect("Failed to read Counter");
    let counter = ctx
        .construct(&ctor, &[Value::Int(4)])
        .expect("Failed to construct")
        .as_object()
        .expect("not an object");
    assert_eq!(ctx.call_method(counter, "increment", &[]).expect("increment"), Value::Int(5));
    assert_eq!(ctx.get(counter, "count").expect("count"), Value::Int(5));

    let twice = ctx.global_value("twice").expect("Failed to read twice");
    assert_eq!(
        ctx.call(&twice, Value::Undefined, &[Value::Int(21)]).expect("twice"),
        Value::Int(42)
    );
}

#[test]
fn test_snapshot_is_deterministic() {
    assert_eq!(create_snapshot(), create_snapshot());
}

#[test]
fn test_snapshot_rejects_different_catalog() {
    let blob = create_snapshot();

    let err = Env::builder()
        .install(counter_module(true))
        .install(tags_module())
        .build_from_snapshot(&blob)
        .err()
        .expect("changed members accepted");
    assert!(matches!(err, EnvError::SnapshotMismatch { .. }), "{err}");

    let err = Env::builder()
        .install(counter_module(false))
        .build_from_snapshot(&blob)
        .err()
        .expect("missing class accepted");
    assert!(
        matches!(err, EnvError::SnapshotMismatch { what: "type catalog" }),
        "{err}"
    );
}

#[test]
fn test_snapshot_rejects_corrupt_blob() {
    let mut blob = create_snapshot();
    let last = blob.len() - 1;
    blob[last] ^= 0xFF;
    let err = builder().build_from_snapshot(&blob).err().expect("corrupt blob accepted");
    assert!(matches!(err, EnvError::Snapshot(_)), "{err}");

    let err = builder()
        .build_from_snapshot(&blob[..4])
        .err()
        .expect("truncated blob accepted");
    assert!(matches!(err, EnvError::Snapshot(_)), "{err}");
}

#[test]
fn test_snapshots_disabled() {
    let disabled = EnvConfig::default().with_snapshots(false);
    let env = builder()
        .with_config(disabled.clone())
        .build()
        .expect("Failed to build environment");
    assert!(matches!(env.create_snapshot(), Err(EnvError::SnapshotsDisabled)));

    let blob = create_snapshot();
    let err = builder()
        .with_config(disabled)
        .build_from_snapshot(&blob)
        .err()
        .expect("snapshot loaded while disabled");
    assert!(matches!(err, EnvError::SnapshotsDisabled));
}
