//! Handle table: the native side's view of engine objects.
//!
//! The engine owns every object; the realm refers to them through an
//! [`ObjectRef`], a generational index into this table. Each live slot holds
//! a persistent engine reference, so an object stays alive while at least
//! one holder keeps its slot:
//!
//! - the scope that interned it (see [`Handles::close_scope`])
//! - persistent handles ([`Global`]), released explicitly by their owner
//! - internal fields of a pinned instance
//!
//! Pinned slots (instances, constructors, prototypes, the global object)
//! live as long as the realm. Freeing a slot bumps its generation, so a
//! stale `ObjectRef` stops resolving instead of aliasing a newer object.

use crate::object::{InternalField, ObjectRef};
use crate::template::TemplateId;
use crate::value::{Symbol, Value};

/// Generations wrap at 20 bits so that a handle key fits a double exactly.
const GENERATION_MASK: u32 = (1 << 20) - 1;

/// Persistent handle keeping a value alive until released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Global(pub(crate) u32);

impl Global {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Native state of an object created from a template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Instance {
    pub template: TemplateId,
    pub fields: Vec<InternalField>,
}

#[derive(Debug)]
struct Slot<P> {
    generation: u32,
    value: Option<P>,
    refs: u32,
    pinned: bool,
    instance: Option<Instance>,
}

/// Slot table for one realm, generic over the stored engine reference.
#[derive(Debug)]
pub(crate) struct Handles<P> {
    slots: Vec<Slot<P>>,
    free: Vec<u32>,
    scope: Vec<ObjectRef>,
    globals: Vec<Option<Value>>,
    free_globals: Vec<u32>,
}

impl<P> Default for Handles<P> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            scope: Vec::new(),
            globals: Vec::new(),
            free_globals: Vec::new(),
        }
    }
}

/// Slot an engine value occupies, if any.
pub(crate) fn slot_of(value: &Value) -> Option<ObjectRef> {
    match value {
        Value::Object(r) | Value::Symbol(Symbol::Script(r)) => Some(*r),
        _ => None,
    }
}

impl<P: Clone> Handles<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new engine reference. The current scope holds it.
    pub fn allocate(&mut self, value: P) -> ObjectRef {
        let r = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                slot.refs = 1;
                ObjectRef {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                    refs: 1,
                    pinned: false,
                    instance: None,
                });
                ObjectRef {
                    index: self.slots.len() as u32 - 1,
                    generation: 0,
                }
            }
        };
        self.scope.push(r);
        r
    }

    fn slot(&self, r: ObjectRef) -> Option<&Slot<P>> {
        self.slots
            .get(r.index as usize)
            .filter(|s| s.generation == r.generation && s.value.is_some())
    }

    fn slot_mut(&mut self, r: ObjectRef) -> Option<&mut Slot<P>> {
        self.slots
            .get_mut(r.index as usize)
            .filter(|s| s.generation == r.generation && s.value.is_some())
    }

    pub fn is_live(&self, r: ObjectRef) -> bool {
        self.slot(r).is_some()
    }

    pub fn value(&self, r: ObjectRef) -> Option<P> {
        self.slot(r).and_then(|s| s.value.clone())
    }

    pub fn retain(&mut self, r: ObjectRef) {
        if let Some(slot) = self.slot_mut(r) {
            slot.refs += 1;
        }
    }

    /// Drop one holder of `r`, freeing the slot (and, transitively, the
    /// values its internal fields hold) once nothing holds it.
    pub fn release(&mut self, r: ObjectRef) {
        let mut worklist = vec![r];
        while let Some(r) = worklist.pop() {
            let Some(slot) = self.slot_mut(r) else {
                continue;
            };
            slot.refs = slot.refs.saturating_sub(1);
            if slot.refs > 0 || slot.pinned {
                continue;
            }
            slot.value = None;
            slot.generation = (slot.generation + 1) & GENERATION_MASK;
            if let Some(instance) = slot.instance.take() {
                worklist.extend(instance.fields.iter().filter_map(|f| match f {
                    InternalField::Value(v) => slot_of(v),
                    _ => None,
                }));
            }
            self.free.push(r.index);
        }
    }

    /// Keep `r` alive for the lifetime of the table.
    pub fn pin(&mut self, r: ObjectRef) {
        if let Some(slot) = self.slot_mut(r) {
            slot.pinned = true;
        }
    }

    pub fn instance(&self, r: ObjectRef) -> Option<&Instance> {
        self.slot(r).and_then(|s| s.instance.as_ref())
    }

    pub fn instance_mut(&mut self, r: ObjectRef) -> Option<&mut Instance> {
        self.slot_mut(r).and_then(|s| s.instance.as_mut())
    }

    pub fn set_instance(&mut self, r: ObjectRef, instance: Instance) {
        if let Some(slot) = self.slot_mut(r) {
            slot.instance = Some(instance);
        }
    }

    pub fn scope_len(&self) -> usize {
        self.scope.len()
    }

    /// Release every handle interned since `mark`.
    pub fn close_scope(&mut self, mark: usize) {
        if mark >= self.scope.len() {
            return;
        }
        let closed: Vec<ObjectRef> = self.scope.drain(mark..).collect();
        for r in closed.into_iter().rev() {
            self.release(r);
        }
    }

    pub fn add_global(&mut self, value: Value) -> Global {
        if let Some(r) = slot_of(&value) {
            self.retain(r);
        }
        if let Some(id) = self.free_globals.pop() {
            self.globals[id as usize] = Some(value);
            return Global(id);
        }
        self.globals.push(Some(value));
        Global(self.globals.len() as u32 - 1)
    }

    pub fn global(&self, id: Global) -> Option<&Value> {
        self.globals.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Release a persistent handle. Releasing twice is a no-op.
    pub fn remove_global(&mut self, id: Global) {
        let Some(value) = self.globals.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        self.free_globals.push(id.0);
        if let Some(r) = slot_of(&value) {
            self.release(r);
        }
    }

    pub fn global_count(&self) -> usize {
        self.globals.iter().filter(|g| g.is_some()).count()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }
}
