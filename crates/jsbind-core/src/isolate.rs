//! Isolate: the immutable, realm-independent part of the engine.
//!
//! An isolate owns the external reference table and the template graph.
//! Realms share it through `Rc`; each realm runs its own engine runtime and
//! instantiates templates on demand, parents first.

use std::rc::Rc;

use crate::callback::{CallbackRef, ExternalCallback, ExternalReferences};
use crate::error::EngineError;
use crate::template::{BoundCallback, FunctionTemplate, TemplateId, TemplateMember};
use crate::value::{PropertyKey, Symbol};

/// Shared engine state.
#[derive(Debug)]
pub struct Isolate {
    references: ExternalReferences,
    templates: Vec<FunctionTemplate>,
}

impl Isolate {
    /// Validate and freeze a template graph.
    pub fn new(
        references: ExternalReferences,
        templates: Vec<FunctionTemplate>,
    ) -> Result<Rc<Self>, EngineError> {
        let isolate = Self {
            references,
            templates,
        };
        isolate.validate()?;
        Ok(Rc::new(isolate))
    }

    pub fn references(&self) -> &ExternalReferences {
        &self.references
    }

    pub fn templates(&self) -> &[FunctionTemplate] {
        &self.templates
    }

    pub fn template(&self, id: TemplateId) -> Option<&FunctionTemplate> {
        self.templates.get(id.0 as usize)
    }

    pub fn callback(&self, r: CallbackRef) -> Option<ExternalCallback> {
        self.references.get(r)
    }

    fn validate(&self) -> Result<(), EngineError> {
        for (idx, t) in self.templates.iter().enumerate() {
            let check = |cb: CallbackRef, expected: &'static str| -> Result<(), EngineError> {
                let found = self.references.get(cb).ok_or_else(|| EngineError::UnknownCallback {
                    template: t.class_name.to_string(),
                    callback: cb.0,
                })?;
                if found.kind_name() != expected {
                    return Err(EngineError::CallbackKind {
                        template: t.class_name.to_string(),
                        name: self.references.name(cb).unwrap_or("?"),
                        expected,
                        found: found.kind_name(),
                    });
                }
                Ok(())
            };
            let check_bound = |b: &Option<BoundCallback>| match b {
                Some(b) => check(b.callback, "function"),
                None => Ok(()),
            };

            check_bound(&t.constructor)?;
            for prop in t.prototype.iter().chain(t.statics.iter()) {
                match &prop.member {
                    TemplateMember::Method { callback, .. } => {
                        check(callback.callback, "function")?
                    }
                    TemplateMember::Accessor { getter, setter } => {
                        check_bound(getter)?;
                        check_bound(setter)?;
                    }
                    TemplateMember::Constant(_) => {}
                }
            }
            if let Some(indexed) = &t.instance.indexed {
                indexed.getter.map_or(Ok(()), |cb| check(cb, "indexed-getter"))?;
                indexed.setter.map_or(Ok(()), |cb| check(cb, "indexed-setter"))?;
            }
            if let Some(named) = &t.instance.named {
                named.getter.map_or(Ok(()), |cb| check(cb, "named-getter"))?;
                named.setter.map_or(Ok(()), |cb| check(cb, "named-setter"))?;
                named.deleter.map_or(Ok(()), |cb| check(cb, "named-deleter"))?;
            }
            if t.prototype.iter().chain(t.statics.iter()).any(|p| {
                matches!(p.key, PropertyKey::Symbol(Symbol::Script(_)))
            }) {
                return Err(EngineError::RealmBoundKey {
                    template: t.class_name.to_string(),
                });
            }
            if let Some(parent) = t.parent {
                if parent.0 as usize >= self.templates.len() || parent.0 as usize == idx {
                    return Err(EngineError::InvalidParent {
                        template: t.class_name.to_string(),
                        parent: parent.0,
                    });
                }
            }
        }
        self.check_parent_cycles()
    }

    /// Realms instantiate parents first, so the parent graph must be a forest.
    fn check_parent_cycles(&self) -> Result<(), EngineError> {
        for (idx, t) in self.templates.iter().enumerate() {
            let mut cursor = t.parent;
            let mut steps = 0;
            while let Some(parent) = cursor {
                steps += 1;
                if parent.0 as usize == idx || steps > self.templates.len() {
                    return Err(EngineError::ParentCycle {
                        template: t.class_name.to_string(),
                    });
                }
                cursor = self.templates.get(parent.0 as usize).and_then(|p| p.parent);
            }
        }
        Ok(())
    }
}
