//! `EventTarget`: listener registration and synchronous dispatch.

use std::cell::RefCell;

use jsbind::{
    Class, DomainError, ExecutionContext, Function, Invocation, Module, NativeError, Value,
};

use crate::exception::DomException;

struct Listener {
    kind: String,
    callback: Function,
}

#[derive(Class, Default)]
pub struct EventTarget {
    listeners: RefCell<Vec<Listener>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding the same callback for the same event twice is a no-op.
    pub fn add_event_listener(&self, kind: String, callback: Function, ctx: &ExecutionContext) {
        let mut listeners = self.listeners.borrow_mut();
        if listeners
            .iter()
            .any(|l| l.kind == kind && l.callback.value() == callback.value())
        {
            return;
        }
        listeners.push(Listener {
            kind,
            callback: callback.retain(ctx),
        });
    }

    pub fn remove_event_listener(&self, kind: String, callback: Function) {
        self.listeners
            .borrow_mut()
            .retain(|l| !(l.kind == kind && l.callback.value() == callback.value()));
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners.borrow().iter().filter(|l| l.kind == kind).count()
    }

    /// Call every listener for `kind` with `this` as receiver. Listeners
    /// added during dispatch run from the next dispatch on.
    pub fn dispatch(
        &self,
        ctx: &ExecutionContext,
        this: &Value,
        kind: &str,
    ) -> Result<bool, NativeError> {
        let callbacks: Vec<Function> = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.callback.clone())
            .collect();
        let event = ctx.new_object()?;
        ctx.define_field(event, "type", Value::string(kind));
        ctx.define_field(event, "target", this.clone());
        for callback in &callbacks {
            callback.call_with_this(ctx, this.clone(), &[Value::Object(event)])?;
        }
        Ok(!callbacks.is_empty())
    }
}

fn dispatch_event(inv: &Invocation<'_>) -> Result<Value, NativeError> {
    let target = inv.this_ref::<EventTarget>()?;
    let kind: String = inv.arg(0)?;
    let handled = target.dispatch(inv.ctx(), inv.this(), &kind)?;
    Ok(Value::Bool(handled))
}

pub fn register(module: &mut Module) {
    module
        .class::<EventTarget>()
        .constructor(EventTarget::new)
        .method("addEventListener", EventTarget::add_event_listener)
        .method("removeEventListener", EventTarget::remove_event_listener)
        .method_raw("dispatchEvent", 1, dispatch_event)
        .exception(|err: &DomainError, _ctx: &ExecutionContext| Some(DomException::from(err)))
        .build();
}
