//! `Window` and page bootstrap.

use jsbind::{Class, ExecutionContext, Module, NativeError, ObjectRef, Ref, Value};

use crate::console::Console;
use crate::dom::{Document, DocumentReadyState, EventTarget};

#[derive(Class)]
pub struct Window {
    #[jsbind(proto)]
    target: EventTarget,
    document: Ref<Document>,
    console: Ref<Console>,
}

impl Window {
    pub fn document(&self) -> Ref<Document> {
        self.document
    }

    pub fn console(&self) -> Ref<Console> {
        self.console
    }

    pub fn event_target(&self) -> &EventTarget {
        &self.target
    }
}

/// Create the window, its document and console, and expose them as the
/// `window`, `document` and `console` globals.
pub fn bootstrap(ctx: &ExecutionContext) -> Result<Ref<Window>, NativeError> {
    let document = Document::create(ctx)?;
    let console = ctx.alloc(Console::new());
    let window = ctx.alloc(Window {
        target: EventTarget::new(),
        document,
        console,
    });

    let global = ctx.global();
    ctx.define_field(global, "window", ctx.wrap(window)?);
    ctx.define_field(global, "document", ctx.wrap(document)?);
    ctx.define_field(global, "console", ctx.wrap(console)?);
    document.set_ready_state(DocumentReadyState::Interactive);
    tracing::debug!(target: "jsbind", "page globals installed");
    Ok(window)
}

fn link_self(
    _window: Ref<Window>,
    obj: ObjectRef,
    ctx: &ExecutionContext,
) -> Result<(), NativeError> {
    ctx.define_field(obj, "self", Value::Object(obj));
    Ok(())
}

pub fn module() -> Module {
    let mut module = Module::new();
    module
        .class::<Window>()
        .getter("document", Window::document)
        .getter("console", Window::console)
        .on_attach(link_self)
        .build();
    module
}
