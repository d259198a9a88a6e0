//! `Document`.

use std::cell::{Cell, RefCell};

use jsbind::{Class, Enumeration, ExecutionContext, Module, NativeError, Ref};

use super::element::{ElementCreationOptions, HtmlElement, find_by_id};
use super::node::{self, DOCUMENT_NODE, Node};
use super::text::Text;

#[derive(Enumeration, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentReadyState {
    Loading,
    Interactive,
    Complete,
}

#[derive(Class)]
#[jsbind(category = "node")]
pub struct Document {
    #[jsbind(proto)]
    node: Node,
    title: RefCell<String>,
    ready_state: Cell<DocumentReadyState>,
    body: Cell<Option<Ref<HtmlElement>>>,
}

impl Document {
    /// A document with an `<html>` root holding an empty `<body>`.
    pub fn create(ctx: &ExecutionContext) -> Result<Ref<Document>, NativeError> {
        let document = node::create(
            ctx,
            Document {
                node: Node::new(DOCUMENT_NODE, "#document"),
                title: RefCell::new(String::new()),
                ready_state: Cell::new(DocumentReadyState::Loading),
                body: Cell::new(None),
            },
        )?;
        let html = HtmlElement::create(ctx, "html", ElementCreationOptions::default())?;
        let body = HtmlElement::create(ctx, "body", ElementCreationOptions::default())?;
        html.node().append_child(body.node().self_ref()?)?;
        document.node.append_child(html.node().self_ref()?)?;
        document.body.set(Some(body));
        Ok(document)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn create_element(
        &self,
        local_name: String,
        options: Option<ElementCreationOptions>,
        ctx: &ExecutionContext,
    ) -> Result<Ref<HtmlElement>, NativeError> {
        HtmlElement::create(ctx, &local_name, options.unwrap_or_default())
    }

    pub fn create_text_node(
        &self,
        data: String,
        ctx: &ExecutionContext,
    ) -> Result<Ref<Text>, NativeError> {
        Text::create(ctx, data)
    }

    pub fn document_element(&self) -> Option<Ref<Node>> {
        self.node.first_child()
    }

    pub fn body(&self) -> Option<Ref<HtmlElement>> {
        self.body.get()
    }

    pub fn get_element_by_id(&self, id: String) -> Option<Ref<Node>> {
        find_by_id(&self.node, &id)
    }

    pub fn title(&self) -> String {
        self.title.borrow().clone()
    }

    pub fn set_title(&self, title: String) {
        *self.title.borrow_mut() = title;
    }

    pub fn ready_state(&self) -> DocumentReadyState {
        self.ready_state.get()
    }

    pub fn set_ready_state(&self, state: DocumentReadyState) {
        self.ready_state.set(state);
    }
}

pub fn register(module: &mut Module) {
    module
        .class::<Document>()
        .constructor(Document::create)
        .method("createElement", Document::create_element)
        .method("createTextNode", Document::create_text_node)
        .method("getElementById", Document::get_element_by_id)
        .getter("documentElement", Document::document_element)
        .getter("body", Document::body)
        .getter("readyState", Document::ready_state)
        .accessor("title", Document::title, Document::set_title)
        .build();
}
