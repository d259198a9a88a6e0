//! `Node`: the tree every document is built from.
//!
//! A `Node` record is always embedded in a more specific record (`Text`,
//! `Document`, or an `Element` held by an `HTMLElement`). The node keeps a
//! pointer to itself and to that outer record, so tree operations can hand
//! out references to nodes and wrapping a node yields the script object of
//! its most specific class.

use std::cell::{Cell, RefCell};
use std::ptr;

use jsbind::{AnyRef, Class, DomainError, ExecutionContext, Module, NativeError, Ref};

use super::collections::NodeList;
use super::document::Document;
use super::element::HtmlElement;
use super::event_target::EventTarget;
use super::text::Text;
use crate::exception::{HIERARCHY_REQUEST_ERROR, INVALID_STATE_ERROR, NOT_FOUND_ERROR, domain};

pub const ELEMENT_NODE: u16 = 1;
pub const TEXT_NODE: u16 = 3;
pub const DOCUMENT_NODE: u16 = 9;

#[derive(Class)]
#[jsbind(category = "node")]
pub struct Node {
    #[jsbind(proto)]
    target: EventTarget,
    node_type: u16,
    node_name: String,
    this: Cell<Option<Ref<Node>>>,
    derived: Cell<Option<AnyRef>>,
    parent: Cell<Option<Ref<Node>>>,
    children: RefCell<Vec<Ref<Node>>>,
}

/// Move a node-derived record into the context, give it its script object
/// and link its node view back to it.
pub fn create<T: Class>(ctx: &ExecutionContext, value: T) -> Result<Ref<T>, NativeError> {
    let instance = ctx.alloc(value);
    let script = ctx.wrap(instance)?;
    let node = ctx.resolve::<Node>(&script)?;
    node.this.set(Some(node));
    node.derived.set(Some(AnyRef::from(instance)));
    Ok(instance)
}

impl Node {
    pub(crate) fn new(node_type: u16, node_name: impl Into<String>) -> Self {
        Self {
            target: EventTarget::new(),
            node_type,
            node_name: node_name.into(),
            this: Cell::new(None),
            derived: Cell::new(None),
            parent: Cell::new(None),
            children: RefCell::new(Vec::new()),
        }
    }

    pub fn node_type(&self) -> u16 {
        self.node_type
    }

    pub fn node_name(&self) -> String {
        self.node_name.clone()
    }

    pub fn event_target(&self) -> &EventTarget {
        &self.target
    }

    /// The record this node is embedded in.
    pub fn derived(&self) -> Option<AnyRef> {
        self.derived.get()
    }

    pub fn as_element(&self) -> Option<Ref<HtmlElement>> {
        self.derived.get()?.downcast::<HtmlElement>()
    }

    pub fn as_text(&self) -> Option<Ref<Text>> {
        self.derived.get()?.downcast::<Text>()
    }

    pub fn as_document(&self) -> Option<Ref<Document>> {
        self.derived.get()?.downcast::<Document>()
    }

    pub(crate) fn self_ref(&self) -> Result<Ref<Node>, DomainError> {
        self.this
            .get()
            .ok_or_else(|| domain(INVALID_STATE_ERROR, "node was not created by a document"))
    }

    fn is(&self, other: Ref<Node>) -> bool {
        ptr::eq(self, &*other)
    }

    // =========================================================================
    // Tree accessors
    // =========================================================================

    pub fn parent_node(&self) -> Option<Ref<Node>> {
        self.parent.get()
    }

    pub fn parent_element(&self) -> Option<Ref<Node>> {
        self.parent.get().filter(|p| p.node_type == ELEMENT_NODE)
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn child(&self, index: usize) -> Option<Ref<Node>> {
        self.children.borrow().get(index).copied()
    }

    pub fn child_nodes(&self) -> Vec<Ref<Node>> {
        self.children.borrow().clone()
    }

    pub fn first_child(&self) -> Option<Ref<Node>> {
        self.children.borrow().first().copied()
    }

    pub fn last_child(&self) -> Option<Ref<Node>> {
        self.children.borrow().last().copied()
    }

    pub fn has_child_nodes(&self) -> bool {
        !self.children.borrow().is_empty()
    }

    pub fn next_sibling(&self) -> Option<Ref<Node>> {
        self.sibling(1)
    }

    pub fn previous_sibling(&self) -> Option<Ref<Node>> {
        self.sibling(-1)
    }

    fn sibling(&self, step: isize) -> Option<Ref<Node>> {
        let parent = self.parent.get()?;
        let children = parent.children.borrow();
        let index = children.iter().position(|c| self.is(*c))?;
        children.get(index.checked_add_signed(step)?).copied()
    }

    /// Whether `other` is this node or one of its descendants.
    pub fn contains(&self, other: Option<Ref<Node>>) -> bool {
        let mut current = other;
        while let Some(node) = current {
            if self.is(node) {
                return true;
            }
            current = node.parent.get();
        }
        false
    }

    /// Concatenated text of every descendant text node. `None` for
    /// documents.
    pub fn text_content(&self) -> Option<String> {
        match self.node_type {
            DOCUMENT_NODE => None,
            TEXT_NODE => self.as_text().map(|t| t.data()),
            _ => {
                let mut out = String::new();
                self.collect_text(&mut out);
                Some(out)
            }
        }
    }

    fn collect_text(&self, out: &mut String) {
        for child in self.children.borrow().iter() {
            match child.as_text() {
                Some(text) => out.push_str(&text.data()),
                None => child.collect_text(out),
            }
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    pub fn append_child(&self, child: Ref<Node>) -> Result<Ref<Node>, DomainError> {
        self.insert_before(child, None)
    }

    /// Insert `child` before `reference`, or last when `reference` is
    /// `None`. A child that already has a parent is moved.
    pub fn insert_before(
        &self,
        child: Ref<Node>,
        reference: Option<Ref<Node>>,
    ) -> Result<Ref<Node>, DomainError> {
        let this = self.self_ref()?;
        if self.node_type == TEXT_NODE {
            return Err(domain(HIERARCHY_REQUEST_ERROR, "text nodes cannot have children"));
        }
        if child.node_type == DOCUMENT_NODE {
            return Err(domain(HIERARCHY_REQUEST_ERROR, "a document cannot be inserted"));
        }
        if child.contains(Some(this)) {
            return Err(domain(
                HIERARCHY_REQUEST_ERROR,
                "the new child contains the parent",
            ));
        }
        if let Some(reference) = reference {
            if !reference.parent.get().is_some_and(|p| self.is(p)) {
                return Err(domain(
                    NOT_FOUND_ERROR,
                    "the reference node is not a child of this node",
                ));
            }
        }

        if let Some(old) = child.parent.get() {
            old.children.borrow_mut().retain(|c| !Ref::ptr_eq(*c, child));
        }
        let mut children = self.children.borrow_mut();
        let index = reference
            .and_then(|r| children.iter().position(|c| Ref::ptr_eq(*c, r)))
            .unwrap_or(children.len());
        children.insert(index, child);
        child.parent.set(Some(this));
        Ok(child)
    }

    pub fn remove_child(&self, child: Ref<Node>) -> Result<Ref<Node>, DomainError> {
        let mut children = self.children.borrow_mut();
        let Some(index) = children.iter().position(|c| Ref::ptr_eq(*c, child)) else {
            return Err(domain(NOT_FOUND_ERROR, "the node is not a child of this node"));
        };
        children.remove(index);
        child.parent.set(None);
        Ok(child)
    }

    /// Detach and drop every child.
    pub fn clear_children(&self) {
        for child in self.children.borrow_mut().drain(..) {
            child.parent.set(None);
        }
    }
}

pub fn register(module: &mut Module) {
    module
        .class::<Node>()
        .getter("nodeType", Node::node_type)
        .getter("nodeName", Node::node_name)
        .getter("parentNode", Node::parent_node)
        .getter("parentElement", Node::parent_element)
        .getter("firstChild", Node::first_child)
        .getter("lastChild", Node::last_child)
        .getter("nextSibling", Node::next_sibling)
        .getter("previousSibling", Node::previous_sibling)
        .getter("textContent", Node::text_content)
        .cached_getter("childNodes", |node: &Node| -> Result<NodeList, DomainError> {
            Ok(NodeList::new(node.self_ref()?))
        })
        .method("hasChildNodes", Node::has_child_nodes)
        .method("contains", Node::contains)
        .method("appendChild", Node::append_child)
        .method("insertBefore", Node::insert_before)
        .method("removeChild", Node::remove_child)
        .constant("ELEMENT_NODE", jsbind::Constant::Int(i32::from(ELEMENT_NODE)))
        .constant("TEXT_NODE", jsbind::Constant::Int(i32::from(TEXT_NODE)))
        .constant("DOCUMENT_NODE", jsbind::Constant::Int(i32::from(DOCUMENT_NODE)))
        .most_derived(Node::derived)
        .build();
}
