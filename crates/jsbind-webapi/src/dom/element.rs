//! `Element` and `HTMLElement`.
//!
//! `HTMLElement` holds its `Element` record behind a box rather than
//! embedding it, so resolving an `HTMLElement` object as an `Element` or a
//! `Node` goes through one pointer hop.

use std::cell::{Cell, RefCell};

use jsbind::{
    Class, ExecutionContext, Invocation, Module, NativeError, Record, Ref, Union, Value,
};

use super::collections::HtmlCollection;
use super::node::{self, ELEMENT_NODE, Node};
use super::text::Text;
use crate::exception::{INVALID_CHARACTER_ERROR, domain};

#[derive(Class)]
#[jsbind(category = "node")]
pub struct Element {
    #[jsbind(proto)]
    node: Node,
    local_name: String,
    attributes: RefCell<Vec<(String, String)>>,
}

/// Argument of `append`: nodes are inserted as they are, strings become
/// text nodes.
#[derive(Union)]
pub enum NodeOrString {
    Node(Ref<Node>),
    Text(String),
}

/// Second argument of `document.createElement`.
#[derive(Record, Debug, Default)]
pub struct ElementCreationOptions {
    pub is: Option<String>,
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

impl Element {
    pub(crate) fn new(local_name: &str) -> Result<Self, NativeError> {
        if !valid_name(local_name) {
            return Err(domain(
                INVALID_CHARACTER_ERROR,
                format!("'{local_name}' is not a valid element name"),
            )
            .into());
        }
        let local_name = local_name.to_ascii_lowercase();
        Ok(Self {
            node: Node::new(ELEMENT_NODE, local_name.to_ascii_uppercase()),
            local_name,
            attributes: RefCell::new(Vec::new()),
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn tag_name(&self) -> String {
        self.local_name.to_ascii_uppercase()
    }

    pub fn local_name(&self) -> String {
        self.local_name.clone()
    }

    pub fn get_attribute(&self, name: String) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.attributes
            .borrow()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set_attribute(&self, name: String, value: String) -> Result<(), NativeError> {
        if !valid_name(&name) {
            return Err(domain(
                INVALID_CHARACTER_ERROR,
                format!("'{name}' is not a valid attribute name"),
            )
            .into());
        }
        let name = name.to_ascii_lowercase();
        let mut attributes = self.attributes.borrow_mut();
        match attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => attributes.push((name, value)),
        }
        Ok(())
    }

    pub fn remove_attribute(&self, name: String) {
        let name = name.to_ascii_lowercase();
        self.attributes.borrow_mut().retain(|(n, _)| *n != name);
    }

    pub fn has_attribute(&self, name: String) -> bool {
        self.get_attribute(name).is_some()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.borrow().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn id(&self) -> String {
        self.get_attribute("id".into()).unwrap_or_default()
    }

    pub fn set_id(&self, id: String) {
        let _ = self.set_attribute("id".into(), id);
    }

    pub fn class_name(&self) -> String {
        self.get_attribute("class".into()).unwrap_or_default()
    }

    pub fn set_class_name(&self, class: String) {
        let _ = self.set_attribute("class".into(), class);
    }

    /// Element children only, in tree order.
    pub fn element_children(&self) -> Vec<Ref<Node>> {
        self.node
            .child_nodes()
            .into_iter()
            .filter(|c| c.node_type() == ELEMENT_NODE)
            .collect()
    }

    /// Depth-first search of the subtree for an `id` attribute.
    pub fn find_by_id(&self, id: &str) -> Option<Ref<Node>> {
        find_by_id(&self.node, id)
    }

    /// Append nodes and strings in order.
    pub fn append(
        &self,
        items: Vec<NodeOrString>,
        ctx: &ExecutionContext,
    ) -> Result<(), NativeError> {
        for item in items {
            let child = match item {
                NodeOrString::Node(node) => node,
                NodeOrString::Text(data) => Text::create(ctx, data)?.node().self_ref()?,
            };
            self.node.append_child(child)?;
        }
        Ok(())
    }
}

pub(crate) fn find_by_id(root: &Node, id: &str) -> Option<Ref<Node>> {
    for child in root.child_nodes() {
        if let Some(element) = child.as_element() {
            if element.element().get_attribute("id".into()).as_deref() == Some(id) {
                return Some(child);
            }
        }
        if let Some(found) = find_by_id(&child, id) {
            return Some(found);
        }
    }
    None
}

#[derive(Class)]
#[jsbind(name = "HTMLElement", category = "node")]
pub struct HtmlElement {
    #[jsbind(proto)]
    element: Box<Element>,
    hidden: Cell<bool>,
    title: RefCell<String>,
    custom: Option<String>,
}

impl HtmlElement {
    pub fn create(
        ctx: &ExecutionContext,
        local_name: &str,
        options: ElementCreationOptions,
    ) -> Result<Ref<HtmlElement>, NativeError> {
        let element = Element::new(local_name)?;
        node::create(
            ctx,
            HtmlElement {
                element: Box::new(element),
                hidden: Cell::new(false),
                title: RefCell::new(String::new()),
                custom: options.is,
            },
        )
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn node(&self) -> &Node {
        &self.element.node
    }

    pub fn hidden(&self) -> bool {
        self.hidden.get()
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.set(hidden);
    }

    pub fn title(&self) -> String {
        self.title.borrow().clone()
    }

    pub fn set_title(&self, title: String) {
        *self.title.borrow_mut() = title;
    }

    /// The `is` value the element was created with.
    pub fn custom_name(&self) -> Option<String> {
        self.custom.clone()
    }
}

fn click(inv: &Invocation<'_>) -> Result<Value, NativeError> {
    let element = inv.this_ref::<HtmlElement>()?;
    if element.hidden() {
        return Ok(Value::Undefined);
    }
    element
        .node()
        .event_target()
        .dispatch(inv.ctx(), inv.this(), "click")?;
    Ok(Value::Undefined)
}

pub fn register(module: &mut Module) {
    module
        .class::<Element>()
        .getter("tagName", Element::tag_name)
        .getter("localName", Element::local_name)
        .accessor("id", Element::id, Element::set_id)
        .accessor("className", Element::class_name, Element::set_class_name)
        .method("getAttribute", Element::get_attribute)
        .method("setAttribute", Element::set_attribute)
        .method("removeAttribute", Element::remove_attribute)
        .method("hasAttribute", Element::has_attribute)
        .method("getAttributeNames", Element::attribute_names)
        .method("append", Element::append)
        .cached_getter(
            "children",
            |element: &Element| -> Result<HtmlCollection, NativeError> {
                Ok(HtmlCollection::new(element.node.self_ref()?))
            },
        )
        .most_derived(|element: &Element| element.node.derived())
        .build();

    module
        .class::<HtmlElement>()
        .accessor("hidden", HtmlElement::hidden, HtmlElement::set_hidden)
        .accessor("title", HtmlElement::title, HtmlElement::set_title)
        .method_raw("click", 0, click)
        .build();
}
