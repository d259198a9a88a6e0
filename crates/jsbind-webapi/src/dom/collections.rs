//! Live views over a node's children: `NodeList` and `HTMLCollection`.

use std::cell::Cell;

use jsbind::{Class, ExecutionContext, Function, IterResult, Module, NativeError, Ref, Value};

use super::node::{ELEMENT_NODE, Node};

#[derive(Class)]
#[jsbind(category = "array")]
pub struct NodeList {
    owner: Ref<Node>,
}

impl NodeList {
    pub fn new(owner: Ref<Node>) -> Self {
        Self { owner }
    }

    pub fn length(&self) -> u32 {
        self.owner.child_count() as u32
    }

    pub fn item(&self, index: u32) -> Option<Ref<Node>> {
        self.owner.child(index as usize)
    }

    pub fn values(&self) -> NodeListIterator {
        NodeListIterator {
            owner: self.owner,
            next: Cell::new(0),
        }
    }

    /// Call `callback(node, index, list)` for every node. The list is read
    /// again on every step, so callbacks may mutate it.
    pub fn for_each(
        &self,
        callback: Function,
        ctx: &ExecutionContext,
    ) -> Result<(), NativeError> {
        let mut index = 0;
        while let Some(node) = self.item(index) {
            let node = ctx.wrap(node)?;
            callback.call(ctx, &[node, Value::Int(index as i32)])?;
            index += 1;
        }
        Ok(())
    }
}

#[derive(Class)]
#[jsbind(category = "iterator")]
pub struct NodeListIterator {
    owner: Ref<Node>,
    next: Cell<u32>,
}

impl NodeListIterator {
    pub fn next(&self) -> IterResult<Ref<Node>> {
        let index = self.next.get();
        let item = self.owner.child(index as usize);
        if item.is_some() {
            self.next.set(index + 1);
        }
        item.into()
    }
}

#[derive(Class)]
#[jsbind(name = "HTMLCollection", category = "array")]
pub struct HtmlCollection {
    owner: Ref<Node>,
}

impl HtmlCollection {
    pub fn new(owner: Ref<Node>) -> Self {
        Self { owner }
    }

    fn elements(&self) -> impl Iterator<Item = Ref<Node>> {
        self.owner
            .child_nodes()
            .into_iter()
            .filter(|c| c.node_type() == ELEMENT_NODE)
    }

    pub fn length(&self) -> u32 {
        self.elements().count() as u32
    }

    pub fn item(&self, index: u32) -> Option<Ref<Node>> {
        self.elements().nth(index as usize)
    }

    /// First element whose `id` is `name`.
    pub fn named_item(&self, name: &str) -> Option<Ref<Node>> {
        self.elements().find(|node| {
            node.as_element()
                .is_some_and(|el| el.element().get_attribute("id".into()).as_deref() == Some(name))
        })
    }
}

pub fn register(module: &mut Module) {
    module
        .class::<NodeList>()
        .getter("length", NodeList::length)
        .method("item", NodeList::item)
        .method("forEach", NodeList::for_each)
        .iterator(NodeList::values)
        .indexed_getter(|list: &NodeList, index| list.item(index))
        .build();

    module
        .class::<NodeListIterator>()
        .method("next", NodeListIterator::next)
        .to_string_tag("NodeList Iterator")
        .hidden()
        .build();

    module
        .class::<HtmlCollection>()
        .getter("length", HtmlCollection::length)
        .method("item", HtmlCollection::item)
        .method("namedItem", |c: &HtmlCollection, name: String| c.named_item(&name))
        .indexed_getter(|c: &HtmlCollection, index| c.item(index))
        .named_getter(|c: &HtmlCollection, name: &str| c.named_item(name))
        .build();
}
