//! `Text` nodes.

use std::cell::RefCell;

use jsbind::{Class, ExecutionContext, Module, NativeError, Ref};

use super::node::{self, Node, TEXT_NODE};
use crate::exception::{INDEX_SIZE_ERROR, domain};

#[derive(Class)]
#[jsbind(category = "node")]
pub struct Text {
    #[jsbind(proto)]
    node: Node,
    data: RefCell<String>,
}

impl Text {
    pub fn create(ctx: &ExecutionContext, data: String) -> Result<Ref<Text>, NativeError> {
        node::create(
            ctx,
            Text {
                node: Node::new(TEXT_NODE, "#text"),
                data: RefCell::new(data),
            },
        )
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn data(&self) -> String {
        self.data.borrow().clone()
    }

    pub fn set_data(&self, data: String) {
        *self.data.borrow_mut() = data;
    }

    /// Length in UTF-16 code units.
    pub fn length(&self) -> u32 {
        self.data.borrow().encode_utf16().count() as u32
    }

    pub fn append_data(&self, data: String) {
        self.data.borrow_mut().push_str(&data);
    }

    /// Split at a UTF-16 offset. This node keeps the head; the tail becomes
    /// a new text node inserted after it.
    pub fn split_text(
        &self,
        offset: u32,
        ctx: &ExecutionContext,
    ) -> Result<Ref<Text>, NativeError> {
        let units: Vec<u16> = self.data.borrow().encode_utf16().collect();
        let offset = offset as usize;
        if offset > units.len() {
            return Err(domain(INDEX_SIZE_ERROR, format!("offset {offset} is past the end")).into());
        }
        let head = String::from_utf16_lossy(&units[..offset]);
        let tail = String::from_utf16_lossy(&units[offset..]);
        *self.data.borrow_mut() = head;

        let created = Text::create(ctx, tail)?;
        if let Some(parent) = self.node.parent_node() {
            let next = self.node.next_sibling();
            parent.insert_before(created.node().self_ref()?, next)?;
        }
        Ok(created)
    }
}

pub fn register(module: &mut Module) {
    module
        .class::<Text>()
        .constructor(|data: Option<String>, ctx: &ExecutionContext| {
            Text::create(ctx, data.unwrap_or_default())
        })
        .accessor("data", Text::data, Text::set_data)
        .getter("length", Text::length)
        .method("appendData", Text::append_data)
        .method("splitText", Text::split_text)
        .build();
}
