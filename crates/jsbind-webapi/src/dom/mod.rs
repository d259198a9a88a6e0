//! The DOM tree.
//!
//! ```text
//! EventTarget
//! └── Node
//!     ├── Element ──(boxed)── HTMLElement
//!     ├── Text
//!     └── Document
//! NodeList, HTMLCollection     live views over a node's children
//! ```

mod collections;
mod document;
mod element;
mod event_target;
mod node;
mod text;

pub use collections::{HtmlCollection, NodeList, NodeListIterator};
pub use document::{Document, DocumentReadyState};
pub use element::{Element, ElementCreationOptions, HtmlElement, NodeOrString};
pub use event_target::EventTarget;
pub use node::{DOCUMENT_NODE, ELEMENT_NODE, Node, TEXT_NODE};
pub use text::Text;

use jsbind::Module;

pub fn module() -> Module {
    let mut module = Module::new();
    event_target::register(&mut module);
    node::register(&mut module);
    element::register(&mut module);
    text::register(&mut module);
    document::register(&mut module);
    collections::register(&mut module);
    module
}
