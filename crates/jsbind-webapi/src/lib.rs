//! DOM and Web API classes bound through jsbind.
//!
//! - **dom** - `EventTarget`, `Node`, `Element`, `HTMLElement`, `Text`,
//!   `Document`, `NodeList`, `HTMLCollection`
//! - **exception** - `DOMException`
//! - **console** - `console.log` and friends
//! - **encoding** - `TextEncoder`, `btoa`, `atob`
//! - **window** - `Window` and the page globals
//!
//! # Usage
//!
//! Each area provides a function returning a `Module`; [`install`] adds all
//! of them to an environment builder:
//!
//! ```ignore
//! let env = jsbind_webapi::install(Env::builder()).build()?;
//! let ctx = env.create_context(ContextOptions::default());
//! let window = jsbind_webapi::bootstrap(&ctx)?;
//! ```

pub mod console;
pub mod dom;
pub mod encoding;
pub mod exception;
pub mod window;

pub use console::Console;
pub use dom::{Document, Element, EventTarget, HtmlElement, Node, Text};
pub use exception::DomException;
pub use window::{Window, bootstrap};

use jsbind::{EnvBuilder, Module};

/// Every module of this crate, in dependency order.
pub fn modules() -> Vec<Module> {
    vec![
        exception::module(),
        dom::module(),
        console::module(),
        encoding::module(),
        window::module(),
    ]
}

pub fn install(builder: EnvBuilder) -> EnvBuilder {
    modules().into_iter().fold(builder, EnvBuilder::install)
}
