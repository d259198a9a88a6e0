//! `console`.
//!
//! Messages are kept on the console object for the embedder to read and
//! forwarded to `tracing` under the `console` target.

use std::cell::{Cell, RefCell};

use jsbind::{Class, Module};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Log,
    Info,
    Warn,
    Error,
}

#[derive(Class, Default)]
pub struct Console {
    messages: RefCell<Vec<(Level, String)>>,
    groups: Cell<usize>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }

    fn write(&self, level: Level, parts: Vec<String>) {
        let indent = "  ".repeat(self.groups.get());
        let line = format!("{indent}{}", parts.join(" "));
        match level {
            Level::Log | Level::Info => tracing::info!(target: "console", "{line}"),
            Level::Warn => tracing::warn!(target: "console", "{line}"),
            Level::Error => tracing::error!(target: "console", "{line}"),
        }
        self.messages.borrow_mut().push((level, line));
    }

    pub fn log(&self, parts: Vec<String>) {
        self.write(Level::Log, parts);
    }

    pub fn info(&self, parts: Vec<String>) {
        self.write(Level::Info, parts);
    }

    pub fn warn(&self, parts: Vec<String>) {
        self.write(Level::Warn, parts);
    }

    pub fn error(&self, parts: Vec<String>) {
        self.write(Level::Error, parts);
    }

    pub fn group(&self, label: Vec<String>) {
        if !label.is_empty() {
            self.write(Level::Log, label);
        }
        self.groups.set(self.groups.get() + 1);
    }

    pub fn group_end(&self) {
        self.groups.set(self.groups.get().saturating_sub(1));
    }
}

pub fn module() -> Module {
    let mut module = Module::new();
    module
        .class::<Console>()
        .method("log", Console::log)
        .method("info", Console::info)
        .method("warn", Console::warn)
        .method("error", Console::error)
        .method("group", Console::group)
        .method("groupEnd", Console::group_end)
        .method("clear", Console::clear)
        .finalizer(|console: &Console| {
            tracing::debug!(
                target: "console",
                messages = console.messages.borrow().len(),
                "console finalized"
            );
        })
        .hidden()
        .build();
    module
}
