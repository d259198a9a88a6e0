//! `DOMException`.
//!
//! Native code reports DOM failures as [`DomainError`]s named after the
//! exception (`NotFoundError`, `HierarchyRequestError`, ...). Classes on the
//! `EventTarget` chain map them to `DOMException` objects; free functions
//! throw one directly with [`throw`].

use jsbind::{
    Class, Constant, DomainError, ExecutionContext, Module, NativeError, ToScript,
};

pub const INDEX_SIZE_ERROR: &str = "IndexSizeError";
pub const HIERARCHY_REQUEST_ERROR: &str = "HierarchyRequestError";
pub const INVALID_CHARACTER_ERROR: &str = "InvalidCharacterError";
pub const NOT_FOUND_ERROR: &str = "NotFoundError";
pub const NOT_SUPPORTED_ERROR: &str = "NotSupportedError";
pub const INVALID_STATE_ERROR: &str = "InvalidStateError";
pub const SYNTAX_ERROR: &str = "SyntaxError";

/// Legacy numeric codes, kept for `DOMException.prototype.code`.
const LEGACY_CODES: &[(&str, &str, u16)] = &[
    (INDEX_SIZE_ERROR, "INDEX_SIZE_ERR", 1),
    (HIERARCHY_REQUEST_ERROR, "HIERARCHY_REQUEST_ERR", 3),
    ("WrongDocumentError", "WRONG_DOCUMENT_ERR", 4),
    (INVALID_CHARACTER_ERROR, "INVALID_CHARACTER_ERR", 5),
    (NOT_FOUND_ERROR, "NOT_FOUND_ERR", 8),
    (NOT_SUPPORTED_ERROR, "NOT_SUPPORTED_ERR", 9),
    (INVALID_STATE_ERROR, "INVALID_STATE_ERR", 11),
    (SYNTAX_ERROR, "SYNTAX_ERR", 12),
];

#[derive(Class, Debug, Clone, PartialEq)]
#[jsbind(name = "DOMException", category = "error")]
pub struct DomException {
    name: String,
    message: String,
}

impl DomException {
    pub fn new(message: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn name(&self) -> String {
        self.name.clone()
    }

    pub fn message(&self) -> String {
        self.message.clone()
    }

    /// 0 for names without a legacy code.
    pub fn code(&self) -> u16 {
        LEGACY_CODES
            .iter()
            .find(|(name, _, _)| *name == self.name)
            .map_or(0, |(_, _, code)| *code)
    }

    fn to_display(&self) -> String {
        if self.message.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.message)
        }
    }
}

impl From<&DomainError> for DomException {
    fn from(err: &DomainError) -> Self {
        Self::new(err.message.clone(), err.name.to_string())
    }
}

/// A thrown `DOMException`, for functions outside the `EventTarget` chain.
pub fn throw(ctx: &ExecutionContext, name: &str, message: impl Into<String>) -> NativeError {
    match DomException::new(message, name).to_script(ctx) {
        Ok(value) => NativeError::Exception(value),
        Err(err) => err,
    }
}

pub fn domain(name: &'static str, message: impl Into<String>) -> DomainError {
    DomainError::new(name, message)
}

pub fn module() -> Module {
    let mut module = Module::new();
    let mut class = module
        .class::<DomException>()
        .constructor(|message: Option<String>, name: Option<String>| {
            DomException::new(
                message.unwrap_or_default(),
                name.unwrap_or_else(|| "Error".to_string()),
            )
        })
        .getter("name", DomException::name)
        .getter("message", DomException::message)
        .getter("code", DomException::code)
        .method("toString", |e: &DomException| e.to_display());
    for (_, constant, code) in LEGACY_CODES {
        class = class.constant(constant, Constant::Int(i32::from(*code)));
    }
    class.build();
    module
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_codes() {
        assert_eq!(DomException::new("", NOT_FOUND_ERROR).code(), 8);
        assert_eq!(DomException::new("", HIERARCHY_REQUEST_ERROR).code(), 3);
        assert_eq!(DomException::new("", "AbortError").code(), 0);
    }

    #[test]
    fn display() {
        let e = DomException::new("child is missing", NOT_FOUND_ERROR);
        assert_eq!(e.to_display(), "NotFoundError: child is missing");
        assert_eq!(DomException::new("", SYNTAX_ERROR).to_display(), "SyntaxError");
    }

    #[test]
    fn from_domain_error() {
        let e = DomException::from(&domain(INVALID_STATE_ERROR, "detached"));
        assert_eq!(e.name(), "InvalidStateError");
        assert_eq!(e.message(), "detached");
    }
}
