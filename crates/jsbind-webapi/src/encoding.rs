//! `TextEncoder`, `btoa` and `atob`.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

use jsbind::{Class, ExecutionContext, Module, NativeError, TypedArray};

use crate::exception::{INVALID_CHARACTER_ERROR, throw};

/// Stateless; instances carry no native data.
#[derive(Class, Debug, Default, Clone, Copy)]
pub struct TextEncoder;

impl TextEncoder {
    pub fn encoding(&self) -> String {
        "utf-8".to_string()
    }

    pub fn encode(&self, input: Option<String>) -> TypedArray<u8> {
        TypedArray(input.unwrap_or_default().into_bytes())
    }
}

/// Base64 of a string whose code points are all at most U+00FF.
pub fn btoa(data: String, ctx: &ExecutionContext) -> Result<String, NativeError> {
    let bytes = data
        .chars()
        .map(|c| u8::try_from(u32::from(c)))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| {
            throw(
                ctx,
                INVALID_CHARACTER_ERROR,
                "the string contains characters outside of the Latin1 range",
            )
        })?;
    Ok(STANDARD.encode(bytes))
}

/// Decode base64, ignoring ASCII whitespace. Padding is optional.
pub fn atob(data: String, ctx: &ExecutionContext) -> Result<String, NativeError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let decoded = if compact.len() % 4 == 0 {
        STANDARD.decode(&compact)
    } else {
        STANDARD_NO_PAD.decode(&compact)
    };
    let bytes = decoded.map_err(|_| {
        throw(ctx, INVALID_CHARACTER_ERROR, "the string is not correctly encoded")
    })?;
    Ok(bytes.into_iter().map(char::from).collect())
}

pub fn module() -> Module {
    let mut module = Module::new();
    module
        .class::<TextEncoder>()
        .constructor(|| TextEncoder)
        .getter("encoding", TextEncoder::encoding)
        .method("encode", TextEncoder::encode)
        .build();
    module.function("btoa", btoa);
    module.function("atob", atob);
    module
}
