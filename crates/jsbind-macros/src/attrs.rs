//! Attribute parsing for `#[jsbind(...)]`.

use syn::{Attribute, LitStr};

/// Category names accepted by `#[jsbind(category = "...")]`, paired with the
/// `Category` variant they expand to.
const CATEGORIES: &[(&str, &str)] = &[
    ("array", "Array"),
    ("map", "Map"),
    ("set", "Set"),
    ("weakmap", "WeakMap"),
    ("weakset", "WeakSet"),
    ("promise", "Promise"),
    ("iterator", "Iterator"),
    ("generator", "Generator"),
    ("date", "Date"),
    ("regexp", "RegExp"),
    ("error", "Error"),
    ("typedarray", "TypedArray"),
    ("arraybuffer", "ArrayBuffer"),
    ("dataview", "DataView"),
    ("proxy", "Proxy"),
    ("node", "Node"),
];

/// Parsed `#[jsbind(...)]` attributes on a type.
#[derive(Debug, Default)]
pub struct TypeAttrs {
    /// Script-visible name (default: Rust type name)
    pub name: Option<String>,
    /// `Category` variant name, already validated
    pub category: Option<String>,
}

impl TypeAttrs {
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut result = TypeAttrs::default();

        for attr in attrs {
            if !attr.path().is_ident("jsbind") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: LitStr = meta.value()?.parse()?;
                    result.name = Some(value.value());
                    Ok(())
                } else if meta.path.is_ident("category") {
                    let value: LitStr = meta.value()?.parse()?;
                    let variant = category_variant(&value.value()).ok_or_else(|| {
                        syn::Error::new(
                            value.span(),
                            format!("unknown category: {}", value.value()),
                        )
                    })?;
                    result.category = Some(variant.to_string());
                    Ok(())
                } else {
                    Err(meta.error(format!(
                        "unknown jsbind type attribute: {}",
                        meta.path.get_ident().map(|i| i.to_string()).unwrap_or_default()
                    )))
                }
            })?;
        }

        Ok(result)
    }
}

/// Parsed `#[jsbind(...)]` attributes on a field or variant.
#[derive(Debug, Default)]
pub struct MemberAttrs {
    /// This field holds the prototype (classes only)
    pub proto: bool,
    /// Script-visible name override
    pub rename: Option<String>,
}

impl MemberAttrs {
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut result = MemberAttrs::default();

        for attr in attrs {
            if !attr.path().is_ident("jsbind") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("proto") {
                    result.proto = true;
                    Ok(())
                } else if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    result.rename = Some(value.value());
                    Ok(())
                } else {
                    Err(meta.error(format!(
                        "unknown jsbind member attribute: {}",
                        meta.path.get_ident().map(|i| i.to_string()).unwrap_or_default()
                    )))
                }
            })?;
        }

        Ok(result)
    }
}

fn category_variant(name: &str) -> Option<&'static str> {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    CATEGORIES
        .iter()
        .find(|(key, _)| *key == normalized)
        .map(|(_, variant)| *variant)
}

/// `first_child` -> `firstChild`
pub fn camel_case(name: &str) -> String {
    let name = name.strip_prefix("r#").unwrap_or(name);
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `NoReferrer` -> `no-referrer`
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
