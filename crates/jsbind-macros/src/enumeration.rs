//! Implementation of `#[derive(Enumeration)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

use crate::attrs::{MemberAttrs, TypeAttrs, kebab_case};

pub fn derive_enumeration_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_enumeration_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

pub(crate) fn derive_enumeration_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let enum_name = TypeAttrs::from_attrs(&input.attrs)?
        .name
        .unwrap_or_else(|| name.to_string());

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Enumeration can only be derived for enums",
        ));
    };

    let mut idents = Vec::new();
    let mut values = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "enumeration variants cannot carry data",
            ));
        }
        let attrs = MemberAttrs::from_attrs(&variant.attrs)?;
        let value = attrs
            .rename
            .unwrap_or_else(|| kebab_case(&variant.ident.to_string()));
        if values.contains(&value) {
            return Err(syn::Error::new_spanned(
                variant,
                format!("duplicate enumeration value: {value}"),
            ));
        }
        idents.push(&variant.ident);
        values.push(value);
    }

    Ok(quote! {
        impl ::jsbind::Enumeration for #name {
            const NAME: &'static str = #enum_name;
            const VALUES: &'static [&'static str] = &[#(#values),*];

            fn as_str(&self) -> &'static str {
                match self {
                    #(#name::#idents => #values,)*
                }
            }

            fn from_str_value(value: &str) -> ::core::option::Option<Self> {
                match value {
                    #(#values => ::core::option::Option::Some(#name::#idents),)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl ::jsbind::ToScript for #name {
            fn to_script(
                self,
                _ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<::jsbind::Value, ::jsbind::NativeError> {
                ::core::result::Result::Ok(::jsbind::Value::string(
                    ::jsbind::Enumeration::as_str(&self),
                ))
            }
        }

        impl ::jsbind::FromScript for #name {
            fn from_script(
                value: &::jsbind::Value,
                _ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<Self, ::jsbind::NativeError> {
                ::jsbind::marshal::enumeration_from_script::<Self>(value)
            }

            fn probe(
                value: &::jsbind::Value,
                _ctx: &::jsbind::ExecutionContext,
            ) -> ::jsbind::Probe {
                ::jsbind::marshal::probe_enumeration::<Self>(value)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_values() {
        let input: DeriveInput = parse_quote! {
            enum DocumentReadyState {
                Loading,
                Interactive,
                #[jsbind(rename = "complete")]
                Done,
            }
        };
        let out = derive_enumeration_inner(&input).unwrap().to_string();
        assert!(out.contains("[\"loading\" , \"interactive\" , \"complete\"]"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let input: DeriveInput = parse_quote! {
            enum Mode { Open, #[jsbind(rename = "open")] Closed }
        };
        let err = derive_enumeration_inner(&input).unwrap_err();
        assert!(err.to_string().contains("duplicate enumeration value: open"));
    }

    #[test]
    fn test_data_variants_rejected() {
        let input: DeriveInput = parse_quote! { enum Mode { Open(u8) } };
        assert!(derive_enumeration_inner(&input).is_err());
    }
}
