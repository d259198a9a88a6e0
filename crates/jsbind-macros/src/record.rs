//! Implementation of `#[derive(Record)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

use crate::attrs::{MemberAttrs, TypeAttrs, camel_case};

pub fn derive_record_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_record_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

pub(crate) fn derive_record_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "generic records are not supported",
        ));
    }
    let attrs = TypeAttrs::from_attrs(&input.attrs)?;
    if attrs.category.is_some() {
        return Err(syn::Error::new_spanned(name, "records have no category"));
    }
    let record_name = attrs.name.unwrap_or_else(|| name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut writes = Vec::with_capacity(fields.len());
    let mut reads = Vec::with_capacity(fields.len());
    for field in fields {
        let member_attrs = MemberAttrs::from_attrs(&field.attrs)?;
        if member_attrs.proto {
            return Err(syn::Error::new_spanned(field, "records have no prototype"));
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let ty = &field.ty;
        let key = member_attrs
            .rename
            .unwrap_or_else(|| camel_case(&ident.to_string()));

        writes.push(quote! {
            ctx.define_field(
                obj,
                #key,
                ::jsbind::ToScript::to_script(self.#ident, ctx)?,
            );
        });
        reads.push(quote! {
            #ident: ctx.record_field::<#ty>(obj, #key, #record_name)?
        });
    }

    Ok(quote! {
        impl ::jsbind::ToScript for #name {
            fn to_script(
                self,
                ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<::jsbind::Value, ::jsbind::NativeError> {
                let obj = ctx.new_object()?;
                #(#writes)*
                ::core::result::Result::Ok(::jsbind::Value::Object(obj))
            }
        }

        impl ::jsbind::FromScript for #name {
            fn from_script(
                value: &::jsbind::Value,
                ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<Self, ::jsbind::NativeError> {
                let obj = ctx.expect_record(value, #record_name)?;
                ::core::result::Result::Ok(Self {
                    #(#reads,)*
                })
            }

            fn probe(value: &::jsbind::Value, ctx: &::jsbind::ExecutionContext) -> ::jsbind::Probe {
                ::jsbind::marshal::probe_record(value, ctx)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_field_names() {
        let input: DeriveInput = parse_quote! {
            struct ScrollOptions {
                scroll_top: f64,
                #[jsbind(rename = "behavior")]
                mode: Option<String>,
            }
        };
        let out = derive_record_inner(&input).unwrap().to_string();
        assert!(out.contains("\"scrollTop\""));
        assert!(out.contains("\"behavior\""));
        assert!(out.contains("record_field :: < Option < String > >"));
    }

    #[test]
    fn test_tuple_struct_rejected() {
        let input: DeriveInput = parse_quote! { struct Pair(u32, u32); };
        let err = derive_record_inner(&input).unwrap_err();
        assert!(err.to_string().contains("named fields"));
    }
}
