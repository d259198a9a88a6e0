//! Implementation of `#[derive(Union)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

use crate::attrs::{MemberAttrs, TypeAttrs};

pub fn derive_union_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_union_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

pub(crate) fn derive_union_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "generic unions are not supported",
        ));
    }
    let union_name = TypeAttrs::from_attrs(&input.attrs)?
        .name
        .unwrap_or_else(|| name.to_string());

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Union can only be derived for enums",
        ));
    };
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(name, "a union needs at least one variant"));
    }

    let mut tys = Vec::new();
    let mut idents = Vec::new();
    for variant in &data.variants {
        let attrs = MemberAttrs::from_attrs(&variant.attrs)?;
        if attrs.proto || attrs.rename.is_some() {
            return Err(syn::Error::new_spanned(
                variant,
                "union variants take no attributes",
            ));
        }
        match &variant.fields {
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                tys.push(&fields.unnamed[0].ty);
                idents.push(&variant.ident);
            }
            _ => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "union variants must wrap exactly one value",
                ));
            }
        }
    }

    let indices: Vec<usize> = (0..idents.len()).collect();

    Ok(quote! {
        impl ::jsbind::ToScript for #name {
            fn to_script(
                self,
                ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<::jsbind::Value, ::jsbind::NativeError> {
                match self {
                    #(#name::#idents(inner) => ::jsbind::ToScript::to_script(inner, ctx),)*
                }
            }
        }

        impl ::jsbind::FromScript for #name {
            fn from_script(
                value: &::jsbind::Value,
                ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<Self, ::jsbind::NativeError> {
                let probes: &[::jsbind::marshal::ProbeFn] = &[
                    #(<#tys as ::jsbind::FromScript>::probe,)*
                ];
                match ::jsbind::marshal::select_variant(probes, value, ctx) {
                    #(::core::option::Option::Some(#indices) => ::core::result::Result::Ok(
                        #name::#idents(<#tys as ::jsbind::FromScript>::from_script(value, ctx)?)
                    ),)*
                    _ => ::core::result::Result::Err(
                        ::jsbind::ConversionError::NoMatchingVariant {
                            union: #union_name,
                            found: value.type_name(),
                        }
                        .into(),
                    ),
                }
            }

            fn probe(value: &::jsbind::Value, ctx: &::jsbind::ExecutionContext) -> ::jsbind::Probe {
                let probes: &[::jsbind::marshal::ProbeFn] = &[
                    #(<#tys as ::jsbind::FromScript>::probe,)*
                ];
                probes
                    .iter()
                    .map(|probe| probe(value, ctx))
                    .max()
                    .unwrap_or(::jsbind::Probe::Invalid)
            }
        }
    })
}
