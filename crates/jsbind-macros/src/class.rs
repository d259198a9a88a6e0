//! Implementation of `#[derive(Class)]`.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, GenericArgument, PathArguments, Type, parse_macro_input};

use crate::attrs::{MemberAttrs, TypeAttrs};

pub fn derive_class_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_class_inner(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// How the prototype field is stored.
enum ProtoField<'a> {
    Embedded { member: TokenStream2, ty: &'a Type },
    Indirect { member: TokenStream2, field_ty: &'a Type, pointee: &'a Type },
}

pub(crate) fn derive_class_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "generic types cannot be registered as classes",
        ));
    }

    let attrs = TypeAttrs::from_attrs(&input.attrs)?;
    let js_name = attrs.name.clone().unwrap_or_else(|| name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Class can only be derived for structs",
            ));
        }
    };

    let proto = find_proto_field(fields)?;

    let mut decl = quote! {
        ::jsbind::registry::TypeDecl::of::<Self>(#js_name)
    };
    let mut checks = TokenStream2::new();
    match &proto {
        Some(ProtoField::Embedded { member, ty }) => {
            decl = quote! { #decl.embeds::<#ty>(::core::mem::offset_of!(Self, #member)) };
        }
        Some(ProtoField::Indirect { member, field_ty, pointee }) => {
            decl = quote! { #decl.points_to::<#pointee>(::core::mem::offset_of!(Self, #member)) };
            checks = quote! {
                const _: () = ::core::assert!(
                    ::core::mem::size_of::<#field_ty>() == ::core::mem::size_of::<*const u8>(),
                    "prototype pointer field must be pointer-sized"
                );
            };
        }
        None => {}
    }
    if let Some(category) = &attrs.category {
        let variant = format_ident!("{}", category);
        decl = quote! { #decl.category(::jsbind::registry::Category::#variant) };
    }

    Ok(quote! {
        impl ::jsbind::Class for #name {
            const NAME: &'static str = #js_name;

            fn declaration() -> ::jsbind::registry::TypeDecl {
                #decl
            }
        }

        impl ::jsbind::IntoInstance<#name> for #name {
            fn into_instance(
                self,
                ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<::jsbind::Ref<#name>, ::jsbind::NativeError> {
                ::core::result::Result::Ok(ctx.alloc(self))
            }
        }

        impl ::jsbind::ToScript for #name {
            fn to_script(
                self,
                ctx: &::jsbind::ExecutionContext,
            ) -> ::core::result::Result<::jsbind::Value, ::jsbind::NativeError> {
                ::jsbind::ToScript::to_script(ctx.alloc(self), ctx)
            }
        }

        #checks
    })
}

fn find_proto_field(fields: &Fields) -> syn::Result<Option<ProtoField<'_>>> {
    let mut found: Option<ProtoField<'_>> = None;

    for (index, field) in fields.iter().enumerate() {
        let attrs = MemberAttrs::from_attrs(&field.attrs)?;
        if attrs.rename.is_some() {
            return Err(syn::Error::new_spanned(
                field,
                "rename is not supported on class fields",
            ));
        }
        if !attrs.proto {
            continue;
        }
        if found.is_some() {
            return Err(syn::Error::new_spanned(
                field,
                "a class can declare only one prototype field",
            ));
        }

        let member = match &field.ident {
            Some(ident) => quote! { #ident },
            None => {
                let index = syn::Index { index: index as u32, span: Span::call_site() };
                quote! { #index }
            }
        };

        found = Some(match pointee(&field.ty)? {
            Some(pointee) => ProtoField::Indirect { member, field_ty: &field.ty, pointee },
            None => ProtoField::Embedded { member, ty: &field.ty },
        });
    }

    Ok(found)
}

/// Classify a prototype field type. `Some(P)` for pointer-shaped fields,
/// `None` for a by-value record.
fn pointee(ty: &Type) -> syn::Result<Option<&Type>> {
    match ty {
        Type::Ptr(ptr) => Ok(Some(&ptr.elem)),
        Type::Path(path) if path.qself.is_none() => {
            let Some(last) = path.path.segments.last() else {
                return Err(invalid_shape(ty));
            };
            let wrapper = last.ident.to_string();
            match wrapper.as_str() {
                "Ref" | "NonNull" | "Box" => single_type_arg(&last.arguments)
                    .map(Some)
                    .ok_or_else(|| invalid_shape(ty)),
                "Option" | "Rc" | "Arc" | "Weak" | "RefCell" | "Cell" | "Vec" => {
                    Err(invalid_shape(ty))
                }
                _ if matches!(last.arguments, PathArguments::None) => Ok(None),
                _ => Err(invalid_shape(ty)),
            }
        }
        _ => Err(invalid_shape(ty)),
    }
}

fn single_type_arg(args: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(args) = args else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first() {
        Some(GenericArgument::Type(ty)) => Some(ty),
        _ => None,
    }
}

fn invalid_shape(ty: &Type) -> syn::Error {
    syn::Error::new_spanned(
        ty,
        "prototype field must hold the prototype by value or behind \
         Ref<P>, NonNull<P>, Box<P>, *mut P or *const P",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand(input: DeriveInput) -> syn::Result<String> {
        derive_class_inner(&input).map(|tokens| tokens.to_string())
    }

    #[test]
    fn test_embedded_prototype() {
        let out = expand(parse_quote! {
            #[jsbind(name = "Element", category = "node")]
            struct Element {
                #[jsbind(proto)]
                node: Node,
                tag: String,
            }
        })
        .unwrap();
        assert!(out.contains("embeds :: < Node >"));
        assert!(out.contains("offset_of ! (Self , node)"));
        assert!(out.contains("Category :: Node"));
        assert!(out.contains("\"Element\""));
    }

    #[test]
    fn test_indirect_prototype() {
        let out = expand(parse_quote! {
            struct Window {
                #[jsbind(proto)]
                target: Ref<EventTarget>,
            }
        })
        .unwrap();
        assert!(out.contains("points_to :: < EventTarget >"));
        assert!(out.contains("size_of :: < Ref < EventTarget > >"));

        let out = expand(parse_quote! {
            struct Raw(u32, #[jsbind(proto)] *mut Base);
        })
        .unwrap();
        assert!(out.contains("points_to :: < Base >"));
        assert!(out.contains("offset_of ! (Self , 1)"));
    }

    #[test]
    fn test_bad_prototype_shapes() {
        let err = expand(parse_quote! {
            struct A<'a> { #[jsbind(proto)] base: &'a Base }
        })
        .unwrap_err();
        assert!(err.to_string().contains("generic types"));

        for input in [
            parse_quote! { struct A { #[jsbind(proto)] base: Option<Base> } },
            parse_quote! { struct A { #[jsbind(proto)] base: Rc<Base> } },
            parse_quote! { struct A { #[jsbind(proto)] base: (Base, u8) } },
            parse_quote! { struct A { #[jsbind(proto)] base: [Base; 2] } },
            parse_quote! { struct A { #[jsbind(proto)] base: &'static Base } },
        ] {
            let err = expand(input).unwrap_err();
            assert!(err.to_string().contains("prototype field must hold"));
        }
    }

    #[test]
    fn test_one_prototype_only() {
        let err = expand(parse_quote! {
            struct A {
                #[jsbind(proto)] a: Base,
                #[jsbind(proto)] b: Base,
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("only one prototype"));
    }

    #[test]
    fn test_empty_class() {
        let out = expand(parse_quote! { struct Console; }).unwrap();
        assert!(out.contains("TypeDecl :: of :: < Self > (\"Console\")"));
        assert!(!out.contains("embeds"));
    }
}
