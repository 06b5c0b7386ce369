//! Derive macro for the ledger's canonical binary format.
//!
//! Fields are written in declaration order with the field type's own
//! `Encode` impl, so the wire layout of a derived type is exactly the
//! concatenation of its fields. Enums are prefixed by a one-byte tag.
//!
//! ```ignore
//! #[derive(BinaryCodec)]
//! pub struct Out {
//!     pub address: Address,
//!     pub delta: i64,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DataEnum, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "BinaryCodec cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(
                input: &mut &[u8],
            ) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Binding names used when destructuring a variant or struct.
fn bindings(fields: &Fields) -> Vec<syn::Ident> {
    match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter_map(|f| f.ident.clone())
            .collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(|i| format_ident!("f{}", i))
            .collect(),
        Fields::Unit => Vec::new(),
    }
}

/// Pattern that binds every field by reference: `{ a, b }`, `(f0, f1)` or nothing.
fn pattern(fields: &Fields, names: &[syn::Ident]) -> TokenStream2 {
    match fields {
        Fields::Named(_) => quote! { { #(#names),* } },
        Fields::Unnamed(_) => quote! { ( #(#names),* ) },
        Fields::Unit => quote! {},
    }
}

/// Constructor reading each field from `input`.
fn constructor(path: TokenStream2, fields: &Fields) -> TokenStream2 {
    match fields {
        Fields::Named(named) => {
            let names = named.named.iter().map(|f| &f.ident);
            quote! {
                #path { #( #names: crate::types::encoding::Decode::decode(input)?, )* }
            }
        }
        Fields::Unnamed(unnamed) => {
            let reads = unnamed
                .unnamed
                .iter()
                .map(|_| quote! { crate::types::encoding::Decode::decode(input)? });
            quote! { #path( #(#reads),* ) }
        }
        Fields::Unit => path,
    }
}

fn struct_bodies(fields: &Fields) -> (TokenStream2, TokenStream2) {
    let names = bindings(fields);
    let pat = pattern(fields, &names);
    let encode = if names.is_empty() {
        quote! {
            let _ = out;
        }
    } else {
        quote! {
            let Self #pat = self;
            #( crate::types::encoding::Encode::encode(#names, out); )*
        }
    };
    let ctor = constructor(quote! { Self }, fields);
    let decode = if names.is_empty() {
        quote! {
            let _ = input;
            Ok(#ctor)
        }
    } else {
        quote! { Ok(#ctor) }
    };
    (encode, decode)
}

fn enum_bodies(data: &DataEnum) -> syn::Result<(TokenStream2, TokenStream2)> {
    let tags = discriminants(data)?;

    let mut encode_arms = Vec::with_capacity(tags.len());
    let mut decode_arms = Vec::with_capacity(tags.len());

    for (variant, tag) in data.variants.iter().zip(tags) {
        let ident = &variant.ident;
        let names = bindings(&variant.fields);
        let pat = pattern(&variant.fields, &names);

        encode_arms.push(quote! {
            Self::#ident #pat => {
                crate::types::encoding::Encode::encode(&#tag, out);
                #( crate::types::encoding::Encode::encode(#names, out); )*
            }
        });

        let ctor = constructor(quote! { Self::#ident }, &variant.fields);
        decode_arms.push(quote! { #tag => Ok(#ctor), });
    }

    let encode = quote! {
        match self {
            #(#encode_arms)*
        }
    };
    let decode = quote! {
        let tag: u8 = crate::types::encoding::Decode::decode(input)?;
        match tag {
            #(#decode_arms)*
            _ => Err(crate::types::encoding::DecodeError::InvalidValue),
        }
    };
    Ok((encode, decode))
}

/// One-byte tags following Rust's discriminant rules: explicit literals are
/// honoured, implicit ones continue from the previous variant.
fn discriminants(data: &DataEnum) -> syn::Result<Vec<u8>> {
    let mut tags = Vec::with_capacity(data.variants.len());
    let mut next: Option<u8> = Some(0);

    for variant in &data.variants {
        let tag = match &variant.discriminant {
            Some((_, expr)) => literal_u8(expr)?,
            None => next.ok_or_else(|| {
                syn::Error::new_spanned(variant, "enum tag does not fit in one byte")
            })?,
        };
        tags.push(tag);
        next = tag.checked_add(1);
    }

    Ok(tags)
}

fn literal_u8(expr: &syn::Expr) -> syn::Result<u8> {
    if let syn::Expr::Lit(syn::ExprLit {
        lit: syn::Lit::Int(int),
        ..
    }) = expr
    {
        return int.base10_parse::<u8>();
    }
    Err(syn::Error::new_spanned(
        expr,
        "BinaryCodec enum discriminants must be integer literals in 0..=255",
    ))
}
