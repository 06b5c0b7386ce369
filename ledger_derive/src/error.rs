//! Derive macro for error enums and structs.
//!
//! ```ignore
//! #[derive(Debug, Error)]
//! pub enum ChainError {
//!     #[error("block {0} not found")]
//!     BlockNotFound(u64),
//!
//!     #[error("invalid block number: expected {expected}, got {actual}")]
//!     InvalidBlockNum { expected: u64, actual: u64 },
//!
//!     #[error("trie: {0}")]
//!     Trie(#[from] TrieError),
//! }
//! ```
//!
//! Every variant needs an `#[error("...")]` message that mentions each of its
//! fields. A `#[from]` marker on the only field of a tuple variant adds a
//! `From` conversion and reports the field as the error's `source()`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (display, source, conversions) = match &input.data {
        Data::Enum(data) => {
            let mut display_arms = Vec::new();
            let mut source_arms = Vec::new();
            let mut conversions = Vec::new();

            for variant in &data.variants {
                let ident = &variant.ident;
                let message = message(&variant.attrs, variant)?;
                display_arms.push(display_arm(quote! { Self::#ident }, &variant.fields, &message));

                if let Some(ty) = from_field(&variant.fields)? {
                    source_arms.push(quote! {
                        Self::#ident(inner) => Some(inner as &(dyn ::std::error::Error + 'static)),
                    });
                    conversions.push(quote! {
                        impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                            fn from(inner: #ty) -> Self {
                                Self::#ident(inner)
                            }
                        }
                    });
                }
            }

            let display = quote! {
                match self {
                    #(#display_arms)*
                }
            };
            let source = if source_arms.is_empty() {
                quote! { None }
            } else {
                quote! {
                    match self {
                        #(#source_arms)*
                        _ => None,
                    }
                }
            };
            (display, source, conversions)
        }
        Data::Struct(data) => {
            let message = message(&input.attrs, &input.ident)?;
            let arm = display_arm(quote! { Self }, &data.fields, &message);
            let display = quote! {
                match self {
                    #arm
                }
            };
            (display, quote! { None }, Vec::new())
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            #[allow(unreachable_patterns)]
            fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                #source
            }
        }

        #(#conversions)*
    })
}

/// One `match` arm writing `message` with the fields bound by name.
fn display_arm(path: TokenStream2, fields: &Fields, message: &str) -> TokenStream2 {
    match fields {
        Fields::Unit => quote! {
            #path => write!(f, #message),
        },
        Fields::Unnamed(unnamed) => {
            let names: Vec<_> = (0..unnamed.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let format = positional_to_named(message, names.len());
            quote! {
                #path( #(#names),* ) => write!(f, #format, #( #names = #names ),*),
            }
        }
        Fields::Named(named) => {
            let names: Vec<_> = named.named.iter().filter_map(|f| f.ident.as_ref()).collect();
            quote! {
                #path { #(#names),* } => write!(f, #message, #( #names = #names ),*),
            }
        }
    }
}

/// Type of the single `#[from]` field of a tuple variant, if any.
fn from_field(fields: &Fields) -> syn::Result<Option<&syn::Type>> {
    let Fields::Unnamed(unnamed) = fields else {
        return Ok(None);
    };
    let marked: Vec<_> = unnamed
        .unnamed
        .iter()
        .filter(|field| field.attrs.iter().any(|a| a.path().is_ident("from")))
        .collect();

    match marked.as_slice() {
        [] => Ok(None),
        [field] if unnamed.unnamed.len() == 1 => Ok(Some(&field.ty)),
        [field, ..] => Err(syn::Error::new_spanned(
            field,
            "#[from] is only supported on a variant with exactly one field",
        )),
    }
}

/// Reads the string literal of `#[error("...")]`.
fn message<T: quote::ToTokens>(attrs: &[Attribute], target: &T) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|a| a.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            "missing #[error(\"...\")] message",
        ));
    };

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] takes a single string literal",
        )),
    }
}

/// Rewrites `{0}`, `{1:?}` into `{f0}`, `{f1:?}` so tuple fields can be passed by name.
fn positional_to_named(format: &str, count: usize) -> String {
    let mut out = format.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    out
}
