//! Derive macros for the ledger crate.
//!
//! - `#[derive(BinaryCodec)]` implements the crate's `Encode`/`Decode` traits
//! - `#[derive(Error)]` implements `Display`, `Error` and `#[from]` conversions

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` by visiting fields in declaration order.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `std::error::Error` from `#[error("...")]` attributes.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
