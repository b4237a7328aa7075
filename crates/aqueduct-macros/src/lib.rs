//! Derive macros for the Aqueduct audio engine bridge.
//!
//! This crate provides `#[derive(PropertyData)]`, which marks a plain C
//! struct as safe to exchange with the engine as a property block.
//!
//! # Example
//!
//! ```ignore
//! use aqueduct::prelude::*;
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, PropertyData)]
//! pub struct ChannelRange {
//!     pub first: u32,
//!     pub count: u32,
//! }
//! ```

use proc_macro::TokenStream;

mod codegen;
mod validate;

/// Derive `PropertyData` for a `#[repr(C)]` or `#[repr(transparent)]`
/// struct.
///
/// The macro checks, at compile time, that:
/// - the type is a non-generic struct with at least one field,
/// - its layout is `repr(C)` or `repr(transparent)`,
/// - every field type implements `PropertyData`,
/// - the struct has no padding bytes.
///
/// The type must also be `Copy`.
#[proc_macro_derive(PropertyData)]
pub fn derive_property_data(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    match derive_property_data_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_property_data_impl(input: syn::DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let layout = validate::validate(&input)?;
    Ok(codegen::generate(&layout))
}
