//! Code generation for `#[derive(PropertyData)]`.

use proc_macro2::TokenStream;
use quote::quote;

use crate::validate::Layout;

pub fn generate(layout: &Layout<'_>) -> TokenStream {
    let name = layout.name;
    let field_types = &layout.field_types;
    let message = format!(
        "`{}` has padding bytes; PropertyData types must be tightly laid out",
        name
    );

    quote! {
        const _: () = {
            fn assert_property_data<T: ::aqueduct::core::property::PropertyData>() {}
            #[allow(dead_code)]
            fn assert_fields() {
                #( assert_property_data::<#field_types>(); )*
            }

            assert!(
                ::core::mem::size_of::<#name>()
                    == 0 #( + ::core::mem::size_of::<#field_types>() )*,
                #message
            );
        };

        // SAFETY: repr(C)/transparent, no padding, every field is PropertyData.
        unsafe impl ::aqueduct::core::property::PropertyData for #name {}
    }
}
