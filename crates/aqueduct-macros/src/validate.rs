//! Validation for `#[derive(PropertyData)]`.
//!
//! Everything that can be decided from the syntax is checked here so that
//! errors point at the offending token. Field types and padding are checked
//! by the generated code instead.

use syn::{Data, DeriveInput, Fields, Ident, Type};

/// A struct that passed validation.
pub struct Layout<'a> {
    pub name: &'a Ident,
    pub field_types: Vec<&'a Type>,
}

pub fn validate(input: &DeriveInput) -> syn::Result<Layout<'_>> {
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(_) => {
            return Err(syn::Error::new_spanned(
                name,
                "PropertyData cannot be derived for enums; use a repr(u32) newtype struct instead",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                name,
                "PropertyData cannot be derived for unions",
            ));
        }
    };

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "PropertyData cannot be derived for generic types",
        ));
    }

    check_repr(input)?;

    let field_types: Vec<&Type> = match fields {
        Fields::Named(named) => named.named.iter().map(|f| &f.ty).collect(),
        Fields::Unnamed(unnamed) => unnamed.unnamed.iter().map(|f| &f.ty).collect(),
        Fields::Unit => Vec::new(),
    };
    if field_types.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "PropertyData requires at least one field",
        ));
    }

    Ok(Layout { name, field_types })
}

/// Require `#[repr(C)]` or `#[repr(transparent)]`; reject `packed`, whose
/// fields cannot be borrowed.
fn check_repr(input: &DeriveInput) -> syn::Result<()> {
    let mut stable_layout = false;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("repr")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("C") || meta.path.is_ident("transparent") {
                stable_layout = true;
            } else if meta.path.is_ident("packed") {
                return Err(meta.error("PropertyData types must not be packed"));
            } else if meta.path.is_ident("align") {
                // `align(N)` takes an argument; consume it.
                let content;
                syn::parenthesized!(content in meta.input);
                content.parse::<syn::LitInt>()?;
            }
            Ok(())
        })?;
    }

    if !stable_layout {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "PropertyData requires #[repr(C)] or #[repr(transparent)]",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(tokens: proc_macro2::TokenStream) -> DeriveInput {
        syn::parse2(tokens).unwrap()
    }

    #[test]
    fn test_accepts_repr_c_struct() {
        let input = parse(quote::quote! {
            #[repr(C)]
            struct Range { first: u32, count: u32 }
        });
        let layout = validate(&input).unwrap();
        assert_eq!(layout.name, "Range");
        assert_eq!(layout.field_types.len(), 2);
    }

    #[test]
    fn test_accepts_transparent_tuple_struct() {
        let input = parse(quote::quote! {
            #[repr(transparent)]
            struct Frames(u32);
        });
        assert!(validate(&input).is_ok());
    }

    #[test]
    fn test_rejects_missing_repr() {
        let input = parse(quote::quote! {
            struct Range { first: u32 }
        });
        let err = validate(&input).err().unwrap();
        assert!(err.to_string().contains("repr(C)"));
    }

    #[test]
    fn test_rejects_packed() {
        let input = parse(quote::quote! {
            #[repr(C, packed)]
            struct Range { first: u8, count: u32 }
        });
        let err = validate(&input).err().unwrap();
        assert!(err.to_string().contains("packed"));
    }

    #[test]
    fn test_rejects_enum_and_generics() {
        let input = parse(quote::quote! {
            #[repr(u32)]
            enum Mode { A, B }
        });
        assert!(validate(&input).is_err());

        let input = parse(quote::quote! {
            #[repr(C)]
            struct Wrapper<T> { value: T }
        });
        let err = validate(&input).err().unwrap();
        assert!(err.to_string().contains("generic"));
    }

    #[test]
    fn test_rejects_unit_struct() {
        let input = parse(quote::quote! {
            #[repr(C)]
            struct Nothing;
        });
        assert!(validate(&input).is_err());
    }
}
