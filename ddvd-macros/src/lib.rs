use quote::quote;
use syn::{Data, DeriveInput, Fields, Member, Type, parse_macro_input};

use proc_macro::TokenStream;

fn struct_fields(input: &DeriveInput, derive: &str) -> syn::Result<(Vec<Member>, Vec<Type>)> {
    let fields = match input.data {
        Data::Struct(ref s) => &s.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                format!("{derive} can only be derived for structs"),
            ));
        }
    };

    let members = match fields {
        Fields::Named(nf) => nf
            .named
            .iter()
            .filter_map(|f| f.ident.clone().map(Member::from))
            .collect(),
        Fields::Unnamed(uf) => uf
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, _)| syn::Index::from(i).into())
            .collect(),
        Fields::Unit => Vec::new(),
    };
    let types = fields.iter().map(|f| f.ty.clone()).collect();

    Ok((members, types))
}

#[proc_macro_derive(ToWire)]
pub fn derive_to_wire(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let (members, types) = match struct_fields(&input, "ToWire") {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.to_compile_error()),
    };

    let expanded = quote! {
        impl crate::structs::wire::WireWrite for #name {
            const WIRE_LEN: usize =
                0 #( + <#types as crate::structs::wire::WireWrite>::WIRE_LEN )*;

            fn write_wire(&self, dst: &mut Vec<u8>) {
                #( crate::structs::wire::WireWrite::write_wire(&self.#members, dst); )*
            }
        }
    };

    TokenStream::from(expanded)
}

#[proc_macro_derive(FromWire)]
pub fn derive_from_wire(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let (members, types) = match struct_fields(&input, "FromWire") {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.to_compile_error()),
    };

    let expanded = quote! {
        impl crate::structs::wire::WireRead for #name {
            fn read_wire(
                src: &mut &[u8],
            ) -> ::core::result::Result<Self, crate::utils::errors::ProtocolError> {
                Ok(Self {
                    #( #members: <#types as crate::structs::wire::WireRead>::read_wire(src)?, )*
                })
            }
        }
    };

    TokenStream::from(expanded)
}
