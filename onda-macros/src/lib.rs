use darling::Error;
use darling::ast::NestedMeta;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, Index, ItemStruct, Member, parse_macro_input};

use proc_macro::TokenStream;

/// Serialises every field in declaration order, in either byte order.
#[proc_macro_derive(ToBytes)]
pub fn derive_to_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match record_members(&input) {
        Ok(members) => field_writers(&input.ident, &members).into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn record_members(input: &DeriveInput) -> syn::Result<Vec<Member>> {
    let Data::Struct(record) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "ToBytes can only be derived for structs",
        ));
    };
    let members = match &record.fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter_map(|field| field.ident.clone().map(Member::Named))
            .collect(),
        Fields::Unnamed(unnamed) => (0..unnamed.unnamed.len())
            .map(|i| Member::Unnamed(Index::from(i)))
            .collect(),
        Fields::Unit => Vec::new(),
    };
    Ok(members)
}

fn field_writers(name: &Ident, members: &[Member]) -> proc_macro2::TokenStream {
    quote! {
        impl crate::byteorder::WriteBytesBe for #name {
            fn write_be(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesBe::write_be(&self.#members, dst); )*
            }
        }

        impl crate::byteorder::WriteBytesLe for #name {
            fn write_le(&self, dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesLe::write_le(&self.#members, dst); )*
            }
        }
    }
}

/// Implements `crate::byteorder::Chunk` for a `ToBytes` struct.
///
/// `#[chunk_type(b"COMM")]` serialises big-endian (IFF);
/// `#[chunk_type(b"fmt ", le)]` serialises little-endian (RIFF).
#[proc_macro_attribute]
pub fn chunk_type(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };

    let Some(first) = args.first() else {
        return TokenStream::from(Error::custom("chunk_type expects a chunk id").write_errors());
    };

    let id_bytes = match first {
        NestedMeta::Lit(syn::Lit::ByteStr(bs)) => bs.value(),
        other => {
            return TokenStream::from(
                syn::Error::new_spanned(other, "chunk_type expects a byte string, e.g. b\"COMM\"")
                    .to_compile_error(),
            );
        }
    };

    if id_bytes.len() != 4 {
        return TokenStream::from(
            syn::Error::new_spanned(first, "chunk_type expects 4 bytes").to_compile_error(),
        );
    }

    let little_endian = match args.get(1) {
        None => false,
        Some(NestedMeta::Meta(syn::Meta::Path(p))) if p.is_ident("le") => true,
        Some(NestedMeta::Meta(syn::Meta::Path(p))) if p.is_ident("be") => false,
        Some(other) => {
            return TokenStream::from(
                syn::Error::new_spanned(other, "expected `le` or `be`").to_compile_error(),
            );
        }
    };

    let id_tokens = quote! {[#(#id_bytes),*]};

    let (byte_order, write_data) = if little_endian {
        (
            quote! { crate::byteorder::ByteOrder::Little },
            quote! { crate::byteorder::WriteBytesLe::write_le(self, &mut vec); },
        )
    } else {
        (
            quote! { crate::byteorder::ByteOrder::Big },
            quote! { crate::byteorder::WriteBytesBe::write_be(self, &mut vec); },
        )
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let expanded = quote! {
        #input

        impl crate::byteorder::Chunk for #name {
            const BYTE_ORDER: crate::byteorder::ByteOrder = #byte_order;

            fn chunk_id(&self) -> &[u8; 4] {
                const ID: [u8; 4] = #id_tokens;
                &ID
            }

            fn chunk_data(&self) -> Vec<u8> {
                let mut vec = Vec::new();
                #write_data
                vec
            }
        }
    };
    TokenStream::from(expanded)
}
