extern crate proc_macro;

use itertools::izip;
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DataEnum, DeriveInput, Fields, GenericParam,
    Generics, Ident, Index, Member,
};

/// Field attributes parsed from `#[wire(...)]`.
#[derive(Debug, Default, Clone, Copy)]
struct FieldAttributes {
    /// Not written; decoded as `Default::default()`.
    skip: bool,
}

fn get_field_attributes(attrs: &[Attribute]) -> syn::Result<FieldAttributes> {
    let mut parsed = FieldAttributes::default();
    for attr in attrs {
        if !attr.path().is_ident("wire") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                parsed.skip = true;
                Ok(())
            } else {
                Err(meta.error("unsupported wire attribute; expected `skip`"))
            }
        })?;
    }
    Ok(parsed)
}

/// Derives `wirepack::Formattable`.
///
/// - Structs (named, tuple or unit) become plain objects: `[ArrayHeader, member count, members]`
///   with members in declaration order. `#[wire(skip)]` leaves a member off the wire.
/// - Fieldless enums are written as their discriminant at the width of `#[repr(..)]`. With no
///   integer repr the width is `i32`, widened to `i64` when a discriminant does not fit in `i32`.
#[proc_macro_derive(Formattable, attributes(wire))]
pub fn derive_formattable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let expanded = match &input.data {
        Data::Struct(s) => derive_struct(&input, &s.fields),
        Data::Enum(e) => derive_enum(&input, e),
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input.ident,
            "Formattable cannot be derived for unions",
        )),
    };
    expanded
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Adds `T: Formattable` for every type parameter.
fn add_formattable_bounds(mut generics: Generics) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(ty) = param {
            ty.bounds.push(parse_quote!(::wirepack::Formattable));
        }
    }
    generics
}

struct WireMember {
    member: Member,
    ty: syn::Type,
    attrs: FieldAttributes,
}

fn collect_members(fields: &Fields) -> syn::Result<Vec<WireMember>> {
    fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let member = match &f.ident {
                Some(ident) => Member::Named(ident.clone()),
                None => Member::Unnamed(Index {
                    index: i as u32,
                    span: Span::call_site(),
                }),
            };
            Ok(WireMember {
                member,
                ty: f.ty.clone(),
                attrs: get_field_attributes(&f.attrs)?,
            })
        })
        .collect()
}

fn derive_struct(input: &DeriveInput, fields: &Fields) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let members = collect_members(fields)?;

    let generics = add_formattable_bounds(input.generics.clone());
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let turbofish = ty_generics.as_turbofish();
    // The formatter struct carries the type's own generics so bounds declared on it still hold.
    let decl_generics = &input.generics;
    let decl_where = &input.generics.where_clause;

    let kept: Vec<&WireMember> = members.iter().filter(|m| !m.attrs.skip).collect();
    let count = kept.len();
    let slots: Vec<Ident> = (0..count).map(|i| format_ident!("__m{}", i)).collect();
    let locals: Vec<Ident> = (0..count).map(|i| format_ident!("__v{}", i)).collect();
    let kept_members: Vec<&Member> = kept.iter().map(|m| &m.member).collect();
    let kept_tys: Vec<&syn::Type> = kept.iter().map(|m| &m.ty).collect();

    let mut serialize_members = Vec::new();
    let mut length_members = Vec::new();
    let mut default_lengths = Vec::new();
    let mut deserialize_members = Vec::new();
    for (slot, member, local) in izip!(&slots, &kept_members, &locals) {
        serialize_members.push(quote! {
            ::wirepack::Formatter::serialize(&*self.#slot, writer, &value.#member)?;
        });
        length_members.push(quote! {
            + ::wirepack::Formatter::length(&*self.#slot, &value.#member)?
        });
        default_lengths.push(quote! {
            + ::wirepack::Formatter::default_length(&*self.#slot)
        });
        deserialize_members.push(quote! {
            let #local = ::wirepack::Formatter::deserialize(&*self.#slot, reader)?;
        });
    }

    // Rebuild the value in declaration order, filling skipped members with defaults.
    let mut next_local = locals.iter();
    let mut inits = Vec::new();
    for m in &members {
        let init = if m.attrs.skip {
            quote! { ::std::default::Default::default() }
        } else {
            let local = next_local
                .next()
                .ok_or_else(|| syn::Error::new_spanned(name, "member bookkeeping out of sync"))?;
            quote! { #local }
        };
        inits.push((m.member.clone(), init));
    }
    let construct = match fields {
        Fields::Named(_) => {
            let fields = inits.iter().map(|(member, init)| quote! { #member: #init });
            quote! { #name { #(#fields,)* } }
        }
        Fields::Unnamed(_) => {
            let values = inits.iter().map(|(_, init)| init);
            quote! { #name(#(#values,)*) }
        }
        Fields::Unit => quote! { #name },
    };

    Ok(quote! {
        const _: () = {
            struct __WireObjectFormatter #decl_generics #decl_where {
                #(#slots: ::std::sync::Arc<dyn ::wirepack::Formatter<#kept_tys>>,)*
                __marker: ::std::marker::PhantomData<fn() -> #name #ty_generics>,
            }

            #[allow(unused_variables)]
            impl #impl_generics ::wirepack::Formatter<#name #ty_generics>
                for __WireObjectFormatter #ty_generics #where_clause
            {
                fn serialize(
                    &self,
                    writer: &mut ::wirepack::BufferWriter<'_>,
                    value: &#name #ty_generics,
                ) -> ::wirepack::Result<()> {
                    let _guard = ::wirepack::depth::enter()?;
                    ::wirepack::object::write_header(writer, #count)?;
                    #(#serialize_members)*
                    ::std::result::Result::Ok(())
                }

                fn deserialize(
                    &self,
                    reader: &mut ::wirepack::BufferReader<'_>,
                ) -> ::wirepack::Result<#name #ty_generics> {
                    let _guard = ::wirepack::depth::enter()?;
                    ::wirepack::object::read_header(reader, #count, #name_str)?;
                    #(#deserialize_members)*
                    ::std::result::Result::Ok(#construct)
                }

                fn length(&self, value: &#name #ty_generics) -> ::wirepack::Result<usize> {
                    let _guard = ::wirepack::depth::enter()?;
                    ::std::result::Result::Ok(::wirepack::object::header_length() #(#length_members)*)
                }

                fn default_length(&self) -> usize {
                    ::wirepack::object::header_length() #(#default_lengths)*
                }
            }

            impl #impl_generics ::wirepack::Formattable for #name #ty_generics #where_clause {
                const KIND: ::wirepack::TypeKind = ::wirepack::TypeKind::Object;

                fn build_formatter(
                    resolver: &::wirepack::Resolver,
                ) -> ::wirepack::Result<::std::sync::Arc<dyn ::wirepack::Formatter<Self>>> {
                    ::std::result::Result::Ok(::std::sync::Arc::new(__WireObjectFormatter #turbofish {
                        #(#slots: resolver.get_formatter::<#kept_tys>()?,)*
                        __marker: ::std::marker::PhantomData,
                    }))
                }
            }
        };
    })
}

/// Reads the integer type from `#[repr(..)]`. Returns the type and its `EnumRepr` variant.
fn enum_repr(attrs: &[Attribute]) -> syn::Result<Option<(Ident, Ident)>> {
    let mut repr = None;
    for attr in attrs {
        if !attr.path().is_ident("repr") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if let Some(ident) = meta.path.get_ident() {
                let variant = match ident.to_string().as_str() {
                    "u8" => Some("U8"),
                    "u16" => Some("U16"),
                    "u32" => Some("U32"),
                    "u64" | "usize" => Some("U64"),
                    "i8" => Some("I8"),
                    "i16" => Some("I16"),
                    "i32" => Some("I32"),
                    "i64" | "isize" => Some("I64"),
                    "u128" | "i128" => {
                        return Err(meta.error("128-bit enum discriminants are not supported"))
                    }
                    _ => None,
                };
                if let Some(variant) = variant {
                    repr = Some((ident.clone(), Ident::new(variant, ident.span())));
                }
            }
            // `align(..)` and friends carry arguments; consume them.
            if meta.input.peek(syn::token::Paren) {
                let _content;
                syn::parenthesized!(_content in meta.input);
            }
            Ok(())
        })?;
    }
    Ok(repr)
}

fn derive_enum(input: &DeriveInput, data: &DataEnum) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "Formattable can only be derived for enums whose variants have no fields",
            ));
        }
    }
    let variants: Vec<&Ident> = data.variants.iter().map(|v| &v.ident).collect();

    // Without a `#[repr]` the discriminant type is `isize`. The wire width is `i32` unless some
    // discriminant does not fit, in which case it is `i64`.
    let (repr_ty, repr_const) = match enum_repr(&input.attrs)? {
        Some((repr_ty, repr_variant)) => (repr_ty, quote!(::wirepack::EnumRepr::#repr_variant)),
        None => (
            Ident::new("isize", Span::call_site()),
            quote! {
                if true #(&& (Self::#variants as isize) == (Self::#variants as isize as i32 as isize))* {
                    ::wirepack::EnumRepr::I32
                } else {
                    ::wirepack::EnumRepr::I64
                }
            },
        ),
    };

    Ok(quote! {
        impl #impl_generics ::wirepack::WireEnum for #name #ty_generics #where_clause {
            const REPR: ::wirepack::EnumRepr = #repr_const;
            const NAME: &'static str = #name_str;

            fn to_bits(&self) -> u64 {
                match *self {
                    #(Self::#variants => Self::#variants as #repr_ty as u64,)*
                }
            }

            fn from_bits(bits: u64) -> ::std::option::Option<Self> {
                #(
                    if bits == Self::#variants as #repr_ty as u64 {
                        return ::std::option::Option::Some(Self::#variants);
                    }
                )*
                ::std::option::Option::None
            }
        }

        impl #impl_generics ::wirepack::Formattable for #name #ty_generics #where_clause {
            const KIND: ::wirepack::TypeKind = ::wirepack::TypeKind::Enum;

            fn build_formatter(
                _resolver: &::wirepack::Resolver,
            ) -> ::wirepack::Result<::std::sync::Arc<dyn ::wirepack::Formatter<Self>>> {
                ::std::result::Result::Ok(::std::sync::Arc::new(
                    ::wirepack::EnumFormatter::<Self>::new(),
                ))
            }
        }
    })
}
