use heck::{ToShoutySnakeCase, ToUpperCamelCase};
use proc_macro2::TokenStream;
use proc_macro_error2::{abort, emit_error};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, spanned::Spanned};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadWrite,
    ReadOnly,
    Nested,
}

/// One registered field.
struct QueryField {
    ident: Ident,
    ty: Type,
    /// Queryable name
    name: String,
    access: Access,
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
    read_only: bool,
    nested: bool,
}

/// Parse `#[query(...)]` on a field.
fn parse_field_attrs(field: &syn::Field) -> FieldAttrs {
    let mut out = FieldAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("query") {
            continue;
        }

        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                out.rename = Some(lit.value());
            } else if meta.path.is_ident("skip") {
                out.skip = true;
            } else if meta.path.is_ident("read_only") {
                out.read_only = true;
            } else if meta.path.is_ident("nested") {
                out.nested = true;
            } else {
                emit_error!(meta.path.span(), "unknown #[query] field attribute");
            }
            Ok(())
        });

        if let Err(e) = result {
            emit_error!(attr.span(), "Failed to parse #[query] attribute: {}", e);
        }
    }

    if out.nested && out.read_only {
        emit_error!(field.span(), "`nested` fields are always read-only");
    }
    out
}

/// Parse `#[query(name = "...")]` on the struct.
fn parse_entity_name(input: &DeriveInput) -> String {
    let mut name = input.ident.to_string();
    for attr in &input.attrs {
        if !attr.path().is_ident("query") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                name = lit.value();
            } else {
                emit_error!(meta.path.span(), "unknown #[query] struct attribute");
            }
            Ok(())
        });
        if let Err(e) = result {
            emit_error!(attr.span(), "Failed to parse #[query] attribute: {}", e);
        }
    }
    name
}

fn collect_fields(input: &DeriveInput) -> Vec<QueryField> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => abort!(input, "QueryEntity only supports structs with named fields"),
        },
        _ => abort!(input, "QueryEntity can only be derived for structs"),
    };

    let mut out: Vec<QueryField> = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            abort!(field, "QueryEntity requires named fields");
        };
        let attrs = parse_field_attrs(field);
        if attrs.skip {
            continue;
        }

        let raw = ident.to_string();
        let name = attrs
            .rename
            .unwrap_or_else(|| raw.trim_start_matches("r#").to_upper_camel_case());
        if out.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
            emit_error!(field.span(), "duplicate query field name `{}`", name);
        }

        let access = if attrs.nested {
            Access::Nested
        } else if attrs.read_only {
            Access::ReadOnly
        } else {
            Access::ReadWrite
        };

        out.push(QueryField {
            ident: ident.clone(),
            ty: field.ty.clone(),
            name,
            access,
        });
    }
    out
}

pub fn expand_derive_query_entity(input: &DeriveInput) -> TokenStream {
    if !input.generics.params.is_empty() {
        abort!(input.generics, "QueryEntity cannot be derived for generic types");
    }

    let struct_name = &input.ident;
    let entity_name = parse_entity_name(input);
    let fields = collect_fields(input);

    let registrations = fields.iter().map(|f| {
        let ident = &f.ident;
        let name = &f.name;
        match f.access {
            Access::ReadWrite => quote! {
                .field(#name, |e: &#struct_name| &e.#ident, |e: &mut #struct_name| &mut e.#ident)
            },
            Access::ReadOnly => quote! {
                .read_only(#name, |e: &#struct_name| &e.#ident)
            },
            Access::Nested => quote! {
                .nested(#name, |e: &#struct_name| &e.#ident)
            },
        }
    });

    let selectors = fields
        .iter()
        .filter(|f| f.access != Access::Nested)
        .map(|f| {
            let const_ident = format_ident!(
                "{}",
                f.ident.to_string().trim_start_matches("r#").to_shouty_snake_case(),
                span = f.ident.span()
            );
            let name = &f.name;
            let ty = &f.ty;
            let doc = format!("Selector for `{name}`.");
            quote! {
                #[doc = #doc]
                pub const #const_ident: ::modkit_query::FieldRef<#struct_name, #ty> =
                    ::modkit_query::FieldRef::new(#name);
            }
        });

    quote! {
        #[automatically_derived]
        impl #struct_name {
            #(#selectors)*
        }

        #[automatically_derived]
        impl ::modkit_query::Entity for #struct_name {
            fn schema() -> &'static ::modkit_query::EntitySchema<Self> {
                static SCHEMA: ::std::sync::OnceLock<::modkit_query::EntitySchema<#struct_name>> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    ::modkit_query::EntitySchema::builder(#entity_name)
                        #(#registrations)*
                        .build()
                })
            }
        }
    }
}
