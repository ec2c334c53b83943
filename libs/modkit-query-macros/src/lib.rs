//! # modkit-query-macros
//!
//! Derive macro registering a struct's fields with `modkit-query`.
//!
//! `QueryEntity` generates the type's field accessor table (an
//! `modkit_query::Entity` impl built once per type) and one typed
//! `FieldRef` constant per field, so specifications can be built without
//! runtime reflection.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use proc_macro::TokenStream;
use proc_macro_error2::proc_macro_error;
use syn::{DeriveInput, parse_macro_input};

mod query_entity;

/// Derive `modkit_query::Entity` for a struct with named fields.
///
/// Field names default to `UpperCamelCase` of the Rust identifier and each
/// field gets an associated `SHOUTY_CASE` selector constant.
///
/// Struct attribute:
/// - `#[query(name = "...")]` entity name used in error messages.
///
/// Field attributes:
/// - `#[query(rename = "...")]` queryable name.
/// - `#[query(skip)]` not registered.
/// - `#[query(read_only)]` queryable but never written by projections.
/// - `#[query(nested)]` the field's own entity fields are registered under
///   `Name.Inner`.
///
/// # Example
///
/// ```ignore
/// use modkit_query::QueryEntity;
///
/// #[derive(Clone, Default, QueryEntity)]
/// pub struct Company {
///     pub id: i64,
///     #[query(rename = "Title")]
///     pub name: String,
///     #[query(skip)]
///     pub cache: Vec<u8>,
/// }
///
/// assert_eq!(Company::NAME.name(), "Title");
/// ```
#[proc_macro_derive(QueryEntity, attributes(query))]
#[proc_macro_error]
pub fn derive_query_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    query_entity::expand_derive_query_entity(&input).into()
}
