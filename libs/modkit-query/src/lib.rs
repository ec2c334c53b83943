#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Query specifications: typed, composable and serializable descriptions of
//! how to filter, search, sort, page and project a sequence of entities.
//!
//! ```
//! use modkit_query::{QueryEntity, QuerySpecification, SortType};
//!
//! #[derive(Clone, Debug, Default, PartialEq, QueryEntity)]
//! struct Company {
//!     id: i64,
//!     name: String,
//! }
//!
//! let companies: Vec<Company> = (1..=4)
//!     .map(|id| Company { id, name: format!("Company {id}") })
//!     .collect();
//!
//! let mut spec = QuerySpecification::<Company>::new();
//! spec.searches_mut().add(Company::NAME, "Company%").unwrap();
//! spec.sorts_mut().add(Company::ID, SortType::OrderByDescending).unwrap();
//! spec.set_page(2, 2);
//!
//! let ids: Vec<i64> = spec.materialize(companies).iter().map(|c| c.id).collect();
//! assert_eq!(ids, vec![2, 1]);
//! ```

extern crate self as modkit_query;

pub mod ast;
pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod rules;
pub mod schema;
#[cfg(feature = "with-sea-orm")]
pub mod sea_orm_filter;
pub mod specification;
pub mod value;
pub mod wire;

pub use ast::{Comparison, ComparisonOperator, ConnectiveKind, Node, NodeVisitor, Predicate};
pub use config::QueryConfig;
pub use error::{Error, Result};
pub use parser::{ParseError, parse, try_parse};
pub use pipeline::{Criteria, InMemorySource, QueryableSource};
pub use rules::{
    FilterRuleSet, Projection, ProjectionMode, ProjectionRule, ProjectionRuleSet, SearchRule,
    SearchRuleSet, SortDir, SortKind, SortRule, SortRuleSet, SortType,
};
pub use schema::{
    AsFieldPath, Entity, EntitySchema, EntitySchemaBuilder, FieldAccessor, FieldPath, FieldRef, Row,
};
pub use specification::{BehaviorFlags, Page, PageInfo, QuerySpecification};
pub use value::{FieldKind, FieldType, Value, coerce_literal, conform};
pub use wire::SpecificationWire;

pub use modkit_query_macros::QueryEntity;
