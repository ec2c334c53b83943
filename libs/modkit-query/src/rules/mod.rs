//! The four ordered rule collections a specification is assembled from.

mod filter;
mod projection;
mod search;
mod sort;

pub use filter::FilterRuleSet;
pub use projection::{Projection, ProjectionMode, ProjectionRule, ProjectionRuleSet};
pub use search::{DEFAULT_SEARCH_GROUP, SearchRule, SearchRuleSet};
pub use sort::{SortDir, SortKind, SortRule, SortRuleSet, SortType};
