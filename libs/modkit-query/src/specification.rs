//! Query specification: the four rule sets plus paging, behavior hints and
//! result post-processing.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::QueryConfig;
use crate::pipeline::{self, Criteria, InMemorySource, SingleEntity, QueryableSource};
use crate::rules::{FilterRuleSet, Projection, ProjectionRuleSet, SearchRuleSet, SortRuleSet};
use crate::schema::Entity;

/// Hints forwarded to the source. They do not change results of the
/// in-memory evaluator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct BehaviorFlags {
    pub no_tracking: bool,
    pub split_query: bool,
    pub ignore_filters: bool,
    pub ignore_auto_includes: bool,
}

type PostProcessFn<R> = dyn Fn(Vec<R>) -> Vec<R> + Send + Sync;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub skip: u64,
    pub take: Option<u64>,
    /// Entities matching the filter and search rules before paging.
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<R> {
    pub items: Vec<R>,
    pub page_info: PageInfo,
}

impl<R> Page<R> {
    #[must_use]
    pub fn empty(take: Option<u64>) -> Self {
        Self {
            items: Vec::new(),
            page_info: PageInfo {
                skip: 0,
                take,
                total: 0,
            },
        }
    }

    /// Transform items while preserving page metadata.
    #[must_use]
    pub fn map_items<U>(self, f: impl FnMut(R) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page_info: self.page_info,
        }
    }
}

/// Typed, composable description of how to filter, search, sort, page and
/// project a sequence of `T` into results of shape `R`.
///
/// Built through its rule-set accessors before use; safe to share for
/// concurrent evaluation afterwards.
pub struct QuerySpecification<T, R = T> {
    filters: FilterRuleSet<T>,
    sorts: SortRuleSet<T>,
    searches: SearchRuleSet<T>,
    projections: ProjectionRuleSet<T, R>,
    skip: Option<u64>,
    take: Option<u64>,
    flags: BehaviorFlags,
    post_processing: Option<Arc<PostProcessFn<R>>>,
    flatten: Option<Projection<T, R>>,
    config: QueryConfig,
}

impl<T, R> QuerySpecification<T, R> {
    /// Empty specification with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            filters: FilterRuleSet::new(),
            sorts: SortRuleSet::new(),
            searches: SearchRuleSet::new(),
            projections: ProjectionRuleSet::new(),
            skip: None,
            take: None,
            flags: BehaviorFlags::default(),
            post_processing: None,
            flatten: None,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    #[must_use]
    pub fn filters(&self) -> &FilterRuleSet<T> {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterRuleSet<T> {
        &mut self.filters
    }

    #[must_use]
    pub fn sorts(&self) -> &SortRuleSet<T> {
        &self.sorts
    }

    pub fn sorts_mut(&mut self) -> &mut SortRuleSet<T> {
        &mut self.sorts
    }

    #[must_use]
    pub fn searches(&self) -> &SearchRuleSet<T> {
        &self.searches
    }

    pub fn searches_mut(&mut self) -> &mut SearchRuleSet<T> {
        &mut self.searches
    }

    #[must_use]
    pub fn projections(&self) -> &ProjectionRuleSet<T, R> {
        &self.projections
    }

    pub fn projections_mut(&mut self) -> &mut ProjectionRuleSet<T, R> {
        &mut self.projections
    }

    #[must_use]
    pub fn criteria(&self) -> Criteria<'_, T> {
        Criteria::new(&self.filters, &self.searches)
    }

    #[must_use]
    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    #[must_use]
    pub fn take(&self) -> Option<u64> {
        self.take
    }

    pub fn set_skip(&mut self, skip: Option<u64>) -> &mut Self {
        self.skip = skip;
        self
    }

    pub fn set_take(&mut self, take: Option<u64>) -> &mut Self {
        self.take = take;
        self
    }

    /// Page-based pagination.
    ///
    /// A non-positive `page_size` falls back to the configured default and is
    /// clamped to the configured maximum; a `page` below 1 becomes 1.
    pub fn set_page(&mut self, page: i64, page_size: i64) -> &mut Self {
        let size = self.config.effective_page_size(page_size);
        let page = u64::try_from(page).ok().filter(|p| *p >= 1).unwrap_or(1);
        self.skip = Some((page - 1).saturating_mul(size));
        self.take = Some(size);
        self
    }

    #[must_use]
    pub fn flags(&self) -> BehaviorFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: BehaviorFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn as_no_tracking(&mut self) -> &mut Self {
        self.flags.no_tracking = true;
        self
    }

    pub fn as_split_query(&mut self) -> &mut Self {
        self.flags.split_query = true;
        self
    }

    pub fn ignore_query_filters(&mut self) -> &mut Self {
        self.flags.ignore_filters = true;
        self
    }

    pub fn ignore_auto_includes(&mut self) -> &mut Self {
        self.flags.ignore_auto_includes = true;
        self
    }

    /// Transform applied to the materialized result sequence.
    pub fn set_post_processing<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Vec<R>) -> Vec<R> + Send + Sync + 'static,
    {
        self.post_processing = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn post_processing(&self) -> Option<&PostProcessFn<R>> {
        self.post_processing.as_deref()
    }

    /// Use `f` instead of the projection rules to convert each entity.
    pub fn set_flatten<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.flatten = Some(Projection::flatten(f));
        self
    }

    /// Restore defaults: empty rule sets, no flags, first page of the
    /// default size, no post-processing or flattening.
    pub fn clear(&mut self) -> &mut Self {
        self.filters.clear();
        self.sorts.clear();
        self.searches.clear();
        self.projections.clear();
        self.flags = BehaviorFlags::default();
        self.post_processing = None;
        self.flatten = None;
        self.set_page(1, 0)
    }
}

impl<T: Entity, R: Entity + Default> QuerySpecification<T, R> {
    /// The projection applied at stage 5.
    #[must_use]
    pub fn projection(&self) -> Projection<T, R> {
        match &self.flatten {
            Some(flatten) => flatten.clone(),
            None => self.projections.build(),
        }
    }

    /// Whether `entity` passes the filter and search rules.
    pub fn is_satisfied_by(&self, entity: &T) -> bool {
        pipeline::select(self, SingleEntity(Some(entity))).0.is_some()
    }

    /// Apply the specification to `source`.
    pub fn evaluate<S: QueryableSource<T>>(&self, source: S) -> S::Projected<R> {
        pipeline::run(self, source)
    }

    /// Evaluate over `items` and apply post-processing.
    pub fn materialize<I>(&self, items: I) -> Vec<R>
    where
        I: IntoIterator<Item = T>,
    {
        let results = self.evaluate(items.into_iter().collect::<InMemorySource<T>>());
        pipeline::post_process(self, results.into_vec())
    }

    /// Like [`QuerySpecification::materialize`], also reporting how many
    /// entities matched before paging.
    pub fn page_of<I>(&self, items: I) -> Page<R>
    where
        I: IntoIterator<Item = T>,
    {
        let selected = pipeline::select(self, items.into_iter().collect::<InMemorySource<T>>());
        let total = selected.len() as u64;
        let results = pipeline::arrange(self, selected);
        Page {
            items: pipeline::post_process(self, results.into_vec()),
            page_info: PageInfo {
                skip: self.skip.unwrap_or(0),
                take: self.take,
                total,
            },
        }
    }
}

impl<T, R> Default for QuerySpecification<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> Clone for QuerySpecification<T, R> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            sorts: self.sorts.clone(),
            searches: self.searches.clone(),
            projections: self.projections.clone(),
            skip: self.skip,
            take: self.take,
            flags: self.flags,
            post_processing: self.post_processing.clone(),
            flatten: self.flatten.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T, R> fmt::Debug for QuerySpecification<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpecification")
            .field("filters", &self.filters)
            .field("sorts", &self.sorts)
            .field("searches", &self.searches)
            .field("projections", &self.projections)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("flags", &self.flags)
            .field("post_processing", &self.post_processing.is_some())
            .field("flatten", &self.flatten.is_some())
            .finish_non_exhaustive()
    }
}
