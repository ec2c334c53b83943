//! Evaluator pipeline.
//!
//! A specification is applied to a [`QueryableSource`] in a fixed order:
//!
//! 1. behavior flags
//! 2. filter and search rules, as one combined predicate
//! 3. sort rules, primary key first
//! 4. skip, then take
//! 5. projection (or the flattening conversion)
//! 6. post-processing, on the materialized results only
//!
//! Stages whose rule set is empty are skipped. Storage backends implement
//! [`QueryableSource`]; [`InMemorySource`] covers plain collections.

use crate::rules::{FilterRuleSet, Projection, SearchRuleSet, SortRuleSet};
use crate::schema::Entity;
use crate::specification::{BehaviorFlags, QuerySpecification};

/// Filter and search rules applied together.
pub struct Criteria<'a, T> {
    filters: &'a FilterRuleSet<T>,
    searches: &'a SearchRuleSet<T>,
}

impl<'a, T> Criteria<'a, T> {
    #[must_use]
    pub fn new(filters: &'a FilterRuleSet<T>, searches: &'a SearchRuleSet<T>) -> Self {
        Self { filters, searches }
    }

    #[must_use]
    pub fn filters(&self) -> &'a FilterRuleSet<T> {
        self.filters
    }

    #[must_use]
    pub fn searches(&self) -> &'a SearchRuleSet<T> {
        self.searches
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.searches.is_empty()
    }
}

impl<T: Entity> Criteria<'_, T> {
    pub fn is_satisfied_by(&self, entity: &T) -> bool {
        self.filters.is_satisfied_by(entity) && self.searches.is_satisfied_by(entity)
    }
}

/// A lazily or eagerly evaluated sequence of `T` the pipeline can narrow,
/// order, slice and reshape.
///
/// Flag hints default to no-ops; sources that cannot honor them may ignore
/// them.
pub trait QueryableSource<T>: Sized {
    type Projected<R>;

    #[must_use]
    fn as_no_tracking(self) -> Self {
        self
    }

    #[must_use]
    fn as_split_query(self) -> Self {
        self
    }

    #[must_use]
    fn ignore_query_filters(self) -> Self {
        self
    }

    #[must_use]
    fn ignore_auto_includes(self) -> Self {
        self
    }

    #[must_use]
    fn filter(self, criteria: &Criteria<'_, T>) -> Self;

    #[must_use]
    fn sort(self, rules: &SortRuleSet<T>) -> Self;

    #[must_use]
    fn skip(self, n: u64) -> Self;

    #[must_use]
    fn take(self, n: u64) -> Self;

    fn project<R>(self, projection: &Projection<T, R>) -> Self::Projected<R>;
}

/// In-memory source over a `Vec<T>`.
#[derive(Clone, Debug, PartialEq)]
pub struct InMemorySource<T> {
    items: Vec<T>,
}

impl<T> InMemorySource<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> From<Vec<T>> for InMemorySource<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T> FromIterator<T> for InMemorySource<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for InMemorySource<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

fn clamp(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

impl<T: Entity> QueryableSource<T> for InMemorySource<T> {
    type Projected<R> = InMemorySource<R>;

    fn as_no_tracking(self) -> Self {
        tracing::warn!(hint = "as_no_tracking", "in-memory source ignores behavior hint");
        self
    }

    fn as_split_query(self) -> Self {
        tracing::warn!(hint = "as_split_query", "in-memory source ignores behavior hint");
        self
    }

    fn ignore_query_filters(self) -> Self {
        tracing::warn!(hint = "ignore_query_filters", "in-memory source ignores behavior hint");
        self
    }

    fn ignore_auto_includes(self) -> Self {
        tracing::warn!(hint = "ignore_auto_includes", "in-memory source ignores behavior hint");
        self
    }

    fn filter(mut self, criteria: &Criteria<'_, T>) -> Self {
        self.items.retain(|item| criteria.is_satisfied_by(item));
        self
    }

    fn sort(mut self, rules: &SortRuleSet<T>) -> Self {
        self.items.sort_by(|a, b| rules.compare(a, b));
        self
    }

    fn skip(mut self, n: u64) -> Self {
        let n = clamp(n).min(self.items.len());
        self.items.drain(..n);
        self
    }

    fn take(mut self, n: u64) -> Self {
        self.items.truncate(clamp(n));
        self
    }

    fn project<R>(self, projection: &Projection<T, R>) -> InMemorySource<R> {
        self.items.into_iter().map(|item| projection.apply(item)).collect()
    }
}

/// Borrowed single-entity source used for membership tests.
pub(crate) struct SingleEntity<'a, T>(pub(crate) Option<&'a T>);

impl<T: Entity> QueryableSource<T> for SingleEntity<'_, T> {
    type Projected<R> = ();

    fn filter(self, criteria: &Criteria<'_, T>) -> Self {
        SingleEntity(self.0.filter(|entity| criteria.is_satisfied_by(entity)))
    }

    fn sort(self, _rules: &SortRuleSet<T>) -> Self {
        self
    }

    fn skip(self, n: u64) -> Self {
        SingleEntity(self.0.filter(|_| n == 0))
    }

    fn take(self, n: u64) -> Self {
        SingleEntity(self.0.filter(|_| n > 0))
    }

    fn project<R>(self, _projection: &Projection<T, R>) {}
}

/// Stage 1.
pub(crate) fn apply_flags<T, S: QueryableSource<T>>(flags: BehaviorFlags, source: S) -> S {
    if flags == BehaviorFlags::default() {
        tracing::debug!(stage = "flags", "stage skipped: no behavior flags set");
        return source;
    }
    tracing::trace!(stage = "flags", ?flags, "applying stage");
    let mut source = source;
    if flags.no_tracking {
        source = source.as_no_tracking();
    }
    if flags.split_query {
        source = source.as_split_query();
    }
    if flags.ignore_filters {
        source = source.ignore_query_filters();
    }
    if flags.ignore_auto_includes {
        source = source.ignore_auto_includes();
    }
    source
}

/// Stage 2.
pub(crate) fn apply_criteria<T, S: QueryableSource<T>>(criteria: &Criteria<'_, T>, source: S) -> S {
    if criteria.is_empty() {
        tracing::debug!(stage = "criteria", "stage skipped: no filter or search rules");
        return source;
    }
    tracing::trace!(
        stage = "criteria",
        filters = criteria.filters().len(),
        searches = criteria.searches().len(),
        "applying stage"
    );
    source.filter(criteria)
}

/// Stage 3.
pub(crate) fn apply_sort<T, S: QueryableSource<T>>(rules: &SortRuleSet<T>, source: S) -> S {
    if rules.is_empty() {
        tracing::debug!(stage = "sort", "stage skipped: no sort rules");
        return source;
    }
    tracing::trace!(stage = "sort", order = %rules, "applying stage");
    source.sort(rules)
}

/// Stage 4.
pub(crate) fn apply_paging<T, S: QueryableSource<T>>(skip: Option<u64>, take: Option<u64>, source: S) -> S {
    if skip.is_none() && take.is_none() {
        tracing::debug!(stage = "paging", "stage skipped: no skip or take");
        return source;
    }
    tracing::trace!(stage = "paging", ?skip, ?take, "applying stage");
    let source = match skip {
        Some(n) => source.skip(n),
        None => source,
    };
    match take {
        Some(n) => source.take(n),
        None => source,
    }
}

/// Stage 5.
pub(crate) fn apply_projection<T, R, S: QueryableSource<T>>(
    projection: &Projection<T, R>,
    source: S,
) -> S::Projected<R> {
    tracing::trace!(stage = "projection", mode = ?projection.mode(), "applying stage");
    source.project(projection)
}

/// Stages 1 and 2: narrow `source` to the matching entities.
pub(crate) fn select<T, R, S>(spec: &QuerySpecification<T, R>, source: S) -> S
where
    T: Entity,
    R: Entity + Default,
    S: QueryableSource<T>,
{
    let source = apply_flags(spec.flags(), source);
    apply_criteria(&spec.criteria(), source)
}

/// Stages 3 to 5: order, slice and reshape an already selected source.
pub(crate) fn arrange<T, R, S>(spec: &QuerySpecification<T, R>, source: S) -> S::Projected<R>
where
    T: Entity,
    R: Entity + Default,
    S: QueryableSource<T>,
{
    let source = apply_sort(spec.sorts(), source);
    let source = apply_paging(spec.skip(), spec.take(), source);
    apply_projection(&spec.projection(), source)
}

/// Stages 1 to 5.
pub fn run<T, R, S>(spec: &QuerySpecification<T, R>, source: S) -> S::Projected<R>
where
    T: Entity,
    R: Entity + Default,
    S: QueryableSource<T>,
{
    arrange(spec, select(spec, source))
}

/// Stage 6.
pub(crate) fn post_process<T, R>(spec: &QuerySpecification<T, R>, items: Vec<R>) -> Vec<R> {
    match spec.post_processing() {
        Some(f) => {
            tracing::trace!(stage = "post_processing", items = items.len(), "applying stage");
            f(items)
        }
        None => {
            tracing::debug!(stage = "post_processing", "stage skipped: no post-processing");
            items
        }
    }
}
