use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::{AsFieldPath, Entity, FieldAccessor, FieldPath, Row};

/// `source -> destination` field mapping.
///
/// `destination` is `None` when the result shape is the source shape itself
/// or the positional [`Row`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionRule {
    source: FieldPath,
    destination: Option<FieldPath>,
}

impl ProjectionRule {
    #[must_use]
    pub fn source(&self) -> &FieldPath {
        &self.source
    }

    #[must_use]
    pub fn destination(&self) -> Option<&FieldPath> {
        self.destination.as_ref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Same,
    Positional,
    Mapped,
}

fn shape_of<T: 'static, R: 'static>() -> Shape {
    if TypeId::of::<T>() == TypeId::of::<R>() {
        Shape::Same
    } else if TypeId::of::<R>() == TypeId::of::<Row>() {
        Shape::Positional
    } else {
        Shape::Mapped
    }
}

/// Move a value into a type known to be the same at runtime.
fn cast<A: 'static, B: 'static>(value: A) -> Option<B> {
    let boxed: Box<dyn Any> = Box::new(value);
    boxed.downcast::<B>().ok().map(|b| *b)
}

/// How a built [`Projection`] produces results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionMode {
    /// Source items pass through unchanged.
    Identity,
    /// Selected destination fields are set, the rest keep their default.
    Mapping,
    /// Selected values in rule order, as a [`Row`].
    Positional,
    /// Caller-supplied conversion.
    Flatten,
}

type ProjectFn<T, R> = dyn Fn(T) -> R + Send + Sync;

/// Materializer turning a source item into a result item.
pub struct Projection<T, R> {
    mode: ProjectionMode,
    apply: Arc<ProjectFn<T, R>>,
}

impl<T, R> Projection<T, R> {
    /// Wrap an arbitrary conversion.
    pub fn flatten<F>(f: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        Self {
            mode: ProjectionMode::Flatten,
            apply: Arc::new(f),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    pub fn apply(&self, item: T) -> R {
        (self.apply)(item)
    }
}

impl<T, R> Clone for Projection<T, R> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<T, R> fmt::Debug for Projection<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Ordered field mappings from `T` to the result shape `R`.
pub struct ProjectionRuleSet<T, R = T> {
    rules: Vec<ProjectionRule>,
    _shape: PhantomData<fn(T) -> R>,
}

impl<T, R> ProjectionRuleSet<T, R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            _shape: PhantomData,
        }
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProjectionRule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn push(&mut self, rule: ProjectionRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }
}

impl<T: Entity, R: Entity + Default> ProjectionRuleSet<T, R> {
    /// Select `source`. For a distinct result shape the destination is the
    /// same-named field of `R`.
    ///
    /// # Errors
    /// Fails when the source does not resolve, or when `R` has no matching
    /// writable field of the same kind.
    pub fn add<F: AsFieldPath>(&mut self, source: F) -> Result<&mut Self> {
        let accessor = source.resolve::<T>()?;
        let destination = match shape_of::<T, R>() {
            Shape::Same => {
                ensure_writable(accessor)?;
                None
            }
            Shape::Positional => None,
            Shape::Mapped => {
                let dest = same_named::<T, R>(accessor).ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "'{}' has no field matching '{}'",
                        R::schema().name(),
                        accessor.path()
                    ))
                })?;
                ensure_assignable(accessor, dest)?;
                Some(dest.path().clone())
            }
        };
        self.push(ProjectionRule {
            source: accessor.path().clone(),
            destination,
        });
        Ok(self)
    }

    /// Map `source` onto an explicitly named `destination`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when the shapes are identical (redundant) or
    /// the result is a [`Row`] (ambiguous), plus the resolution and
    /// compatibility failures of [`ProjectionRuleSet::add`].
    pub fn add_mapped<F: AsFieldPath, D: AsFieldPath>(&mut self, source: F, destination: D) -> Result<&mut Self> {
        match shape_of::<T, R>() {
            Shape::Same => {
                return Err(Error::InvalidArgument(
                    "destination is redundant when source and result shapes match".to_owned(),
                ));
            }
            Shape::Positional => {
                return Err(Error::InvalidArgument(
                    "destination is ambiguous for a positional row result".to_owned(),
                ));
            }
            Shape::Mapped => {}
        }
        let source = source.resolve::<T>()?;
        let dest = destination.resolve::<R>()?;
        ensure_assignable(source, dest)?;
        self.push(ProjectionRule {
            source: source.path().clone(),
            destination: Some(dest.path().clone()),
        });
        Ok(self)
    }

    /// Remove every rule selecting `source`.
    ///
    /// # Errors
    /// Fails when the source does not resolve.
    pub fn remove<F: AsFieldPath>(&mut self, source: F) -> Result<bool> {
        let accessor = source.resolve::<T>()?;
        let before = self.rules.len();
        self.rules.retain(|r| &r.source != accessor.path());
        Ok(self.rules.len() != before)
    }

    /// Build the materializer.
    ///
    /// With no rules, a same-shape projection is the identity, a [`Row`]
    /// takes every source field and a distinct shape maps every compatible
    /// same-named field.
    #[must_use]
    pub fn build(&self) -> Projection<T, R> {
        let source = T::schema();
        match shape_of::<T, R>() {
            Shape::Same if self.rules.is_empty() => Projection {
                mode: ProjectionMode::Identity,
                apply: Arc::new(|item: T| cast::<T, R>(item).unwrap_or_default()),
            },
            Shape::Positional => {
                let getters: Vec<&'static FieldAccessor<T>> = if self.rules.is_empty() {
                    source.fields().iter().collect()
                } else {
                    self.rules
                        .iter()
                        .filter_map(|r| source.find(r.source.as_str()))
                        .collect()
                };
                Projection {
                    mode: ProjectionMode::Positional,
                    apply: Arc::new(move |item: T| {
                        let row = Row(getters.iter().map(|g| g.get(&item)).collect());
                        cast::<Row, R>(row).unwrap_or_default()
                    }),
                }
            }
            Shape::Same | Shape::Mapped => {
                let pairs: Vec<(&'static FieldAccessor<T>, &'static FieldAccessor<R>)> =
                    if self.rules.is_empty() {
                        source
                            .fields()
                            .iter()
                            .filter_map(|s| {
                                same_named::<T, R>(s)
                                    .filter(|d| ensure_assignable(s, d).is_ok())
                                    .map(|d| (s, d))
                            })
                            .collect()
                    } else {
                        self.rules
                            .iter()
                            .filter_map(|r| {
                                let s = source.find(r.source.as_str())?;
                                let target = r.destination.as_ref().unwrap_or(&r.source);
                                let d = R::schema().find(target.as_str())?;
                                Some((s, d))
                            })
                            .collect()
                    };
                Projection {
                    mode: ProjectionMode::Mapping,
                    apply: Arc::new(move |item: T| {
                        let mut out = R::default();
                        for (s, d) in &pairs {
                            d.set(&mut out, s.get(&item));
                        }
                        out
                    }),
                }
            }
        }
    }
}

fn same_named<T: Entity, R: Entity>(source: &FieldAccessor<T>) -> Option<&'static FieldAccessor<R>> {
    let schema = R::schema();
    schema
        .find(source.path().as_str())
        .or_else(|| schema.find(source.path().leaf()))
}

fn ensure_writable<R>(dest: &FieldAccessor<R>) -> Result<()> {
    if dest.is_writable() {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "projection destination '{}' is read-only",
            dest.path()
        )))
    }
}

fn ensure_assignable<T, R>(source: &FieldAccessor<T>, dest: &FieldAccessor<R>) -> Result<()> {
    ensure_writable(dest)?;
    if source.kind() != dest.kind() {
        return Err(Error::InvalidArgument(format!(
            "cannot project {} '{}' onto {} '{}'",
            source.kind(),
            source.path(),
            dest.kind(),
            dest.path()
        )));
    }
    Ok(())
}

impl<T, R> Default for ProjectionRuleSet<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> Clone for ProjectionRuleSet<T, R> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            _shape: PhantomData,
        }
    }
}

impl<T, R> PartialEq for ProjectionRuleSet<T, R> {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl<T, R> fmt::Debug for ProjectionRuleSet<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter()).finish()
    }
}

impl<'a, T, R> IntoIterator for &'a ProjectionRuleSet<T, R> {
    type Item = &'a ProjectionRule;
    type IntoIter = std::slice::Iter<'a, ProjectionRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
