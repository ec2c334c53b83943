use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::schema::{AsFieldPath, Entity, FieldPath};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SortDir {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

impl SortDir {
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }
}

/// Requested sort operation. The wire form is the discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum SortType {
    OrderBy = 0,
    OrderByDescending = 1,
    ThenBy = 2,
    ThenByDescending = 3,
}

impl SortType {
    #[must_use]
    pub fn direction(self) -> SortDir {
        match self {
            SortType::OrderBy | SortType::ThenBy => SortDir::Asc,
            SortType::OrderByDescending | SortType::ThenByDescending => SortDir::Desc,
        }
    }

    #[must_use]
    pub fn is_secondary(self) -> bool {
        matches!(self, SortType::ThenBy | SortType::ThenByDescending)
    }

    /// Secondary counterpart with the same direction.
    #[must_use]
    pub fn demoted(self) -> Self {
        match self.direction() {
            SortDir::Asc => SortType::ThenBy,
            SortDir::Desc => SortType::ThenByDescending,
        }
    }

    /// Primary counterpart with the same direction.
    #[must_use]
    pub fn promoted(self) -> Self {
        match self.direction() {
            SortDir::Asc => SortType::OrderBy,
            SortDir::Desc => SortType::OrderByDescending,
        }
    }
}

impl From<SortType> for u8 {
    fn from(value: SortType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for SortType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SortType::OrderBy),
            1 => Ok(SortType::OrderByDescending),
            2 => Ok(SortType::ThenBy),
            3 => Ok(SortType::ThenByDescending),
            other => Err(Error::InvalidArgument(format!("unknown sort type {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKind {
    Primary,
    Secondary,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortRule {
    field: FieldPath,
    sort_type: SortType,
}

impl SortRule {
    #[must_use]
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    #[must_use]
    pub fn sort_type(&self) -> SortType {
        self.sort_type
    }

    #[must_use]
    pub fn direction(&self) -> SortDir {
        self.sort_type.direction()
    }

    #[must_use]
    pub fn kind(&self) -> SortKind {
        if self.sort_type.is_secondary() {
            SortKind::Secondary
        } else {
            SortKind::Primary
        }
    }
}

/// Ordered sort keys: at most one primary rule, always first, followed by
/// tie-break keys in insertion order.
pub struct SortRuleSet<T> {
    rules: Vec<SortRule>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> SortRuleSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn primary(&self) -> Option<&SortRule> {
        self.rules.first().filter(|r| r.kind() == SortKind::Primary)
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SortRule> {
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

    fn position(&self, field: &FieldPath) -> Option<usize> {
        self.rules.iter().position(|r| &r.field == field)
    }

    fn insert(&mut self, field: FieldPath, requested: SortType) {
        // A field sorts once; re-adding replaces the earlier key.
        if let Some(index) = self.position(&field) {
            self.remove_at(index);
        }

        if self.primary().is_some() {
            let sort_type = requested.demoted();
            if sort_type != requested {
                tracing::debug!(field = %field, ?requested, ?sort_type, "sort rule demoted behind existing primary");
            }
            self.rules.push(SortRule { field, sort_type });
        } else if requested.is_secondary() {
            self.rules.push(SortRule {
                field,
                sort_type: requested,
            });
        } else {
            self.rules.insert(
                0,
                SortRule {
                    field,
                    sort_type: requested,
                },
            );
        }
    }

    fn remove_at(&mut self, index: usize) {
        let removed = self.rules.remove(index);
        if removed.kind() == SortKind::Primary
            && let Some(next) = self.rules.first_mut()
        {
            next.sort_type = next.sort_type.promoted();
        }
    }
}

impl<T: Entity> SortRuleSet<T> {
    /// Add a sort key.
    ///
    /// Once a primary rule exists every further rule becomes a tie-break key
    /// with the requested direction. An explicit `ThenBy*` is always kept as a
    /// tie-break key.
    ///
    /// # Errors
    /// Fails when the field does not resolve on `T`.
    pub fn add<F: AsFieldPath>(&mut self, field: F, sort_type: SortType) -> Result<&mut Self> {
        let accessor = field.resolve::<T>()?;
        self.insert(accessor.path().clone(), sort_type);
        Ok(self)
    }

    /// Remove the key for `field`, whatever its direction. The next key is
    /// promoted when the primary is removed.
    ///
    /// # Errors
    /// Fails when the field does not resolve on `T`.
    pub fn remove<F: AsFieldPath>(&mut self, field: F) -> Result<bool> {
        let accessor = field.resolve::<T>()?;
        Ok(match self.position(accessor.path()) {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        })
    }

    /// Append `field` as the final tie-break key unless it is already sorted.
    ///
    /// # Errors
    /// Fails when the field does not resolve on `T`.
    pub fn ensure_tiebreaker<F: AsFieldPath>(&mut self, field: F, dir: SortDir) -> Result<&mut Self> {
        let accessor = field.resolve::<T>()?;
        if self.position(accessor.path()).is_none() {
            let sort_type = match dir {
                SortDir::Asc => SortType::OrderBy,
                SortDir::Desc => SortType::OrderByDescending,
            };
            self.insert(accessor.path().clone(), sort_type);
        }
        Ok(self)
    }

    /// Compare two entities by every key in order.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        let schema = T::schema();
        for rule in &self.rules {
            let Some(accessor) = schema.find(rule.field.as_str()) else {
                continue;
            };
            let ord = accessor.get(a).sort_cmp(&accessor.get(b));
            let ord = match rule.direction() {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl<T> Default for SortRuleSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SortRuleSet<T> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> PartialEq for SortRuleSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl<T> fmt::Debug for SortRuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter()).finish()
    }
}

/// Signed tokens, e.g. `+Name,-Id`.
impl<T> fmt::Display for SortRuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self
            .rules
            .iter()
            .map(|r| match r.direction() {
                SortDir::Asc => format!("+{}", r.field),
                SortDir::Desc => format!("-{}", r.field),
            })
            .collect();
        f.write_str(&tokens.join(","))
    }
}

impl<'a, T> IntoIterator for &'a SortRuleSet<T> {
    type Item = &'a SortRule;
    type IntoIter = std::slice::Iter<'a, SortRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
