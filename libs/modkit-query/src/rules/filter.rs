use std::fmt;

use crate::ast::{ComparisonOperator, Predicate};
use crate::error::{Error, Result};
use crate::parser::try_parse;
use crate::schema::{AsFieldPath, Entity};
use crate::value::Value;

/// Ordered list of independent predicates; an entity passes only when every
/// entry holds.
pub struct FilterRuleSet<T> {
    rules: Vec<Predicate<T>>,
}

impl<T> FilterRuleSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add(&mut self, predicate: Predicate<T>) -> &mut Self {
        self.rules.push(predicate);
        self
    }

    /// Remove the first entry structurally equal to `predicate`.
    pub fn remove(&mut self, predicate: &Predicate<T>) -> bool {
        match self.rules.iter().position(|p| p.structural_equals(predicate)) {
            Some(index) => {
                self.rules.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Predicate<T>> {
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
}

impl<T: Entity> FilterRuleSet<T> {
    /// Append a single comparison `field op value`.
    ///
    /// # Errors
    /// Fails when the field does not resolve or `value` does not fit it.
    pub fn add_rule<F: AsFieldPath>(
        &mut self,
        field: F,
        value: impl Into<Value>,
        op: ComparisonOperator,
    ) -> Result<&mut Self> {
        let predicate = Predicate::compare(field, op, value)?;
        Ok(self.add(predicate))
    }

    /// Shorthand for [`FilterRuleSet::add_rule`] with `==`.
    ///
    /// # Errors
    /// See [`FilterRuleSet::add_rule`].
    pub fn add_eq<F: AsFieldPath>(&mut self, field: F, value: impl Into<Value>) -> Result<&mut Self> {
        self.add_rule(field, value, ComparisonOperator::EqualTo)
    }

    /// Parse grammar text and append the resulting predicate.
    ///
    /// # Errors
    /// [`Error::ArgumentNull`] for blank text, [`Error::InvalidFilter`] when
    /// the parser rejects it.
    pub fn add_text(&mut self, text: &str) -> Result<&mut Self> {
        if text.trim().is_empty() {
            return Err(Error::ArgumentNull("filter"));
        }
        let predicate = try_parse::<T>(text).map_err(|err| {
            tracing::debug!(text, error = %err, "filter text rejected");
            Error::InvalidFilter(err.to_string())
        })?;
        Ok(self.add(predicate))
    }

    /// Remove the first entry equal to the comparison `field op value`.
    ///
    /// # Errors
    /// Same as [`FilterRuleSet::add_rule`].
    pub fn remove_rule<F: AsFieldPath>(
        &mut self,
        field: F,
        value: impl Into<Value>,
        op: ComparisonOperator,
    ) -> Result<bool> {
        let target = Predicate::compare(field, op, value)?;
        Ok(self.remove(&target))
    }

    /// `true` when every entry holds for `entity` (vacuously for an empty set).
    pub fn is_satisfied_by(&self, entity: &T) -> bool {
        self.rules.iter().all(|p| p.evaluate(entity))
    }
}

impl<T> Default for FilterRuleSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FilterRuleSet<T> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
        }
    }
}

impl<T> PartialEq for FilterRuleSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl<T> fmt::Debug for FilterRuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a FilterRuleSet<T> {
    type Item = &'a Predicate<T>;
    type IntoIter = std::slice::Iter<'a, Predicate<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
