use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use regex::Regex;

use crate::error::{Error, Result};
use crate::schema::{AsFieldPath, Entity, FieldPath};
use crate::value::Value;

/// Group a search rule lands in when none is given.
pub const DEFAULT_SEARCH_GROUP: i32 = 1;

/// `field LIKE pattern` within a disjunctive group.
#[derive(Clone)]
pub struct SearchRule {
    field: FieldPath,
    pattern: String,
    group: i32,
    matcher: Regex,
}

impl SearchRule {
    #[must_use]
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn group(&self) -> i32 {
        self.group
    }

    /// Match a field value against the pattern. Non-text values are matched
    /// on their display text; nulls never match.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::String(s) => self.matcher.is_match(s),
            other => self.matcher.is_match(&other.to_string()),
        }
    }
}

impl PartialEq for SearchRule {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.pattern == other.pattern && self.group == other.group
    }
}

impl fmt::Debug for SearchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRule")
            .field("field", &self.field)
            .field("pattern", &self.pattern)
            .field("group", &self.group)
            .finish()
    }
}

/// Translate a SQL LIKE pattern into an anchored, case-insensitive regex.
///
/// `%` matches any run of characters, `_` exactly one; `\` escapes the next
/// character.
fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?is)^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4]))),
                None => out.push_str(&regex::escape("\\")),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| Error::InvalidPattern(e.to_string()))
}

/// Grouped LIKE rules: OR within a group, AND across groups.
pub struct SearchRuleSet<T> {
    rules: Vec<SearchRule>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> SearchRuleSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchRule> {
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

    /// Rules partitioned by group, in ascending group order.
    #[must_use]
    pub fn groups(&self) -> BTreeMap<i32, Vec<&SearchRule>> {
        let mut groups: BTreeMap<i32, Vec<&SearchRule>> = BTreeMap::new();
        for rule in &self.rules {
            groups.entry(rule.group).or_default().push(rule);
        }
        groups
    }
}

impl<T: Entity> SearchRuleSet<T> {
    /// Add `field LIKE pattern` to the default group.
    ///
    /// # Errors
    /// See [`SearchRuleSet::add_grouped`].
    pub fn add<F: AsFieldPath>(&mut self, field: F, pattern: &str) -> Result<&mut Self> {
        self.add_grouped(field, pattern, DEFAULT_SEARCH_GROUP)
    }

    /// Add `field LIKE pattern` to `group`.
    ///
    /// # Errors
    /// Fails when the field does not resolve, the pattern is empty or it
    /// cannot be compiled.
    pub fn add_grouped<F: AsFieldPath>(&mut self, field: F, pattern: &str, group: i32) -> Result<&mut Self> {
        let accessor = field.resolve::<T>()?;
        if pattern.is_empty() {
            return Err(Error::ArgumentNull("pattern"));
        }
        self.rules.push(SearchRule {
            field: accessor.path().clone(),
            pattern: pattern.to_owned(),
            group,
            matcher: like_to_regex(pattern)?,
        });
        Ok(self)
    }

    /// Remove the first rule with the same field, pattern and group.
    ///
    /// # Errors
    /// Fails when the field does not resolve.
    pub fn remove<F: AsFieldPath>(&mut self, field: F, pattern: &str, group: i32) -> Result<bool> {
        let accessor = field.resolve::<T>()?;
        let found = self
            .rules
            .iter()
            .position(|r| &r.field == accessor.path() && r.pattern == pattern && r.group == group);
        Ok(match found {
            Some(index) => {
                self.rules.remove(index);
                true
            }
            None => false,
        })
    }

    /// An empty set places no restriction.
    pub fn is_satisfied_by(&self, entity: &T) -> bool {
        let schema = T::schema();
        self.groups().values().all(|rules| {
            rules.iter().any(|rule| {
                schema
                    .find(rule.field.as_str())
                    .is_some_and(|accessor| rule.matches(&accessor.get(entity)))
            })
        })
    }
}

impl<T> Default for SearchRuleSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SearchRuleSet<T> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> PartialEq for SearchRuleSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl<T> fmt::Debug for SearchRuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a SearchRuleSet<T> {
    type Item = &'a SearchRule;
    type IntoIter = std::slice::Iter<'a, SearchRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
