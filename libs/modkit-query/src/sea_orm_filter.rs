//! `SeaORM` translation of filter, search and sort rules.
//!
//! Only builds `sea_orm::Condition`s and ordering pairs; executing them is up
//! to the caller's `Select`.
//!
//! Columns default to the snake-cased leaf of the field path
//! (`Address.ZipCode` -> `zip_code`) and can be overridden per field with
//! [`ColumnMap::with`].

use std::collections::HashMap;

use heck::ToSnakeCase;
use rust_decimal::Decimal;
use sea_orm::Condition;
use sea_orm::sea_query::{Alias, Expr, Order, SimpleExpr};

use crate::ast::{Comparison, ComparisonOperator, ConnectiveKind, NodeVisitor};
use crate::error::{Error, Result};
use crate::pipeline::Criteria;
use crate::rules::{FilterRuleSet, SearchRuleSet, SortDir, SortRuleSet};
use crate::schema::{Entity, FieldPath};
use crate::value::{FieldKind, Value};

/// Field path to column name mapping.
#[derive(Clone, Debug, Default)]
pub struct ColumnMap {
    columns: HashMap<String, String>,
}

impl ColumnMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(field.into(), column.into());
        self
    }

    #[must_use]
    pub fn column_name(&self, field: &FieldPath) -> String {
        self.columns
            .get(field.as_str())
            .cloned()
            .unwrap_or_else(|| field.leaf().to_snake_case())
    }

    fn column(&self, field: &FieldPath) -> Alias {
        Alias::new(self.column_name(field))
    }
}

/* ---------- coercion helpers ---------- */

fn bigdecimal_to_decimal(field: &FieldPath, bd: &bigdecimal::BigDecimal) -> Result<Decimal> {
    let s = bd.normalized().to_string();
    Decimal::from_str_exact(&s)
        .or_else(|_| s.parse::<Decimal>())
        .map_err(|_| Error::format(field.as_str(), FieldKind::Decimal, s))
}

fn to_sea_value(field: &FieldPath, value: &Value) -> Result<sea_orm::Value> {
    Ok(match value {
        Value::Null => {
            return Err(Error::InvalidArgument(format!(
                "null literal for '{field}' must use an equality operator"
            )));
        }
        Value::String(s) => sea_orm::Value::String(Some(Box::new(s.clone()))),
        Value::I64(i) => sea_orm::Value::BigInt(Some(*i)),
        Value::F64(f) => sea_orm::Value::Double(Some(*f)),
        Value::Bool(b) => sea_orm::Value::Bool(Some(*b)),
        Value::Uuid(u) => sea_orm::Value::Uuid(Some(Box::new(*u))),
        Value::DateTime(dt) => sea_orm::Value::ChronoDateTimeUtc(Some(Box::new(*dt))),
        Value::Date(d) => sea_orm::Value::ChronoDate(Some(Box::new(*d))),
        Value::Decimal(bd) => sea_orm::Value::Decimal(Some(Box::new(bigdecimal_to_decimal(field, bd)?))),
    })
}

/* ---------- predicate visitor ---------- */

/// Translates a predicate tree into a `Condition`.
pub struct SeaOrmConditionBuilder<'a> {
    columns: &'a ColumnMap,
}

impl<'a> SeaOrmConditionBuilder<'a> {
    #[must_use]
    pub fn new(columns: &'a ColumnMap) -> Self {
        Self { columns }
    }
}

impl NodeVisitor for SeaOrmConditionBuilder<'_> {
    type Output = Result<Condition>;

    fn visit_comparison(&mut self, c: &Comparison) -> Result<Condition> {
        let col = self.columns.column(c.field());

        if c.literal().is_null() {
            let expr: SimpleExpr = match c.op() {
                ComparisonOperator::EqualTo => Expr::col(col).is_null(),
                ComparisonOperator::NotEqualTo => Expr::col(col).is_not_null(),
                // Ordering against null never holds.
                _ => Expr::cust("1=0"),
            };
            return Ok(Condition::all().add(expr));
        }

        let value = to_sea_value(c.field(), c.literal())?;
        Ok(match c.op() {
            ComparisonOperator::EqualTo => Condition::all().add(Expr::col(col).eq(value)),
            // Null fields differ from every non-null literal.
            ComparisonOperator::NotEqualTo => Condition::any()
                .add(Expr::col(col.clone()).ne(value))
                .add(Expr::col(col).is_null()),
            ComparisonOperator::GreaterThan => Condition::all().add(Expr::col(col).gt(value)),
            ComparisonOperator::GreaterThanOrEqualTo => Condition::all().add(Expr::col(col).gte(value)),
            ComparisonOperator::LessThan => Condition::all().add(Expr::col(col).lt(value)),
            ComparisonOperator::LessThanOrEqualTo => Condition::all().add(Expr::col(col).lte(value)),
        })
    }

    fn visit_connective(
        &mut self,
        kind: ConnectiveKind,
        left: Result<Condition>,
        right: Result<Condition>,
    ) -> Result<Condition> {
        let (left, right) = (left?, right?);
        Ok(if kind.is_conjunction() {
            Condition::all().add(left).add(right)
        } else {
            Condition::any().add(left).add(right)
        })
    }
}

/* ---------- rule sets ---------- */

/// Conjunction of every filter rule.
///
/// # Errors
/// Fails when a literal cannot be represented as a `SeaORM` value.
pub fn filter_condition<T>(rules: &FilterRuleSet<T>, columns: &ColumnMap) -> Result<Condition> {
    let mut builder = SeaOrmConditionBuilder::new(columns);
    rules
        .iter()
        .try_fold(Condition::all(), |acc, p| Ok(acc.add(p.root().accept(&mut builder)?)))
}

/// Grouped LIKE rules: OR within a group, AND across groups.
///
/// Columns of non-string fields are cast to `text` first, so they match on
/// their text form as they do in memory. LIKE case sensitivity follows the
/// database collation.
#[must_use]
pub fn search_condition<T: Entity>(rules: &SearchRuleSet<T>, columns: &ColumnMap) -> Condition {
    let schema = T::schema();
    rules
        .groups()
        .into_values()
        .fold(Condition::all(), |acc, group| {
            let any = group.into_iter().fold(Condition::any(), |any, rule| {
                let col = Expr::col(columns.column(rule.field()));
                let is_text = schema
                    .find(rule.field().as_str())
                    .is_none_or(|f| f.kind() == FieldKind::String);
                let target = if is_text {
                    col
                } else {
                    Expr::expr(col.cast_as(Alias::new("text")))
                };
                any.add(target.like(rule.pattern()))
            });
            acc.add(any)
        })
}

/// Filter and search rules combined.
///
/// # Errors
/// See [`filter_condition`].
pub fn criteria_condition<T: Entity>(criteria: &Criteria<'_, T>, columns: &ColumnMap) -> Result<Condition> {
    Ok(Condition::all()
        .add(filter_condition(criteria.filters(), columns)?)
        .add(search_condition(criteria.searches(), columns)))
}

/// `(column, order)` pairs, primary key first.
#[must_use]
pub fn order_by<T>(rules: &SortRuleSet<T>, columns: &ColumnMap) -> Vec<(Alias, Order)> {
    rules
        .iter()
        .map(|r| {
            let order = match r.direction() {
                SortDir::Asc => Order::Asc,
                SortDir::Desc => Order::Desc,
            };
            (columns.column(r.field()), order)
        })
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::ast::Predicate;
    use crate::rules::SortType;
    use crate::schema::EntitySchema;
    use sea_orm::sea_query::{Asterisk, PostgresQueryBuilder, Query, QueryStatementWriter};
    use std::sync::OnceLock;

    #[derive(Clone, Default)]
    struct Customer {
        id: i64,
        full_name: String,
        region: Option<String>,
    }

    impl Entity for Customer {
        fn schema() -> &'static EntitySchema<Self> {
            static SCHEMA: OnceLock<EntitySchema<Customer>> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                EntitySchema::builder("Customer")
                    .field("Id", |c: &Customer| &c.id, |c: &mut Customer| &mut c.id)
                    .field("FullName", |c: &Customer| &c.full_name, |c: &mut Customer| &mut c.full_name)
                    .field("Region", |c: &Customer| &c.region, |c: &mut Customer| &mut c.region)
                    .build()
            })
        }
    }

    fn render(cond: Condition) -> String {
        Query::select()
            .column(Asterisk)
            .from(Alias::new("customers"))
            .cond_where(cond)
            .to_owned()
            .to_string(PostgresQueryBuilder)
    }

    #[test]
    fn comparison_and_connectives() {
        let p = Predicate::<Customer>::parse("Id > 5 | FullName == 'Ann'").unwrap();
        let cond = p.root().accept(&mut SeaOrmConditionBuilder::new(&ColumnMap::new())).unwrap();
        let sql = render(cond);
        assert!(sql.contains(r#""id" > 5"#), "{sql}");
        assert!(sql.contains(r#""full_name" = 'Ann'"#), "{sql}");
        assert!(sql.contains(" OR "), "{sql}");
    }

    #[test]
    fn null_literals_use_is_null() {
        let mut rules = FilterRuleSet::<Customer>::new();
        rules.add_eq("Region", Value::Null).unwrap();
        let sql = render(filter_condition(&rules, &ColumnMap::new()).unwrap());
        assert!(sql.contains(r#""region" IS NULL"#), "{sql}");
    }

    #[test]
    fn column_overrides() {
        let columns = ColumnMap::new().with("FullName", "name");
        let mut rules = FilterRuleSet::<Customer>::new();
        rules.add_eq("FullName", "x").unwrap();
        let sql = render(filter_condition(&rules, &columns).unwrap());
        assert!(sql.contains(r#""name" = 'x'"#), "{sql}");
    }

    #[test]
    fn search_groups_translate_to_like() {
        let mut rules = SearchRuleSet::<Customer>::new();
        rules
            .add_grouped("FullName", "A%", 1)
            .unwrap()
            .add_grouped("FullName", "%z", 1)
            .unwrap()
            .add_grouped("Region", "EU%", 2)
            .unwrap();
        let sql = render(search_condition(&rules, &ColumnMap::new()));
        assert!(sql.contains(r#""full_name" LIKE 'A%'"#), "{sql}");
        assert!(sql.contains(r#""region" LIKE 'EU%'"#), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn non_text_search_columns_are_cast() {
        let mut rules = SearchRuleSet::<Customer>::new();
        rules
            .add_grouped("Id", "1%", 1)
            .unwrap()
            .add_grouped("FullName", "A%", 1)
            .unwrap();
        let sql = render(search_condition(&rules, &ColumnMap::new()));
        assert!(sql.contains(r#"CAST("id" AS text) LIKE '1%'"#), "{sql}");
        assert!(sql.contains(r#""full_name" LIKE 'A%'"#), "{sql}");
        assert!(!sql.contains(r#"CAST("full_name""#), "{sql}");
    }

    #[test]
    fn sort_rules_to_order_pairs() {
        let mut rules = SortRuleSet::<Customer>::new();
        rules
            .add("FullName", SortType::OrderByDescending)
            .unwrap()
            .add("Id", SortType::OrderBy)
            .unwrap();
        let pairs = order_by(&rules, &ColumnMap::new());
        assert_eq!(pairs.len(), 2);
        assert!(matches!(pairs[0].1, Order::Desc));
        assert!(matches!(pairs[1].1, Order::Asc));
    }
}
