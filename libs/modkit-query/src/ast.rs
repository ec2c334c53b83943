//! Predicate AST.
//!
//! A predicate is a tree of comparison leaves joined by connectives. Leaves
//! always reference a field resolved on the target entity and carry a literal
//! already coerced to the field's kind, so a [`Predicate`] is valid by
//! construction. Backends translate the tree through [`NodeVisitor`]; the
//! in-memory path compiles it once into a closure.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use crate::error::Result;
use crate::schema::{AsFieldPath, Entity, FieldPath};
use crate::value::{Value, conform};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
}

impl ComparisonOperator {
    pub const ALL: [ComparisonOperator; 6] = [
        ComparisonOperator::EqualTo,
        ComparisonOperator::NotEqualTo,
        ComparisonOperator::GreaterThan,
        ComparisonOperator::GreaterThanOrEqualTo,
        ComparisonOperator::LessThan,
        ComparisonOperator::LessThanOrEqualTo,
    ];

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::EqualTo => "==",
            ComparisonOperator::NotEqualTo => "!=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqualTo => ">=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqualTo => "<=",
        }
    }

    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    /// Apply the operator to a field value (`lhs`) and a literal (`rhs`).
    ///
    /// Nulls are only ever equal to nulls; ordering operators are false when
    /// either side is null.
    #[must_use]
    pub fn apply(self, lhs: &Value, rhs: &Value) -> bool {
        let ordering = lhs.compare(rhs);
        let any_null = lhs.is_null() || rhs.is_null();
        match self {
            ComparisonOperator::EqualTo => ordering == Some(Ordering::Equal),
            ComparisonOperator::NotEqualTo => ordering != Some(Ordering::Equal),
            ComparisonOperator::GreaterThan => !any_null && ordering == Some(Ordering::Greater),
            ComparisonOperator::GreaterThanOrEqualTo => {
                !any_null && matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
            ComparisonOperator::LessThan => !any_null && ordering == Some(Ordering::Less),
            ComparisonOperator::LessThanOrEqualTo => {
                !any_null && matches!(ordering, Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Connective joining two sub-predicates.
///
/// `And`/`AndStrict` (and `Or`/`OrStrict`) evaluate identically; the strict
/// variants remember that the text used `&&` / `||`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectiveKind {
    And,
    AndStrict,
    Or,
    OrStrict,
}

impl ConnectiveKind {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            ConnectiveKind::And => "&",
            ConnectiveKind::AndStrict => "&&",
            ConnectiveKind::Or => "|",
            ConnectiveKind::OrStrict => "||",
        }
    }

    #[must_use]
    pub fn is_conjunction(self) -> bool {
        matches!(self, ConnectiveKind::And | ConnectiveKind::AndStrict)
    }
}

impl fmt::Display for ConnectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Comparison leaf: `field op literal`.
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    field: FieldPath,
    op: ComparisonOperator,
    literal: Value,
}

impl Comparison {
    pub(crate) fn new(field: FieldPath, op: ComparisonOperator, literal: Value) -> Self {
        Self { field, op, literal }
    }

    #[must_use]
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    #[must_use]
    pub fn op(&self) -> ComparisonOperator {
        self.op
    }

    #[must_use]
    pub fn literal(&self) -> &Value {
        &self.literal
    }
}

#[derive(Clone, Debug)]
pub enum Node {
    Comparison(Comparison),
    Connective {
        kind: ConnectiveKind,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    #[must_use]
    pub fn connective(kind: ConnectiveKind, left: Node, right: Node) -> Node {
        Node::Connective {
            kind,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Semantic equality: same operator, field and literal on every leaf and
    /// the same connective class (conjunction/disjunction) on every inner
    /// node. Object identity and `&` vs `&&` spelling are ignored.
    #[must_use]
    pub fn structural_equals(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Comparison(a), Node::Comparison(b)) => a == b,
            (
                Node::Connective {
                    kind: ka,
                    left: la,
                    right: ra,
                },
                Node::Connective {
                    kind: kb,
                    left: lb,
                    right: rb,
                },
            ) => {
                ka.is_conjunction() == kb.is_conjunction()
                    && la.structural_equals(lb)
                    && ra.structural_equals(rb)
            }
            _ => false,
        }
    }

    /// Walk the tree bottom-up.
    pub fn accept<V: NodeVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Node::Comparison(c) => visitor.visit_comparison(c),
            Node::Connective { kind, left, right } => {
                let l = left.accept(visitor);
                let r = right.accept(visitor);
                visitor.visit_connective(*kind, l, r)
            }
        }
    }

    /// Canonical text, e.g. `((Id > 1) && (Name == "John"))`.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.accept(&mut TextRenderer)
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Node::Comparison(_) => 1,
            Node::Connective { left, right, .. } => 1 + left.node_count() + right.node_count(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Bottom-up visitor over a predicate tree.
///
/// Implement this to translate predicates into a backend's query language.
pub trait NodeVisitor {
    type Output;

    fn visit_comparison(&mut self, comparison: &Comparison) -> Self::Output;

    fn visit_connective(
        &mut self,
        kind: ConnectiveKind,
        left: Self::Output,
        right: Self::Output,
    ) -> Self::Output;
}

struct TextRenderer;

impl NodeVisitor for TextRenderer {
    type Output = String;

    fn visit_comparison(&mut self, c: &Comparison) -> String {
        format!("({} {} {})", c.field, c.op, c.literal.to_literal())
    }

    fn visit_connective(&mut self, kind: ConnectiveKind, left: String, right: String) -> String {
        format!("({left} {kind} {right})")
    }
}

type CompiledFn<T> = dyn Fn(&T) -> bool + Send + Sync;

/// A validated predicate over entities of type `T`.
pub struct Predicate<T> {
    root: Node,
    compiled: OnceLock<Box<CompiledFn<T>>>,
}

impl<T: Entity> Predicate<T> {
    /// Build a single comparison leaf.
    ///
    /// # Errors
    /// [`crate::Error::FieldNotFound`] / [`crate::Error::ArgumentNull`] when
    /// the field does not resolve, [`crate::Error::Format`] when `value` does
    /// not fit the field's kind.
    pub fn compare<F>(field: F, op: ComparisonOperator, value: impl Into<Value>) -> Result<Self>
    where
        F: AsFieldPath,
    {
        let accessor = field.resolve::<T>()?;
        let literal = conform(
            accessor.path().as_str(),
            value.into(),
            accessor.kind(),
            accessor.is_nullable(),
        )?;
        Ok(Self::from_root(Node::Comparison(Comparison::new(
            accessor.path().clone(),
            op,
            literal,
        ))))
    }

    /// Validate an externally built tree against `T`'s schema.
    ///
    /// Field paths are canonicalized and literals coerced.
    ///
    /// # Errors
    /// Same as [`Predicate::compare`], for the first offending leaf.
    pub fn from_node(node: Node) -> Result<Self> {
        fn validate<T: Entity>(node: Node) -> Result<Node> {
            match node {
                Node::Comparison(c) => {
                    let accessor = c.field.resolve::<T>()?;
                    let literal = conform(
                        accessor.path().as_str(),
                        c.literal,
                        accessor.kind(),
                        accessor.is_nullable(),
                    )?;
                    Ok(Node::Comparison(Comparison::new(
                        accessor.path().clone(),
                        c.op,
                        literal,
                    )))
                }
                Node::Connective { kind, left, right } => Ok(Node::connective(
                    kind,
                    validate::<T>(*left)?,
                    validate::<T>(*right)?,
                )),
            }
        }
        validate::<T>(node).map(Self::from_root)
    }

    /// Parse grammar text; `None` when the text is rejected.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        crate::parser::parse(text)
    }

    /// Evaluate against one entity.
    ///
    /// The tree is compiled into a closure on first use and reused after.
    pub fn evaluate(&self, entity: &T) -> bool {
        (self.compiled())(entity)
    }

    fn compiled(&self) -> &CompiledFn<T> {
        if let Some(f) = self.compiled.get() {
            return f.as_ref();
        }
        let fresh = compile::<T>(&self.root);
        tracing::trace!(predicate = %self.root, "compiled predicate");
        // A racing caller may have published first; both closures are equivalent.
        self.compiled.get_or_init(|| fresh).as_ref()
    }
}

impl<T> Predicate<T> {
    pub(crate) fn from_root(root: Node) -> Self {
        Self {
            root,
            compiled: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    #[must_use]
    pub fn into_node(self) -> Node {
        self.root
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        self.root.to_text()
    }

    #[must_use]
    pub fn structural_equals(&self, other: &Predicate<T>) -> bool {
        self.root.structural_equals(&other.root)
    }

    /// Join with `other` using `kind`.
    #[must_use]
    pub fn combine(self, kind: ConnectiveKind, other: Predicate<T>) -> Predicate<T> {
        Predicate::from_root(Node::connective(kind, self.root, other.root))
    }

    #[must_use]
    pub fn and(self, other: Predicate<T>) -> Predicate<T> {
        self.combine(ConnectiveKind::AndStrict, other)
    }

    #[must_use]
    pub fn or(self, other: Predicate<T>) -> Predicate<T> {
        self.combine(ConnectiveKind::OrStrict, other)
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_root(self.root.clone())
    }
}

impl<T> PartialEq for Predicate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.structural_equals(other)
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.root.to_text()).finish()
    }
}

impl<T> fmt::Display for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root.to_text())
    }
}

fn compile<T: Entity>(node: &Node) -> Box<CompiledFn<T>> {
    match node {
        Node::Comparison(c) => {
            let op = c.op;
            let literal = c.literal.clone();
            match T::schema().find(c.field.as_str()) {
                Some(accessor) => Box::new(move |entity: &T| op.apply(&accessor.get(entity), &literal)),
                None => Box::new(|_: &T| false),
            }
        }
        Node::Connective { kind, left, right } => {
            let l = compile::<T>(left);
            let r = compile::<T>(right);
            if kind.is_conjunction() {
                Box::new(move |entity: &T| l(entity) && r(entity))
            } else {
                Box::new(move |entity: &T| l(entity) || r(entity))
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::schema::EntitySchema;

    #[derive(Clone, Default)]
    struct Item {
        id: i64,
        name: String,
        rating: Option<i32>,
    }

    impl Entity for Item {
        fn schema() -> &'static EntitySchema<Self> {
            static SCHEMA: OnceLock<EntitySchema<Item>> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                EntitySchema::builder("Item")
                    .field("Id", |i: &Item| &i.id, |i: &mut Item| &mut i.id)
                    .field("Name", |i: &Item| &i.name, |i: &mut Item| &mut i.name)
                    .field("Rating", |i: &Item| &i.rating, |i: &mut Item| &mut i.rating)
                    .build()
            })
        }
    }

    fn item(id: i64, name: &str) -> Item {
        Item {
            id,
            name: name.to_owned(),
            rating: None,
        }
    }

    #[test]
    fn operator_semantics() {
        let a = Value::I64(1);
        let b = Value::I64(2);
        assert!(ComparisonOperator::LessThan.apply(&a, &b));
        assert!(ComparisonOperator::LessThanOrEqualTo.apply(&a, &a));
        assert!(ComparisonOperator::NotEqualTo.apply(&a, &b));
        assert!(!ComparisonOperator::GreaterThan.apply(&a, &b));
        assert!(ComparisonOperator::EqualTo.apply(&Value::Null, &Value::Null));
        assert!(!ComparisonOperator::GreaterThanOrEqualTo.apply(&Value::Null, &Value::Null));
        assert!(ComparisonOperator::NotEqualTo.apply(&Value::Null, &a));
    }

    #[test]
    fn leaf_renders_canonical_text() {
        let p = Predicate::<Item>::compare("name", ComparisonOperator::EqualTo, "John").unwrap();
        assert_eq!(p.to_text(), "(Name == \"John\")");
    }

    #[test]
    fn connective_renders_symbol() {
        let p = Predicate::<Item>::compare("Id", ComparisonOperator::GreaterThan, 1)
            .unwrap()
            .combine(
                ConnectiveKind::Or,
                Predicate::compare("Name", ComparisonOperator::EqualTo, "x").unwrap(),
            );
        assert_eq!(p.to_text(), "((Id > 1) | (Name == \"x\"))");
    }

    #[test]
    fn evaluates_connectives() {
        let p = Predicate::<Item>::compare("Id", ComparisonOperator::GreaterThan, 1)
            .unwrap()
            .and(Predicate::compare("Name", ComparisonOperator::NotEqualTo, "skip").unwrap());
        assert!(p.evaluate(&item(2, "keep")));
        assert!(!p.evaluate(&item(2, "skip")));
        assert!(!p.evaluate(&item(1, "keep")));
        // Second call reuses the cached closure.
        assert!(p.evaluate(&item(3, "keep")));
    }

    #[test]
    fn nullable_comparison() {
        let p = Predicate::<Item>::compare("Rating", ComparisonOperator::EqualTo, Value::Null).unwrap();
        assert!(p.evaluate(&item(1, "a")));
        let rated = Item {
            rating: Some(4),
            ..item(1, "a")
        };
        assert!(!p.evaluate(&rated));
    }

    #[test]
    fn structural_equality_ignores_identity_and_spelling() {
        let make = |kind| {
            Predicate::<Item>::compare("Id", ComparisonOperator::EqualTo, 1)
                .unwrap()
                .combine(
                    kind,
                    Predicate::compare("Name", ComparisonOperator::EqualTo, "a").unwrap(),
                )
        };
        assert_eq!(make(ConnectiveKind::And), make(ConnectiveKind::AndStrict));
        assert_ne!(make(ConnectiveKind::And), make(ConnectiveKind::Or));

        let other = Predicate::<Item>::compare("Id", ComparisonOperator::EqualTo, 2).unwrap();
        let same = Predicate::<Item>::compare("id", ComparisonOperator::EqualTo, "1").unwrap();
        let one = Predicate::<Item>::compare("Id", ComparisonOperator::EqualTo, 1).unwrap();
        assert_ne!(one, other);
        assert_eq!(one, same);
    }

    #[test]
    fn compare_rejects_bad_literal() {
        let err = Predicate::<Item>::compare("Id", ComparisonOperator::EqualTo, "abc").unwrap_err();
        assert!(matches!(err, crate::Error::Format { .. }));
    }

    #[test]
    fn visitor_counts_leaves() {
        struct Leaves;
        impl NodeVisitor for Leaves {
            type Output = usize;
            fn visit_comparison(&mut self, _: &Comparison) -> usize {
                1
            }
            fn visit_connective(&mut self, _: ConnectiveKind, l: usize, r: usize) -> usize {
                l + r
            }
        }

        let p = Predicate::<Item>::compare("Id", ComparisonOperator::EqualTo, 1)
            .unwrap()
            .or(Predicate::compare("Id", ComparisonOperator::EqualTo, 2).unwrap())
            .or(Predicate::compare("Id", ComparisonOperator::EqualTo, 3).unwrap());
        assert_eq!(p.root().accept(&mut Leaves), 3);
        assert_eq!(p.root().node_count(), 5);
    }
}
