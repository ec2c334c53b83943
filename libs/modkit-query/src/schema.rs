//! Field accessor registry.
//!
//! Each queryable type registers its fields once (see [`Entity::schema`]),
//! mapping a field name to a typed getter, an optional setter and the field's
//! declared [`FieldKind`]. Builders and the grammar parser resolve names
//! against this table instead of inspecting types at runtime.
//!
//! Registration is usually generated by `#[derive(QueryEntity)]`, but can be
//! written by hand:
//!
//! ```
//! use std::sync::OnceLock;
//! use modkit_query::{Entity, EntitySchema};
//!
//! #[derive(Clone, Default)]
//! struct Company {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for Company {
//!     fn schema() -> &'static EntitySchema<Self> {
//!         static SCHEMA: OnceLock<EntitySchema<Company>> = OnceLock::new();
//!         SCHEMA.get_or_init(|| {
//!             EntitySchema::builder("Company")
//!                 .field("Id", |c: &Company| &c.id, |c: &mut Company| &mut c.id)
//!                 .field("Name", |c: &Company| &c.name, |c: &mut Company| &mut c.name)
//!                 .build()
//!         })
//!     }
//! }
//!
//! let field = Company::schema().resolve("name").unwrap();
//! assert_eq!(field.path().as_str(), "Name");
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{FieldKind, FieldType, Value};

type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, Value) -> bool + Send + Sync>;

/// Canonical, resolved reference to a (possibly nested) field.
///
/// Nested segments are separated by `.`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(String);

impl FieldPath {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Last segment of the path (the member name on the innermost type).
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    fn nested(prefix: &str, inner: &FieldPath) -> Self {
        FieldPath(format!("{prefix}.{}", inner.0))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved accessor for one field of `T`.
pub struct FieldAccessor<T> {
    path: FieldPath,
    kind: FieldKind,
    nullable: bool,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
}

impl<T> FieldAccessor<T> {
    #[must_use]
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// Read the field from `entity`.
    pub fn get(&self, entity: &T) -> Value {
        (self.getter)(entity)
    }

    /// Write `value` into `entity`. Returns `false` if the field is read-only
    /// or the value does not fit the field's Rust type.
    pub fn set(&self, entity: &mut T, value: Value) -> bool {
        self.setter.as_ref().is_some_and(|set| set(entity, value))
    }
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            kind: self.kind,
            nullable: self.nullable,
            getter: Arc::clone(&self.getter),
            setter: self.setter.clone(),
        }
    }
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("writable", &self.setter.is_some())
            .finish_non_exhaustive()
    }
}

/// Field table of an entity type, built once per type.
pub struct EntitySchema<T> {
    name: &'static str,
    fields: Vec<FieldAccessor<T>>,
}

impl<T: 'static> EntitySchema<T> {
    #[must_use]
    pub fn builder(name: &'static str) -> EntitySchemaBuilder<T> {
        EntitySchemaBuilder {
            name,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldAccessor<T>] {
        &self.fields
    }

    /// Look up a field by name: exact match first, then ASCII
    /// case-insensitive.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&FieldAccessor<T>> {
        let name = name.trim();
        self.fields
            .iter()
            .find(|f| f.path.as_str() == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| f.path.as_str().eq_ignore_ascii_case(name))
            })
    }

    /// Resolve a field name.
    ///
    /// # Errors
    /// Returns [`Error::ArgumentNull`] for a blank name and
    /// [`Error::FieldNotFound`] when no field matches.
    pub fn resolve(&self, name: &str) -> Result<&FieldAccessor<T>> {
        if name.trim().is_empty() {
            return Err(Error::ArgumentNull("field"));
        }
        self.find(name).ok_or_else(|| Error::FieldNotFound {
            entity: self.name,
            field: name.trim().to_owned(),
        })
    }
}

impl<T> fmt::Debug for EntitySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

#[must_use]
pub struct EntitySchemaBuilder<T> {
    name: &'static str,
    fields: Vec<FieldAccessor<T>>,
}

impl<T: 'static> EntitySchemaBuilder<T> {
    /// Register a readable and writable field.
    pub fn field<V>(self, name: &str, get: fn(&T) -> &V, set: fn(&mut T) -> &mut V) -> Self
    where
        V: FieldType + 'static,
    {
        let setter: Setter<T> = Arc::new(move |entity: &mut T, value: Value| {
            match V::from_value(value) {
                Some(v) => {
                    *set(entity) = v;
                    true
                }
                None => false,
            }
        });
        self.push::<V>(name, Arc::new(move |entity: &T| get(entity).to_value()), Some(setter))
    }

    /// Register a field that can be queried but not written by projections.
    pub fn read_only<V>(self, name: &str, get: fn(&T) -> &V) -> Self
    where
        V: FieldType + 'static,
    {
        self.push::<V>(name, Arc::new(move |entity: &T| get(entity).to_value()), None)
    }

    /// Register every field of the nested entity `U` under `prefix.`.
    ///
    /// Nested fields are read-only.
    pub fn nested<U: Entity>(mut self, prefix: &str, project: fn(&T) -> &U) -> Self {
        for inner in U::schema().fields() {
            let inner_get = Arc::clone(&inner.getter);
            self.fields.push(FieldAccessor {
                path: FieldPath::nested(prefix, &inner.path),
                kind: inner.kind,
                nullable: inner.nullable,
                getter: Arc::new(move |entity: &T| inner_get(project(entity))),
                setter: None,
            });
        }
        self
    }

    fn push<V: FieldType>(mut self, name: &str, getter: Getter<T>, setter: Option<Setter<T>>) -> Self {
        self.fields.push(FieldAccessor {
            path: FieldPath(name.to_owned()),
            kind: V::KIND,
            nullable: V::NULLABLE,
            getter,
            setter,
        });
        self
    }

    pub fn build(self) -> EntitySchema<T> {
        EntitySchema {
            name: self.name,
            fields: self.fields,
        }
    }
}

/// A type whose fields can be filtered, sorted, searched and projected.
pub trait Entity: Sized + Send + Sync + 'static {
    fn schema() -> &'static EntitySchema<Self>;
}

/// Typed field selector, the compile-time counterpart of a field name.
///
/// `#[derive(QueryEntity)]` generates one associated constant per field
/// (e.g. `Company::NAME`).
pub struct FieldRef<T, V> {
    name: &'static str,
    _phantom: PhantomData<fn() -> (T, V)>,
}

impl<T, V> FieldRef<T, V> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T, V> Clone for FieldRef<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for FieldRef<T, V> {}

impl<T, V> fmt::Debug for FieldRef<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRef").field("field", &self.name).finish()
    }
}

impl<T, V> PartialEq for FieldRef<T, V> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T, V> Eq for FieldRef<T, V> {}

/// Anything that names a field: a raw string, a resolved [`FieldPath`] or a
/// typed [`FieldRef`]. Builders accept any of them.
pub trait AsFieldPath {
    fn as_field_name(&self) -> &str;

    /// Resolve against `T`'s schema, yielding the canonical accessor.
    ///
    /// # Errors
    /// See [`EntitySchema::resolve`].
    fn resolve<T: Entity>(&self) -> Result<&'static FieldAccessor<T>> {
        T::schema().resolve(self.as_field_name())
    }
}

impl AsFieldPath for str {
    fn as_field_name(&self) -> &str {
        self
    }
}

impl AsFieldPath for String {
    fn as_field_name(&self) -> &str {
        self
    }
}

impl AsFieldPath for FieldPath {
    fn as_field_name(&self) -> &str {
        &self.0
    }
}

impl<T, V> AsFieldPath for FieldRef<T, V> {
    fn as_field_name(&self) -> &str {
        self.name
    }
}

impl<F: AsFieldPath + ?Sized> AsFieldPath for &F {
    fn as_field_name(&self) -> &str {
        (**self).as_field_name()
    }
}

/// Untyped positional result shape.
///
/// Projecting into `Row` yields the selected values in rule insertion order.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Row(pub Vec<Value>);

impl Row {
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }
}

impl Entity for Row {
    fn schema() -> &'static EntitySchema<Self> {
        static SCHEMA: std::sync::OnceLock<EntitySchema<Row>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| EntitySchema::builder("Row").build())
    }
}
