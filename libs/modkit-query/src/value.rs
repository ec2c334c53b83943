//! Typed values and literal coercion.
//!
//! Every queryable field declares a [`FieldKind`]. Literals arriving as text
//! (from the grammar parser or the wire codec) and values handed to builders
//! are coerced to that kind before a predicate is constructed, so evaluation
//! only ever compares values of the same kind.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Logical kinds a field can have.
///
/// Optional fields report the kind of their inner type; enums report `I64`
/// (their underlying integer representation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    I64,
    F64,
    Bool,
    Uuid,
    DateTimeUtc,
    Date,
    Decimal,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "String"),
            FieldKind::I64 => write!(f, "I64"),
            FieldKind::F64 => write!(f, "F64"),
            FieldKind::Bool => write!(f, "Bool"),
            FieldKind::Uuid => write!(f, "Uuid"),
            FieldKind::DateTimeUtc => write!(f, "DateTimeUtc"),
            FieldKind::Date => write!(f, "Date"),
            FieldKind::Decimal => write!(f, "Decimal"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Decimal(BigDecimal),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Uuid(_) => "uuid",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Decimal(_) => "decimal",
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Returns `None` for incomparable pairs (different kinds, NaN, or a null
    /// against a non-null value).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::I64(a), Value::I64(b)) => Some(a.cmp(b)),
            (Value::F64(a), Value::F64(b)) => a.partial_cmp(b),
            (Value::I64(a), Value::F64(b)) => (*a as f64).partial_cmp(b),
            (Value::F64(a), Value::I64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total ordering used by sorting: nulls first, incomparable pairs equal.
    #[must_use]
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Render the value as a literal accepted back by the grammar parser.
    ///
    /// Text-like values are double-quoted with `"` and `\` escaped.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::I64(_) | Value::F64(_) | Value::Bool(_) | Value::Decimal(_) => self.to_string(),
            Value::String(_) | Value::Uuid(_) | Value::DateTime(_) | Value::Date(_) => {
                let raw = self.to_string();
                let mut out = String::with_capacity(raw.len() + 2);
                out.push('"');
                for ch in raw.chars() {
                    if ch == '"' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
                out
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => f.write_str(s),
            Value::I64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::DateTime(v) => f.write_str(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Decimal(v) => write!(f, "{v}"),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::String(_)
            | Value::Uuid(_)
            | Value::DateTime(_)
            | Value::Date(_)
            | Value::Decimal(_) => serializer.collect_str(self),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I64(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::I64(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(v: BigDecimal) -> Self {
        Value::Decimal(v)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(v: Option<V>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Rust types that can back a queryable field.
///
/// Implemented for the primitive types below and for `Option<V>`. Enums are
/// queried through their underlying integer; implement this trait with
/// `KIND = FieldKind::I64`:
///
/// ```
/// use modkit_query::{FieldKind, FieldType, Value};
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// enum Status { Draft = 0, Active = 1 }
///
/// impl FieldType for Status {
///     const KIND: FieldKind = FieldKind::I64;
///
///     fn to_value(&self) -> Value {
///         Value::I64(*self as i64)
///     }
///
///     fn from_value(value: Value) -> Option<Self> {
///         match value {
///             Value::I64(0) => Some(Status::Draft),
///             Value::I64(1) => Some(Status::Active),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait FieldType: Sized {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! integer_field_type {
    ($($t:ty),* $(,)?) => {
        $(
            impl FieldType for $t {
                const KIND: FieldKind = FieldKind::I64;

                fn to_value(&self) -> Value {
                    i64::try_from(*self).map_or(Value::Null, Value::I64)
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::I64(v) => <$t>::try_from(v).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

integer_field_type!(i8, i16, i32, i64, u8, u16, u32);

// Unsigned types as wide as `i64` are stored as decimals, so values above
// `i64::MAX` keep their magnitude.
macro_rules! wide_unsigned_field_type {
    ($($t:ty),* $(,)?) => {
        $(
            impl FieldType for $t {
                const KIND: FieldKind = FieldKind::Decimal;

                fn to_value(&self) -> Value {
                    u128::try_from(*self).map_or(Value::Null, |v| Value::Decimal(BigDecimal::from(v)))
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::Decimal(d) if d.with_scale(0) == d => {
                            d.to_u128().and_then(|v| <$t>::try_from(v).ok())
                        }
                        Value::I64(v) => <$t>::try_from(v).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

wide_unsigned_field_type!(u64, usize);

impl FieldType for String {
    const KIND: FieldKind = FieldKind::String;

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::F64;

    fn to_value(&self) -> Value {
        Value::F64(*self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::F64(v) => Some(v),
            Value::I64(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for Uuid {
    const KIND: FieldKind = FieldKind::Uuid;

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Uuid(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::DateTimeUtc;

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::DateTime(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for NaiveDate {
    const KIND: FieldKind = FieldKind::Date;

    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Date(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for BigDecimal {
    const KIND: FieldKind = FieldKind::Decimal;

    fn to_value(&self) -> Value {
        Value::Decimal(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Decimal(v) => Some(v),
            Value::I64(v) => Some(BigDecimal::from(v)),
            _ => None,
        }
    }
}

impl<V: FieldType> FieldType for Option<V> {
    const KIND: FieldKind = V::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, V::to_value)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => V::from_value(other).map(Some),
        }
    }
}

/// Coerce a raw literal token to `kind`.
///
/// The token must already be stripped of its quotes. An unquoted `null`
/// (any case) is accepted for nullable fields only; pass `quoted = true` for
/// tokens that were delimited so the text `"null"` stays a string.
///
/// # Errors
/// Returns [`Error::Format`] when the token does not parse as `kind`.
pub fn coerce_literal(
    field: &str,
    raw: &str,
    quoted: bool,
    kind: FieldKind,
    nullable: bool,
) -> Result<Value> {
    if !quoted && raw.eq_ignore_ascii_case("null") {
        return if nullable {
            Ok(Value::Null)
        } else {
            Err(Error::format(field, kind, raw))
        };
    }

    let fail = || Error::format(field, kind, raw);
    let text = raw.trim();
    Ok(match kind {
        FieldKind::String => Value::String(raw.to_owned()),
        FieldKind::I64 => Value::I64(text.parse::<i64>().map_err(|_| fail())?),
        FieldKind::F64 => Value::F64(text.parse::<f64>().map_err(|_| fail())?),
        FieldKind::Bool => {
            if text.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if text.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                return Err(fail());
            }
        }
        FieldKind::Uuid => Value::Uuid(Uuid::parse_str(text).map_err(|_| fail())?),
        FieldKind::DateTimeUtc => Value::DateTime(
            DateTime::parse_from_rfc3339(text)
                .map_err(|_| fail())?
                .with_timezone(&Utc),
        ),
        FieldKind::Date => {
            Value::Date(NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| fail())?)
        }
        FieldKind::Decimal => Value::Decimal(BigDecimal::from_str(text).map_err(|_| fail())?),
    })
}

/// Coerce an already-typed value to `kind`.
///
/// Widening conversions (`I64` to `F64`/`Decimal`, integral `F64` to `I64`)
/// are accepted, strings are parsed as literals, and any value converts to
/// its text for `String` fields.
///
/// # Errors
/// Returns [`Error::Format`] when the value cannot represent `kind`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn conform(field: &str, value: Value, kind: FieldKind, nullable: bool) -> Result<Value> {
    match (kind, value) {
        (_, Value::Null) if nullable => Ok(Value::Null),
        (FieldKind::String, Value::String(s)) => Ok(Value::String(s)),
        (FieldKind::String, other) if !other.is_null() => Ok(Value::String(other.to_string())),
        (k, Value::String(s)) => coerce_literal(field, &s, true, k, nullable),
        (FieldKind::I64, Value::I64(v)) => Ok(Value::I64(v)),
        // `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
        (FieldKind::I64, Value::F64(v))
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 =>
        {
            Ok(Value::I64(v as i64))
        }
        (FieldKind::F64, Value::F64(v)) => Ok(Value::F64(v)),
        (FieldKind::F64, Value::I64(v)) => Ok(Value::F64(v as f64)),
        (FieldKind::Decimal, Value::Decimal(v)) => Ok(Value::Decimal(v)),
        (FieldKind::Decimal, Value::I64(v)) => Ok(Value::Decimal(BigDecimal::from(v))),
        (FieldKind::Decimal, Value::F64(v)) => BigDecimal::from_str(&v.to_string())
            .map(Value::Decimal)
            .map_err(|_| Error::format(field, kind, v.to_string())),
        (FieldKind::Bool, Value::Bool(v)) => Ok(Value::Bool(v)),
        (FieldKind::Uuid, Value::Uuid(v)) => Ok(Value::Uuid(v)),
        (FieldKind::DateTimeUtc, Value::DateTime(v)) => Ok(Value::DateTime(v)),
        (FieldKind::Date, Value::Date(v)) => Ok(Value::Date(v)),
        (FieldKind::Date, Value::DateTime(v)) => Ok(Value::Date(v.date_naive())),
        (k, other) => Err(Error::format(field, k, other.to_string())),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn coerces_numbers_and_bools() {
        assert_eq!(
            coerce_literal("Id", "42", false, FieldKind::I64, false).unwrap(),
            Value::I64(42)
        );
        assert_eq!(
            coerce_literal("Score", "2.5", false, FieldKind::F64, false).unwrap(),
            Value::F64(2.5)
        );
        assert_eq!(
            coerce_literal("Active", "TRUE", false, FieldKind::Bool, false).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn null_only_for_nullable_fields() {
        assert_eq!(
            coerce_literal("Age", "null", false, FieldKind::I64, true).unwrap(),
            Value::Null
        );
        assert!(matches!(
            coerce_literal("Age", "null", false, FieldKind::I64, false),
            Err(Error::Format { .. })
        ));
        // A quoted "null" is a plain string.
        assert_eq!(
            coerce_literal("Name", "null", true, FieldKind::String, true).unwrap(),
            Value::String("null".to_owned())
        );
    }

    #[test]
    fn rejects_malformed_literal() {
        let err = coerce_literal("Id", "abc", false, FieldKind::I64, false).unwrap_err();
        assert_eq!(
            err,
            Error::Format {
                field: "Id".to_owned(),
                expected: FieldKind::I64,
                literal: "abc".to_owned(),
            }
        );
    }

    #[test]
    fn coerces_temporal_and_uuid() {
        let dt = coerce_literal(
            "CreatedAt",
            "2024-03-01T10:00:00Z",
            true,
            FieldKind::DateTimeUtc,
            false,
        )
        .unwrap();
        assert_eq!(dt.to_string(), "2024-03-01T10:00:00Z");

        let d = coerce_literal("Day", "2024-03-01", true, FieldKind::Date, false).unwrap();
        assert_eq!(d.to_literal(), "\"2024-03-01\"");

        let id = "123e4567-e89b-12d3-a456-426614174000";
        let u = coerce_literal("Key", id, true, FieldKind::Uuid, false).unwrap();
        assert_eq!(u.to_string(), id);
    }

    #[test]
    fn conform_widens_integers() {
        assert_eq!(
            conform("Score", Value::I64(3), FieldKind::F64, false).unwrap(),
            Value::F64(3.0)
        );
        assert_eq!(
            conform("Id", Value::String("7".to_owned()), FieldKind::I64, false).unwrap(),
            Value::I64(7)
        );
        assert!(conform("Id", Value::F64(1.5), FieldKind::I64, false).is_err());
        assert_eq!(
            conform("Id", Value::F64(-9_223_372_036_854_775_808.0), FieldKind::I64, false).unwrap(),
            Value::I64(i64::MIN)
        );
        assert!(conform("Id", Value::F64(1e20), FieldKind::I64, false).is_err());
        assert!(conform("Id", Value::F64(-1e20), FieldKind::I64, false).is_err());
        assert!(conform("Id", Value::F64(9_223_372_036_854_775_808.0), FieldKind::I64, false).is_err());
        assert!(conform("Id", Value::F64(f64::INFINITY), FieldKind::I64, false).is_err());
        assert!(conform("Id", Value::Null, FieldKind::I64, false).is_err());
    }

    #[test]
    fn wide_unsigned_fields_keep_their_magnitude() {
        assert_eq!(<u64 as FieldType>::KIND, FieldKind::Decimal);
        let big = u64::MAX.to_value();
        assert_eq!(big, Value::Decimal(BigDecimal::from(u64::MAX)));
        assert_eq!(u64::from_value(big), Some(u64::MAX));
        assert_eq!(u64::from_value(Value::I64(7)), Some(7));
        assert_eq!(u64::from_value(Value::I64(-1)), None);

        let half = BigDecimal::from_str("1.5").unwrap();
        assert_eq!(u64::from_value(Value::Decimal(half)), None);
        assert_eq!(usize::from_value(42_usize.to_value()), Some(42));
    }

    #[test]
    fn literal_round_trips_quotes() {
        let v = Value::String("say \"hi\"".to_owned());
        assert_eq!(v.to_literal(), r#""say \"hi\"""#);
    }

    #[test]
    fn sort_cmp_puts_nulls_first() {
        assert_eq!(Value::Null.sort_cmp(&Value::I64(1)), Ordering::Less);
        assert_eq!(Value::I64(2).sort_cmp(&Value::I64(1)), Ordering::Greater);
    }

    #[test]
    fn option_field_type_is_nullable() {
        assert!(<Option<i32> as FieldType>::NULLABLE);
        assert_eq!(<Option<i32> as FieldType>::KIND, FieldKind::I64);
        assert_eq!(Some(5_i32).to_value(), Value::I64(5));
        assert_eq!(<Option<i32>>::from_value(Value::Null), Some(None));
    }
}
