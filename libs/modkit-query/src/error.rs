//! Unified error type for query specification building.
//!
//! Parsing of textual predicates does not use this type: a rejected text is
//! reported as "no predicate" (see [`crate::parser`]). Everything raised by
//! builders, coercion, the wire codec and configuration lands here.

use crate::value::FieldKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("argument '{0}' must not be empty")]
    ArgumentNull(&'static str),

    #[error("field '{field}' not found on '{entity}'")]
    FieldNotFound { entity: &'static str, field: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("literal '{literal}' is not a valid {expected} for field '{field}'")]
    Format {
        field: String,
        expected: FieldKind,
        literal: String,
    },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn format(field: impl Into<String>, expected: FieldKind, literal: impl Into<String>) -> Self {
        Error::Format {
            field: field.into(),
            expected,
            literal: literal.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
