use std::fmt;

use thiserror::Error;

use crate::scalar::ScalarKind;

/// Message used when the driver reports an error without any text.
pub const EMPTY_ERROR_MESSAGE: &str = "empty error msg";

/// Errors raised by the marshaling core and the executor boundary
#[derive(Debug, Error)]
pub enum Error {
    /// Text could not be coerced to or from a scalar.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The record shape cannot be marshaled.
    #[error("reflect error: {0}")]
    Reflection(String),

    /// A single row was required but the query returned none.
    #[error("rows not found")]
    EmptyResult,

    /// The executor failed to run a statement.
    #[error("sql error: {0}")]
    Sql(String),

    /// A condition map could not be turned into a WHERE clause.
    #[error("predicate error: {0}")]
    Predicate(String),
}

impl Error {
    /// Builds a SQL error, replacing a blank driver message.
    pub fn sql(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Error::Sql(EMPTY_ERROR_MESSAGE.to_string())
        } else {
            Error::Sql(message)
        }
    }

    /// Replaces a blank SQL error message with [`EMPTY_ERROR_MESSAGE`].
    pub fn normalized(self) -> Self {
        match self {
            Error::Sql(message) => Error::sql(message),
            other => other,
        }
    }

    pub fn reflection(message: impl Into<String>) -> Self {
        Error::Reflection(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::sql(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure converting between a textual value and a scalar kind
#[derive(Debug, Error)]
pub struct ConversionError {
    pub text: String,
    pub kind: ScalarKind,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl ConversionError {
    pub fn new(text: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            text: text.into(),
            kind,
            source: None,
        }
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert {:?} as {}", self.text, self.kind)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}
