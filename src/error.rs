//src/error.rs
use thiserror::Error;

use crate::db;

/// Errors surfaced by every catalog, session and history operation.
///
/// Messages are safe to show to the user as-is. Storage failures never expose the
/// underlying database text through `Display`; it stays reachable via `source()`.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing input: empty names, non-numeric reps/weight, non-positive ids.
    #[error("{0}")]
    Validation(String),
    /// A referenced exercise, template, session or set does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Duplicate template name, exercise already in template, exercise still in use.
    #[error("{0}")]
    Conflict(String),
    #[error("Something went wrong. Please try again.")]
    Storage(#[source] db::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<db::Error> for Error {
    fn from(err: db::Error) -> Self {
        log::error!("Storage failure: {err}");
        Self::Storage(err)
    }
}

/// Only reached by `transaction()` and `commit()`; queries map their own errors in `db`.
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        db::Error::Transaction(err).into()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Rejects identifiers that cannot name a stored row.
pub(crate) fn require_id(value: i64, message: &str) -> Result<i64> {
    if value > 0 {
        Ok(value)
    } else {
        Err(Error::validation(message))
    }
}
