use std::time::Duration;
use thiserror::Error;
use treeidx_core::IndexError;

/// Failures of the document store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no generation is published under alias {0}")]
    UnknownAlias(String),
}

/// Errors a query can report to its caller. None of them are fatal to the
/// server; each maps to an HTTP-style status.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed query syntax.
    #[error("{reason}")]
    BadTerm { reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("query took longer than {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The tree names a plugin this build does not know.
    #[error(transparent)]
    Configuration(#[from] IndexError),
}

impl QueryError {
    pub fn bad_term(reason: impl Into<String>) -> Self {
        QueryError::BadTerm {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            QueryError::BadTerm { .. } => 400,
            QueryError::NotFound(_) => 404,
            QueryError::Timeout(_) => 503,
            QueryError::Store(StoreError::UnknownAlias(_)) => 404,
            QueryError::Store(_) | QueryError::Configuration(_) => 500,
        }
    }

    /// Human-readable text for the presentation layer.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
