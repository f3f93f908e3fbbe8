//! Error types for pglink.

use std::time::Duration;

use thiserror::Error;

use crate::query::Query;

/// Result type for pglink operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for pglink.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid setup (e.g. no connection string)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Native connect/poll/status failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The asynchronous connect poll loop exceeded its wall-clock budget
    #[error("Connection timed out after {elapsed:?} ({timeout:?} configured)")]
    ConnectTimeout {
        /// Time spent polling before giving up
        elapsed: Duration,
        /// Configured budget for the poll loop
        timeout: Duration,
    },

    /// Synchronous query failed on the native layer
    #[error("Query failed: '{}' with error: {native}", .query.sql())]
    QueryFailed {
        /// The offending query
        query: Query,
        /// Native error text
        native: String,
    },

    /// Asynchronous query send or result retrieval failed
    #[error("Async query failed: '{}' with error: {native}", .query.sql())]
    AsyncQueryFailed {
        /// The offending query
        query: Query,
        /// Native error text
        native: String,
    },

    /// A prebuilt `Query` was passed together with extra parameters
    #[error("Cannot pass params together with a prebuilt query")]
    CantPassParams,

    /// A second async query was requested while one is outstanding
    #[error("Previous async query result was not consumed yet")]
    AsyncQueryPending,

    /// `wait_for_async_query` was called with no async query outstanding
    #[error("No async query was sent")]
    NoAsyncQuery,

    /// Row access on an async result that has not finished yet
    #[error("Async result is not finished yet")]
    ResultPending,

    /// Unknown field name in a row
    #[error("Row has no column '{0}'")]
    NoSuchColumn(String),

    /// Raw value could not be coerced to its column type
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the query attached to this error, if any.
    pub fn query(&self) -> Option<&Query> {
        match self {
            Error::QueryFailed { query, .. } | Error::AsyncQueryFailed { query, .. } => Some(query),
            _ => None,
        }
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(errno: nix::errno::Errno) -> Self {
        Error::Io(std::io::Error::from(errno))
    }
}
