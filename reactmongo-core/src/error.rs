//! Error types and result types for the dispatch layer and its drivers.
//!
//! Two families of errors exist:
//!
//! - [`DriverError`] is what a blocking [`Driver`](crate::driver::Driver) call returns
//!   instead of throwing. It never crosses the worker thread boundary as-is: the
//!   dispatch engine renders it to text and hands it to the caller's failure callback.
//! - [`ReactMongoError`] covers failures that happen synchronously in the caller's
//!   context, such as an unparsable host string or a worker thread that cannot be spawned.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Text used when an operation is attempted against a handle that has no live link.
pub const CONNECTION_ERROR: &str = "not connected to mongo";

/// Represents all failures a blocking driver call can report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// The handle has no live link to the server, either because the connect attempt
    /// failed or because the link was lost afterwards.
    #[error("{}", CONNECTION_ERROR)]
    NotConnected,
    /// The driver could not establish a link to the server.
    #[error("{0}")]
    Connection(String),
    /// The driver rejected the request or hit a protocol problem.
    #[error("{0}")]
    Operation(String),
    /// The server completed the request but reported that it failed.
    #[error("{0}")]
    Command(String),
    /// The namespace is not of the `database.collection` form.
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),
}

/// A specialized `Result` type for blocking driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

impl From<BsonError> for DriverError {
    fn from(err: BsonError) -> Self {
        DriverError::Operation(err.to_string())
    }
}

/// Represents failures that are reported synchronously to the caller.
#[derive(Error, Debug)]
pub enum ReactMongoError {
    /// The host string is not of the `hostname[:port]` form.
    #[error("Invalid host: {0}")]
    InvalidHost(String),
    /// The worker thread could not be started.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// A driver error surfaced outside of a worker job.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// A specialized `Result` type for synchronous library calls.
pub type ReactMongoResult<T> = Result<T, ReactMongoError>;
