//! The blocking driver abstraction the dispatch engine runs on its worker thread.
//!
//! # Overview
//!
//! A [`Driver`] is a synchronous database client. Every call may block for as long as
//! the network exchange takes; that is fine because the only caller is the
//! [`Worker`](crate::context::Worker) thread of a
//! [`Connection`](crate::connection::Connection), which owns the driver exclusively.
//! Implementations therefore need to be `Send` but never `Sync`, and need no locking
//! around their own state.
//!
//! Failures are returned as [`DriverError`] values rather than panics. Write calls
//! only report failures of the call itself; the server's verdict on a write is
//! retrieved separately with [`Driver::last_error`], which the dispatch engine skips
//! when nobody is listening.

use std::{fmt, str::FromStr};

use bson::Document;

use crate::error::{DriverError, DriverResult, ReactMongoError, ReactMongoResult};

/// Port assumed when the host string does not carry one.
pub const DEFAULT_PORT: u16 = 27017;

/// Abstract interface for blocking document-database clients.
pub trait Driver: Send + 'static {
    /// Establishes the link to the server.
    fn connect(&mut self, host: &HostSpec) -> DriverResult<()>;

    /// Whether the link to the server is healthy.
    fn is_connected(&mut self) -> bool;

    /// Runs a query against a `database.collection` namespace, returning every match
    /// in server order.
    fn query(&mut self, namespace: &str, filter: Document) -> DriverResult<Vec<Document>>;

    /// Inserts a batch of documents.
    fn insert(&mut self, namespace: &str, documents: Vec<Document>) -> DriverResult<()>;

    /// Updates the documents matching `filter`.
    ///
    /// * `upsert` - insert a document when nothing matches
    /// * `multi` - apply to every match instead of the first one only
    fn update(
        &mut self,
        namespace: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> DriverResult<()>;

    /// Removes the documents matching `filter`, or only the first one when
    /// `limit_to_one` is set.
    fn remove(&mut self, namespace: &str, filter: Document, limit_to_one: bool) -> DriverResult<()>;

    /// Runs a database command and returns the server's reply.
    fn run_command(&mut self, database: &str, command: Document) -> DriverResult<Document>;

    /// Retrieves the status of the last write issued on this handle.
    ///
    /// Returns `Ok(None)` if it succeeded and `Ok(Some(text))` with the server's
    /// description if it did not.
    fn last_error(&mut self) -> DriverResult<Option<String>>;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn connect(&mut self, host: &HostSpec) -> DriverResult<()> {
        (**self).connect(host)
    }

    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }

    fn query(&mut self, namespace: &str, filter: Document) -> DriverResult<Vec<Document>> {
        (**self).query(namespace, filter)
    }

    fn insert(&mut self, namespace: &str, documents: Vec<Document>) -> DriverResult<()> {
        (**self).insert(namespace, documents)
    }

    fn update(
        &mut self,
        namespace: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> DriverResult<()> {
        (**self).update(namespace, filter, update, upsert, multi)
    }

    fn remove(&mut self, namespace: &str, filter: Document, limit_to_one: bool) -> DriverResult<()> {
        (**self).remove(namespace, filter, limit_to_one)
    }

    fn run_command(&mut self, database: &str, command: Document) -> DriverResult<Document> {
        (**self).run_command(database, command)
    }

    fn last_error(&mut self) -> DriverResult<Option<String>> {
        (**self).last_error()
    }
}

/// A single server address, parsed from `hostname` or `hostname:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub host: String,
    pub port: u16,
}

impl HostSpec {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses a host string, defaulting the port to [`DEFAULT_PORT`].
    pub fn parse(input: &str) -> ReactMongoResult<Self> {
        let input = input.trim();
        let (host, port) = match input.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| ReactMongoError::InvalidHost(input.to_string()))?,
            ),
            None => (input, DEFAULT_PORT),
        };

        if host.is_empty() || host.contains(':') {
            return Err(ReactMongoError::InvalidHost(input.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl FromStr for HostSpec {
    type Err = ReactMongoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A `database.collection` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace<'a> {
    pub database: &'a str,
    pub collection: &'a str,
}

impl<'a> Namespace<'a> {
    /// Splits a namespace on its first dot; collection names may contain further dots.
    pub fn parse(namespace: &'a str) -> DriverResult<Self> {
        match namespace.split_once('.') {
            Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
                Ok(Self {
                    database,
                    collection,
                })
            }
            _ => Err(DriverError::InvalidNamespace(namespace.to_string())),
        }
    }
}
