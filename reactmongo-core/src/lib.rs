//! An asynchronous, callback-driven facade over blocking document-database clients.
//!
//! This crate is the core of the reactmongo project and provides:
//!
//! - **Dynamic values** ([`value`]) - The tagged union used for filters, documents and replies
//! - **Value conversion** ([`convert`]) - Mapping between values and BSON documents
//! - **Completion handles** ([`deferred`]) - Success, failure and completion observers for one operation
//! - **Execution contexts** ([`context`]) - The caller's event loop and the background worker thread
//! - **Driver abstraction** ([`driver`]) - The blocking client interface the worker runs against
//! - **Dispatch engine** ([`connection`]) - The connection object tying all of the above together
//! - **Error handling** ([`error`]) - Driver and library error types
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use reactmongo_core::{connection::Connection, context::EventLoop, value::Value};
//!
//! let event_loop = EventLoop::new();
//! let connection = Connection::new(&event_loop, driver, "localhost:27017")?;
//!
//! connection
//!     .query("shop.orders", Value::map([("status", "open")]))
//!     .on_success(|orders| println!("open orders: {orders:?}"))
//!     .on_failure(|error| eprintln!("query failed: {error}"));
//!
//! // Callbacks run here, on the caller's thread
//! event_loop.run_once(Duration::from_secs(1));
//! ```

#[allow(unused_extern_crates)]
extern crate self as reactmongo_core;

pub mod connection;
pub mod context;
pub mod convert;
pub mod deferred;
pub mod driver;
pub mod error;
pub mod value;
