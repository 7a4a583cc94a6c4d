//! In-memory database backend for reactmongo.
//!
//! This crate provides [`InMemoryDriver`], an implementation of the blocking
//! `Driver` trait that keeps documents in process memory. It behaves enough like a
//! real server to drive a `Connection` end to end, which makes it the backend of
//! choice for tests and local development.
//!
//! # Features
//!
//! - **Shared state** - Clones of a driver see the same documents, so a test can keep one
//!   handle for assertions while the connection's worker owns another
//! - **Query filters** - Equality, comparison operators, dotted paths and logical combinators
//! - **Write status** - Rejected writes are reported through `last_error`, like a server would
//! - **Reachability** - The simulated server can be taken offline to exercise failure paths
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use reactmongo_core::{connection::Connection, context::EventLoop, value::Value};
//! use reactmongo_memory::InMemoryDriver;
//!
//! let server = InMemoryDriver::new();
//! let event_loop = EventLoop::new();
//! let connection = Connection::new(&event_loop, server.clone(), "localhost")?;
//!
//! connection
//!     .insert("shop.orders", Value::map([("sku", "abc")]))
//!     .on_success(|()| println!("stored"));
//!
//! event_loop.run_once(Duration::from_secs(1));
//! assert_eq!(server.documents("shop.orders").len(), 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as reactmongo_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryDriver, InMemoryDriverBuilder};
