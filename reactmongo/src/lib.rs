//! Main reactmongo crate: an asynchronous, callback-driven facade over a blocking
//! MongoDB client.
//!
//! Operations issued on a [`Connection`](connection::Connection) return immediately
//! with a [`Deferred`](deferred::Deferred) handle. The blocking driver call happens on
//! the connection's own worker thread, and the handle's callbacks run later on the
//! caller's [`EventLoop`](context::EventLoop), never on the worker.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use reactmongo::{prelude::*, memory::InMemoryDriver};
//!
//! fn main() -> ReactMongoResult<()> {
//!     let event_loop = EventLoop::new();
//!     let connection = Connection::new(&event_loop, InMemoryDriver::new(), "localhost")?;
//!
//!     // Observing the outcome makes the connection fetch the write's status
//!     connection
//!         .insert("shop.orders", Value::map([("sku", "abc")]))
//!         .on_success(|()| println!("stored"))
//!         .on_failure(|error| eprintln!("rejected: {error}"));
//!
//!     // Nobody listens here, so no status round-trip is made
//!     connection.insert_detached("shop.audit", Value::map([("event", "order")]));
//!
//!     connection
//!         .query("shop.orders", Value::empty_map())
//!         .on_success(|orders| println!("orders: {orders:?}"));
//!
//!     // Callbacks run on this thread, as the loop is driven
//!     while event_loop.run_once(Duration::from_millis(100)) {}
//!
//!     Ok(())
//! }
//! ```
//!
//! # Commands
//!
//! A command reply whose `ok` field is missing or falsy settles as a failure with
//! the reply's error text:
//!
//! ```ignore
//! connection
//!     .run_command("admin", Value::map([("ping", 1)]))
//!     .on_success(|reply| println!("pong: {reply:?}"))
//!     .on_failure(|error| eprintln!("ping failed: {error}"));
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process server simulation for development and testing
//! - [`mongodb`] - MongoDB over the official driver (requires `mongodb` feature)

pub mod prelude;

pub use reactmongo_core::{connection, context, convert, deferred, driver, error, value};

// Re-export BSON types for custom drivers
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use reactmongo_memory::{InMemoryDriver, InMemoryDriverBuilder};
}

/// MongoDB driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use reactmongo_mongodb::{MongoDriver, MongoDriverBuilder};
}
