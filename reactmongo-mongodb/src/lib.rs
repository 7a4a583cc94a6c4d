//! MongoDB backend for reactmongo.
//!
//! This crate provides [`MongoDriver`], an implementation of the blocking `Driver`
//! trait on top of the synchronous API of the official `mongodb` crate. The
//! connection's worker thread owns the driver, so every call here simply blocks
//! until the server answers.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! reactmongo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use reactmongo::{prelude::*, mongodb::MongoDriver};
//!
//! let event_loop = EventLoop::new();
//! let driver = MongoDriver::builder()
//!     .connect_timeout(Duration::from_secs(2))
//!     .build();
//!
//! let connection = Connection::with_callback(&event_loop, driver, "localhost:27017", |result| {
//!     if let Err(error) = result {
//!         eprintln!("cannot reach mongo: {error}");
//!     }
//! })?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as reactmongo_mongodb;

pub mod driver;

pub use driver::{MongoDriver, MongoDriverBuilder};
