//! Convenient re-exports of commonly used types from reactmongo.
//!
//! ```ignore
//! use reactmongo::prelude::*;
//! ```
//!
//! This provides access to:
//! - The connection, its builder and the event loop callbacks run on
//! - Completion handles returned by operations
//! - The dynamic value type and the driver interface
//! - Error types

pub use reactmongo_core::{
    connection::{Connection, ConnectionBuilder},
    context::{EventLoop, LoopHandle},
    deferred::{Deferred, DeferredValue, DeferredWrite},
    driver::{Driver, HostSpec, Namespace},
    value::{Value, ValueMap},
    error::{DriverError, DriverResult, ReactMongoError, ReactMongoResult},
};
