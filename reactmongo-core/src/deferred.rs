//! Single-use completion handles returned by [`Connection`](crate::connection::Connection)
//! operations.
//!
//! A [`Deferred`] carries up to three observers: one for success, one for failure and
//! one for completion. Exactly one outcome is delivered over its lifetime:
//!
//! - success, then completion
//! - failure, then completion
//! - completion only, when the outcome was never determined because nobody asked
//!
//! Observers are registered through the public handle. Settling is only possible
//! through the crate-private [`Settler`], which is consumed by the act of settling, so
//! a handle can never be settled twice.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;
type FailureCallback = Box<dyn FnOnce(&str) + Send>;
type CompleteCallback = Box<dyn FnOnce() + Send>;

struct Slots<T> {
    success: Option<SuccessCallback<T>>,
    failure: Option<FailureCallback>,
    complete: Option<CompleteCallback>,
    settled: bool,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            success: None,
            failure: None,
            complete: None,
            settled: false,
        }
    }
}

/// Completion handle for an operation that is running on the worker thread.
///
/// Callbacks always run on the thread draining the
/// [`EventLoop`](crate::context::EventLoop), never on the worker. Registering a
/// callback replaces any callback previously registered for the same slot.
///
/// # Example
///
/// ```ignore
/// connection
///     .query("shop.orders", Value::map([("_id", "documentid")]))
///     .on_success(|orders| println!("{orders:?}"))
///     .on_failure(|error| eprintln!("query failed: {error}"))
///     .on_complete(|| println!("done"));
/// ```
pub struct Deferred<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

/// Deferred for operations that produce a value (queries and commands).
pub type DeferredValue = Deferred<crate::value::Value>;

/// Deferred for write operations, whose success carries no payload.
pub type DeferredWrite = Deferred<()>;

impl<T> Deferred<T> {
    /// Creates a pending handle together with the capability to settle it.
    pub(crate) fn new() -> (Self, Settler<T>) {
        let slots = Arc::new(Mutex::new(Slots::default()));

        (
            Self {
                slots: Arc::clone(&slots),
            },
            Settler { slots },
        )
    }

    /// Registers the callback to execute when the operation succeeds.
    pub fn on_success<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.slots.lock().success = Some(Box::new(callback));
        self
    }

    /// Registers the callback to execute when the operation fails.
    pub fn on_failure<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.slots.lock().failure = Some(Box::new(callback));
        self
    }

    /// Registers the callback to execute once the operation finished, whatever the outcome.
    pub fn on_complete<F>(&self, callback: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.slots.lock().complete = Some(Box::new(callback));
        self
    }

    /// Whether anyone is interested in the outcome of the operation.
    ///
    /// Only success and failure observers count; a completion observer does not need
    /// to know which of the two happened.
    pub fn requires_status(&self) -> bool {
        self.slots.lock().requires_status()
    }

    /// Whether the outcome has already been delivered.
    pub fn is_settled(&self) -> bool {
        self.slots.lock().settled
    }
}

impl<T> Slots<T> {
    fn requires_status(&self) -> bool {
        self.success.is_some() || self.failure.is_some()
    }

    fn settle(&mut self) -> (Option<SuccessCallback<T>>, Option<FailureCallback>, Option<CompleteCallback>) {
        self.settled = true;
        (self.success.take(), self.failure.take(), self.complete.take())
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();

        f.debug_struct("Deferred")
            .field("on_success", &slots.success.is_some())
            .field("on_failure", &slots.failure.is_some())
            .field("on_complete", &slots.complete.is_some())
            .field("settled", &slots.settled)
            .finish()
    }
}

/// Settling side of a [`Deferred`]. Every method consumes the settler.
///
/// The lock is released before any callback runs, so callbacks may freely touch the
/// handle they were registered on.
pub(crate) struct Settler<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> Settler<T> {
    pub(crate) fn requires_status(&self) -> bool {
        self.slots.lock().requires_status()
    }

    /// Delivers a successful outcome.
    pub(crate) fn succeed(self, payload: T) {
        let (success, _, complete) = self.slots.lock().settle();

        if let Some(callback) = success {
            callback(payload);
        }
        if let Some(callback) = complete {
            callback();
        }
    }

    /// Delivers a failed outcome.
    pub(crate) fn fail(self, error: &str) {
        let (_, failure, complete) = self.slots.lock().settle();

        if let Some(callback) = failure {
            callback(error);
        }
        if let Some(callback) = complete {
            callback();
        }
    }

    /// Signals that the operation finished without determining its outcome.
    pub(crate) fn complete(self) {
        let (_, _, complete) = self.slots.lock().settle();

        if let Some(callback) = complete {
            callback();
        }
    }
}
