//! The dispatch engine: a connection whose blocking work runs on a worker thread and
//! whose notifications are delivered on the caller's event loop.
//!
//! Every operation follows the same path:
//!
//! 1. the request is packaged in the calling thread and a [`Deferred`] is created
//! 2. a job is queued on the connection's [`Worker`]; the worker encodes the request,
//!    performs the blocking driver call and decodes the reply
//! 3. the outcome is queued on the [`EventLoop`], where the deferred's callbacks run
//!
//! Nothing blocks the caller, and no user callback ever runs on the worker thread.
//! Operations on one connection reach the driver in submission order and report back
//! in the same order.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

use tracing::{debug, error, info, trace, warn};

use crate::{
    context::{EventLoop, LoopHandle, Worker},
    convert::{decode_document, encode_batch, encode_document},
    deferred::{Deferred, DeferredValue, DeferredWrite, Settler},
    driver::{Driver, HostSpec},
    error::{DriverError, DriverResult, ReactMongoResult},
    value::Value,
};

/// Callback informed of the outcome of a connection attempt.
pub type ConnectCallback = Box<dyn FnOnce(Result<(), &str>) + Send>;

/// Name given to worker threads unless configured otherwise.
pub const DEFAULT_WORKER_NAME: &str = "reactmongo-worker";

/// Text used when a command reply reports failure without saying why.
const COMMAND_FAILED: &str = "command failed";

/// Failure text delivered when the driver panicked while serving an operation.
pub const OPERATION_ABORTED: &str = "operation aborted: the driver panicked";

/// Asynchronous connection to a database server.
///
/// The driver is moved into a dedicated worker thread and only ever touched there.
/// All callbacks, including the one passed at construction, are delivered through
/// the [`EventLoop`] the connection was created with.
///
/// Write operations decide whether to fetch the server's status when the worker
/// reaches them, by asking the returned [`Deferred`] whether it has a success or
/// failure observer. Register those observers right after issuing the write; a write
/// whose observers arrive after the worker got to it completes without status.
///
/// # Dropping
///
/// Dropping the connection blocks the calling thread until every operation already
/// queued has run against the driver, which for a slow or unreachable server can
/// take as long as the driver's timeouts. Drop it outside latency-sensitive paths.
///
/// # Example
///
/// ```ignore
/// let event_loop = EventLoop::new();
/// let connection = Connection::with_callback(&event_loop, driver, "localhost", |result| {
///     if let Err(error) = result {
///         eprintln!("cannot connect: {error}");
///     }
/// })?;
///
/// connection
///     .insert("shop.orders", Value::map([("item", "book")]))
///     .on_failure(|error| eprintln!("insert failed: {error}"));
///
/// loop {
///     event_loop.run_once(Duration::from_millis(100));
/// }
/// ```
pub struct Connection<D: Driver> {
    worker: Worker<D>,
    master: LoopHandle,
}

impl<D: Driver> Connection<D> {
    /// Creates a connection and queues the attempt to connect to `host`.
    ///
    /// Connection failures are absorbed; later operations fail on their own.
    pub fn new(event_loop: &EventLoop, driver: D, host: &str) -> ReactMongoResult<Self> {
        ConnectionBuilder::new(host).build(event_loop, driver)
    }

    /// Creates a connection and queues the attempt to connect to `host`, reporting the
    /// outcome to `callback` on the event loop.
    pub fn with_callback<F>(
        event_loop: &EventLoop,
        driver: D,
        host: &str,
        callback: F,
    ) -> ReactMongoResult<Self>
    where
        F: FnOnce(Result<(), &str>) + Send + 'static,
    {
        ConnectionBuilder::new(host)
            .on_connect(callback)
            .build(event_loop, driver)
    }

    /// Queues a new connection attempt without observing its outcome.
    pub fn connect(&self, host: &str) {
        self.queue_connect(host, None);
    }

    /// Queues a new connection attempt and reports its outcome to `callback`.
    pub fn connect_with<F>(&self, host: &str, callback: F)
    where
        F: FnOnce(Result<(), &str>) + Send + 'static,
    {
        self.queue_connect(host, Some(Box::new(callback)));
    }

    fn queue_connect(&self, host: &str, callback: Option<ConnectCallback>) {
        let host = host.to_string();
        let master = self.master.clone();

        self.worker.execute(move |driver| {
            let result = HostSpec::parse(&host)
                .map_err(|e| e.to_string())
                .and_then(|address| driver.connect(&address).map_err(|e| e.to_string()));

            match &result {
                Ok(()) => info!(host = %host, "Connected"),
                Err(error) => warn!(host = %host, error = %error, "Connection attempt failed"),
            }

            if let Some(callback) = callback {
                master.execute(move || callback(result.as_ref().map(|_| ()).map_err(String::as_str)));
            }
        });
    }

    /// Checks on the worker whether the link to the server is healthy.
    pub fn is_connected<F>(&self, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let master = self.master.clone();

        self.worker.execute(move |driver| {
            let connected = driver.is_connected();
            master.execute(move || callback(connected));
        });
    }

    /// Queries a `database.collection` namespace.
    ///
    /// On success the payload is always a [`Value::Array`] of the matching documents,
    /// empty when nothing matched.
    pub fn query(&self, collection: &str, filter: impl Into<Value>) -> DeferredValue {
        let filter = filter.into();

        self.dispatch_read("query", collection, move |driver, namespace| {
            Ok(Value::Array(
                driver
                    .query(namespace, encode_document(filter))?
                    .into_iter()
                    .map(decode_document)
                    .collect(),
            ))
        })
    }

    /// Inserts a document, or every element of an array of documents.
    pub fn insert(&self, collection: &str, documents: impl Into<Value>) -> DeferredWrite {
        let documents = documents.into();

        self.dispatch_write("insert", collection, move |driver, namespace| {
            driver.insert(namespace, encode_batch(documents))
        })
    }

    /// Inserts without returning a handle: no status is retrieved and failures are
    /// never reported.
    pub fn insert_detached(&self, collection: &str, documents: impl Into<Value>) {
        let documents = documents.into();

        self.dispatch_detached("insert", collection, move |driver, namespace| {
            driver.insert(namespace, encode_batch(documents))
        });
    }

    /// Updates the documents matching `filter`.
    ///
    /// * `upsert` - insert a document when nothing matches
    /// * `multi` - update every match instead of only the first
    pub fn update(
        &self,
        collection: &str,
        filter: impl Into<Value>,
        document: impl Into<Value>,
        upsert: bool,
        multi: bool,
    ) -> DeferredWrite {
        let (filter, document) = (filter.into(), document.into());

        self.dispatch_write("update", collection, move |driver, namespace| {
            driver.update(
                namespace,
                encode_document(filter),
                encode_document(document),
                upsert,
                multi,
            )
        })
    }

    /// Fire-and-forget variant of [`update`](Connection::update).
    pub fn update_detached(
        &self,
        collection: &str,
        filter: impl Into<Value>,
        document: impl Into<Value>,
        upsert: bool,
        multi: bool,
    ) {
        let (filter, document) = (filter.into(), document.into());

        self.dispatch_detached("update", collection, move |driver, namespace| {
            driver.update(
                namespace,
                encode_document(filter),
                encode_document(document),
                upsert,
                multi,
            )
        });
    }

    /// Removes the documents matching `filter`, or only the first when `limit_to_one`.
    pub fn remove(
        &self,
        collection: &str,
        filter: impl Into<Value>,
        limit_to_one: bool,
    ) -> DeferredWrite {
        let filter = filter.into();

        self.dispatch_write("remove", collection, move |driver, namespace| {
            driver.remove(namespace, encode_document(filter), limit_to_one)
        })
    }

    /// Fire-and-forget variant of [`remove`](Connection::remove).
    pub fn remove_detached(&self, collection: &str, filter: impl Into<Value>, limit_to_one: bool) {
        let filter = filter.into();

        self.dispatch_detached("remove", collection, move |driver, namespace| {
            driver.remove(namespace, encode_document(filter), limit_to_one)
        });
    }

    /// Runs a command against `database`.
    ///
    /// A reply whose `ok` field is absent or falsy settles as a failure carrying the
    /// reply's `error` (or `errmsg`) text.
    pub fn run_command(&self, database: &str, command: impl Into<Value>) -> DeferredValue {
        let command = command.into();

        self.dispatch_read("command", database, move |driver, database| {
            check_command_reply(decode_document(
                driver.run_command(database, encode_document(command))?,
            ))
        })
    }

    fn dispatch_read<F>(&self, operation: &'static str, target: &str, read: F) -> DeferredValue
    where
        F: FnOnce(&mut D, &str) -> DriverResult<Value> + Send + 'static,
    {
        let (deferred, settler) = Deferred::new();
        let target = target.to_string();
        let master = self.master.clone();

        debug!(operation, target = %target, "Dispatching");

        self.worker.execute(move |driver| {
            let outcome = shielded(operation, || read(driver, &target));

            master.execute(move || match outcome {
                Ok(value) => settler.succeed(value),
                Err(error) => settler.fail(&error.to_string()),
            });
        });

        deferred
    }

    fn dispatch_write<F>(&self, operation: &'static str, namespace: &str, write: F) -> DeferredWrite
    where
        F: FnOnce(&mut D, &str) -> DriverResult<()> + Send + 'static,
    {
        let (deferred, settler) = Deferred::new();
        let namespace = namespace.to_string();
        let master = self.master.clone();

        debug!(operation, namespace = %namespace, "Dispatching");

        self.worker.execute(move |driver| {
            let outcome = match shielded(operation, || write(driver, &namespace)) {
                Err(error) => WriteOutcome::Failed(error.to_string()),
                Ok(()) if !settler.requires_status() => {
                    trace!(operation, namespace = %namespace, "No observer, skipping status round-trip");
                    WriteOutcome::Unobserved
                }
                Ok(()) => match shielded(operation, || driver.last_error()) {
                    Ok(None) => WriteOutcome::Succeeded,
                    Ok(Some(error)) => WriteOutcome::Failed(error),
                    Err(error) => WriteOutcome::Failed(error.to_string()),
                },
            };

            master.execute(move || outcome.settle(settler));
        });

        deferred
    }

    fn dispatch_detached<F>(&self, operation: &'static str, namespace: &str, write: F)
    where
        F: FnOnce(&mut D, &str) -> DriverResult<()> + Send + 'static,
    {
        let namespace = namespace.to_string();

        debug!(operation, namespace = %namespace, "Dispatching detached");

        self.worker.execute(move |driver| {
            if let Err(error) = shielded(operation, || write(driver, &namespace)) {
                debug!(operation, namespace = %namespace, %error, "Detached operation failed");
            }
        });
    }
}

impl<D: Driver> fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("worker", &self.worker)
            .finish()
    }
}

enum WriteOutcome {
    Unobserved,
    Succeeded,
    Failed(String),
}

impl WriteOutcome {
    fn settle(self, settler: Settler<()>) {
        match self {
            WriteOutcome::Unobserved => settler.complete(),
            WriteOutcome::Succeeded => settler.succeed(()),
            WriteOutcome::Failed(error) => settler.fail(&error),
        }
    }
}

/// Runs a driver call, turning a panic into a failure so the operation still settles.
fn shielded<T>(operation: &'static str, call: impl FnOnce() -> DriverResult<T>) -> DriverResult<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|_| {
        error!(operation, "Driver panicked");
        Err(DriverError::Operation(OPERATION_ABORTED.to_string()))
    })
}

/// Turns a command reply with a falsy or missing `ok` into a failure.
fn check_command_reply(reply: Value) -> DriverResult<Value> {
    if reply.get("ok").is_some_and(Value::is_truthy) {
        return Ok(reply);
    }

    Err(DriverError::Command(
        ["error", "errmsg"]
            .iter()
            .find_map(|key| reply.get(key).and_then(Value::as_str))
            .unwrap_or(COMMAND_FAILED)
            .to_string(),
    ))
}

/// Builder for [`Connection`].
pub struct ConnectionBuilder {
    host: String,
    worker_name: String,
    on_connect: Option<ConnectCallback>,
}

impl ConnectionBuilder {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            on_connect: None,
        }
    }

    /// Names the worker thread.
    pub fn worker_name(mut self, name: &str) -> Self {
        self.worker_name = name.to_string();
        self
    }

    /// Registers the callback informed of the initial connection attempt.
    pub fn on_connect<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<(), &str>) + Send + 'static,
    {
        self.on_connect = Some(Box::new(callback));
        self
    }

    /// Spawns the worker, moves `driver` into it and queues the connection attempt.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHost`](crate::error::ReactMongoError::InvalidHost) if the host
    /// string is malformed and [`Spawn`](crate::error::ReactMongoError::Spawn) if the
    /// worker thread cannot be started.
    pub fn build<D: Driver>(self, event_loop: &EventLoop, driver: D) -> ReactMongoResult<Connection<D>> {
        HostSpec::parse(&self.host)?;

        let connection = Connection {
            worker: Worker::spawn(&self.worker_name, driver)?,
            master: event_loop.handle(),
        };
        connection.queue_connect(&self.host, self.on_connect);

        Ok(connection)
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("host", &self.host)
            .field("worker_name", &self.worker_name)
            .field("on_connect", &self.on_connect.is_some())
            .finish()
    }
}
