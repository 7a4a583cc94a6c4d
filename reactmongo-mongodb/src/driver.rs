use std::time::Duration;

use bson::{Document, doc};
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, ServerAddress},
    sync::{Client, Collection},
};
use tracing::debug;

use reactmongo_core::{
    driver::{Driver, HostSpec, Namespace},
    error::{DriverError, DriverResult},
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_APP_NAME: &str = "reactmongo";

/// Blocking MongoDB client for a single server.
///
/// Write calls only fail for transport or selection problems. When the server
/// rejects a write, the rejection is kept and handed out by
/// [`last_error`](Driver::last_error), matching the status round-trip the
/// connection performs for observed writes.
#[derive(Debug)]
pub struct MongoDriver {
    client: Option<Client>,
    options: MongoDriverBuilder,
    last_error: Option<String>,
}

impl MongoDriver {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MongoDriverBuilder {
        MongoDriverBuilder::default()
    }

    fn client(&self) -> DriverResult<&Client> {
        self.client.as_ref().ok_or(DriverError::NotConnected)
    }

    fn collection(&self, namespace: &str) -> DriverResult<Collection<Document>> {
        let namespace = Namespace::parse(namespace)?;

        Ok(self
            .client()?
            .database(namespace.database)
            .collection(namespace.collection))
    }

    fn client_options(&self, host: &HostSpec) -> ClientOptions {
        let mut options = ClientOptions::default();

        options.hosts = vec![ServerAddress::Tcp {
            host: host.host.clone(),
            port: Some(host.port),
        }];
        options.connect_timeout = Some(self.options.connect_timeout);
        options.server_selection_timeout = Some(self.options.server_selection_timeout);
        options.app_name = Some(self.options.app_name.clone());
        options.direct_connection = Some(self.options.direct_connection);

        options
    }

    fn ping(client: &Client) -> Result<Document, MongoError> {
        client.database("admin").run_command(doc! { "ping": 1 }).run()
    }

    /// Splits a write's outcome into the part returned to the caller and the
    /// server's verdict, which is kept for [`last_error`](Driver::last_error).
    fn record<T>(&mut self, result: Result<T, MongoError>) -> DriverResult<()> {
        self.last_error = match result {
            Ok(_) => None,
            Err(error) => match server_rejection(&error) {
                Some(message) => {
                    debug!(error = %message, "Write rejected by server");
                    Some(message)
                }
                None => return Err(driver_error(error)),
            },
        };

        Ok(())
    }
}

impl Default for MongoDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MongoDriver {
    fn connect(&mut self, host: &HostSpec) -> DriverResult<()> {
        self.client = None;

        let client = Client::with_options(self.client_options(host))
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        Self::ping(&client).map_err(|e| DriverError::Connection(e.to_string()))?;

        debug!(host = %host, "Server answered ping");
        self.client = Some(client);

        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|client| Self::ping(client).is_ok())
    }

    fn query(&mut self, namespace: &str, filter: Document) -> DriverResult<Vec<Document>> {
        self.collection(namespace)?
            .find(filter)
            .run()
            .map_err(driver_error)?
            .collect::<Result<Vec<Document>, _>>()
            .map_err(driver_error)
    }

    fn insert(&mut self, namespace: &str, documents: Vec<Document>) -> DriverResult<()> {
        let collection = self.collection(namespace)?;

        if documents.is_empty() {
            self.last_error = None;
            return Ok(());
        }

        self.record(collection.insert_many(documents).run())
    }

    fn update(
        &mut self,
        namespace: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> DriverResult<()> {
        let collection = self.collection(namespace)?;
        let operators = update.keys().next().is_some_and(|key| key.starts_with('$'));

        let result = match (operators, multi) {
            (true, false) => collection.update_one(filter, update).upsert(upsert).run(),
            (true, true) => collection.update_many(filter, update).upsert(upsert).run(),
            (false, false) => collection.replace_one(filter, update).upsert(upsert).run(),
            (false, true) => {
                self.last_error = Some("multi update only works with $ operators".to_string());
                return Ok(());
            }
        };

        self.record(result)
    }

    fn remove(&mut self, namespace: &str, filter: Document, limit_to_one: bool) -> DriverResult<()> {
        let collection = self.collection(namespace)?;

        let result = if limit_to_one {
            collection.delete_one(filter).run()
        } else {
            collection.delete_many(filter).run()
        };

        self.record(result)
    }

    fn run_command(&mut self, database: &str, command: Document) -> DriverResult<Document> {
        match self.client()?.database(database).run_command(command).run() {
            Ok(reply) => Ok(reply),
            // The driver turns `ok: 0` replies into errors; hand them back as replies.
            Err(error) => match error.kind.as_ref() {
                ErrorKind::Command(failure) => Ok(doc! {
                    "ok": 0.0,
                    "errmsg": failure.message.clone(),
                    "code": failure.code,
                    "codeName": failure.code_name.clone(),
                }),
                _ => Err(driver_error(error)),
            },
        }
    }

    fn last_error(&mut self) -> DriverResult<Option<String>> {
        self.client()?;

        Ok(self.last_error.take())
    }
}

/// Classifies a failed call. Losing the server after connecting reads as
/// [`NotConnected`](DriverError::NotConnected), like never having connected.
fn driver_error(error: MongoError) -> DriverError {
    match error.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => DriverError::NotConnected,
        _ => DriverError::Operation(error.to_string()),
    }
}

/// The server's description of a rejected write, if the error is one.
fn server_rejection(error: &MongoError) -> Option<String> {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) => Some(failure.message.clone()),
        ErrorKind::Write(WriteFailure::WriteConcernError(failure)) => Some(failure.message.clone()),
        ErrorKind::InsertMany(_) => Some(error.to_string()),
        _ => None,
    }
}

/// Builder for [`MongoDriver`] instances.
///
/// The host comes from the connection; this only carries client settings.
#[derive(Debug, Clone)]
pub struct MongoDriverBuilder {
    connect_timeout: Duration,
    server_selection_timeout: Duration,
    app_name: String,
    direct_connection: bool,
}

impl Default for MongoDriverBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
            app_name: DEFAULT_APP_NAME.to_string(),
            direct_connection: true,
        }
    }
}

impl MongoDriverBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How long an operation waits for a usable server before failing.
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = timeout;
        self
    }

    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = name.to_string();
        self
    }

    /// Talk to the given host only, instead of discovering the rest of its replica set.
    pub fn direct_connection(mut self, direct: bool) -> Self {
        self.direct_connection = direct;
        self
    }

    pub fn build(self) -> MongoDriver {
        MongoDriver {
            client: None,
            options: self,
            last_error: None,
        }
    }
}
