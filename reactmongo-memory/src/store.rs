//! In-memory implementation of the blocking [`Driver`] interface.
//!
//! Documents live in per-namespace vectors, in insertion order, behind a shared
//! read-write lock. Every clone of an [`InMemoryDriver`] talks to the same simulated
//! server, while connection state and the last write status stay per handle, the way
//! they would for separate client connections.

use std::{collections::HashMap, sync::Arc};

use bson::{Bson, Document, doc, oid::ObjectId};
use parking_lot::RwLock;
use tracing::debug;

use reactmongo_core::{
    driver::{Driver, HostSpec, Namespace},
    error::{DriverError, DriverResult},
};

use crate::evaluator::{DocumentEvaluator, bson_eq, is_operator_document};

type StoreMap = HashMap<String, Vec<Document>>;

#[derive(Debug)]
struct Server {
    online: bool,
    namespaces: StoreMap,
}

/// Thread-safe, in-process stand-in for a database server.
///
/// # Example
///
/// ```ignore
/// use reactmongo_memory::InMemoryDriver;
/// use reactmongo_core::{connection::Connection, context::EventLoop};
///
/// let server = InMemoryDriver::new();
/// let event_loop = EventLoop::new();
/// let connection = Connection::new(&event_loop, server.clone(), "memory")?;
///
/// // later, from the test
/// assert!(server.documents("shop.orders").is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDriver {
    server: Arc<RwLock<Server>>,
    connected: bool,
    last_error: Option<String>,
}

impl InMemoryDriver {
    /// Creates an empty, reachable server with a disconnected handle to it.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InMemoryDriverBuilder {
        InMemoryDriverBuilder::default()
    }

    /// Marks the simulated server as reachable or not.
    ///
    /// Going offline breaks the link of every handle: connection attempts are refused
    /// and operations fail with [`DriverError::NotConnected`].
    pub fn set_online(&self, online: bool) {
        self.server.write().online = online;
    }

    /// Snapshot of the documents stored under a namespace, in insertion order.
    pub fn documents(&self, namespace: &str) -> Vec<Document> {
        self.server
            .read()
            .namespaces
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Names of the namespaces holding at least one document.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names = self
            .server
            .read()
            .namespaces
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    fn ensure_connected(&self) -> DriverResult<()> {
        if self.connected && self.server.read().online {
            Ok(())
        } else {
            Err(DriverError::NotConnected)
        }
    }

    fn matching(documents: &[Document], filter: &Document) -> DriverResult<Vec<usize>> {
        let mut indices = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).matches(filter)? {
                indices.push(index);
            }
        }

        Ok(indices)
    }

    fn insert_into(collection: &mut Vec<Document>, namespace: &str, documents: Vec<Document>) -> Result<(), String> {
        for document in documents {
            let document = with_id(document);
            let id = document.get("_id").cloned().unwrap_or(Bson::Null);

            if collection
                .iter()
                .any(|existing| existing.get("_id").is_some_and(|other| bson_eq(other, &id)))
            {
                return Err(format!(
                    "E11000 duplicate key error collection: {namespace} index: _id_ dup key: {{ _id: {id} }}"
                ));
            }

            collection.push(document);
        }

        Ok(())
    }

    fn update_in(
        collection: &mut Vec<Document>,
        filter: &Document,
        update: &Document,
        upsert: bool,
        multi: bool,
    ) -> Result<(), String> {
        let operators = is_operator_document(update);

        if multi && !operators {
            return Err("multi update only works with $ operators".to_string());
        }

        let mut indices = Self::matching(collection, filter).map_err(|e| e.to_string())?;
        if !multi {
            indices.truncate(1);
        }

        if indices.is_empty() {
            if upsert {
                let document = if operators {
                    let mut seeded = equality_fields(filter);
                    apply_operators(&mut seeded, update)?;
                    seeded
                } else {
                    let mut replacement = update.clone();
                    if !replacement.contains_key("_id") {
                        if let Some(id) = equality_fields(filter).get("_id") {
                            replacement.insert("_id", id.clone());
                        }
                    }
                    replacement
                };
                collection.push(with_id(document));
            }
            return Ok(());
        }

        for index in indices {
            let target = &mut collection[index];

            if operators {
                // Modifiers apply all or nothing
                let mut modified = target.clone();
                apply_operators(&mut modified, update)?;
                *target = modified;
            } else {
                let mut replaced = Document::new();
                if let Some(id) = target.get("_id") {
                    replaced.insert("_id", id.clone());
                }
                for (key, value) in update {
                    if key != "_id" {
                        replaced.insert(key.clone(), value.clone());
                    }
                }
                *target = replaced;
            }
        }

        Ok(())
    }

    /// Runs a write against the shared server and records its status for
    /// [`last_error`](Driver::last_error).
    fn write<F>(&mut self, namespace: &str, write: F) -> DriverResult<()>
    where
        F: FnOnce(&mut Vec<Document>) -> Result<(), String>,
    {
        self.ensure_connected()?;
        Namespace::parse(namespace)?;

        let status = {
            let mut server = self.server.write();
            write(server.namespaces.entry(namespace.to_string()).or_default())
        };

        if let Err(error) = &status {
            debug!(namespace, error = %error, "Write rejected");
        }
        self.last_error = status.err();

        Ok(())
    }

    fn count(&self, database: &str, command: &Document) -> Document {
        let Some(Bson::String(collection)) = command.get("count") else {
            return command_error("collection name has invalid type", 73);
        };
        let filter = match command.get("query") {
            Some(Bson::Document(filter)) => filter.clone(),
            _ => Document::new(),
        };
        let server = self.server.read();
        let documents = server
            .namespaces
            .get(&format!("{database}.{collection}"))
            .map(Vec::as_slice)
            .unwrap_or_default();

        match Self::matching(documents, &filter) {
            Ok(indices) => doc! { "n": indices.len() as i64, "ok": 1.0 },
            Err(error) => command_error(&error.to_string(), 2),
        }
    }

    fn drop_collection(&self, database: &str, command: &Document) -> Document {
        let Some(Bson::String(collection)) = command.get("drop") else {
            return command_error("collection name has invalid type", 73);
        };
        let namespace = format!("{database}.{collection}");

        match self.server.write().namespaces.remove(&namespace) {
            Some(_) => doc! { "ns": namespace, "nIndexesWas": 1, "ok": 1.0 },
            None => command_error("ns not found", 26),
        }
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for InMemoryDriver {
    fn connect(&mut self, host: &HostSpec) -> DriverResult<()> {
        self.connected = self.server.read().online;

        if !self.connected {
            return Err(DriverError::Connection(format!(
                "couldn't connect to server {host}: connection refused"
            )));
        }

        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.ensure_connected().is_ok()
    }

    fn query(&mut self, namespace: &str, filter: Document) -> DriverResult<Vec<Document>> {
        self.ensure_connected()?;
        Namespace::parse(namespace)?;

        let server = self.server.read();
        let documents = server
            .namespaces
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(Self::matching(documents, &filter)?
            .into_iter()
            .map(|index| documents[index].clone())
            .collect())
    }

    fn insert(&mut self, namespace: &str, documents: Vec<Document>) -> DriverResult<()> {
        self.write(namespace, |collection| {
            Self::insert_into(collection, namespace, documents)
        })
    }

    fn update(
        &mut self,
        namespace: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> DriverResult<()> {
        self.write(namespace, |collection| {
            Self::update_in(collection, &filter, &update, upsert, multi)
        })
    }

    fn remove(&mut self, namespace: &str, filter: Document, limit_to_one: bool) -> DriverResult<()> {
        self.write(namespace, |collection| {
            let mut indices = Self::matching(collection, &filter).map_err(|e| e.to_string())?;
            if limit_to_one {
                indices.truncate(1);
            }
            for index in indices.into_iter().rev() {
                collection.remove(index);
            }
            Ok(())
        })
    }

    fn run_command(&mut self, database: &str, command: Document) -> DriverResult<Document> {
        self.ensure_connected()?;

        let Some(name) = command.keys().next().cloned() else {
            return Ok(command_error("no command given", 59));
        };

        Ok(match name.as_str() {
            "ping" => doc! { "ok": 1.0 },
            "count" => self.count(database, &command),
            "drop" => self.drop_collection(database, &command),
            "getLastError" | "getlasterror" => doc! {
                "err": self.last_error.clone().map_or(Bson::Null, Bson::String),
                "ok": 1.0,
            },
            _ => command_error(&format!("no such command: '{name}'"), 59),
        })
    }

    fn last_error(&mut self) -> DriverResult<Option<String>> {
        self.ensure_connected()?;

        Ok(self.last_error.take())
    }
}

/// Builder for [`InMemoryDriver`] instances.
#[derive(Debug)]
pub struct InMemoryDriverBuilder {
    online: bool,
    namespaces: StoreMap,
}

impl Default for InMemoryDriverBuilder {
    fn default() -> Self {
        Self {
            online: true,
            namespaces: StoreMap::new(),
        }
    }
}

impl InMemoryDriverBuilder {
    /// Starts the server unreachable.
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    /// Preloads documents under a namespace. Documents without `_id` get one.
    pub fn seed(mut self, namespace: &str, documents: Vec<Document>) -> Self {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .extend(documents.into_iter().map(with_id));
        self
    }

    pub fn build(self) -> InMemoryDriver {
        InMemoryDriver {
            server: Arc::new(RwLock::new(Server {
                online: self.online,
                namespaces: self.namespaces,
            })),
            connected: false,
            last_error: None,
        }
    }
}

/// Puts an `_id` first in the document, generating one when absent.
fn with_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }

    let mut identified = doc! { "_id": ObjectId::new() };
    for (key, value) in document {
        identified.insert(key, value);
    }
    identified
}

/// The plain `field: value` clauses of a filter, used to seed upserted documents.
fn equality_fields(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(key, value)| {
            !key.starts_with('$')
                && !key.contains('.')
                && !matches!(value, Bson::Document(inner) if is_operator_document(inner))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn apply_operators(document: &mut Document, update: &Document) -> Result<(), String> {
    for (operator, argument) in update {
        let Bson::Document(fields) = argument else {
            return Err(format!(
                "Modifiers operate on fields but we found type {} instead",
                type_name(argument)
            ));
        };

        for (field, operand) in fields {
            if field == "_id" {
                return Err("Performing an update on the path '_id' would modify the immutable field '_id'".to_string());
            }

            match operator.as_str() {
                "$set" => {
                    document.insert(field.clone(), operand.clone());
                }
                "$unset" => {
                    document.remove(field);
                }
                "$inc" => {
                    let incremented = increment(field, document.get(field), operand)?;
                    document.insert(field.clone(), incremented);
                }
                _ => return Err(format!("Unknown modifier: {operator}")),
            }
        }
    }

    Ok(())
}

fn increment(field: &str, current: Option<&Bson>, by: &Bson) -> Result<Bson, String> {
    let overflow = || format!("integer overflow applying $inc to field '{field}'");

    Ok(match (current.unwrap_or(&Bson::Int32(0)), by) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (a, b) => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(format!("Cannot apply $inc to field '{field}'")),
        },
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => "number",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        _ => "value",
    }
}

fn command_error(message: &str, code: i32) -> Document {
    doc! { "ok": 0.0, "errmsg": message, "code": code }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(driver: InMemoryDriver) -> InMemoryDriver {
        let mut driver = driver;
        driver.connect(&HostSpec::new("memory", 27017)).unwrap();
        driver
    }

    fn names(documents: &[Document]) -> Vec<&str> {
        documents
            .iter()
            .filter_map(|document| document.get_str("name").ok())
            .collect()
    }

    #[test]
    fn operations_require_a_connection() {
        let mut driver = InMemoryDriver::new();

        assert_eq!(driver.query("db.c", doc! {}), Err(DriverError::NotConnected));
        assert_eq!(driver.insert("db.c", vec![doc! {}]), Err(DriverError::NotConnected));
        assert!(!driver.is_connected());
    }

    #[test]
    fn offline_server_refuses_connections() {
        let mut driver = InMemoryDriver::builder().offline().build();

        assert!(matches!(
            driver.connect(&HostSpec::new("memory", 27017)),
            Err(DriverError::Connection(message)) if message.contains("memory:27017")
        ));
    }

    #[test]
    fn going_offline_breaks_existing_links() {
        let mut driver = connected(InMemoryDriver::new());
        assert!(driver.is_connected());

        driver.set_online(false);

        assert!(!driver.is_connected());
        assert_eq!(driver.query("db.c", doc! {}), Err(DriverError::NotConnected));
    }

    #[test]
    fn insert_assigns_ids_and_keeps_order() {
        let mut driver = connected(InMemoryDriver::new());

        driver
            .insert("db.people", vec![doc! { "name": "a" }, doc! { "name": "b" }])
            .unwrap();
        driver.insert("db.people", vec![doc! { "name": "c" }]).unwrap();

        let documents = driver.documents("db.people");
        assert_eq!(names(&documents), vec!["a", "b", "c"]);
        assert!(documents.iter().all(|d| matches!(d.get("_id"), Some(Bson::ObjectId(_)))));
        assert_eq!(driver.last_error().unwrap(), None);
    }

    #[test]
    fn duplicate_ids_are_reported_through_last_error() {
        let mut driver = connected(InMemoryDriver::new());

        driver.insert("db.c", vec![doc! { "_id": 1 }]).unwrap();
        driver.insert("db.c", vec![doc! { "_id": 2 }, doc! { "_id": 1 }]).unwrap();

        let error = driver.last_error().unwrap().unwrap();
        assert!(error.starts_with("E11000 duplicate key error"));
        assert_eq!(driver.documents("db.c").len(), 2);
        assert_eq!(driver.last_error().unwrap(), None);
    }

    #[test]
    fn query_filters_in_insertion_order() {
        let mut driver = connected(
            InMemoryDriver::builder()
                .seed(
                    "db.people",
                    vec![
                        doc! { "name": "a", "age": 20 },
                        doc! { "name": "b", "age": 40 },
                        doc! { "name": "c", "age": 30 },
                    ],
                )
                .build(),
        );

        let adults = driver
            .query("db.people", doc! { "age": { "$gte": 30 } })
            .unwrap();

        assert_eq!(names(&adults), vec!["b", "c"]);
        assert!(driver.query("db.other", doc! {}).unwrap().is_empty());
    }

    #[test]
    fn invalid_namespace_is_an_operation_error() {
        let mut driver = connected(InMemoryDriver::new());

        assert_eq!(
            driver.query("nodot", doc! {}),
            Err(DriverError::InvalidNamespace("nodot".to_string()))
        );
    }

    #[test]
    fn update_applies_operators_to_first_or_all_matches() {
        let mut driver = connected(
            InMemoryDriver::builder()
                .seed("db.c", vec![doc! { "k": 1, "n": 1 }, doc! { "k": 1, "n": 5 }])
                .build(),
        );

        driver
            .update("db.c", doc! { "k": 1 }, doc! { "$inc": { "n": 1 } }, false, false)
            .unwrap();
        assert_eq!(
            driver.documents("db.c").iter().map(|d| d.get("n").cloned()).collect::<Vec<_>>(),
            vec![Some(Bson::Int32(2)), Some(Bson::Int32(5))]
        );

        driver
            .update("db.c", doc! { "k": 1 }, doc! { "$set": { "tag": "x" }, "$unset": { "n": "" } }, false, true)
            .unwrap();
        assert!(driver
            .documents("db.c")
            .iter()
            .all(|d| d.get_str("tag").ok() == Some("x") && !d.contains_key("n")));
    }

    #[test]
    fn replacement_keeps_the_id() {
        let mut driver = connected(
            InMemoryDriver::builder()
                .seed("db.c", vec![doc! { "_id": 7, "old": true }])
                .build(),
        );

        driver
            .update("db.c", doc! { "_id": 7 }, doc! { "new": true }, false, false)
            .unwrap();

        assert_eq!(driver.documents("db.c"), vec![doc! { "_id": 7, "new": true }]);
        assert_eq!(driver.last_error().unwrap(), None);
    }

    #[test]
    fn multi_replacement_is_rejected() {
        let mut driver = connected(InMemoryDriver::new());

        driver
            .update("db.c", doc! {}, doc! { "plain": 1 }, false, true)
            .unwrap();

        assert_eq!(
            driver.last_error().unwrap().as_deref(),
            Some("multi update only works with $ operators")
        );
    }

    #[test]
    fn upsert_seeds_from_filter() {
        let mut driver = connected(InMemoryDriver::new());

        driver
            .update("db.c", doc! { "sku": "abc", "qty": { "$gt": 1 } }, doc! { "$set": { "qty": 3 } }, true, false)
            .unwrap();

        let documents = driver.documents("db.c");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].get_str("sku").unwrap(), "abc");
        assert_eq!(documents[0].get("qty"), Some(&Bson::Int32(3)));
    }

    #[test]
    fn update_without_upsert_ignores_misses() {
        let mut driver = connected(InMemoryDriver::new());

        driver
            .update("db.c", doc! { "sku": "abc" }, doc! { "$set": { "qty": 3 } }, false, false)
            .unwrap();

        assert!(driver.documents("db.c").is_empty());
    }

    #[test]
    fn increment_overflow_is_reported() {
        let mut driver = connected(
            InMemoryDriver::builder()
                .seed("db.c", vec![doc! { "_id": 1, "n": i64::MAX }])
                .build(),
        );

        driver
            .update("db.c", doc! { "_id": 1 }, doc! { "$inc": { "n": 1 } }, false, false)
            .unwrap();

        assert_eq!(
            driver.last_error().unwrap().as_deref(),
            Some("integer overflow applying $inc to field 'n'")
        );
        assert_eq!(driver.documents("db.c"), vec![doc! { "_id": 1, "n": i64::MAX }]);
    }

    #[test]
    fn int32_increment_widens_instead_of_overflowing() {
        let mut driver = connected(
            InMemoryDriver::builder()
                .seed("db.c", vec![doc! { "_id": 1, "n": i32::MAX }])
                .build(),
        );

        driver
            .update("db.c", doc! {}, doc! { "$inc": { "n": 1 } }, false, false)
            .unwrap();

        assert_eq!(driver.last_error().unwrap(), None);
        assert_eq!(
            driver.documents("db.c")[0].get("n"),
            Some(&Bson::Int64(i64::from(i32::MAX) + 1))
        );
    }

    #[test]
    fn unknown_modifier_is_reported() {
        let mut driver = connected(
            InMemoryDriver::builder().seed("db.c", vec![doc! { "n": 1 }]).build(),
        );

        driver
            .update("db.c", doc! {}, doc! { "$push": { "n": 1 } }, false, false)
            .unwrap();

        assert_eq!(driver.last_error().unwrap().as_deref(), Some("Unknown modifier: $push"));
    }

    #[test]
    fn remove_honours_limit() {
        let seeded = vec![doc! { "k": 1 }, doc! { "k": 1 }, doc! { "k": 2 }];
        let mut driver = connected(InMemoryDriver::builder().seed("db.c", seeded).build());

        driver.remove("db.c", doc! { "k": 1 }, true).unwrap();
        assert_eq!(driver.documents("db.c").len(), 2);

        driver.remove("db.c", doc! {}, false).unwrap();
        assert!(driver.documents("db.c").is_empty());
    }

    #[test]
    fn commands() {
        let mut driver = connected(
            InMemoryDriver::builder()
                .seed("shop.orders", vec![doc! { "open": true }, doc! { "open": false }])
                .build(),
        );

        assert_eq!(driver.run_command("admin", doc! { "ping": 1 }).unwrap(), doc! { "ok": 1.0 });
        assert_eq!(
            driver
                .run_command("shop", doc! { "count": "orders", "query": { "open": true } })
                .unwrap(),
            doc! { "n": 1_i64, "ok": 1.0 }
        );
        assert_eq!(
            driver.run_command("shop", doc! { "bogus": 1 }).unwrap(),
            doc! { "ok": 0.0, "errmsg": "no such command: 'bogus'", "code": 59 }
        );
        assert_eq!(
            driver.run_command("shop", doc! { "drop": "orders" }).unwrap().get("ok"),
            Some(&Bson::Double(1.0))
        );
        assert!(driver.namespaces().is_empty());
        assert_eq!(
            driver.run_command("shop", doc! { "drop": "orders" }).unwrap().get("errmsg"),
            Some(&Bson::String("ns not found".to_string()))
        );
    }

    #[test]
    fn clones_share_the_server() {
        let server = InMemoryDriver::new();
        let mut writer = connected(server.clone());

        writer.insert("db.c", vec![doc! { "n": 1 }]).unwrap();

        assert_eq!(server.namespaces(), vec!["db.c".to_string()]);
        assert!(!server.clone().is_connected());
    }
}
