//! `MongoDB` engine.
//!
//! Queries are named [`DocumentOp`]s issued against a collection of the
//! database named in the connection URI.

use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use futures::future::BoxFuture;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use polystore_config::{MongoSection, redact_uri};
use polystore_schema::DocumentSchema;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::{
    ConnectingGuard, ConnectionState, EngineKind, StateCell, StorageEngine, TransactionControl,
    run_transaction,
};
use crate::error::{StorageError, StorageResult};

const ENGINE: EngineKind = EngineKind::Mongo;

/// Database used when the URI names none.
const DEFAULT_DATABASE: &str = "polystore";

/// A document operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOp {
    /// Insert one document.
    InsertOne(Document),
    /// All documents matching a filter.
    Find(Document),
    /// First document matching a filter.
    FindOne(Document),
    /// Apply an update document to every match.
    UpdateMany {
        /// Match filter.
        filter: Document,
        /// Update document (`$set`, `$inc`, ...).
        update: Document,
    },
    /// Delete every match.
    DeleteMany(Document),
    /// Count matches.
    Count(Document),
}

impl DocumentOp {
    /// Driver-style operation name, used in errors and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InsertOne(_) => "insertOne",
            Self::Find(_) => "find",
            Self::FindOne(_) => "findOne",
            Self::UpdateMany { .. } => "updateMany",
            Self::DeleteMany(_) => "deleteMany",
            Self::Count(_) => "countDocuments",
        }
    }
}

/// Result of a [`DocumentOp`].
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutput {
    /// Id of the inserted document.
    Inserted(Bson),
    /// Matching documents.
    Documents(Vec<Document>),
    /// First match, if any.
    Document(Option<Document>),
    /// Update counts.
    Updated {
        /// Documents matched by the filter.
        matched: u64,
        /// Documents actually changed.
        modified: u64,
    },
    /// Documents deleted.
    Deleted(u64),
    /// Documents counted.
    Count(u64),
}

#[derive(Clone)]
struct Connection {
    client: Client,
    database: Database,
}

/// Document storage engine backed by a pooled [`Client`].
pub struct MongoEngine {
    config: MongoSection,
    connection: RwLock<Option<Connection>>,
    state: StateCell,
}

impl std::fmt::Debug for MongoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoEngine")
            .field("config", &self.config)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl MongoEngine {
    /// A disconnected engine. No I/O happens until [`StorageEngine::connect`].
    #[must_use]
    pub fn new(config: MongoSection) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
            state: StateCell::new(),
        }
    }

    /// Connection settings.
    #[must_use]
    pub fn config(&self) -> &MongoSection {
        &self.config
    }

    /// Options given in the URI win over the configured fallbacks.
    async fn open_client(&self) -> mongodb::error::Result<Connection> {
        let mut options = ClientOptions::parse(&self.config.uri).await?;
        if options.max_pool_size.is_none() {
            options.max_pool_size = self.config.max_pool_size;
        }
        if options.server_selection_timeout.is_none() {
            options.server_selection_timeout = self
                .config
                .server_selection_timeout_ms
                .map(Duration::from_millis);
        }
        if options.app_name.is_none() {
            options.app_name.clone_from(&self.config.app_name);
        }
        let database_name = options
            .default_database
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned());

        let client = Client::with_options(options)?;
        let database = client.database(&database_name);
        database.run_command(doc! { "ping": 1 }).await?;
        Ok(Connection { client, database })
    }

    async fn connection(&self) -> StorageResult<Connection> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(StorageError::NotConnected(ENGINE))
    }

    /// Name of the database in use, once connected.
    pub async fn database_name(&self) -> Option<String> {
        self.connection
            .read()
            .await
            .as_ref()
            .map(|c| c.database.name().to_owned())
    }

    /// Run one operation against `collection`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotConnected`] before `connect`
    /// - [`StorageError::Query`] wrapping the driver error
    pub async fn query(&self, collection: &str, op: DocumentOp) -> StorageResult<DocumentOutput> {
        let conn = self.connection().await?;
        let name = op.name();
        debug!(collection, op = name, "mongo query");
        execute(&conn.database.collection(collection), op, None)
            .await
            .map_err(|e| {
                error!(error = %e, collection, op = name, "mongo query failed");
                StorageError::query(ENGINE, name, e)
            })
    }

    /// Create `schema`'s collection with its `$jsonSchema` validator (or
    /// update the validator when the collection exists) and its indexes.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotConnected`] before `connect`
    /// - [`StorageError::Serialization`] if the validator cannot be encoded
    /// - [`StorageError::Query`] wrapping the driver error
    pub async fn ensure_collection(&self, schema: &DocumentSchema) -> StorageResult<()> {
        let conn = self.connection().await?;
        let db = &conn.database;
        let name = schema.collection.as_str();
        let validator = bson::to_document(&schema.json_schema())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let existing = db
            .list_collection_names()
            .await
            .map_err(|e| StorageError::query(ENGINE, "listCollections", e))?;
        if existing.iter().any(|c| c == name) {
            db.run_command(doc! { "collMod": name, "validator": validator })
                .await
                .map_err(|e| StorageError::query(ENGINE, "collMod", e))?;
            debug!(collection = name, "updated collection validator");
        } else {
            db.create_collection(name)
                .validator(validator)
                .await
                .map_err(|e| StorageError::query(ENGINE, "createCollection", e))?;
            info!(collection = name, "created collection");
        }

        let collection: Collection<Document> = db.collection(name);
        for spec in schema.indexes() {
            let mut keys = Document::new();
            keys.insert(spec.field.clone(), 1_i32);
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .unique(spec.unique)
                        .name(spec.name.clone())
                        .build(),
                )
                .build();
            collection
                .create_index(model)
                .await
                .map_err(|e| StorageError::query(ENGINE, "createIndex", e))?;
            debug!(collection = name, index = %spec.name, "ensured index");
        }
        Ok(())
    }

    /// Drop `collection` and its indexes. Dropping a missing collection
    /// succeeds.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotConnected`] before `connect`
    /// - [`StorageError::Query`] wrapping the driver error
    pub async fn drop_collection(&self, collection: &str) -> StorageResult<()> {
        let conn = self.connection().await?;
        conn.database
            .collection::<Document>(collection)
            .drop()
            .await
            .map_err(|e| StorageError::query(ENGINE, "drop", e))?;
        info!(collection, "dropped collection");
        Ok(())
    }

    /// Run `work` inside a multi-document transaction on a dedicated session.
    ///
    /// Commits when `work` returns `Ok`; aborts and returns the original
    /// error when it returns `Err`. Dropping the session mid-transaction
    /// aborts it server-side. Transactions need a replica set or sharded
    /// cluster.
    ///
    /// For engine-neutral code see [`Engine::transaction`](super::Engine::transaction).
    ///
    /// # Errors
    ///
    /// Returns the error from `work`, or [`StorageError::Query`] if the
    /// session cannot start or the commit fails.
    pub async fn transaction<T, F>(&self, work: F) -> StorageResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut MongoTransaction) -> BoxFuture<'t, StorageResult<T>> + Send,
    {
        run_transaction(self.begin().await?, work).await
    }

    /// Start a session and open a transaction on it.
    pub(crate) async fn begin(&self) -> StorageResult<MongoTransaction> {
        let conn = self.connection().await?;
        let mut session = conn
            .client
            .start_session()
            .await
            .map_err(|e| StorageError::query(ENGINE, "startSession", e))?;
        session
            .start_transaction()
            .await
            .map_err(|e| StorageError::query(ENGINE, "startTransaction", e))?;
        debug!("mongo transaction started");
        Ok(MongoTransaction {
            session,
            database: conn.database,
        })
    }
}

#[async_trait]
impl StorageEngine for MongoEngine {
    fn kind(&self) -> EngineKind {
        ENGINE
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> StorageResult<()> {
        let mut slot = self.connection.write().await;
        if slot.is_some() {
            debug!("mongo already connected");
            return Ok(());
        }

        let connecting = ConnectingGuard::new(&self.state);
        info!(uri = %redact_uri(&self.config.uri), "connecting to mongo");
        match self.open_client().await {
            Ok(conn) => {
                info!(database = conn.database.name(), "mongo connected");
                *slot = Some(conn);
                connecting.connected();
                Ok(())
            },
            Err(e) => {
                drop(connecting);
                error!(error = %e, "mongo connection failed");
                Err(StorageError::Connection {
                    engine: ENGINE,
                    source: e.into(),
                })
            },
        }
    }

    async fn disconnect(&self) -> StorageResult<()> {
        let mut slot = self.connection.write().await;
        let Some(conn) = slot.take() else {
            return Ok(());
        };
        drop(conn.database);
        conn.client.shutdown().await;
        self.state.set(ConnectionState::Disconnected);
        info!("mongo disconnected");
        Ok(())
    }
}

/// A transaction-scoped handle passed to [`MongoEngine::transaction`].
pub struct MongoTransaction {
    session: ClientSession,
    database: Database,
}

impl std::fmt::Debug for MongoTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoTransaction")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}

impl MongoTransaction {
    /// Run one operation inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] wrapping the driver error.
    pub async fn query(&mut self, collection: &str, op: DocumentOp) -> StorageResult<DocumentOutput> {
        let name = op.name();
        debug!(collection, op = name, "mongo transaction query");
        execute(
            &self.database.collection(collection),
            op,
            Some(&mut self.session),
        )
        .await
        .map_err(|e| StorageError::query(ENGINE, name, e))
    }
}

#[async_trait]
impl TransactionControl for MongoTransaction {
    async fn commit(mut self) -> StorageResult<()> {
        self.session
            .commit_transaction()
            .await
            .map_err(|e| StorageError::query(ENGINE, "commitTransaction", e))?;
        debug!("mongo transaction committed");
        Ok(())
    }

    async fn rollback(mut self) {
        match self.session.abort_transaction().await {
            Ok(()) => debug!("mongo transaction aborted"),
            Err(e) => error!(error = %e, "mongo abort failed"),
        }
    }
}

async fn execute(
    collection: &Collection<Document>,
    op: DocumentOp,
    session: Option<&mut ClientSession>,
) -> mongodb::error::Result<DocumentOutput> {
    let output = match (op, session) {
        (DocumentOp::InsertOne(doc), None) => {
            DocumentOutput::Inserted(collection.insert_one(doc).await?.inserted_id)
        },
        (DocumentOp::InsertOne(doc), Some(s)) => {
            DocumentOutput::Inserted(collection.insert_one(doc).session(s).await?.inserted_id)
        },
        (DocumentOp::Find(filter), None) => {
            DocumentOutput::Documents(collection.find(filter).await?.try_collect().await?)
        },
        (DocumentOp::Find(filter), Some(s)) => {
            let mut cursor = collection.find(filter).session(&mut *s).await?;
            DocumentOutput::Documents(cursor.stream(s).try_collect().await?)
        },
        (DocumentOp::FindOne(filter), None) => {
            DocumentOutput::Document(collection.find_one(filter).await?)
        },
        (DocumentOp::FindOne(filter), Some(s)) => {
            DocumentOutput::Document(collection.find_one(filter).session(s).await?)
        },
        (DocumentOp::UpdateMany { filter, update }, session) => {
            let action = collection.update_many(filter, update);
            let result = match session {
                Some(s) => action.session(s).await?,
                None => action.await?,
            };
            DocumentOutput::Updated {
                matched: result.matched_count,
                modified: result.modified_count,
            }
        },
        (DocumentOp::DeleteMany(filter), session) => {
            let action = collection.delete_many(filter);
            let result = match session {
                Some(s) => action.session(s).await?,
                None => action.await?,
            };
            DocumentOutput::Deleted(result.deleted_count)
        },
        (DocumentOp::Count(filter), session) => {
            let action = collection.count_documents(filter);
            DocumentOutput::Count(match session {
                Some(s) => action.session(s).await?,
                None => action.await?,
            })
        },
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> MongoSection {
        MongoSection {
            uri: "mongodb://127.0.0.1:1/polystore_test".to_owned(),
            server_selection_timeout_ms: Some(200),
            ..MongoSection::default()
        }
    }

    #[test]
    fn test_op_names() {
        assert_eq!(DocumentOp::InsertOne(doc! {}).name(), "insertOne");
        assert_eq!(
            DocumentOp::UpdateMany {
                filter: doc! {},
                update: doc! {}
            }
            .name(),
            "updateMany"
        );
        assert_eq!(DocumentOp::Count(doc! {}).name(), "countDocuments");
    }

    #[tokio::test]
    async fn test_new_engine_is_disconnected() {
        let engine = MongoEngine::new(MongoSection::default());
        assert_eq!(engine.kind(), EngineKind::Mongo);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(engine.database_name().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_noop() {
        let engine = MongoEngine::new(MongoSection::default());
        engine.disconnect().await.unwrap();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_query_before_connect() {
        let engine = MongoEngine::new(MongoSection::default());
        let err = engine
            .query("users", DocumentOp::Find(doc! {}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotConnected(EngineKind::Mongo)));
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        let engine = MongoEngine::new(unreachable_config());
        let err = engine.connect().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Connection {
                engine: EngineKind::Mongo,
                ..
            }
        ));
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_cancelled_connect_leaves_disconnected() {
        // Accepts the TCP connection but never answers the handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let engine = MongoEngine::new(MongoSection {
            uri: format!("mongodb://127.0.0.1:{port}/polystore_test"),
            server_selection_timeout_ms: Some(30_000),
            ..MongoSection::default()
        });

        let attempt = tokio::time::timeout(Duration::from_millis(200), engine.connect()).await;
        assert!(attempt.is_err());
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(engine.database_name().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_uri_is_connection_error() {
        let engine = MongoEngine::new(MongoSection {
            uri: "not-a-uri".to_owned(),
            ..MongoSection::default()
        });
        assert!(matches!(
            engine.connect().await,
            Err(StorageError::Connection { .. })
        ));
    }
}
