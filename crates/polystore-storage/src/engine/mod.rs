//! Storage engine contract.
//!
//! An engine owns one connection pool and moves through
//! `Disconnected → Connecting → Connected → Disconnected`. The shared
//! lifecycle lives behind [`StorageEngine`]; the native query surface of each
//! variant (document operations, SQL) is reached through [`Engine`].
//!
//! [`Engine::transaction`] runs a unit of work on whichever engine is active.
//! The work receives a [`Transaction`], which entity models accept through
//! their `*_in` operations, so the same code commits or rolls back on either
//! engine.

pub mod mongo;
pub mod postgres;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use mongo::{MongoEngine, MongoTransaction};
use postgres::{PgTransaction, PostgresEngine};

/// Which storage engine backs the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// `MongoDB` document store.
    Mongo,
    /// `PostgreSQL` relational database.
    Postgres,
}

impl EngineKind {
    /// Canonical tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mongo => "mongodb",
            Self::Postgres => "postgres",
        }
    }

    /// Parse an engine tag, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedEngineType`] for unknown tags.
    pub fn parse(tag: &str) -> StorageResult<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Self::Mongo),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(StorageError::UnsupportedEngineType(tag.to_owned())),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Pool lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No pool.
    Disconnected = 0,
    /// Pool being established.
    Connecting = 1,
    /// Pool ready.
    Connected = 2,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Lock-free holder for a [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Holds a [`StateCell`] at `Connecting` for the duration of a connect.
///
/// Dropped without [`ConnectingGuard::connected`], whether the connect failed
/// or its future was cancelled, it puts the cell back to `Disconnected`.
#[derive(Debug)]
pub(crate) struct ConnectingGuard<'a> {
    cell: Option<&'a StateCell>,
}

impl<'a> ConnectingGuard<'a> {
    pub(crate) fn new(cell: &'a StateCell) -> Self {
        cell.set(ConnectionState::Connecting);
        Self { cell: Some(cell) }
    }

    pub(crate) fn connected(mut self) {
        if let Some(cell) = self.cell.take() {
            cell.set(ConnectionState::Connected);
        }
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            cell.set(ConnectionState::Disconnected);
        }
    }
}

/// Ends an open transaction.
#[async_trait]
pub(crate) trait TransactionControl: Send + Sized {
    async fn commit(self) -> StorageResult<()>;

    /// Roll back. Failures are logged; the caller's error wins.
    async fn rollback(self);
}

/// Run `work` in `tx`, committing on `Ok` and rolling back on `Err`.
pub(crate) async fn run_transaction<X, T, F>(mut tx: X, work: F) -> StorageResult<T>
where
    X: TransactionControl,
    T: Send,
    F: for<'t> FnOnce(&'t mut X) -> BoxFuture<'t, StorageResult<T>> + Send,
{
    match work(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        },
        Err(err) => {
            debug!(error = %err, "rolling back transaction");
            tx.rollback().await;
            Err(err)
        },
    }
}

/// An open transaction on the active engine.
///
/// Handed to the unit of work run by [`Engine::transaction`]. Pass it to an
/// entity model's `*_in` operations, or reach the engine-native handle with
/// [`Transaction::as_postgres_mut`] / [`Transaction::as_mongo_mut`].
#[derive(Debug)]
pub enum Transaction {
    /// Session-based document transaction.
    Mongo(MongoTransaction),
    /// Connection-based relational transaction.
    Postgres(PgTransaction),
}

impl Transaction {
    /// Engine the transaction runs on.
    #[must_use]
    pub const fn kind(&self) -> EngineKind {
        match self {
            Self::Mongo(_) => EngineKind::Mongo,
            Self::Postgres(_) => EngineKind::Postgres,
        }
    }

    /// The document transaction, if that is what this is.
    pub fn as_mongo_mut(&mut self) -> Option<&mut MongoTransaction> {
        match self {
            Self::Mongo(tx) => Some(tx),
            Self::Postgres(_) => None,
        }
    }

    /// The relational transaction, if that is what this is.
    pub fn as_postgres_mut(&mut self) -> Option<&mut PgTransaction> {
        match self {
            Self::Postgres(tx) => Some(tx),
            Self::Mongo(_) => None,
        }
    }
}

#[async_trait]
impl TransactionControl for Transaction {
    async fn commit(self) -> StorageResult<()> {
        match self {
            Self::Mongo(tx) => tx.commit().await,
            Self::Postgres(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) {
        match self {
            Self::Mongo(tx) => tx.rollback().await,
            Self::Postgres(tx) => tx.rollback().await,
        }
    }
}

/// Lifecycle shared by every storage engine.
#[async_trait]
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Which engine this is.
    fn kind(&self) -> EngineKind;

    /// Current pool state.
    fn state(&self) -> ConnectionState;

    /// Whether the pool is ready.
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Build the pool and prove it with a round trip.
    ///
    /// Calling again while connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`]; the engine is left disconnected.
    async fn connect(&self) -> StorageResult<()>;

    /// Release the pool. A no-op when already disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Disconnection`] on driver failure.
    async fn disconnect(&self) -> StorageResult<()>;
}

/// A concrete engine, cheap to clone.
#[derive(Debug, Clone)]
pub enum Engine {
    /// Document engine.
    Mongo(Arc<MongoEngine>),
    /// Relational engine.
    Postgres(Arc<PostgresEngine>),
}

impl Engine {
    /// The document engine, if that is what this is.
    #[must_use]
    pub fn as_mongo(&self) -> Option<&Arc<MongoEngine>> {
        match self {
            Self::Mongo(engine) => Some(engine),
            Self::Postgres(_) => None,
        }
    }

    /// The relational engine, if that is what this is.
    #[must_use]
    pub fn as_postgres(&self) -> Option<&Arc<PostgresEngine>> {
        match self {
            Self::Postgres(engine) => Some(engine),
            Self::Mongo(_) => None,
        }
    }

    /// Whether both handles point at the same engine instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Mongo(a), Self::Mongo(b)) => Arc::ptr_eq(a, b),
            (Self::Postgres(a), Self::Postgres(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Run `work` inside a transaction on this engine.
    ///
    /// Commits when `work` returns `Ok`; rolls back and returns the original
    /// error when it returns `Err`. Dropping the returned future midway rolls
    /// the transaction back. Document transactions need a replica set or
    /// sharded cluster.
    ///
    /// Captures must be owned (clone the `Arc`s you need into the closure):
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use polystore_storage::{Engine, EntityModel, Record, StorageResult};
    /// # async fn demo(engine: &Engine, users: Arc<dyn EntityModel>, a: Record, b: Record)
    /// #     -> StorageResult<()> {
    /// engine
    ///     .transaction(move |tx| {
    ///         Box::pin(async move {
    ///             users.create_in(tx, a).await?;
    ///             users.create_in(tx, b).await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotConnected`] before `connect`
    /// - the error from `work`
    /// - [`StorageError::Query`] if the transaction cannot begin or commit
    pub async fn transaction<T, F>(&self, work: F) -> StorageResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, StorageResult<T>> + Send,
    {
        let tx = match self {
            Self::Mongo(engine) => Transaction::Mongo(engine.begin().await?),
            Self::Postgres(engine) => Transaction::Postgres(engine.begin().await?),
        };
        run_transaction(tx, work).await
    }

    fn inner(&self) -> &dyn StorageEngine {
        match self {
            Self::Mongo(engine) => engine.as_ref(),
            Self::Postgres(engine) => engine.as_ref(),
        }
    }
}

#[async_trait]
impl StorageEngine for Engine {
    fn kind(&self) -> EngineKind {
        self.inner().kind()
    }

    fn state(&self) -> ConnectionState {
        self.inner().state()
    }

    async fn connect(&self) -> StorageResult<()> {
        self.inner().connect().await
    }

    async fn disconnect(&self) -> StorageResult<()> {
        self.inner().disconnect().await
    }
}
