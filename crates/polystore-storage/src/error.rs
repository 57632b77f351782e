//! Storage error types.

use polystore_schema::SchemaError;
use thiserror::Error;

use crate::engine::EngineKind;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The configured engine tag names no known engine.
    #[error("unsupported engine type: {0}")]
    UnsupportedEngineType(String),

    /// No descriptor is registered under the requested entity name.
    #[error("unsupported entity: {0}")]
    UnsupportedEntity(String),

    /// Descriptor compilation or record validation failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The engine could not establish its pool.
    #[error("{engine} connection failed: {source}")]
    Connection {
        /// Engine that failed.
        engine: EngineKind,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// The engine failed to release its pool.
    #[error("{engine} disconnection failed: {source}")]
    Disconnection {
        /// Engine that failed.
        engine: EngineKind,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// A driver operation failed.
    #[error("{engine} {operation} failed: {source}")]
    Query {
        /// Engine that failed.
        engine: EngineKind,
        /// Operation name, e.g. `insertOne` or `select`.
        operation: String,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// The storage handle was used before `initialize`.
    #[error("storage has not been initialized")]
    NotInitialized,

    /// An operation was issued on an engine that is not connected.
    #[error("{0} engine is not connected")]
    NotConnected(EngineKind),

    /// A lookup that must find a record found none.
    #[error("{entity} not found")]
    NotFound {
        /// Entity name.
        entity: String,
    },

    /// An update carried no fields to set.
    #[error("update for {entity} has no fields to set")]
    EmptyUpdate {
        /// Entity name.
        entity: String,
    },

    /// A model was handed a transaction opened on the other engine.
    #[error("{expected} model cannot run inside a {actual} transaction")]
    TransactionMismatch {
        /// Engine the model writes to.
        expected: EngineKind,
        /// Engine the transaction belongs to.
        actual: EngineKind,
    },

    /// A value could not be converted between record and driver form.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub(crate) fn query(
        engine: EngineKind,
        operation: impl Into<String>,
        source: impl Into<DriverError>,
    ) -> Self {
        Self::Query {
            engine,
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Whether this is a [`StorageError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised by the underlying database drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    /// `PostgreSQL` driver error.
    #[error(transparent)]
    Postgres(#[from] sqlx::Error),

    /// `MongoDB` driver error.
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
