//! `PostgreSQL` engine.
//!
//! Queries are literal SQL with positional `$n` placeholders; values always
//! travel as bound parameters. Result rows come back as [`Record`]s keyed by
//! column name, in column order.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::future::BoxFuture;
use polystore_config::PostgresSection;
use polystore_schema::{Record, format_timestamp};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo};
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace};

use super::{
    ConnectingGuard, ConnectionState, EngineKind, StateCell, StorageEngine, TransactionControl,
    run_transaction,
};
use crate::error::{StorageError, StorageResult};

const ENGINE: EngineKind = EngineKind::Postgres;

/// Advisory lock key held while a schema script runs.
const SCHEMA_LOCK_KEY: i64 = 0x706f_6c79_7374_6f72;

/// Type hint for a bound SQL `NULL`.
///
/// `PostgreSQL` infers placeholder types from context, but a `NULL` still has
/// to be sent with a type the column accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlNull {
    /// `TEXT` / `VARCHAR`.
    #[default]
    Text,
    /// `INT8`.
    Int,
    /// `FLOAT8`.
    Float,
    /// `BOOL`.
    Bool,
    /// `TIMESTAMP`.
    Timestamp,
    /// `JSONB`.
    Json,
}

/// A typed positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Typed `NULL`.
    Null(SqlNull),
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Text.
    Text(String),
    /// Timestamp without time zone, in UTC.
    Timestamp(NaiveDateTime),
    /// JSON document.
    Json(Value),
}

impl SqlValue {
    fn bind<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            Self::Null(SqlNull::Text) => query.bind(None::<String>),
            Self::Null(SqlNull::Int) => query.bind(None::<i64>),
            Self::Null(SqlNull::Float) => query.bind(None::<f64>),
            Self::Null(SqlNull::Bool) => query.bind(None::<bool>),
            Self::Null(SqlNull::Timestamp) => query.bind(None::<NaiveDateTime>),
            Self::Null(SqlNull::Json) => query.bind(None::<sqlx::types::Json<Value>>),
            Self::Bool(b) => query.bind(*b),
            Self::Int(i) => query.bind(*i),
            Self::Float(f) => query.bind(*f),
            Self::Text(s) => query.bind(s.clone()),
            Self::Timestamp(ts) => query.bind(*ts),
            Self::Json(v) => query.bind(sqlx::types::Json(v.clone())),
        }
    }
}

impl From<Value> for SqlValue {
    /// Untyped conversion, used when no field type is known.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null(SqlNull::Text),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null(SqlNull::Float), Self::Float),
            },
            Value::String(s) => Self::Text(s),
            json @ (Value::Array(_) | Value::Object(_)) => Self::Json(json),
        }
    }
}

fn build_query<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| param.bind(query))
}

/// Relational storage engine backed by an sqlx [`PgPool`].
pub struct PostgresEngine {
    config: PostgresSection,
    pool: RwLock<Option<PgPool>>,
    state: StateCell,
}

impl std::fmt::Debug for PostgresEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresEngine")
            .field("config", &self.config)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl PostgresEngine {
    /// A disconnected engine. No I/O happens until [`StorageEngine::connect`].
    #[must_use]
    pub fn new(config: PostgresSection) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
            state: StateCell::new(),
        }
    }

    /// Connection settings.
    #[must_use]
    pub fn config(&self) -> &PostgresSection {
        &self.config
    }

    async fn open_pool(&self) -> Result<PgPool, sqlx::Error> {
        let options = PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .database(&self.config.database)
            .username(&self.config.user)
            .password(&self.config.password)
            .application_name("polystore")
            // TIMESTAMP columns hold UTC; CURRENT_TIMESTAMP defaults follow the session zone.
            .options([("timezone", "UTC")]);

        let pool = PgPoolOptions::new()
            .max_connections(self.config.pool_size)
            .idle_timeout(Duration::from_secs(self.config.idle_timeout_secs))
            .acquire_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .connect_with(options)
            .await?;

        if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
            pool.close().await;
            return Err(e);
        }
        Ok(pool)
    }

    async fn pool(&self) -> StorageResult<PgPool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(StorageError::NotConnected(ENGINE))
    }

    /// Run one statement with positional parameters and return its rows.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotConnected`] before `connect`
    /// - [`StorageError::Query`] wrapping the driver error
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Record>> {
        let pool = self.pool().await?;
        debug!(sql, params = params.len(), "postgres query");
        let rows = build_query(sql, params)
            .fetch_all(&pool)
            .await
            .map_err(|e| {
                error!(error = %e, sql, "postgres query failed");
                StorageError::query(ENGINE, "query", e)
            })?;
        rows_to_records(&rows)
    }

    /// Run a multi-statement script without parameters, e.g. compiled DDL.
    ///
    /// The script runs in one transaction holding a database-wide advisory
    /// lock, so concurrent schema syncs (from this process or another) apply
    /// one after the other and never race on shared catalog objects such as
    /// the `updatedAt` trigger function. A failing script leaves nothing
    /// behind.
    ///
    /// Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotConnected`] before `connect`
    /// - [`StorageError::Query`] wrapping the driver error
    pub async fn execute_batch(&self, script: &str) -> StorageResult<u64> {
        let pool = self.pool().await?;
        trace!(script, "postgres batch");
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| StorageError::query(ENGINE, "begin", e))?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::query(ENGINE, "advisory_lock", e))?;
        let result = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(script)).await.map_err(|e| {
            error!(error = %e, "postgres batch failed");
            StorageError::query(ENGINE, "execute_batch", e)
        })?;
        tx.commit()
            .await
            .map_err(|e| StorageError::query(ENGINE, "commit", e))?;
        Ok(result.rows_affected())
    }

    /// Open a transaction on a dedicated pooled connection.
    pub(crate) async fn begin(&self) -> StorageResult<PgTransaction> {
        let pool = self.pool().await?;
        let inner = pool
            .begin()
            .await
            .map_err(|e| StorageError::query(ENGINE, "begin", e))?;
        debug!("postgres transaction started");
        Ok(PgTransaction { inner })
    }

    /// Run `work` inside a transaction on a dedicated pooled connection.
    ///
    /// Commits when `work` returns `Ok`; rolls back and returns the original
    /// error when it returns `Err`. If the future is dropped midway the
    /// transaction is rolled back and the connection returned to the pool.
    ///
    /// ```rust,no_run
    /// # use polystore_storage::{PostgresEngine, SqlValue, StorageResult};
    /// # async fn demo(engine: &PostgresEngine) -> StorageResult<()> {
    /// engine
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.query("UPDATE users SET age = age + 1 WHERE id = $1", &[SqlValue::Int(5)])
    ///                 .await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await
    /// # }
    /// ```
    ///
    /// For engine-neutral code see [`Engine::transaction`](super::Engine::transaction).
    ///
    /// # Errors
    ///
    /// Returns the error from `work`, or [`StorageError::Query`] if the
    /// transaction cannot begin or commit.
    pub async fn transaction<T, F>(&self, work: F) -> StorageResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut PgTransaction) -> BoxFuture<'t, StorageResult<T>> + Send,
    {
        run_transaction(self.begin().await?, work).await
    }
}

#[async_trait]
impl StorageEngine for PostgresEngine {
    fn kind(&self) -> EngineKind {
        ENGINE
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> StorageResult<()> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            debug!("postgres already connected");
            return Ok(());
        }

        let connecting = ConnectingGuard::new(&self.state);
        info!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "connecting to postgres"
        );
        match self.open_pool().await {
            Ok(pool) => {
                *slot = Some(pool);
                connecting.connected();
                info!("postgres connected");
                Ok(())
            },
            Err(e) => {
                drop(connecting);
                error!(error = %e, "postgres connection failed");
                Err(StorageError::Connection {
                    engine: ENGINE,
                    source: e.into(),
                })
            },
        }
    }

    async fn disconnect(&self) -> StorageResult<()> {
        let mut slot = self.pool.write().await;
        let Some(pool) = slot.take() else {
            return Ok(());
        };
        pool.close().await;
        self.state.set(ConnectionState::Disconnected);
        info!("postgres disconnected");
        Ok(())
    }
}

/// A transaction-scoped handle passed to [`PostgresEngine::transaction`].
///
/// Dropping it uncommitted rolls the transaction back.
pub struct PgTransaction {
    inner: sqlx::Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

impl PgTransaction {
    /// Run one statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Query`] wrapping the driver error.
    pub async fn query(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Record>> {
        debug!(sql, params = params.len(), "postgres transaction query");
        let rows = build_query(sql, params)
            .fetch_all(&mut *self.inner)
            .await
            .map_err(|e| StorageError::query(ENGINE, "query", e))?;
        rows_to_records(&rows)
    }
}

#[async_trait]
impl TransactionControl for PgTransaction {
    async fn commit(self) -> StorageResult<()> {
        self.inner
            .commit()
            .await
            .map_err(|e| StorageError::query(ENGINE, "commit", e))?;
        debug!("postgres transaction committed");
        Ok(())
    }

    async fn rollback(self) {
        match self.inner.rollback().await {
            Ok(()) => debug!("postgres transaction rolled back"),
            Err(e) => error!(error = %e, "postgres rollback failed"),
        }
    }
}

fn rows_to_records(rows: &[PgRow]) -> StorageResult<Vec<Record>> {
    rows.iter()
        .map(|row| row_to_record(row).map_err(|e| StorageError::query(ENGINE, "decode", e)))
        .collect()
}

fn row_to_record(row: &PgRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_info().name())?;
        record.insert(column.name().to_owned(), value);
    }
    Ok(record)
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|f| Value::from(f64::from(f))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::from),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            row.try_get::<Option<String>, _>(idx)?.map(Value::String)
        },
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|ts| Value::String(format_timestamp(ts.and_utc()))),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|ts| Value::String(format_timestamp(ts))),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        other => {
            return Err(sqlx::Error::ColumnDecode {
                index: idx.to_string(),
                source: format!("unsupported column type {other}").into(),
            });
        },
    };
    Ok(value.unwrap_or(Value::Null))
}
