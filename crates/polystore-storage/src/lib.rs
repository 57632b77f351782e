//! Polystore Storage - one entity model over two storage engines.
//!
//! Application code asks a [`ModelFactory`] for an entity's model and issues
//! `create` / `find` / `find_one` / `update` / `delete` against it. Whether
//! the records land in `MongoDB` or `PostgreSQL` is decided once, at process
//! start, from configuration.
//!
//! # Layers
//!
//! | Layer | Type |
//! |-------|------|
//! | Engine contract | [`StorageEngine`], [`Engine`] |
//! | Document engine | [`MongoEngine`] |
//! | Relational engine | [`PostgresEngine`] |
//! | Engine selection | [`create_engine`] |
//! | Lifecycle | [`Storage`] |
//! | Entity operations | [`EntityModel`], [`MongoModel`], [`PostgresModel`] |
//! | Units of work | [`Engine::transaction`], [`Transaction`] |
//! | Model selection | [`ModelFactory`] |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use polystore_config::DatabaseConfig;
//! use polystore_storage::{ModelFactory, Storage};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), polystore_storage::StorageError> {
//! let storage = Arc::new(Storage::new(DatabaseConfig::default()));
//! storage.initialize().await?;
//!
//! let factory = ModelFactory::with_builtins(Arc::clone(&storage))?;
//! let users = factory.create_model("user").await?;
//! let record = json!({"email": "ana@example.com", "name": "Ana", "origin": "Github"});
//! let created = users.create(record.as_object().cloned().unwrap_or_default()).await?;
//! tracing::info!(?created, "created user");
//!
//! storage.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod engine;
pub mod error;
pub mod factory;
pub mod handle;
pub mod model;
pub mod prelude;

pub use engine::mongo::{DocumentOp, DocumentOutput, MongoEngine, MongoTransaction};
pub use engine::postgres::{PgTransaction, PostgresEngine, SqlNull, SqlValue};
pub use engine::{ConnectionState, Engine, EngineKind, StorageEngine, Transaction};
pub use error::{DriverError, StorageError, StorageResult};
pub use factory::create_engine;
pub use handle::Storage;
pub use model::factory::ModelFactory;
pub use model::mongo::MongoModel;
pub use model::postgres::PostgresModel;
pub use model::query::{Clause, Statement};
pub use model::{DeleteOutcome, EntityModel, UpdateOutcome};
pub use polystore_schema::Record;
