//! Model selection.

use std::sync::Arc;

use polystore_schema::SchemaRegistry;
use tracing::debug;

use super::EntityModel;
use super::mongo::MongoModel;
use super::postgres::PostgresModel;
use crate::engine::{Engine, EngineKind, StorageEngine};
use crate::error::{StorageError, StorageResult};
use crate::handle::Storage;

/// Builds the model matching the active engine for a named entity.
#[derive(Debug, Clone)]
pub struct ModelFactory {
    storage: Arc<Storage>,
    registry: Arc<SchemaRegistry>,
}

impl ModelFactory {
    /// A factory resolving entity names against `registry`.
    #[must_use]
    pub fn new(storage: Arc<Storage>, registry: Arc<SchemaRegistry>) -> Self {
        Self { storage, registry }
    }

    /// A factory over the built-in `User` and `Repo` entities.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Schema`] if a built-in descriptor is invalid.
    pub fn with_builtins(storage: Arc<Storage>) -> StorageResult<Self> {
        Ok(Self::new(storage, Arc::new(SchemaRegistry::with_builtins()?)))
    }

    /// Registered descriptors.
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// The storage handle models are bound to.
    #[must_use]
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// The model for `entity` (case-insensitive) on the active engine.
    ///
    /// Name and engine tag are checked before the engine is touched, so an
    /// unknown entity fails without I/O.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UnsupportedEntity`] for an unregistered name
    /// - [`StorageError::UnsupportedEngineType`] for an unknown engine tag
    /// - [`StorageError::NotInitialized`] before [`Storage::initialize`]
    pub async fn create_model(&self, entity: &str) -> StorageResult<Arc<dyn EntityModel>> {
        let schema = self
            .registry
            .resolve(entity)
            .ok_or_else(|| StorageError::UnsupportedEntity(entity.to_owned()))?;
        let kind = self.storage.engine_kind()?;
        let engine = self.storage.get().await?;
        debug!(entity = schema.entity_name(), engine = %kind, "creating model");

        let model: Arc<dyn EntityModel> = match (kind, engine) {
            (EngineKind::Mongo, Engine::Mongo(engine)) => Arc::new(MongoModel::new(schema, engine)),
            (EngineKind::Postgres, Engine::Postgres(engine)) => {
                Arc::new(PostgresModel::new(schema, engine))
            },
            (_, engine) => {
                return Err(StorageError::UnsupportedEngineType(format!(
                    "{kind} (active engine is {})",
                    engine.kind()
                )));
            },
        };
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use polystore_config::DatabaseConfig;

    use super::*;

    fn factory(engine: &str) -> ModelFactory {
        let storage = Arc::new(Storage::new(DatabaseConfig::default().with_engine(engine)));
        ModelFactory::with_builtins(storage).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_entity_fails_first() {
        let err = factory("postgres").create_model("ghost").await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedEntity(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_unknown_engine_tag() {
        let err = factory("couchdb").create_model("user").await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedEngineType(_)));
    }

    #[tokio::test]
    async fn test_uninitialized_storage() {
        let err = factory("mongodb").create_model("User").await.unwrap_err();
        assert!(matches!(err, StorageError::NotInitialized));
    }

    #[test]
    fn test_builtin_registry() {
        let factory = factory("postgres");
        let names: Vec<_> = factory.registry().names().collect();
        assert_eq!(names, vec!["User", "Repo"]);
    }
}
