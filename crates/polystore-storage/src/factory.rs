//! Engine selection.

use std::sync::Arc;

use polystore_config::DatabaseConfig;
use tracing::debug;

use crate::engine::mongo::MongoEngine;
use crate::engine::postgres::PostgresEngine;
use crate::engine::{Engine, EngineKind};
use crate::error::StorageResult;

/// Build the engine named by `tag` from `config`. No I/O happens here; the
/// engine is returned disconnected.
///
/// Adding a backend means adding an [`EngineKind`] variant and an arm here.
///
/// # Errors
///
/// Returns [`StorageError::UnsupportedEngineType`](crate::StorageError::UnsupportedEngineType)
/// for an unknown tag.
pub fn create_engine(tag: &str, config: &DatabaseConfig) -> StorageResult<Engine> {
    let kind = EngineKind::parse(tag)?;
    debug!(engine = %kind, "creating storage engine");
    Ok(match kind {
        EngineKind::Mongo => Engine::Mongo(Arc::new(MongoEngine::new(config.mongodb.clone()))),
        EngineKind::Postgres => {
            Engine::Postgres(Arc::new(PostgresEngine::new(config.postgres.clone())))
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ConnectionState, StorageEngine};
    use crate::error::StorageError;

    #[test]
    fn test_creates_each_kind_disconnected() {
        let config = DatabaseConfig::default();
        for (tag, kind) in [
            ("mongodb", EngineKind::Mongo),
            ("Postgres", EngineKind::Postgres),
            ("POSTGRESQL", EngineKind::Postgres),
        ] {
            let engine = create_engine(tag, &config).unwrap();
            assert_eq!(engine.kind(), kind);
            assert_eq!(engine.state(), ConnectionState::Disconnected);
        }
    }

    #[test]
    fn test_passes_section_through() {
        let mut config = DatabaseConfig::default();
        config.postgres.port = 6543;
        let engine = create_engine("postgres", &config).unwrap();
        assert_eq!(engine.as_postgres().unwrap().config().port, 6543);
        assert!(engine.as_mongo().is_none());
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = create_engine("cassandra", &DatabaseConfig::default()).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedEngineType(tag) if tag == "cassandra"));
    }

    #[test]
    fn test_each_call_builds_a_new_instance() {
        let config = DatabaseConfig::default();
        let a = create_engine("mongodb", &config).unwrap();
        let b = create_engine("mongodb", &config).unwrap();
        assert!(!a.same_instance(&b));
        assert!(a.same_instance(&a.clone()));
    }
}
