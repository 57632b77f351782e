//! Engine selection and lifecycle without a database.

use polystore_storage::{
    ConnectionState, EngineKind, StorageEngine, StorageError, create_engine,
};
use polystore_test::{test_database_config, unreachable_mongo_config, unreachable_postgres_config};

#[test]
fn test_every_supported_tag_builds_a_disconnected_engine() {
    let config = test_database_config("postgres");
    for (tag, kind) in [
        ("mongodb", EngineKind::Mongo),
        ("MONGO", EngineKind::Mongo),
        ("postgres", EngineKind::Postgres),
        ("PostgreSQL", EngineKind::Postgres),
    ] {
        let engine = create_engine(tag, &config).unwrap();
        assert_eq!(engine.kind(), kind, "tag {tag}");
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert!(!engine.is_connected());
    }
}

#[test]
fn test_unknown_tag_is_unsupported() {
    let err = create_engine("sqlite", &test_database_config("sqlite")).unwrap_err();
    assert!(matches!(err, StorageError::UnsupportedEngineType(ref tag) if tag == "sqlite"));
    assert_eq!(err.to_string(), "unsupported engine type: sqlite");
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    for tag in ["mongodb", "postgres"] {
        let engine = create_engine(tag, &test_database_config(tag)).unwrap();
        engine.disconnect().await.unwrap();
        engine.disconnect().await.unwrap();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }
}

#[tokio::test]
async fn test_postgres_connect_failure_keeps_cause() {
    let config = unreachable_postgres_config();
    let engine = create_engine(&config.engine, &config).unwrap();
    let err = engine.connect().await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Connection {
            engine: EngineKind::Postgres,
            ..
        }
    ));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(engine.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_mongo_connect_failure_keeps_cause() {
    let config = unreachable_mongo_config();
    let engine = create_engine(&config.engine, &config).unwrap();
    let err = engine.connect().await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Connection {
            engine: EngineKind::Mongo,
            ..
        }
    ));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(engine.state(), ConnectionState::Disconnected);
}
