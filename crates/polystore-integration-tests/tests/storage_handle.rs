//! Storage handle lifecycle without a database.

use std::sync::Arc;

use polystore_storage::{EngineKind, Storage, StorageError};
use polystore_test::{test_database_config, unreachable_postgres_config};

#[tokio::test]
async fn test_get_before_initialize_is_not_initialized() {
    let storage = Storage::new(test_database_config("mongodb"));
    let err = storage.get().await.unwrap_err();
    assert!(matches!(err, StorageError::NotInitialized));
    assert_eq!(err.to_string(), "storage has not been initialized");
}

#[tokio::test]
async fn test_close_without_engine_is_noop() {
    let storage = Storage::new(test_database_config("postgres"));
    storage.close().await.unwrap();
    storage.close().await.unwrap();
    assert!(!storage.is_initialized());
}

#[tokio::test]
async fn test_engine_kind_needs_no_io() {
    let storage = Storage::new(unreachable_postgres_config());
    assert_eq!(storage.engine_kind().unwrap(), EngineKind::Postgres);
    assert!(!storage.is_initialized());
}

#[tokio::test]
async fn test_concurrent_failed_initialization_stores_nothing() {
    let storage = Arc::new(Storage::new(unreachable_postgres_config()));
    let attempts: Vec<_> = (0..4)
        .map(|_| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move { storage.initialize().await })
        })
        .collect();
    for attempt in futures::future::join_all(attempts).await {
        assert!(matches!(
            attempt.unwrap(),
            Err(StorageError::Connection { .. })
        ));
    }
    assert!(matches!(
        storage.get().await,
        Err(StorageError::NotInitialized)
    ));
}
