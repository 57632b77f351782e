//! `PostgreSQL` suites. Skipped unless `POLYSTORE_TEST_POSTGRES_HOST` is set.

mod common;

use std::sync::Arc;

use common::LiveHarness;
use polystore_schema::parse_timestamp;
use polystore_storage::{
    ConnectionState, EntityModel, PostgresModel, Storage, StorageEngine, StorageError,
    StorageResult,
};
use polystore_test::{
    init_test_tracing, live_postgres_config, record, test_user_record, test_user_schema_named,
    unique_name,
};
use serde_json::json;

#[tokio::test]
async fn test_round_trip_by_unique_field() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;

    let created = h.users.create(test_user_record("ana@example.com")).await.unwrap();
    assert!(created["id"].is_i64());
    assert_eq!(created["isActive"], json!(true));

    let found = h
        .users
        .find_one(record(json!({"email": "ana@example.com"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["name"], json!("Ana"));
    assert_eq!(found["age"], json!(34));
    assert_eq!(found["origin"], json!("Github"));
    assert!(found["createdAt"].is_string());
    assert_eq!(found["createdAt"], found["updatedAt"]);

    h.finish().await;
}

#[tokio::test]
async fn test_update_and_delete_by_id() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;
    let created = h.users.create(test_user_record("bea@example.com")).await.unwrap();
    let id = created["id"].clone();

    let outcome = h
        .users
        .update(record(json!({"id": id})), record(json!({"name": "Bea"})))
        .await
        .unwrap();
    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.records[0]["name"], json!("Bea"));

    let deleted = h.users.delete(record(json!({"id": id}))).await.unwrap();
    assert_eq!(deleted.deleted, 1);

    let err = h
        .users
        .find_required(record(json!({"id": id})))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    h.finish().await;
}

#[tokio::test]
async fn test_rejected_record_reaches_no_table() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;

    let mut bad = test_user_record("cy@example.com");
    bad.insert("origin".to_owned(), json!("Bitbucket"));
    assert!(matches!(
        h.users.create(bad).await,
        Err(StorageError::Schema(_))
    ));
    assert!(h.users.find(record(json!({}))).await.unwrap().is_empty());

    h.finish().await;
}

#[tokio::test]
async fn test_update_refreshes_updated_at() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;
    let created = h.users.create(test_user_record("dee@example.com")).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let outcome = h
        .users
        .update(
            record(json!({"id": created["id"]})),
            record(json!({"name": "Dee"})),
        )
        .await
        .unwrap();
    let updated = &outcome.records[0];
    assert_eq!(updated["createdAt"], created["createdAt"]);
    let before = parse_timestamp(created["updatedAt"].as_str().unwrap()).unwrap();
    let after = parse_timestamp(updated["updatedAt"].as_str().unwrap()).unwrap();
    assert!(after > before, "{after} should be later than {before}");

    h.finish().await;
}

#[tokio::test]
async fn test_stored_timestamps_find_their_row() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;
    let created = h.users.create(test_user_record("eve@example.com")).await.unwrap();

    let by_created = h
        .users
        .find_one(record(json!({"createdAt": created["createdAt"]})))
        .await
        .unwrap();
    assert_eq!(by_created.map(|r| r["id"].clone()), Some(created["id"].clone()));

    let by_both = h
        .users
        .find(record(json!({
            "createdAt": created["createdAt"],
            "updatedAt": created["updatedAt"],
        })))
        .await
        .unwrap();
    assert_eq!(by_both.len(), 1);

    h.finish().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_schema_sync() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    init_test_tracing();
    let storage = Storage::new(config);
    let engine = storage.initialize().await.unwrap();
    let pg = Arc::clone(engine.as_postgres().unwrap());
    let tables: Vec<String> = (0..16).map(|_| unique_name("users")).collect();

    let tasks: Vec<_> = tables
        .iter()
        .map(|table| {
            let schema = Arc::new(test_user_schema_named(table).unwrap());
            let model = PostgresModel::new(schema, Arc::clone(&pg));
            tokio::spawn(async move { model.ensure_schema().await })
        })
        .collect();
    let failures: Vec<String> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap().err())
        .map(|e| e.to_string())
        .collect();
    assert!(failures.is_empty(), "schema sync failures: {failures:?}");

    for table in &tables {
        pg.execute_batch(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .await
            .unwrap();
    }
    storage.close().await.unwrap();
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;
    let engine = h.storage.get().await.unwrap();
    let users = Arc::clone(&h.users);

    let result: StorageResult<()> = engine
        .transaction(move |tx| {
            Box::pin(async move {
                users.create_in(tx, test_user_record("tx@example.com")).await?;
                let seen = users
                    .find_one_in(tx, record(json!({"email": "tx@example.com"})))
                    .await?;
                assert!(seen.is_some());
                Err(StorageError::NotFound {
                    entity: "User".to_owned(),
                })
            })
        })
        .await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));

    let after = h
        .users
        .find_one(record(json!({"email": "tx@example.com"})))
        .await
        .unwrap();
    assert!(after.is_none());

    h.finish().await;
}

#[tokio::test]
async fn test_transaction_commits_on_success() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;
    let engine = h.storage.get().await.unwrap();
    let users = Arc::clone(&h.users);

    let inserted = engine
        .transaction(move |tx| {
            Box::pin(async move {
                let one = users.create_in(tx, test_user_record("one@example.com")).await?;
                users.create_in(tx, test_user_record("two@example.com")).await?;
                users
                    .update_in(tx, record(json!({"id": one["id"]})), record(json!({"age": 35})))
                    .await?;
                Ok(users.find_in(tx, record(json!({}))).await?.len())
            })
        })
        .await
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(h.users.find(record(json!({}))).await.unwrap().len(), 2);
    let one = h
        .users
        .find_required(record(json!({"email": "one@example.com"})))
        .await
        .unwrap();
    assert_eq!(one["age"], json!(35));

    h.finish().await;
}

#[tokio::test]
async fn test_native_transaction_handle() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let h = LiveHarness::start(config).await;
    let engine = h.storage.get().await.unwrap();
    let pg = Arc::clone(engine.as_postgres().unwrap());
    let model = PostgresModel::new(Arc::clone(h.users.schema()), Arc::clone(&pg));

    let insert = model.insert_statement(test_user_record("raw@example.com")).unwrap();
    let params = model.bind(&insert).unwrap();
    let rows = pg
        .transaction(|tx| Box::pin(async move { tx.query(&insert.sql, &params).await }))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(h.users.find(record(json!({}))).await.unwrap().len(), 1);

    h.finish().await;
}

#[tokio::test]
async fn test_connect_twice_keeps_one_pool() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let storage = Storage::new(config);
    let engine = storage.initialize().await.unwrap();
    engine.connect().await.unwrap();
    assert_eq!(engine.state(), ConnectionState::Connected);

    let again = storage.initialize().await.unwrap();
    assert!(engine.same_instance(&again));

    storage.close().await.unwrap();
    assert_eq!(engine.state(), ConnectionState::Disconnected);
    engine.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_initialize_is_single_flight() {
    let Some(config) = live_postgres_config() else {
        return;
    };
    let storage = Arc::new(Storage::new(config));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move { storage.initialize().await })
        })
        .collect();
    let engines: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert!(engines.windows(2).all(|w| w[0].same_instance(&w[1])));

    storage.close().await.unwrap();
}
