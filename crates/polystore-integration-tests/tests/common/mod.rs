//! Shared harness for live-database suites.

use std::sync::Arc;

use polystore_config::DatabaseConfig;
use polystore_schema::SchemaRegistry;
use polystore_storage::{EntityModel, ModelFactory, Storage};
use polystore_test::{init_test_tracing, test_user_schema_named, unique_name};

/// An initialized storage handle with a `User` entity bound to a table or
/// collection unique to this test.
#[allow(dead_code)]
pub struct LiveHarness {
    /// The storage handle.
    pub storage: Arc<Storage>,
    /// Model for the test entity, schema already ensured.
    pub users: Arc<dyn EntityModel>,
    /// Name of the table or collection.
    pub store_name: String,
}

#[allow(dead_code)]
impl LiveHarness {
    /// Connect with `config` and ensure a fresh `User` store.
    pub async fn start(config: DatabaseConfig) -> Self {
        init_test_tracing();
        let store_name = unique_name("users");
        let storage = Arc::new(Storage::new(config));
        storage.initialize().await.expect("storage initializes");

        let mut registry = SchemaRegistry::new();
        registry.register(test_user_schema_named(&store_name).expect("valid schema"));
        let factory = ModelFactory::new(Arc::clone(&storage), Arc::new(registry));
        let users = factory.create_model("user").await.expect("model");
        users.ensure_schema().await.expect("schema ensured");

        Self {
            storage,
            users,
            store_name,
        }
    }

    /// Drop the test store and close the handle.
    pub async fn finish(self) {
        let engine = self.storage.get().await.expect("initialized");
        if let Some(pg) = engine.as_postgres() {
            pg.execute_batch(&format!("DROP TABLE IF EXISTS {} CASCADE", self.store_name))
                .await
                .expect("drop table");
        }
        if let Some(mongo) = engine.as_mongo() {
            mongo
                .drop_collection(&self.store_name)
                .await
                .expect("drop collection");
        }
        self.storage.close().await.expect("close");
    }
}
