//! Test fixtures for descriptors, records and configuration.

use polystore_config::DatabaseConfig;
use polystore_schema::{
    DefaultValue, EntitySchema, FieldDef, FieldType, PatternRule, Record, SchemaResult,
};
use serde_json::{Value, json};

/// Convert a JSON object literal into a [`Record`].
///
/// Non-object values yield an empty record.
#[must_use]
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// A small `User` descriptor stored in `table`.
///
/// Fields: `email` (required, unique, indexed, email pattern), `name`
/// (required), `age`, `origin` (required enum `Github`/`Gitlab`) and
/// `isActive` (default `true`), plus timestamps.
///
/// # Errors
///
/// Only if the descriptor itself is invalid.
pub fn test_user_schema_named(table: &str) -> SchemaResult<EntitySchema> {
    let email_rule = PatternRule::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$", "Invalid format")
        .map_err(|source| polystore_schema::SchemaError::InvalidPattern {
            field: "email".to_owned(),
            source,
        })?;
    EntitySchema::builder("User")
        .table(table)
        .collection(table)
        .field(
            FieldDef::new("email", FieldType::String)
                .required()
                .unique()
                .indexed()
                .with_pattern(email_rule),
        )
        .field(FieldDef::new("name", FieldType::String).required())
        .field(FieldDef::new("age", FieldType::Number))
        .field(
            FieldDef::new("origin", FieldType::String)
                .required()
                .with_enum(["Github", "Gitlab"]),
        )
        .field(
            FieldDef::new("isActive", FieldType::Boolean)
                .with_default(DefaultValue::Literal(json!(true))),
        )
        .build()
}

/// [`test_user_schema_named`] stored in `users`.
///
/// # Errors
///
/// Only if the descriptor itself is invalid.
pub fn test_user_schema() -> SchemaResult<EntitySchema> {
    test_user_schema_named("users")
}

/// A valid record for [`test_user_schema`].
#[must_use]
pub fn test_user_record(email: &str) -> Record {
    record(json!({
        "email": email,
        "name": "Ana",
        "age": 34,
        "origin": "Github",
    }))
}

/// Default database configuration with the given engine tag.
#[must_use]
pub fn test_database_config(engine: &str) -> DatabaseConfig {
    DatabaseConfig::default().with_engine(engine)
}

/// `PostgreSQL` settings pointing at a closed local port, failing fast.
#[must_use]
pub fn unreachable_postgres_config() -> DatabaseConfig {
    let mut config = test_database_config("postgres");
    config.postgres.host = "127.0.0.1".to_owned();
    config.postgres.port = 1;
    config.postgres.connect_timeout_secs = 1;
    config
}

/// `MongoDB` settings pointing at a closed local port, failing fast.
#[must_use]
pub fn unreachable_mongo_config() -> DatabaseConfig {
    let mut config = test_database_config("mongodb");
    "mongodb://127.0.0.1:1/polystore_test".clone_into(&mut config.mongodb.uri);
    config.mongodb.server_selection_timeout_ms = Some(200);
    config
}
