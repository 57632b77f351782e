//! Descriptor compilation and statement building, end to end, offline.

use std::sync::Arc;

use polystore_config::PostgresSection;
use polystore_schema::{
    DefaultValue, EntitySchema, FieldDef, FieldType, SchemaError, SchemaRegistry,
};
use polystore_storage::{PostgresEngine, PostgresModel, SqlValue, Statement};
use polystore_test::{record, test_user_schema};
use serde_json::json;

#[test]
fn test_email_and_is_active_ddl() {
    let schema = EntitySchema::builder("User")
        .field(FieldDef::new("email", FieldType::String).required().unique())
        .field(
            FieldDef::new("isActive", FieldType::Boolean)
                .with_default(DefaultValue::Literal(json!(true))),
        )
        .build()
        .unwrap();
    let ddl = schema.to_relational_schema().unwrap().create_table();

    assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS users ("));
    assert!(ddl.contains("id SERIAL PRIMARY KEY"));
    assert!(ddl.contains("email VARCHAR(255) NOT NULL UNIQUE"));
    assert!(ddl.contains("\"isActive\" BOOLEAN DEFAULT true"));
}

#[test]
fn test_indexes_follow_lookup_fields_only() {
    let schema = EntitySchema::builder("Tag")
        .field(FieldDef::new("label", FieldType::String).indexed())
        .build()
        .unwrap();
    let sql = schema.to_relational_schema().unwrap().to_sql();
    assert!(sql.contains("CREATE INDEX IF NOT EXISTS idx_tags_label ON tags (label);"));
    assert!(!sql.contains("email"));
}

#[test]
fn test_reference_without_target_fails_naming_field() {
    let err = EntitySchema::from_json(
        r#"{"entity": "Note", "fields": [{"name": "author", "type": "REFERENCE"}]}"#,
    )
    .and_then(|schema| schema.to_relational_schema().map(|_| ()))
    .unwrap_err();
    assert!(err.to_string().contains("author"), "{err}");
}

#[test]
fn test_unknown_type_tag_is_unsupported() {
    let err = EntitySchema::from_json(
        r#"{"entity": "Note", "fields": [{"name": "body", "type": "BLOB"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::UnsupportedFieldType { ref field, .. } if field == "body"
    ));
}

#[test]
fn test_document_schema_carries_enum_and_pattern() {
    let document = test_user_schema().unwrap().to_document_schema().unwrap();
    let validator = document.json_schema();
    let properties = &validator["$jsonSchema"]["properties"];

    assert_eq!(properties["email"]["bsonType"], "string");
    assert!(properties["email"]["pattern"].is_string());
    assert_eq!(properties["origin"]["enum"], json!(["Github", "Gitlab"]));
    assert!(document.timestamps);
    assert!(
        validator["$jsonSchema"]["required"]
            .as_array()
            .unwrap()
            .contains(&json!("email"))
    );
}

#[test]
fn test_update_scenario_through_model() {
    let registry = SchemaRegistry::with_builtins().unwrap();
    let model = PostgresModel::new(
        registry.resolve("user").unwrap(),
        Arc::new(PostgresEngine::new(PostgresSection::default())),
    );
    let stmt = model
        .update_statement(&record(json!({"id": 5})), record(json!({"name": "Ana"})))
        .unwrap();

    assert!(stmt.sql.starts_with("UPDATE users SET name = $1 WHERE id = $2"));
    assert_eq!(stmt.values, vec![json!("Ana"), json!(5)]);
    assert_eq!(
        model.bind(&stmt).unwrap(),
        vec![SqlValue::Text("Ana".to_owned()), SqlValue::Int(5)]
    );
}

#[test]
fn test_where_and_set_numbering() {
    let filter = record(json!({"origin": "Github", "isActive": true, "age": 30}));
    let patch = record(json!({"name": "Bea", "age": 31}));
    let stmt = Statement::update("users", &filter, &patch).unwrap();

    assert_eq!(
        stmt.sql,
        "UPDATE users SET name = $1, age = $2 \
         WHERE origin = $3 AND \"isActive\" = $4 AND age = $5 RETURNING *"
    );
    assert_eq!(
        stmt.values,
        vec![json!("Bea"), json!(31), json!("Github"), json!(true), json!(30)]
    );
}
