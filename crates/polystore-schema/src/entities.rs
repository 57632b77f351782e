//! Built-in entities.

use serde_json::json;

use crate::descriptor::EntitySchema;
use crate::error::{SchemaError, SchemaResult};
use crate::field::{DefaultValue, FieldDef, FieldType, PatternRule};

/// Loose e-mail shape check: something, `@`, something, `.`, something.
pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Accounts that signed in through a code host.
///
/// # Errors
///
/// Only fails if the built-in definition itself is broken.
pub fn user_schema() -> SchemaResult<EntitySchema> {
    let email_rule = PatternRule::new(EMAIL_PATTERN, "Invalid format").map_err(|source| {
        SchemaError::InvalidPattern {
            field: "email".to_owned(),
            source,
        }
    })?;

    EntitySchema::builder("User")
        .table("users")
        .collection("users")
        .field(
            FieldDef::new("email", FieldType::String)
                .required()
                .unique()
                .indexed()
                .with_pattern(email_rule),
        )
        .field(FieldDef::new("password", FieldType::String))
        .field(FieldDef::new("name", FieldType::String).required())
        .field(FieldDef::new("profile_picture", FieldType::String))
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
        .field(FieldDef::new("createdAt", FieldType::Date).with_default(DefaultValue::Now))
        .field(FieldDef::new("updatedAt", FieldType::Date).with_default(DefaultValue::Now))
        .build()
}

/// Repositories registered by a user.
///
/// # Errors
///
/// Only fails if the built-in definition itself is broken.
pub fn repo_schema() -> SchemaResult<EntitySchema> {
    EntitySchema::builder("Repo")
        .table("repos")
        .collection("repos")
        .field(FieldDef::new("name", FieldType::String).required())
        .field(
            FieldDef::new("url", FieldType::String)
                .required()
                .unique()
                .indexed(),
        )
        .field(
            FieldDef::new("branch", FieldType::String)
                .with_default(DefaultValue::Literal(json!("main"))),
        )
        .field(
            FieldDef::new("owner", FieldType::Reference)
                .required()
                .indexed()
                .references("users"),
        )
        .field(FieldDef::new("metadata", FieldType::Object))
        .field(FieldDef::new("tags", FieldType::Array))
        .build()
}

/// Every built-in entity, in dependency order.
///
/// # Errors
///
/// Only fails if a built-in definition itself is broken.
pub fn builtin_schemas() -> SchemaResult<Vec<EntitySchema>> {
    Ok(vec![user_schema()?, repo_schema()?])
}
