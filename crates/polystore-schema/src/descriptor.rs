//! Entity schema descriptors.
//!
//! A descriptor is either assembled in code through [`EntitySchema::builder`]
//! or parsed from a [`SchemaDefinition`] written in JSON or TOML:
//!
//! ```toml
//! entity = "Team"
//! table = "teams"
//!
//! [[fields]]
//! name = "slug"
//! type = "STRING"
//! required = true
//! unique = true
//! index = true
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::DocumentSchema;
use crate::error::{SchemaError, SchemaResult};
use crate::field::{DefaultValue, FieldDef, FieldType, PatternRule};
use crate::relational::RelationalSchema;
use crate::{CREATED_AT, UPDATED_AT};

/// Failure message used when a pattern definition omits one.
const DEFAULT_PATTERN_MESSAGE: &str = "Invalid format";

/// The schema of one entity, shared by both storage engines.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    entity_name: String,
    collection_name: String,
    table_name: String,
    timestamps: bool,
    fields: Vec<FieldDef>,
}

impl EntitySchema {
    /// Start a descriptor for `entity_name`.
    #[must_use]
    pub fn builder(entity_name: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder::new(entity_name)
    }

    /// Build a descriptor from a parsed definition.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnsupportedFieldType`] for unknown type tags and
    /// any invariant violation reported by [`EntitySchemaBuilder::build`].
    pub fn from_definition(definition: SchemaDefinition) -> SchemaResult<Self> {
        let mut builder = Self::builder(definition.entity).timestamps(definition.timestamps);
        if let Some(table) = definition.table {
            builder = builder.table(table);
        }
        if let Some(collection) = definition.collection {
            builder = builder.collection(collection);
        }
        for field in definition.fields {
            builder = builder.field(field.into_field_def()?);
        }
        builder.build()
    }

    /// Parse a JSON definition.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Definition`] on malformed JSON, then anything
    /// [`Self::from_definition`] reports.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let definition: SchemaDefinition =
            serde_json::from_str(json).map_err(|e| SchemaError::Definition(e.to_string()))?;
        Self::from_definition(definition)
    }

    /// Parse a TOML definition.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Definition`] on malformed TOML, then anything
    /// [`Self::from_definition`] reports.
    pub fn from_toml(toml_str: &str) -> SchemaResult<Self> {
        let definition: SchemaDefinition =
            toml::from_str(toml_str).map_err(|e| SchemaError::Definition(e.to_string()))?;
        Self::from_definition(definition)
    }

    /// Canonical entity name, e.g. `User`.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Document collection name.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Relational table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Whether `createdAt`/`updatedAt` are maintained.
    #[must_use]
    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Type of the named field, if declared.
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }

    /// Fields that get a secondary index.
    pub fn lookup_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.index)
    }

    /// Compile for the document engine.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnsupportedFieldType`] when a field has no
    /// document mapping.
    pub fn to_document_schema(&self) -> SchemaResult<DocumentSchema> {
        DocumentSchema::compile(self)
    }

    /// Compile for the relational engine.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnsupportedFieldType`] when a field has no
    /// relational mapping.
    pub fn to_relational_schema(&self) -> SchemaResult<RelationalSchema> {
        RelationalSchema::compile(self)
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder {
    entity_name: String,
    collection_name: Option<String>,
    table_name: Option<String>,
    timestamps: bool,
    fields: Vec<FieldDef>,
}

impl EntitySchemaBuilder {
    fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            collection_name: None,
            table_name: None,
            timestamps: true,
            fields: Vec::new(),
        }
    }

    /// Override the table name (default: lower-cased plural of the entity).
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Override the collection name (default: lower-cased plural of the entity).
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    /// Enable or disable timestamp maintenance (default: enabled).
    #[must_use]
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Check invariants and produce the descriptor.
    ///
    /// With timestamps enabled, `createdAt` and `updatedAt` DATE fields
    /// defaulting to now are appended when not declared.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::InvalidField`] for an empty entity name or a field
    ///   that breaks a per-field invariant
    /// - [`SchemaError::DuplicateField`] when two fields share a name
    pub fn build(self) -> SchemaResult<EntitySchema> {
        let entity_name = self.entity_name.trim().to_owned();
        if entity_name.is_empty() {
            return Err(SchemaError::invalid("<entity>", "entity name is empty"));
        }

        let mut fields = self.fields;
        if self.timestamps {
            for stamp in [CREATED_AT, UPDATED_AT] {
                if !fields.iter().any(|f| f.name == stamp) {
                    fields.push(
                        FieldDef::new(stamp, FieldType::Date).with_default(DefaultValue::Now),
                    );
                }
            }
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    entity: entity_name,
                    field: field.name.clone(),
                });
            }
            field.check()?;
        }

        let plural = default_storage_name(&entity_name);
        Ok(EntitySchema {
            collection_name: self.collection_name.unwrap_or_else(|| plural.clone()),
            table_name: self.table_name.unwrap_or(plural),
            entity_name,
            timestamps: self.timestamps,
            fields,
        })
    }
}

fn default_storage_name(entity: &str) -> String {
    let lower = entity.to_lowercase();
    if lower.ends_with('s') {
        lower
    } else {
        format!("{lower}s")
    }
}

/// Serialized form of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Entity name.
    pub entity: String,
    /// Table name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Collection name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Timestamp maintenance.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

fn default_true() -> bool {
    true
}

/// Serialized form of a field.
///
/// `default = "now"` on a DATE field selects the current-time generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name.
    pub name: String,
    /// Type tag (`STRING`, `NUMBER`, ...), case-insensitive.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Required on create.
    #[serde(default)]
    pub required: bool,
    /// Unique across the entity.
    #[serde(default)]
    pub unique: bool,
    /// Lookup field.
    #[serde(default)]
    pub index: bool,
    /// Default literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// Pattern constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Message for pattern failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Reference target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl FieldDefinition {
    fn into_field_def(self) -> SchemaResult<FieldDef> {
        let field_type = FieldType::parse_for(&self.name, &self.type_name)?;
        let mut field = FieldDef::new(self.name, field_type);
        field.required = self.required;
        field.unique = self.unique;
        field.index = self.index;
        field.allowed = self.allowed;
        field.reference = self.reference;
        field.default = self.default.map(|value| {
            let is_now = field_type == FieldType::Date
                && value.as_str().is_some_and(|s| s.eq_ignore_ascii_case("now"));
            if is_now {
                DefaultValue::Now
            } else {
                DefaultValue::Literal(value)
            }
        });
        if let Some(pattern) = self.pattern {
            let message = self
                .message
                .unwrap_or_else(|| DEFAULT_PATTERN_MESSAGE.to_owned());
            let rule =
                PatternRule::new(&pattern, message).map_err(|source| SchemaError::InvalidPattern {
                    field: field.name.clone(),
                    source,
                })?;
            field.pattern = Some(rule);
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_names_default_to_plural() {
        let schema = EntitySchema::builder("User").build().unwrap();
        assert_eq!(schema.entity_name(), "User");
        assert_eq!(schema.table_name(), "users");
        assert_eq!(schema.collection_name(), "users");

        let schema = EntitySchema::builder("Address").table("addr").build().unwrap();
        assert_eq!(schema.table_name(), "addr");
        assert_eq!(schema.collection_name(), "address");
    }

    #[test]
    fn test_timestamps_are_appended() {
        let schema = EntitySchema::builder("Note")
            .field(FieldDef::new("body", FieldType::String))
            .build()
            .unwrap();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["body", "createdAt", "updatedAt"]);
        assert_eq!(
            schema.field("createdAt").unwrap().default,
            Some(DefaultValue::Now)
        );
    }

    #[test]
    fn test_timestamps_can_be_disabled() {
        let schema = EntitySchema::builder("Note")
            .timestamps(false)
            .field(FieldDef::new("body", FieldType::String))
            .build()
            .unwrap();
        assert_eq!(schema.fields().len(), 1);
        assert!(!schema.has_timestamps());
    }

    #[test]
    fn test_duplicate_fields_are_rejected() {
        let err = EntitySchema::builder("Note")
            .field(FieldDef::new("body", FieldType::String))
            .field(FieldDef::new("body", FieldType::Object))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { field, .. } if field == "body"));
    }

    #[test]
    fn test_parse_json_definition() {
        let schema = EntitySchema::from_json(
            r#"{
                "entity": "Team",
                "fields": [
                    {"name": "slug", "type": "string", "required": true, "unique": true, "index": true},
                    {"name": "seats", "type": "NUMBER", "default": 5},
                    {"name": "foundedAt", "type": "DATE", "default": "now"},
                    {"name": "code", "type": "STRING", "pattern": "^[A-Z]{3}$"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(schema.table_name(), "teams");
        let slug = schema.field("slug").unwrap();
        assert!(slug.required && slug.unique && slug.index);
        assert_eq!(
            schema.field("seats").unwrap().default,
            Some(DefaultValue::Literal(json!(5)))
        );
        assert_eq!(schema.field("foundedAt").unwrap().default, Some(DefaultValue::Now));
        assert_eq!(
            schema.field("code").unwrap().pattern.as_ref().unwrap().message(),
            "Invalid format"
        );
    }

    #[test]
    fn test_parse_toml_definition_with_unknown_type() {
        let err = EntitySchema::from_toml(
            r#"
            entity = "Team"

            [[fields]]
            name = "logo"
            type = "BLOB"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedFieldType { field, .. } if field == "logo"));
    }

    #[test]
    fn test_parse_malformed_definition() {
        assert!(matches!(
            EntitySchema::from_json("{"),
            Err(SchemaError::Definition(_))
        ));
    }

    #[test]
    fn test_bad_pattern_is_reported() {
        let err = EntitySchema::from_json(
            r#"{"entity": "T", "fields": [{"name": "x", "type": "STRING", "pattern": "("}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPattern { .. }));
    }
}
