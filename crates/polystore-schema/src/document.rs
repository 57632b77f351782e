//! Document target compiler.

use serde_json::{Map, Value, json};

use crate::descriptor::EntitySchema;
use crate::error::{SchemaError, SchemaResult};
use crate::field::{DefaultValue, FieldDef, FieldType, PatternRule};

/// Storage type of a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    /// UTF-8 string.
    Text,
    /// Numeric value.
    Number,
    /// Boolean.
    Boolean,
    /// UTC datetime.
    DateTime,
    /// Embedded document.
    Document,
    /// Array.
    List,
    /// Object id referencing another collection.
    ObjectId,
}

impl DocumentType {
    /// Map a descriptor type.
    #[must_use]
    pub const fn from_field_type(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => Self::Text,
            FieldType::Number => Self::Number,
            FieldType::Boolean => Self::Boolean,
            FieldType::Date => Self::DateTime,
            FieldType::Object => Self::Document,
            FieldType::Array => Self::List,
            FieldType::Reference => Self::ObjectId,
        }
    }

    /// Alias used by `$jsonSchema` `bsonType`.
    #[must_use]
    pub const fn bson_type(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::Boolean => "bool",
            Self::DateTime => "date",
            Self::Document => "object",
            Self::List => "array",
            Self::ObjectId => "objectId",
        }
    }
}

/// A compiled `(predicate, message)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternValidator {
    rule: PatternRule,
}

impl PatternValidator {
    /// Run the predicate.
    #[must_use]
    pub fn validate(&self, value: &str) -> bool {
        self.rule.is_match(value)
    }

    /// Failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.rule.message()
    }

    /// Source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.rule.pattern()
    }
}

/// One compiled document field.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentField {
    /// Field name.
    pub name: String,
    /// Storage type.
    pub doc_type: DocumentType,
    /// Required on insert.
    pub required: bool,
    /// Unique index.
    pub unique: bool,
    /// Lookup index.
    pub index: bool,
    /// Default applied on insert.
    pub default: Option<DefaultValue>,
    /// Allowed values.
    pub allowed: Option<Vec<String>>,
    /// Pattern validator.
    pub validator: Option<PatternValidator>,
    /// Referenced collection.
    pub reference: Option<String>,
}

/// An index the document engine should create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed field.
    pub field: String,
    /// Unique constraint.
    pub unique: bool,
    /// Index name.
    pub name: String,
}

/// A descriptor compiled for the document engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSchema {
    /// Collection name.
    pub collection: String,
    /// Fields in declaration order.
    pub fields: Vec<DocumentField>,
    /// `createdAt`/`updatedAt` maintained on writes.
    pub timestamps: bool,
}

impl DocumentSchema {
    pub(crate) fn compile(schema: &EntitySchema) -> SchemaResult<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(compile_field)
            .collect::<SchemaResult<Vec<_>>>()?;
        Ok(Self {
            collection: schema.collection_name().to_owned(),
            fields,
            timestamps: schema.has_timestamps(),
        })
    }

    /// Look up a compiled field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&DocumentField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render the collection validator: `{"$jsonSchema": {...}}`.
    ///
    /// Optional fields also accept `null`. Patterns are carried as `pattern`
    /// so the server rejects what the client-side validator would.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = Map::new();
            let bson_type = field.doc_type.bson_type();
            if field.required {
                property.insert("bsonType".into(), json!(bson_type));
            } else {
                property.insert("bsonType".into(), json!([bson_type, "null"]));
            }
            if let Some(allowed) = &field.allowed {
                let mut members: Vec<Value> = allowed.iter().map(|a| json!(a)).collect();
                if !field.required {
                    members.push(Value::Null);
                }
                property.insert("enum".into(), Value::Array(members));
            }
            if let Some(validator) = &field.validator {
                property.insert("pattern".into(), json!(validator.pattern()));
                property.insert("description".into(), json!(validator.message()));
            }
            properties.insert(field.name.clone(), Value::Object(property));
        }

        let required: Vec<Value> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| json!(f.name))
            .collect();

        let mut schema = Map::new();
        schema.insert("bsonType".into(), json!("object"));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        schema.insert("properties".into(), Value::Object(properties));
        json!({ "$jsonSchema": schema })
    }

    /// Unique and lookup indexes, one per field, in declaration order.
    #[must_use]
    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.fields
            .iter()
            .filter(|f| f.unique || f.index)
            .map(|f| IndexSpec {
                field: f.name.clone(),
                unique: f.unique,
                name: format!("{}_1", f.name),
            })
            .collect()
    }
}

fn compile_field(field: &FieldDef) -> SchemaResult<DocumentField> {
    if field.field_type == FieldType::Reference && field.reference.is_none() {
        return Err(SchemaError::UnsupportedFieldType {
            field: field.name.clone(),
            type_name: "REFERENCE without a target".to_owned(),
        });
    }
    Ok(DocumentField {
        name: field.name.clone(),
        doc_type: DocumentType::from_field_type(field.field_type),
        required: field.required,
        unique: field.unique,
        index: field.index,
        default: field.default.clone(),
        allowed: field.allowed.clone(),
        validator: field
            .pattern
            .clone()
            .map(|rule| PatternValidator { rule }),
        reference: field.reference.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{repo_schema, user_schema};
    use crate::field::FieldDef;

    #[test]
    fn test_user_compiles_to_document_types() {
        let doc = user_schema().unwrap().to_document_schema().unwrap();
        assert_eq!(doc.collection, "users");
        assert!(doc.timestamps);
        assert_eq!(doc.field("email").unwrap().doc_type, DocumentType::Text);
        assert_eq!(doc.field("age").unwrap().doc_type, DocumentType::Number);
        assert_eq!(doc.field("isActive").unwrap().doc_type, DocumentType::Boolean);
        assert_eq!(doc.field("createdAt").unwrap().doc_type, DocumentType::DateTime);
    }

    #[test]
    fn test_pattern_becomes_validator_pair() {
        let doc = user_schema().unwrap().to_document_schema().unwrap();
        let validator = doc.field("email").unwrap().validator.as_ref().unwrap();
        assert!(validator.validate("ana@example.com"));
        assert!(!validator.validate("ana@example"));
        assert_eq!(validator.message(), "Invalid format");
    }

    #[test]
    fn test_json_schema_shape() {
        let doc = user_schema().unwrap().to_document_schema().unwrap();
        let rendered = doc.json_schema();
        let schema = &rendered["$jsonSchema"];
        assert_eq!(schema["bsonType"], "object");
        assert_eq!(schema["required"], json!(["email", "name", "origin"]));
        assert_eq!(schema["properties"]["email"]["bsonType"], "string");
        assert_eq!(schema["properties"]["age"]["bsonType"], json!(["number", "null"]));
        assert_eq!(schema["properties"]["origin"]["enum"], json!(["Github", "Gitlab"]));
    }

    #[test]
    fn test_indexes_cover_unique_and_lookup_fields() {
        let doc = repo_schema().unwrap().to_document_schema().unwrap();
        let indexes = doc.indexes();
        let fields: Vec<_> = indexes.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, ["url", "owner"]);
        assert!(indexes[0].unique);
        assert!(!indexes[1].unique);
        assert_eq!(indexes[0].name, "url_1");
    }

    #[test]
    fn test_reference_needs_target() {
        let schema = EntitySchema::builder("Pin")
            .field(FieldDef::new("owner", FieldType::Reference))
            .build()
            .unwrap();
        let err = schema.to_document_schema().unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedFieldType { field, .. } if field == "owner"));
    }
}
