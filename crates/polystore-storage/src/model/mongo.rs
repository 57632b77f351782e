//! Document entity model.

use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use chrono::Utc;
use polystore_schema::{
    EntitySchema, FieldType, Record, SchemaError, ValidationMode, coerce_value, format_timestamp,
    parse_timestamp,
};
use serde_json::Value;
use tracing::debug;

use super::{DeleteOutcome, EntityModel, UpdateOutcome};
use crate::engine::mongo::{DocumentOp, DocumentOutput, MongoEngine, MongoTransaction};
use crate::engine::{EngineKind, Transaction};
use crate::error::{StorageError, StorageResult};

/// Document identity field.
const ID_FIELD: &str = "_id";

/// [`EntityModel`] over a [`MongoEngine`].
///
/// Defaults and timestamps are filled in here, before the insert, with one
/// instant per call. Dates are stored as BSON dates and references as object
/// ids; records come back with both rendered as strings.
#[derive(Debug, Clone)]
pub struct MongoModel {
    schema: Arc<EntitySchema>,
    engine: Arc<MongoEngine>,
}

impl MongoModel {
    /// Bind `schema` to `engine`.
    #[must_use]
    pub fn new(schema: Arc<EntitySchema>, engine: Arc<MongoEngine>) -> Self {
        Self { schema, engine }
    }

    /// Engine this model writes to.
    #[must_use]
    pub fn engine(&self) -> &Arc<MongoEngine> {
        &self.engine
    }

    /// The document `create` would insert: defaults applied, validated, with
    /// a fresh `_id` when none was given.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] for a record the descriptor rejects.
    pub fn insert_document(&self, data: Record) -> StorageResult<Document> {
        let mut data = data;
        self.schema.apply_defaults(&mut data, Utc::now());
        let data = self.schema.prepare(data, ValidationMode::Create)?;
        let mut document = self.to_document(data);
        if !document.contains_key(ID_FIELD) {
            let mut with_id = Document::new();
            with_id.insert(ID_FIELD, ObjectId::new());
            for (key, value) in document {
                with_id.insert(key, value);
            }
            document = with_id;
        }
        Ok(document)
    }

    /// Filter document for an equality map.
    #[must_use]
    pub fn filter_document(&self, filter: Record) -> Document {
        self.to_document(filter)
    }

    /// Update document for `patch`.
    ///
    /// A plain patch is validated and wrapped in `$set`. A patch of update
    /// operators (`$inc`, `$unset`, ...) passes through, with the contents of
    /// its `$set` validated. Either way `updatedAt` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] for a rejected patch and
    /// [`StorageError::EmptyUpdate`] for an empty one.
    pub fn update_document(&self, patch: Record) -> StorageResult<Document> {
        if patch.is_empty() {
            return Err(StorageError::EmptyUpdate {
                entity: self.schema.entity_name().to_owned(),
            });
        }

        let now = Utc::now();
        let is_operator = patch.keys().any(|k| k.starts_with('$'));
        let mut update = Document::new();
        if is_operator {
            let mut patch = patch;
            let mut set = match patch.remove("$set") {
                Some(Value::Object(set)) => self.schema.prepare(set, ValidationMode::Update)?,
                Some(other) => {
                    return Err(SchemaError::Validation {
                        entity: self.schema.entity_name().to_owned(),
                        field: "$set".to_owned(),
                        message: format!("expected an object, got {other}"),
                    }
                    .into());
                },
                None => Record::new(),
            };
            self.schema.touch(&mut set, now);
            for (operator, argument) in patch {
                update.insert(operator, json_to_bson(argument));
            }
            if !set.is_empty() {
                update.insert("$set", self.to_document(set));
            }
        } else {
            let mut set = self.schema.prepare(patch, ValidationMode::Update)?;
            self.schema.touch(&mut set, now);
            update.insert("$set", self.to_document(set));
        }
        Ok(update)
    }

    /// Run `op` on the entity's collection, inside `tx` when given.
    async fn run(
        &self,
        tx: Option<&mut Transaction>,
        op: DocumentOp,
    ) -> StorageResult<DocumentOutput> {
        let collection = self.schema.collection_name();
        match tx {
            None => self.engine.query(collection, op).await,
            Some(tx) => document_side(tx)?.query(collection, op).await,
        }
    }

    async fn insert(&self, tx: Option<&mut Transaction>, data: Record) -> StorageResult<Record> {
        let document = self.insert_document(data)?;
        match self.run(tx, DocumentOp::InsertOne(document.clone())).await? {
            DocumentOutput::Inserted(id) => {
                debug!(collection = self.schema.collection_name(), id = %id, "created");
                Ok(document_to_record(document))
            },
            other => Err(unexpected("insertOne", &other)),
        }
    }

    async fn select(
        &self,
        tx: Option<&mut Transaction>,
        filter: Record,
    ) -> StorageResult<Vec<Record>> {
        let op = DocumentOp::Find(self.filter_document(filter));
        match self.run(tx, op).await? {
            DocumentOutput::Documents(docs) => {
                Ok(docs.into_iter().map(document_to_record).collect())
            },
            other => Err(unexpected("find", &other)),
        }
    }

    async fn select_one(
        &self,
        tx: Option<&mut Transaction>,
        filter: Record,
    ) -> StorageResult<Option<Record>> {
        let op = DocumentOp::FindOne(self.filter_document(filter));
        match self.run(tx, op).await? {
            DocumentOutput::Document(doc) => Ok(doc.map(document_to_record)),
            other => Err(unexpected("findOne", &other)),
        }
    }

    async fn update_matching(
        &self,
        tx: Option<&mut Transaction>,
        filter: Record,
        patch: Record,
    ) -> StorageResult<UpdateOutcome> {
        let op = DocumentOp::UpdateMany {
            filter: self.filter_document(filter),
            update: self.update_document(patch)?,
        };
        match self.run(tx, op).await? {
            DocumentOutput::Updated { matched, modified } => {
                debug!(collection = self.schema.collection_name(), matched, modified, "updated");
                Ok(UpdateOutcome {
                    matched,
                    modified,
                    records: Vec::new(),
                })
            },
            other => Err(unexpected("updateMany", &other)),
        }
    }

    async fn delete_matching(
        &self,
        tx: Option<&mut Transaction>,
        filter: Record,
    ) -> StorageResult<DeleteOutcome> {
        let op = DocumentOp::DeleteMany(self.filter_document(filter));
        match self.run(tx, op).await? {
            DocumentOutput::Deleted(deleted) => {
                debug!(collection = self.schema.collection_name(), deleted, "deleted");
                Ok(DeleteOutcome {
                    deleted,
                    records: Vec::new(),
                })
            },
            other => Err(unexpected("deleteMany", &other)),
        }
    }

    /// Convert a record, typing declared fields for storage.
    fn to_document(&self, record: Record) -> Document {
        record
            .into_iter()
            .map(|(key, value)| {
                let bson = self.field_to_bson(&key, value);
                (key, bson)
            })
            .collect()
    }

    fn field_to_bson(&self, key: &str, value: Value) -> Bson {
        if key == ID_FIELD {
            return object_id_or_plain(value);
        }
        let Some(field) = self.schema.field(key) else {
            return json_to_bson(value);
        };
        if is_operator_object(&value) {
            return json_to_bson(value);
        }
        // Uncastable values are kept as given; validation happens on writes.
        let value = match coerce_value(field, value.clone()) {
            Ok(coerced) => coerced,
            Err(_) => return json_to_bson(value),
        };
        match (field.field_type, value) {
            (FieldType::Date, Value::String(text)) => parse_timestamp(&text)
                .map_or(Bson::String(text), |at| Bson::DateTime(bson::DateTime::from_chrono(at))),
            (FieldType::Reference, value) => object_id_or_plain(value),
            (_, value) => json_to_bson(value),
        }
    }
}

/// The document side of `tx`.
fn document_side(tx: &mut Transaction) -> StorageResult<&mut MongoTransaction> {
    let actual = tx.kind();
    tx.as_mongo_mut().ok_or(StorageError::TransactionMismatch {
        expected: EngineKind::Mongo,
        actual,
    })
}

/// `{"$in": [..]}` and friends, but not an extended-JSON `{"$oid": ..}`.
fn is_operator_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        !map.is_empty() && !map.contains_key("$oid") && map.keys().all(|k| k.starts_with('$'))
    })
}

fn object_id_or_plain(value: Value) -> Bson {
    match value {
        Value::String(text) => ObjectId::parse_str(&text).map_or(Bson::String(text), Bson::ObjectId),
        Value::Object(map) => {
            let oid = map
                .get("$oid")
                .and_then(Value::as_str)
                .and_then(|hex| ObjectId::parse_str(hex).ok());
            match oid {
                Some(id) if map.len() == 1 => Bson::ObjectId(id),
                _ => json_to_bson(Value::Object(map)),
            }
        },
        other => json_to_bson(other),
    }
}

/// Structural JSON to BSON conversion. Keys like `$gt` stay plain keys.
fn json_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32),
            None => n.as_f64().map_or(Bson::Null, Bson::Double),
        },
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.into_iter()
                .map(|(k, v)| (k, json_to_bson(v)))
                .collect(),
        ),
    }
}

/// BSON back to the record form: ids as hex strings, dates as RFC 3339.
fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Value::from(f),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(at) => Value::String(format_timestamp(at.to_chrono())),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_record(doc)),
        other => other.into_relaxed_extjson(),
    }
}

fn document_to_record(document: Document) -> Record {
    document
        .into_iter()
        .map(|(k, v)| (k, bson_to_json(v)))
        .collect()
}

fn unexpected(op: &str, output: &DocumentOutput) -> StorageError {
    StorageError::Serialization(format!("unexpected {op} result: {output:?}"))
}

#[async_trait]
impl EntityModel for MongoModel {
    fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    async fn create(&self, data: Record) -> StorageResult<Record> {
        self.insert(None, data).await
    }

    async fn find(&self, filter: Record) -> StorageResult<Vec<Record>> {
        self.select(None, filter).await
    }

    async fn find_one(&self, filter: Record) -> StorageResult<Option<Record>> {
        self.select_one(None, filter).await
    }

    async fn update(&self, filter: Record, patch: Record) -> StorageResult<UpdateOutcome> {
        self.update_matching(None, filter, patch).await
    }

    async fn delete(&self, filter: Record) -> StorageResult<DeleteOutcome> {
        self.delete_matching(None, filter).await
    }

    async fn create_in(&self, tx: &mut Transaction, data: Record) -> StorageResult<Record> {
        self.insert(Some(tx), data).await
    }

    async fn find_in(&self, tx: &mut Transaction, filter: Record) -> StorageResult<Vec<Record>> {
        self.select(Some(tx), filter).await
    }

    async fn find_one_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
    ) -> StorageResult<Option<Record>> {
        self.select_one(Some(tx), filter).await
    }

    async fn update_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
        patch: Record,
    ) -> StorageResult<UpdateOutcome> {
        self.update_matching(Some(tx), filter, patch).await
    }

    async fn delete_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
    ) -> StorageResult<DeleteOutcome> {
        self.delete_matching(Some(tx), filter).await
    }

    async fn ensure_schema(&self) -> StorageResult<()> {
        let schema = self.schema.to_document_schema()?;
        self.engine.ensure_collection(&schema).await
    }
}
