//! Relational entity model.

use std::sync::Arc;

use async_trait::async_trait;
use polystore_schema::{
    EntitySchema, FieldType, Record, SchemaError, ValidationMode, coerce_value, parse_timestamp,
};
use serde_json::Value;
use tracing::{debug, trace};

use super::query::Statement;
use super::{DeleteOutcome, EntityModel, UpdateOutcome};
use crate::engine::postgres::{PgTransaction, PostgresEngine, SqlNull, SqlValue};
use crate::engine::{EngineKind, Transaction};
use crate::error::{StorageError, StorageResult};

/// Primary key column generated by the relational compiler.
const ID_COLUMN: &str = "id";

/// [`EntityModel`] over a [`PostgresEngine`].
///
/// `createdAt` and `updatedAt` are owned by the table: column defaults fill
/// them on insert and a row trigger refreshes `updatedAt` on update.
#[derive(Debug, Clone)]
pub struct PostgresModel {
    schema: Arc<EntitySchema>,
    engine: Arc<PostgresEngine>,
}

impl PostgresModel {
    /// Bind `schema` to `engine`.
    #[must_use]
    pub fn new(schema: Arc<EntitySchema>, engine: Arc<PostgresEngine>) -> Self {
        Self { schema, engine }
    }

    /// Engine this model writes to.
    #[must_use]
    pub fn engine(&self) -> &Arc<PostgresEngine> {
        &self.engine
    }

    /// Validated `INSERT` for `data`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] for a record the descriptor rejects.
    pub fn insert_statement(&self, data: Record) -> StorageResult<Statement> {
        let data = self.schema.prepare(data, ValidationMode::Create)?;
        Ok(Statement::insert(self.schema.table_name(), &data))
    }

    /// `SELECT` for `filter`, optionally limited.
    #[must_use]
    pub fn select_statement(&self, filter: &Record, limit: Option<u32>) -> Statement {
        Statement::select(self.schema.table_name(), filter, limit)
    }

    /// Validated `UPDATE` applying `patch` to rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] for a rejected patch and
    /// [`StorageError::EmptyUpdate`](crate::StorageError::EmptyUpdate) for an
    /// empty one.
    pub fn update_statement(&self, filter: &Record, patch: Record) -> StorageResult<Statement> {
        let patch = self.schema.prepare(patch, ValidationMode::Update)?;
        Statement::update(self.schema.table_name(), filter, &patch)
    }

    /// `DELETE` for `filter`.
    #[must_use]
    pub fn delete_statement(&self, filter: &Record) -> Statement {
        Statement::delete(self.schema.table_name(), filter)
    }

    /// Typed parameters for `statement`, one per placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] when a value cannot be cast to its
    /// column's type.
    pub fn bind(&self, statement: &Statement) -> StorageResult<Vec<SqlValue>> {
        statement
            .columns
            .iter()
            .zip(&statement.values)
            .map(|(column, value)| self.to_sql_value(column, value.clone()))
            .collect()
    }

    fn to_sql_value(&self, column: &str, value: Value) -> StorageResult<SqlValue> {
        if column == ID_COLUMN {
            return Ok(integer_or_untyped(value, SqlNull::Int));
        }
        let Some(field) = self.schema.field(column) else {
            return Ok(SqlValue::from(value));
        };
        let invalid = |message: String| SchemaError::Validation {
            entity: self.schema.entity_name().to_owned(),
            field: column.to_owned(),
            message,
        };
        let value = coerce_value(field, value).map_err(invalid)?;

        Ok(match (field.field_type, value) {
            (field_type, Value::Null) => SqlValue::Null(null_hint(field_type)),
            (FieldType::Date, Value::String(text)) => match parse_timestamp(&text) {
                Some(at) => SqlValue::Timestamp(at.naive_utc()),
                None => return Err(invalid(format!("cannot cast \"{text}\" to DATE")).into()),
            },
            (FieldType::Object | FieldType::Array, json) => SqlValue::Json(json),
            (FieldType::Reference, value) => integer_or_untyped(value, SqlNull::Int),
            (_, value) => SqlValue::from(value),
        })
    }

    /// Run `statement` on the pool, or on `tx` when given.
    async fn run(
        &self,
        tx: Option<&mut Transaction>,
        statement: &Statement,
    ) -> StorageResult<Vec<Record>> {
        let params = self.bind(statement)?;
        trace!(entity = self.schema.entity_name(), sql = %statement.sql, "relational model");
        match tx {
            None => self.engine.query(&statement.sql, &params).await,
            Some(tx) => relational_side(tx)?.query(&statement.sql, &params).await,
        }
    }

    async fn insert(&self, tx: Option<&mut Transaction>, data: Record) -> StorageResult<Record> {
        let statement = self.insert_statement(data)?;
        let row = self.run(tx, &statement).await?.into_iter().next().unwrap_or_default();
        debug!(entity = self.schema.entity_name(), id = ?row.get(ID_COLUMN), "created");
        Ok(row)
    }

    async fn select(
        &self,
        tx: Option<&mut Transaction>,
        filter: &Record,
        limit: Option<u32>,
    ) -> StorageResult<Vec<Record>> {
        self.run(tx, &self.select_statement(filter, limit)).await
    }

    async fn update_rows(
        &self,
        tx: Option<&mut Transaction>,
        filter: &Record,
        patch: Record,
    ) -> StorageResult<UpdateOutcome> {
        let statement = self.update_statement(filter, patch)?;
        let records = self.run(tx, &statement).await?;
        let count = u64::try_from(records.len()).unwrap_or(u64::MAX);
        debug!(entity = self.schema.entity_name(), count, "updated");
        Ok(UpdateOutcome {
            matched: count,
            modified: count,
            records,
        })
    }

    async fn delete_rows(
        &self,
        tx: Option<&mut Transaction>,
        filter: &Record,
    ) -> StorageResult<DeleteOutcome> {
        let records = self.run(tx, &self.delete_statement(filter)).await?;
        let deleted = u64::try_from(records.len()).unwrap_or(u64::MAX);
        debug!(entity = self.schema.entity_name(), deleted, "deleted");
        Ok(DeleteOutcome { deleted, records })
    }
}

/// The relational side of `tx`.
fn relational_side(tx: &mut Transaction) -> StorageResult<&mut PgTransaction> {
    let actual = tx.kind();
    tx.as_postgres_mut()
        .ok_or(StorageError::TransactionMismatch {
            expected: EngineKind::Postgres,
            actual,
        })
}

/// Integer ids arrive as numbers or numeric strings.
fn integer_or_untyped(value: Value, null: SqlNull) -> SqlValue {
    match &value {
        Value::Null => SqlValue::Null(null),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_or_else(|_| SqlValue::from(value.clone()), SqlValue::Int),
        _ => SqlValue::from(value),
    }
}

const fn null_hint(field_type: FieldType) -> SqlNull {
    match field_type {
        FieldType::String => SqlNull::Text,
        FieldType::Number | FieldType::Reference => SqlNull::Int,
        FieldType::Boolean => SqlNull::Bool,
        FieldType::Date => SqlNull::Timestamp,
        FieldType::Object | FieldType::Array => SqlNull::Json,
    }
}

#[async_trait]
impl EntityModel for PostgresModel {
    fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    async fn create(&self, data: Record) -> StorageResult<Record> {
        self.insert(None, data).await
    }

    async fn find(&self, filter: Record) -> StorageResult<Vec<Record>> {
        self.select(None, &filter, None).await
    }

    async fn find_one(&self, filter: Record) -> StorageResult<Option<Record>> {
        Ok(self.select(None, &filter, Some(1)).await?.into_iter().next())
    }

    async fn update(&self, filter: Record, patch: Record) -> StorageResult<UpdateOutcome> {
        self.update_rows(None, &filter, patch).await
    }

    async fn delete(&self, filter: Record) -> StorageResult<DeleteOutcome> {
        self.delete_rows(None, &filter).await
    }

    async fn create_in(&self, tx: &mut Transaction, data: Record) -> StorageResult<Record> {
        self.insert(Some(tx), data).await
    }

    async fn find_in(&self, tx: &mut Transaction, filter: Record) -> StorageResult<Vec<Record>> {
        self.select(Some(tx), &filter, None).await
    }

    async fn find_one_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
    ) -> StorageResult<Option<Record>> {
        Ok(self.select(Some(tx), &filter, Some(1)).await?.into_iter().next())
    }

    async fn update_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
        patch: Record,
    ) -> StorageResult<UpdateOutcome> {
        self.update_rows(Some(tx), &filter, patch).await
    }

    async fn delete_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
    ) -> StorageResult<DeleteOutcome> {
        self.delete_rows(Some(tx), &filter).await
    }

    async fn ensure_schema(&self) -> StorageResult<()> {
        let ddl = self.schema.to_relational_schema()?.to_sql();
        self.engine.execute_batch(&ddl).await?;
        debug!(table = self.schema.table_name(), "table ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polystore_config::PostgresSection;
    use polystore_schema::entities::user_schema;
    use serde_json::json;

    use super::*;

    fn model() -> PostgresModel {
        PostgresModel::new(
            Arc::new(user_schema().unwrap()),
            Arc::new(PostgresEngine::new(PostgresSection::default())),
        )
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_update_by_id_statement() {
        let model = model();
        let stmt = model
            .update_statement(&record(json!({"id": 5})), record(json!({"name": "Ana"})))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE users SET name = $1 WHERE id = $2 RETURNING *"
        );
        assert_eq!(stmt.values, vec![json!("Ana"), json!(5)]);
        assert_eq!(
            model.bind(&stmt).unwrap(),
            vec![SqlValue::Text("Ana".to_owned()), SqlValue::Int(5)]
        );
    }

    #[test]
    fn test_insert_validates_before_building() {
        let err = model()
            .insert_statement(record(json!({"email": "ana@example.com", "name": "Ana"})))
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Schema(SchemaError::Validation { ref field, .. }) if field == "origin"
        ));
    }

    #[test]
    fn test_insert_leaves_timestamps_to_the_table() {
        let stmt = model()
            .insert_statement(record(json!({
                "email": "ana@example.com", "name": "Ana", "origin": "Github"
            })))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (email, name, origin) VALUES ($1, $2, $3) RETURNING *"
        );
    }

    #[test]
    fn test_bind_types_by_field() {
        let model = model();
        let stmt = model.select_statement(
            &record(json!({
                "id": "7",
                "age": "41",
                "isActive": "yes",
                "createdAt": "2024-05-01T10:00:00Z",
                "profile_picture": null,
                "extra": [1, 2],
            })),
            None,
        );
        let expected_at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(
            model.bind(&stmt).unwrap(),
            vec![
                SqlValue::Int(7),
                SqlValue::Int(41),
                SqlValue::Bool(true),
                SqlValue::Timestamp(expected_at),
                SqlValue::Null(SqlNull::Text),
                SqlValue::Json(json!([1, 2])),
            ]
        );
    }

    #[test]
    fn test_bind_rejects_uncastable_value() {
        let model = model();
        let stmt = model.select_statement(&record(json!({"age": "old"})), None);
        assert!(matches!(
            model.bind(&stmt),
            Err(StorageError::Schema(SchemaError::Validation { .. }))
        ));
    }

    #[test]
    fn test_update_rejects_bad_enum() {
        let err = model()
            .update_statement(&record(json!({"id": 1})), record(json!({"origin": "Bitbucket"})))
            .unwrap_err();
        assert!(matches!(err, StorageError::Schema(_)));
    }

    #[tokio::test]
    async fn test_find_before_connect() {
        let err = model().find(Record::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotConnected(_)));
    }
}
