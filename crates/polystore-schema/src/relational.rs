//! Relational target compiler.
//!
//! Renders PostgreSQL DDL. Every statement is idempotent (`IF NOT EXISTS`,
//! `CREATE OR REPLACE`) so a schema sync can run on every start.

use std::borrow::Cow;
use std::fmt::Write as _;

use serde_json::Value;

use crate::descriptor::EntitySchema;
use crate::error::{SchemaError, SchemaResult};
use crate::field::{DefaultValue, FieldDef, FieldType};
use crate::UPDATED_AT;

/// Width of `STRING` columns.
const VARCHAR_WIDTH: u16 = 255;

/// Shared trigger function that refreshes `updatedAt` on every row update.
const TOUCH_FUNCTION: &str = "polystore_touch_updated_at";

/// Words that cannot appear as bare column or table names.
const RESERVED: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "both", "case", "check", "collate", "column",
    "constraint", "create", "current_date", "current_time", "current_timestamp", "current_user",
    "default", "delete", "desc", "distinct", "do", "else", "end", "false", "fetch", "for",
    "foreign", "from", "grant", "group", "having", "in", "index", "insert", "into", "is", "join",
    "key", "leading", "limit", "not", "null", "offset", "on", "only", "or", "order", "primary",
    "references", "returning", "select", "session_user", "set", "some", "table", "then", "to",
    "trailing", "true", "union", "unique", "update", "user", "using", "values", "when", "where",
    "window", "with",
];

/// Quote `name` as a SQL identifier when it is not a plain lower-case one.
///
/// ```
/// use polystore_schema::quote_ident;
///
/// assert_eq!(quote_ident("email"), "email");
/// assert_eq!(quote_ident("isActive"), "\"isActive\"");
/// assert_eq!(quote_ident("user"), "\"user\"");
/// ```
#[must_use]
pub fn quote_ident(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED.contains(&name);
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

/// Render `text` as an escaped SQL string literal.
#[must_use]
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Relational column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `VARCHAR(n)`.
    Varchar(u16),
    /// `INTEGER`.
    Integer,
    /// `BOOLEAN`.
    Boolean,
    /// `TIMESTAMP(3)`. Millisecond precision, the precision records carry,
    /// so a timestamp read back from a row matches that row when filtered on.
    Timestamp,
    /// `JSONB`.
    Jsonb,
}

impl ColumnType {
    /// Map a descriptor type.
    #[must_use]
    pub const fn from_field_type(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => Self::Varchar(VARCHAR_WIDTH),
            FieldType::Number | FieldType::Reference => Self::Integer,
            FieldType::Boolean => Self::Boolean,
            FieldType::Date => Self::Timestamp,
            FieldType::Object | FieldType::Array => Self::Jsonb,
        }
    }

    /// SQL spelling.
    #[must_use]
    pub fn sql(self) -> Cow<'static, str> {
        match self {
            Self::Varchar(width) => Cow::Owned(format!("VARCHAR({width})")),
            Self::Integer => Cow::Borrowed("INTEGER"),
            Self::Boolean => Cow::Borrowed("BOOLEAN"),
            Self::Timestamp => Cow::Borrowed("TIMESTAMP(3)"),
            Self::Jsonb => Cow::Borrowed("JSONB"),
        }
    }
}

/// One compiled column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name (unquoted).
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// `NOT NULL`.
    pub not_null: bool,
    /// `UNIQUE`.
    pub unique: bool,
    /// Rendered `DEFAULT` expression.
    pub default: Option<String>,
    /// Rendered `CHECK` expression.
    pub check: Option<String>,
    /// Referenced table.
    pub references: Option<String>,
}

impl Column {
    /// Column definition as it appears inside `CREATE TABLE`.
    #[must_use]
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.column_type.sql());
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if self.unique {
            def.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            let _ = write!(def, " DEFAULT {default}");
        }
        if let Some(check) = &self.check {
            let _ = write!(def, " CHECK ({check})");
        }
        if let Some(table) = &self.references {
            let _ = write!(def, " REFERENCES {}(id)", quote_ident(table));
        }
        def
    }
}

/// A descriptor compiled for the relational engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalSchema {
    /// Table name (unquoted).
    pub table: String,
    /// Columns after the `id` primary key, in declaration order.
    pub columns: Vec<Column>,
    /// Columns that get a secondary index.
    pub indexed: Vec<String>,
    /// Install the `updatedAt` refresh trigger.
    pub touch_trigger: bool,
}

impl RelationalSchema {
    pub(crate) fn compile(schema: &EntitySchema) -> SchemaResult<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(compile_column)
            .collect::<SchemaResult<Vec<_>>>()?;
        let touch_trigger = schema.has_timestamps()
            && schema.field_type(UPDATED_AT) == Some(FieldType::Date);
        Ok(Self {
            table: schema.table_name().to_owned(),
            columns,
            indexed: schema.lookup_fields().map(|f| f.name.clone()).collect(),
            touch_trigger,
        })
    }

    /// `CREATE TABLE IF NOT EXISTS` statement.
    #[must_use]
    pub fn create_table(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    id SERIAL PRIMARY KEY",
            quote_ident(&self.table)
        );
        for column in &self.columns {
            let _ = write!(sql, ",\n    {}", column.definition());
        }
        sql.push_str("\n)");
        sql
    }

    /// One `CREATE INDEX IF NOT EXISTS idx_<table>_<field>` per lookup field.
    #[must_use]
    pub fn create_indexes(&self) -> Vec<String> {
        self.indexed
            .iter()
            .map(|field| {
                let name = format!("idx_{}_{}", self.table, field).to_lowercase();
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote_ident(&name),
                    quote_ident(&self.table),
                    quote_ident(field)
                )
            })
            .collect()
    }

    /// Trigger function and trigger keeping `updatedAt` current.
    #[must_use]
    pub fn touch_trigger_statements(&self) -> Vec<String> {
        if !self.touch_trigger {
            return Vec::new();
        }
        let trigger = format!("{}_touch_updated_at", self.table).to_lowercase();
        vec![
            format!(
                "CREATE OR REPLACE FUNCTION {TOUCH_FUNCTION}() RETURNS TRIGGER AS $$\n\
                 BEGIN\n    NEW.{} = CURRENT_TIMESTAMP;\n    RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql",
                quote_ident(UPDATED_AT)
            ),
            format!(
                "CREATE OR REPLACE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {TOUCH_FUNCTION}()",
                quote_ident(&trigger),
                quote_ident(&self.table)
            ),
        ]
    }

    /// Every statement, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        let mut statements = vec![self.create_table()];
        statements.extend(self.create_indexes());
        statements.extend(self.touch_trigger_statements());
        statements
    }

    /// All statements as one `;`-terminated script.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.statements()
            .into_iter()
            .map(|s| format!("{s};\n"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn compile_column(field: &FieldDef) -> SchemaResult<Column> {
    let references = match (field.field_type, &field.reference) {
        (FieldType::Reference, None) => {
            return Err(SchemaError::UnsupportedFieldType {
                field: field.name.clone(),
                type_name: "REFERENCE without a target".to_owned(),
            });
        },
        (_, reference) => reference.clone(),
    };

    let check = field.allowed.as_ref().map(|allowed| {
        let members: Vec<String> = allowed.iter().map(|a| quote_literal(a)).collect();
        format!("{} IN ({})", quote_ident(&field.name), members.join(", "))
    });

    Ok(Column {
        name: field.name.clone(),
        column_type: ColumnType::from_field_type(field.field_type),
        not_null: field.required,
        unique: field.unique,
        default: field
            .default
            .as_ref()
            .map(|d| render_default(d, field.field_type)),
        check,
        references,
    })
}

fn render_default(default: &DefaultValue, field_type: FieldType) -> String {
    let value = match default {
        DefaultValue::Now => return "CURRENT_TIMESTAMP".to_owned(),
        DefaultValue::Literal(value) => value,
    };
    match (field_type, value) {
        (FieldType::Object | FieldType::Array, json) => {
            format!("{}::jsonb", quote_literal(&json.to_string()))
        },
        (_, Value::String(text)) => quote_literal(text),
        (_, Value::Null) => "NULL".to_owned(),
        (_, other) => other.to_string(),
    }
}
