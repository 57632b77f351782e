//! Dynamic query builder for the relational engine.
//!
//! Turns filter and patch maps into SQL with `$n` placeholders. Only
//! identifiers reach the SQL text, quoted where needed; every value travels
//! in the parallel `values` vector. `columns[i]` names the column `values[i]`
//! is compared with or assigned to, so callers can type each parameter.
//!
//! Keys are not checked against any descriptor here. An empty filter yields
//! no `WHERE`, which makes `update` and `delete` apply to the whole table.

use polystore_schema::{Record, quote_ident};
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// A `WHERE` or `SET` fragment with its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clause {
    /// SQL text without the leading keyword. Empty when there are no keys.
    pub sql: String,
    /// Column per parameter.
    pub columns: Vec<String>,
    /// Parameters in placeholder order.
    pub values: Vec<Value>,
}

impl Clause {
    fn build(map: &Record, start: usize, separator: &str) -> Self {
        let mut sql = String::new();
        let mut columns = Vec::with_capacity(map.len());
        let mut values = Vec::with_capacity(map.len());
        let mut index = start;
        for (key, value) in map {
            if !columns.is_empty() {
                sql.push_str(separator);
            }
            sql.push_str(&format!("{} = ${index}", quote_ident(key)));
            index = index.saturating_add(1);
            columns.push(key.clone());
            values.push(value.clone());
        }
        Self {
            sql,
            columns,
            values,
        }
    }

    /// `a = $start AND b = $start+1 ...` in `filter` order.
    #[must_use]
    pub fn where_clause(filter: &Record, start: usize) -> Self {
        Self::build(filter, start, " AND ")
    }

    /// `a = $start, b = $start+1 ...` in `patch` order.
    #[must_use]
    pub fn set_clause(patch: &Record, start: usize) -> Self {
        Self::build(patch, start, ", ")
    }

    /// Whether the clause has no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// ` WHERE <sql>`, or nothing for an empty clause.
    fn as_where(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// A complete statement ready for binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Column per parameter.
    pub columns: Vec<String>,
    /// Parameters in placeholder order.
    pub values: Vec<Value>,
}

impl Statement {
    /// `INSERT INTO t (a, b) VALUES ($1, $2) RETURNING *`, naming exactly the
    /// keys of `data` in order. An empty record inserts a row of defaults.
    #[must_use]
    pub fn insert(table: &str, data: &Record) -> Self {
        let table = quote_ident(table);
        if data.is_empty() {
            return Self {
                sql: format!("INSERT INTO {table} DEFAULT VALUES RETURNING *"),
                ..Self::default()
            };
        }
        let names: Vec<_> = data.keys().map(|k| quote_ident(k)).collect();
        let placeholders: Vec<_> = (1..=data.len()).map(|i| format!("${i}")).collect();
        Self {
            sql: format!(
                "INSERT INTO {table} ({}) VALUES ({}) RETURNING *",
                names.join(", "),
                placeholders.join(", ")
            ),
            columns: data.keys().cloned().collect(),
            values: data.values().cloned().collect(),
        }
    }

    /// `SELECT * FROM t [WHERE ..] [LIMIT n]`.
    #[must_use]
    pub fn select(table: &str, filter: &Record, limit: Option<u32>) -> Self {
        let clause = Clause::where_clause(filter, 1);
        let mut sql = format!("SELECT * FROM {}{}", quote_ident(table), clause.as_where());
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Self {
            sql,
            columns: clause.columns,
            values: clause.values,
        }
    }

    /// `UPDATE t SET .. [WHERE ..] RETURNING *`.
    ///
    /// `SET` takes placeholders `1..=m` and `WHERE` continues at `m + 1`;
    /// values are the patch values followed by the filter values.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EmptyUpdate`] when `patch` is empty.
    pub fn update(table: &str, filter: &Record, patch: &Record) -> StorageResult<Self> {
        if patch.is_empty() {
            return Err(StorageError::EmptyUpdate {
                entity: table.to_owned(),
            });
        }
        let set = Clause::set_clause(patch, 1);
        let filter = Clause::where_clause(filter, patch.len().saturating_add(1));
        let sql = format!(
            "UPDATE {} SET {}{} RETURNING *",
            quote_ident(table),
            set.sql,
            filter.as_where()
        );
        let mut columns = set.columns;
        columns.extend(filter.columns);
        let mut values = set.values;
        values.extend(filter.values);
        Ok(Self {
            sql,
            columns,
            values,
        })
    }

    /// `DELETE FROM t [WHERE ..] RETURNING *`.
    #[must_use]
    pub fn delete(table: &str, filter: &Record) -> Self {
        let clause = Clause::where_clause(filter, 1);
        Self {
            sql: format!(
                "DELETE FROM {}{} RETURNING *",
                quote_ident(table),
                clause.as_where()
            ),
            columns: clause.columns,
            values: clause.values,
        }
    }
}
