//! Polystore Schema - engine-neutral entity descriptors.
//!
//! An [`EntitySchema`] is written once per entity and compiled into two
//! structurally different targets:
//!
//! - a [`DocumentSchema`] for the document engine: per-field document types,
//!   compiled pattern validators, a `$jsonSchema` validator and index specs;
//! - a [`RelationalSchema`] for the relational engine: `CREATE TABLE`,
//!   secondary indexes and the `updatedAt` refresh trigger.
//!
//! # Type mapping
//!
//! | Descriptor | Document | Relational |
//! |------------|----------|------------|
//! | `STRING` | `string` | `VARCHAR(255)` |
//! | `NUMBER` | `number` | `INTEGER` |
//! | `BOOLEAN` | `bool` | `BOOLEAN` |
//! | `DATE` | `date` | `TIMESTAMP(3)` |
//! | `OBJECT` | `object` | `JSONB` |
//! | `ARRAY` | `array` | `JSONB` |
//! | `REFERENCE` | `objectId` | `INTEGER REFERENCES <t>(id)` |
//!
//! The crate also carries record coercion and validation shared by both
//! engine models, the built-in `User` and `Repo` entities, and the
//! [`SchemaRegistry`] the model factory resolves entity names against.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod coerce;
pub mod descriptor;
pub mod document;
pub mod entities;
pub mod error;
pub mod field;
pub mod prelude;
pub mod registry;
pub mod relational;
pub mod validate;

pub use coerce::{coerce_value, format_timestamp, parse_timestamp};
pub use descriptor::{EntitySchema, EntitySchemaBuilder, FieldDefinition, SchemaDefinition};
pub use document::{DocumentField, DocumentSchema, DocumentType, IndexSpec, PatternValidator};
pub use error::{SchemaError, SchemaResult};
pub use field::{DefaultValue, FieldDef, FieldType, PatternRule};
pub use registry::SchemaRegistry;
pub use relational::{Column, ColumnType, RelationalSchema, quote_ident, quote_literal};
pub use validate::ValidationMode;

/// An entity record: field values in insertion order.
///
/// Key order is significant. The relational statement builder numbers its
/// placeholders in iteration order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Name of the creation timestamp field.
pub const CREATED_AT: &str = "createdAt";

/// Name of the modification timestamp field.
pub const UPDATED_AT: &str = "updatedAt";
