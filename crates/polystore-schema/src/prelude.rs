//! Common imports for working with entity schemas.
//!
//! ```
//! use polystore_schema::prelude::*;
//! ```

pub use crate::{
    DefaultValue, EntitySchema, FieldDef, FieldType, PatternRule, Record, SchemaError,
    SchemaRegistry, SchemaResult, ValidationMode,
};
