//! Schema error types.

use thiserror::Error;

/// Errors raised while building, compiling or applying a schema descriptor.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A field's type has no mapping in the compilation target.
    #[error("unsupported field type for '{field}': {type_name}")]
    UnsupportedFieldType {
        /// Field that failed to map.
        field: String,
        /// The offending type tag.
        type_name: String,
    },

    /// A field definition breaks a descriptor invariant.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two fields in one descriptor share a name.
    #[error("duplicate field '{field}' in entity '{entity}'")]
    DuplicateField {
        /// Entity name.
        entity: String,
        /// Repeated field name.
        field: String,
    },

    /// A pattern validator did not compile.
    #[error("invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        /// Field name.
        field: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// A record failed validation against the descriptor.
    #[error("validation failed for {entity}.{field}: {message}")]
    Validation {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
        /// Validator message.
        message: String,
    },

    /// A JSON or TOML descriptor definition could not be parsed.
    #[error("invalid schema definition: {0}")]
    Definition(String),
}

impl SchemaError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
