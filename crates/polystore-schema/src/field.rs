//! Field definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::format_timestamp;
use crate::error::{SchemaError, SchemaResult};

/// Engine-neutral field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// Text.
    String,
    /// Numeric value.
    Number,
    /// True or false.
    Boolean,
    /// Point in time.
    Date,
    /// Nested structured value.
    Object,
    /// Ordered list.
    Array,
    /// Identifier of a row or document in another table or collection.
    Reference,
}

impl FieldType {
    /// Every field type, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::Date,
        Self::Object,
        Self::Array,
        Self::Reference,
    ];

    /// The canonical upper-case tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Object => "OBJECT",
            Self::Array => "ARRAY",
            Self::Reference => "REFERENCE",
        }
    }

    /// Parse a type tag for `field`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnsupportedFieldType`] for unknown tags.
    pub fn parse_for(field: &str, tag: &str) -> SchemaResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(tag.trim()))
            .ok_or_else(|| SchemaError::UnsupportedFieldType {
                field: field.to_owned(),
                type_name: tag.to_owned(),
            })
    }

    /// Whether a JSON literal is an acceptable stored value for this type.
    #[must_use]
    pub fn accepts_literal(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Date => value
                .as_str()
                .is_some_and(|s| crate::coerce::parse_timestamp(s).is_some()),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Reference => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_for("<unnamed>", s)
    }
}

/// Default applied to a field that was not supplied on create.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A fixed literal.
    Literal(Value),
    /// The current time, evaluated once per create.
    Now,
}

impl DefaultValue {
    /// Materialize the default as a record value.
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Now => Value::String(format_timestamp(now)),
        }
    }
}

/// A compiled pattern constraint with its failure message.
#[derive(Debug, Clone)]
pub struct PatternRule {
    regex: Regex,
    message: String,
}

impl PatternRule {
    /// Compile `pattern`.
    ///
    /// # Errors
    ///
    /// Returns the regex error when the pattern does not compile.
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            message: message.into(),
        })
    }

    /// Source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Message reported when a value does not match.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether `value` satisfies the pattern.
    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for PatternRule {
    fn eq(&self, other: &Self) -> bool {
        self.pattern() == other.pattern() && self.message == other.message
    }
}

/// One field of an entity descriptor.
///
/// Built with chained modifiers:
///
/// ```
/// use polystore_schema::{DefaultValue, FieldDef, FieldType};
/// use serde_json::json;
///
/// let active = FieldDef::new("isActive", FieldType::Boolean)
///     .with_default(DefaultValue::Literal(json!(true)));
/// assert!(!active.required);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name, used verbatim as document key and column name.
    pub name: String,
    /// Field type.
    pub field_type: FieldType,
    /// Must be present and non-null on create.
    pub required: bool,
    /// Values must be unique across the entity.
    pub unique: bool,
    /// Lookup field: gets a secondary index on both targets.
    pub index: bool,
    /// Default applied on create when absent.
    pub default: Option<DefaultValue>,
    /// Closed set of allowed values (STRING only).
    pub allowed: Option<Vec<String>>,
    /// Pattern constraint (STRING only).
    pub pattern: Option<PatternRule>,
    /// Referenced table or collection (REFERENCE only).
    pub reference: Option<String>,
}

impl FieldDef {
    /// A plain optional field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            index: false,
            default: None,
            allowed: None,
            pattern: None,
            reference: None,
        }
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark the field as a lookup field.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    /// Set the create-time default.
    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Restrict values to `allowed`.
    #[must_use]
    pub fn with_enum<I, S>(mut self, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(allowed.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a pattern validator.
    #[must_use]
    pub fn with_pattern(mut self, rule: PatternRule) -> Self {
        self.pattern = Some(rule);
        self
    }

    /// Point a REFERENCE field at `target`.
    #[must_use]
    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.reference = Some(target.into());
        self
    }

    /// Check the per-field invariants.
    pub(crate) fn check(&self) -> SchemaResult<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(SchemaError::invalid(name, "field name is empty"));
        }
        if matches!(name, "id" | "_id") {
            return Err(SchemaError::invalid(
                name,
                "engine identity fields are managed by the engine",
            ));
        }

        if let Some(allowed) = &self.allowed {
            if self.field_type != FieldType::String {
                return Err(SchemaError::invalid(
                    name,
                    format!("enum is only valid on STRING, not {}", self.field_type),
                ));
            }
            if allowed.is_empty() {
                return Err(SchemaError::invalid(name, "enum has no members"));
            }
        }

        if self.pattern.is_some() && self.field_type != FieldType::String {
            return Err(SchemaError::invalid(
                name,
                format!("pattern validators are only valid on STRING, not {}", self.field_type),
            ));
        }

        if self.reference.is_some() && self.field_type != FieldType::Reference {
            return Err(SchemaError::invalid(
                name,
                format!("reference target on non-REFERENCE field of type {}", self.field_type),
            ));
        }

        match &self.default {
            None => {},
            Some(DefaultValue::Now) => {
                if self.field_type != FieldType::Date {
                    return Err(SchemaError::invalid(
                        name,
                        format!("'now' default is only valid on DATE, not {}", self.field_type),
                    ));
                }
            },
            Some(DefaultValue::Literal(value)) => {
                if !self.field_type.accepts_literal(value) {
                    return Err(SchemaError::invalid(
                        name,
                        format!("default {value} does not match type {}", self.field_type),
                    ));
                }
                if let (Some(allowed), Some(text)) = (&self.allowed, value.as_str())
                    && !allowed.iter().any(|a| a == text)
                {
                    return Err(SchemaError::invalid(
                        name,
                        format!("default '{text}' is not an enum member"),
                    ));
                }
                if let (Some(rule), Some(text)) = (&self.pattern, value.as_str())
                    && !rule.is_match(text)
                {
                    return Err(SchemaError::invalid(
                        name,
                        format!("default '{text}' does not match its own pattern"),
                    ));
                }
            },
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_type_tags_case_insensitively() {
        assert_eq!(FieldType::parse_for("a", "string").unwrap(), FieldType::String);
        assert_eq!(FieldType::parse_for("a", " Date ").unwrap(), FieldType::Date);
        assert_eq!("REFERENCE".parse::<FieldType>().unwrap(), FieldType::Reference);
    }

    #[test]
    fn test_unknown_type_tag_names_the_field() {
        let err = FieldType::parse_for("avatar", "BLOB").unwrap_err();
        match err {
            SchemaError::UnsupportedFieldType { field, type_name } => {
                assert_eq!(field, "avatar");
                assert_eq!(type_name, "BLOB");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_enum_only_on_strings() {
        let field = FieldDef::new("age", FieldType::Number).with_enum(["1", "2"]);
        assert!(matches!(field.check(), Err(SchemaError::InvalidField { .. })));
    }

    #[test]
    fn test_default_must_match_type() {
        let field = FieldDef::new("isActive", FieldType::Boolean)
            .with_default(DefaultValue::Literal(json!("yes")));
        assert!(field.check().is_err());

        let field = FieldDef::new("isActive", FieldType::Boolean)
            .with_default(DefaultValue::Literal(json!(true)));
        assert!(field.check().is_ok());
    }

    #[test]
    fn test_enum_default_must_be_member() {
        let field = FieldDef::new("origin", FieldType::String)
            .with_enum(["Github", "Gitlab"])
            .with_default(DefaultValue::Literal(json!("Bitbucket")));
        assert!(field.check().is_err());
    }

    #[test]
    fn test_now_only_on_dates() {
        let field = FieldDef::new("name", FieldType::String).with_default(DefaultValue::Now);
        assert!(field.check().is_err());
        let field = FieldDef::new("createdAt", FieldType::Date).with_default(DefaultValue::Now);
        assert!(field.check().is_ok());
    }

    #[test]
    fn test_reference_target_only_on_references() {
        let field = FieldDef::new("owner", FieldType::String).references("users");
        assert!(field.check().is_err());
    }

    #[test]
    fn test_identity_names_are_reserved() {
        assert!(FieldDef::new("id", FieldType::Number).check().is_err());
        assert!(FieldDef::new("_id", FieldType::String).check().is_err());
    }

    #[test]
    fn test_pattern_rule_matches() {
        let rule = PatternRule::new(r"^\d+$", "digits only").unwrap();
        assert!(rule.is_match("123"));
        assert!(!rule.is_match("12a"));
        assert_eq!(rule.message(), "digits only");
    }
}
