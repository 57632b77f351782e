//! Record validation against a descriptor.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::coerce::coerce_value;
use crate::descriptor::EntitySchema;
use crate::error::{SchemaError, SchemaResult};
use crate::field::FieldDef;
use crate::{Record, UPDATED_AT};

/// Which write a record is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Full record: required fields must be present.
    Create,
    /// Partial patch: only supplied fields are checked.
    Update,
}

impl EntitySchema {
    /// Fill every absent field that has a default.
    ///
    /// All `now` defaults in one call share the same instant, so
    /// `createdAt == updatedAt` on a fresh record.
    pub fn apply_defaults(&self, record: &mut Record, now: DateTime<Utc>) {
        for field in self.fields() {
            if record.contains_key(&field.name) {
                continue;
            }
            if let Some(default) = &field.default {
                record.insert(field.name.clone(), default.resolve(now));
            }
        }
    }

    /// Stamp `updatedAt` on a patch, when the entity keeps timestamps.
    pub fn touch(&self, patch: &mut Record, now: DateTime<Utc>) {
        if self.has_timestamps() {
            patch.insert(
                UPDATED_AT.to_owned(),
                Value::String(crate::coerce::format_timestamp(now)),
            );
        }
    }

    /// Coerce declared fields to their types and validate the record.
    ///
    /// Undeclared keys pass through untouched. In [`ValidationMode::Create`]
    /// every required field without a default must be present.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Validation`] naming the first offending field.
    pub fn prepare(&self, record: Record, mode: ValidationMode) -> SchemaResult<Record> {
        let mut prepared = Record::with_capacity(record.len());
        for (key, value) in record {
            let value = match self.field(&key) {
                Some(field) => self.check_value(field, value)?,
                None => value,
            };
            prepared.insert(key, value);
        }

        if mode == ValidationMode::Create {
            for field in self.fields() {
                if field.required && field.default.is_none() && !prepared.contains_key(&field.name)
                {
                    return Err(self.violation(field, "is required"));
                }
            }
        }

        Ok(prepared)
    }

    fn check_value(&self, field: &FieldDef, value: Value) -> SchemaResult<Value> {
        let value = coerce_value(field, value).map_err(|message| self.violation(field, message))?;

        let Some(text) = value.as_str() else {
            if value.is_null() && field.required {
                return Err(self.violation(field, "is required"));
            }
            return Ok(value);
        };

        if let Some(allowed) = &field.allowed
            && !allowed.iter().any(|a| a == text)
        {
            return Err(self.violation(
                field,
                format!("'{text}' is not one of [{}]", allowed.join(", ")),
            ));
        }
        if let Some(rule) = &field.pattern
            && !rule.is_match(text)
        {
            return Err(self.violation(field, rule.message()));
        }
        Ok(value)
    }

    fn violation(&self, field: &FieldDef, message: impl Into<String>) -> SchemaError {
        SchemaError::Validation {
            entity: self.entity_name().to_owned(),
            field: field.name.clone(),
            message: message.into(),
        }
    }
}
