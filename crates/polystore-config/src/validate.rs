//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Engine tags the storage layer knows how to build.
const ENGINE_TAGS: &[&str] = &["mongodb", "mongo", "postgres", "postgresql"];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_database(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_database(config: &Config) -> ConfigResult<()> {
    let db = &config.database;
    let engine = db.engine.to_ascii_lowercase();
    if !ENGINE_TAGS.contains(&engine.as_str()) {
        return Err(ConfigError::invalid(
            "database.engine",
            format!(
                "unsupported engine '{}'; expected one of: mongodb, postgres",
                db.engine
            ),
        ));
    }

    // Only the selected engine's section has to be usable.
    if engine.starts_with("mongo") {
        let uri = db.mongodb.uri.trim();
        if !(uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")) {
            return Err(ConfigError::invalid(
                "database.mongodb.uri",
                "must start with mongodb:// or mongodb+srv://",
            ));
        }
        if db.mongodb.max_pool_size == Some(0) {
            return Err(ConfigError::invalid(
                "database.mongodb.max_pool_size",
                "must be at least 1",
            ));
        }
    } else {
        let pg = &db.postgres;
        for (field, value) in [
            ("database.postgres.host", &pg.host),
            ("database.postgres.database", &pg.database),
            ("database.postgres.user", &pg.user),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        if pg.port == 0 {
            return Err(ConfigError::invalid("database.postgres.port", "must not be 0"));
        }
        if pg.pool_size == 0 {
            return Err(ConfigError::invalid(
                "database.postgres.pool_size",
                "must be at least 1",
            ));
        }
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::invalid(
            "logging.level",
            format!("unknown level '{}'", config.logging.level),
        ));
    }
    let format = config.logging.format.to_ascii_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                config.logging.format
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_unknown_engine() {
        let mut config = Config::default();
        config.database.engine = "sqlite".to_owned();
        assert_eq!(field_of(validate(&config).unwrap_err()), "database.engine");
    }

    #[test]
    fn test_engine_tag_is_case_insensitive() {
        let mut config = Config::default();
        config.database.engine = "MongoDB".to_owned();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_mongo_uri_scheme() {
        let mut config = Config::default();
        config.database.engine = "mongodb".to_owned();
        config.database.mongodb.uri = "http://localhost".to_owned();
        assert_eq!(field_of(validate(&config).unwrap_err()), "database.mongodb.uri");
    }

    #[test]
    fn test_unselected_engine_is_not_checked() {
        let mut config = Config::default();
        config.database.mongodb.uri = String::new();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_postgres_zero_pool() {
        let mut config = Config::default();
        config.database.postgres.pool_size = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "database.postgres.pool_size"
        );
    }

    #[test]
    fn test_empty_host() {
        let mut config = Config::default();
        config.database.postgres.host = " ".to_owned();
        assert_eq!(field_of(validate(&config).unwrap_err()), "database.postgres.host");
    }

    #[test]
    fn test_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config).unwrap_err()), "logging.format");
    }
}
