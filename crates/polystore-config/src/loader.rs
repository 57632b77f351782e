//! Layered configuration loading.
//!
//! 1. Parse the embedded `defaults.toml` → base
//! 2. Merge `{workspace}/polystore.toml`, if present
//! 3. Merge the explicit `--config` file, if given (must exist)
//! 4. Apply env var fallbacks for fields no file set
//! 5. Resolve `${VAR}` references
//! 6. Deserialize and validate

use std::path::Path;

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars, resolve_env_references};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// File name looked up in the workspace directory.
pub const WORKSPACE_CONFIG_FILE: &str = "polystore.toml";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load configuration from defaults, files and the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable or malformed, or if the
/// merged configuration fails validation.
pub fn load(explicit: Option<&Path>, workspace_root: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_with_env(explicit, workspace_root, &collect_env_vars())
}

/// [`load`] with an explicit environment, for tests and embedding.
///
/// # Errors
///
/// Same as [`load`].
pub fn load_with_env<S: ::std::hash::BuildHasher>(
    explicit: Option<&Path>,
    workspace_root: Option<&Path>,
    env_vars: &std::collections::HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    if let Some(root) = workspace_root {
        let path = root.join(WORKSPACE_CONFIG_FILE);
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::Workspace, &mut field_sources);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), "loaded workspace config");
        }
    }

    if let Some(path) = explicit {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge_tracking(&mut merged, &overlay, "", &ConfigLayer::File, &mut field_sources);
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded config file");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    resolve_env_references(&mut merged, env_vars);
    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a single file on top of the built-in defaults (no env, no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = overlay
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse `path`, returning `None` if it doesn't exist.
///
/// Uses a single read to avoid races between stat and read.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_defaults_only() {
        let resolved = load_with_env(None, None, &no_env()).unwrap();
        assert_eq!(resolved.config.database.engine, "postgres");
        assert_eq!(resolved.config.database.postgres.port, 5432);
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(
            resolved.field_sources.get("database.engine"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn test_env_fallback_applies() {
        let env: HashMap<String, String> = [
            ("DB_TYPE".to_owned(), "mongodb".to_owned()),
            ("MONGODB_URI".to_owned(), "mongodb://db:27017/app".to_owned()),
        ]
        .into();
        let resolved = load_with_env(None, None, &env).unwrap();
        assert_eq!(resolved.config.database.engine, "mongodb");
        assert_eq!(resolved.config.database.mongodb.uri, "mongodb://db:27017/app");
    }

    #[test]
    fn test_explicit_file_beats_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[database]\nengine = \"mongodb\"").unwrap();

        let env: HashMap<String, String> =
            [("DB_TYPE".to_owned(), "postgres".to_owned())].into();
        let resolved = load_with_env(Some(&path), None, &env).unwrap();
        assert_eq!(resolved.config.database.engine, "mongodb");
        assert_eq!(
            resolved.field_sources.get("database.engine"),
            Some(&ConfigLayer::File)
        );
        assert_eq!(resolved.loaded_files.len(), 1);
    }

    #[test]
    fn test_workspace_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_with_env(None, Some(dir.path()), &no_env()).unwrap();
        assert!(resolved.loaded_files.is_empty());

        std::fs::write(
            dir.path().join(WORKSPACE_CONFIG_FILE),
            "[database.postgres]\nhost = \"pg.internal\"\n",
        )
        .unwrap();
        let resolved = load_with_env(None, Some(dir.path()), &no_env()).unwrap();
        assert_eq!(resolved.config.database.postgres.host, "pg.internal");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_with_env(Some(&dir.path().join("nope.toml")), None, &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_references_resolve_after_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "[database.postgres]\npassword = \"${PGPASS}\"\n").unwrap();
        let env: HashMap<String, String> = [("PGPASS".to_owned(), "hunter2".to_owned())].into();
        let resolved = load_with_env(Some(&path), None, &env).unwrap();
        assert_eq!(resolved.config.database.postgres.password, "hunter2");
    }

    #[test]
    fn test_invalid_merged_config_fails_validation() {
        let env: HashMap<String, String> = [("DB_TYPE".to_owned(), "sqlite".to_owned())].into();
        let err = load_with_env(None, None, &env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field, .. } if field == "database.engine"));
    }

    #[test]
    fn test_load_file_uses_struct_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let config = load_file(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.database, crate::DatabaseConfig::default());
    }
}
