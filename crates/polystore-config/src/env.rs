//! Environment variable fallback and `${VAR}` reference resolution.
//!
//! Env vars are **fallback**, not override: they only apply to fields that no
//! config file set.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// Supported environment variables.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "DB_TYPE",
        field_path: "database.engine",
    },
    EnvMapping {
        var_name: "MONGODB_URI",
        field_path: "database.mongodb.uri",
    },
    EnvMapping {
        var_name: "POSTGRES_HOST",
        field_path: "database.postgres.host",
    },
    EnvMapping {
        var_name: "POSTGRES_PORT",
        field_path: "database.postgres.port",
    },
    EnvMapping {
        var_name: "POSTGRES_DB",
        field_path: "database.postgres.database",
    },
    EnvMapping {
        var_name: "POSTGRES_USER",
        field_path: "database.postgres.user",
    },
    EnvMapping {
        var_name: "POSTGRES_PASSWORD",
        field_path: "database.postgres.password",
    },
    EnvMapping {
        var_name: "POSTGRES_POOL_SIZE",
        field_path: "database.postgres.pool_size",
    },
    EnvMapping {
        var_name: "POSTGRES_IDLE_TIMEOUT_SECS",
        field_path: "database.postgres.idle_timeout_secs",
    },
    EnvMapping {
        var_name: "POLYSTORE_LOG_LEVEL",
        field_path: "logging.level",
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
pub(crate) fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let set_by_file = sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );
            set_field_from_string(merged, mapping.field_path, val);
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Resolve `${VAR}` references within string values in the config tree.
///
/// References that don't resolve are left as-is.
pub(crate) fn resolve_env_references<S: ::std::hash::BuildHasher>(
    val: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) {
    match val {
        toml::Value::String(s) => {
            *s = resolve_string_refs(s, env_vars);
        },
        toml::Value::Table(table) => {
            for (_, child) in table.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        toml::Value::Array(arr) => {
            for child in arr.iter_mut() {
                resolve_env_references(child, env_vars);
            }
        },
        _ => {},
    }
}

fn resolve_string_refs<S: ::std::hash::BuildHasher>(
    input: &str,
    env_vars: &HashMap<String, String, S>,
) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut var_name = String::new();
        let mut closed = false;
        for ch in chars.by_ref() {
            if ch == '}' {
                closed = true;
                break;
            }
            var_name.push(ch);
        }

        match env_vars.get(&var_name) {
            Some(val) if closed && !var_name.is_empty() => result.push_str(val),
            _ if closed => {
                debug!(var = var_name, "unresolved env var reference in config");
                let _ = write!(result, "${{{var_name}}}");
            },
            _ => {
                result.push_str("${");
                result.push_str(&var_name);
            },
        }
    }

    result
}

/// Set a field in the TOML tree from a string value, creating intermediate
/// tables as needed.
fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let toml_val = coerce_to_toml_value(path, val);
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), toml_val);
    }
}

/// Coerce a string env var value to the TOML type of the target field.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if matches!(
        path,
        "database.postgres.port"
            | "database.postgres.pool_size"
            | "database.postgres.idle_timeout_secs"
            | "database.postgres.connect_timeout_secs"
    ) && let Ok(i) = val.trim().parse::<i64>()
    {
        return toml::Value::Integer(i);
    }

    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub(crate) fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn defaults() -> (toml::Value, FieldSources) {
        let val: toml::Value =
            toml::from_str("[database]\nengine = \"postgres\"\n[database.postgres]\nport = 5432")
                .unwrap();
        let mut sources = FieldSources::new();
        crate::merge::record_leaves(&val, "", &ConfigLayer::Defaults, &mut sources);
        (val, sources)
    }

    #[test]
    fn test_env_overrides_defaults() {
        let (mut val, mut sources) = defaults();
        let env = make_env(&[("DB_TYPE", "mongodb"), ("POSTGRES_PORT", "6543")]);
        let applied = apply_env_fallbacks(&mut val, &mut sources, &env);
        assert_eq!(applied, 2);
        assert_eq!(val["database"]["engine"].as_str(), Some("mongodb"));
        assert_eq!(val["database"]["postgres"]["port"].as_integer(), Some(6543));
        assert_eq!(sources.get("database.engine"), Some(&ConfigLayer::Environment));
    }

    #[test]
    fn test_env_does_not_override_files() {
        let (mut val, mut sources) = defaults();
        sources.insert("database.engine".to_owned(), ConfigLayer::File);
        let env = make_env(&[("DB_TYPE", "mongodb")]);
        assert_eq!(apply_env_fallbacks(&mut val, &mut sources, &env), 0);
        assert_eq!(val["database"]["engine"].as_str(), Some("postgres"));
    }

    #[test]
    fn test_env_creates_missing_tables() {
        let mut val = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = make_env(&[("MONGODB_URI", "mongodb://db:27017/x")]);
        apply_env_fallbacks(&mut val, &mut sources, &env);
        assert_eq!(
            val["database"]["mongodb"]["uri"].as_str(),
            Some("mongodb://db:27017/x")
        );
    }

    #[test]
    fn test_non_numeric_port_stays_string() {
        assert_eq!(
            coerce_to_toml_value("database.postgres.port", "abc"),
            toml::Value::String("abc".to_owned())
        );
    }

    #[test]
    fn test_resolve_references() {
        let mut val: toml::Value =
            toml::from_str("uri = \"mongodb://${MONGO_HOST}:27017/${MISSING}\"").unwrap();
        let env = make_env(&[("MONGO_HOST", "db")]);
        resolve_env_references(&mut val, &env);
        assert_eq!(val["uri"].as_str(), Some("mongodb://db:27017/${MISSING}"));
    }

    #[test]
    fn test_malformed_reference_left_alone() {
        let env = make_env(&[]);
        assert_eq!(resolve_string_refs("pa${ss", &env), "pa${ss");
    }
}
