//! Helpers for suites that run against a real database.
//!
//! Live suites are skipped unless the matching variable is set:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `POLYSTORE_TEST_POSTGRES_HOST` | enables `PostgreSQL` suites |
//! | `POLYSTORE_TEST_POSTGRES_PORT` | port (default 5432) |
//! | `POLYSTORE_TEST_POSTGRES_DB` | database (default `polystore_test`) |
//! | `POLYSTORE_TEST_POSTGRES_USER` | role (default `postgres`) |
//! | `POLYSTORE_TEST_POSTGRES_PASSWORD` | password (default `postgres`) |
//! | `POLYSTORE_TEST_MONGODB_URI` | enables `MongoDB` suites |
//! | `POLYSTORE_TEST_MONGODB_TRANSACTIONS` | enables `MongoDB` transaction suites (needs a replica set) |

use std::sync::atomic::{AtomicU32, Ordering};

use polystore_config::DatabaseConfig;

use crate::fixtures::test_database_config;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Live `PostgreSQL` settings, or `None` when the suite should be skipped.
#[must_use]
pub fn live_postgres_config() -> Option<DatabaseConfig> {
    let host = env("POLYSTORE_TEST_POSTGRES_HOST")?;
    let mut config = test_database_config("postgres");
    config.postgres.host = host;
    if let Some(port) = env("POLYSTORE_TEST_POSTGRES_PORT").and_then(|p| p.parse().ok()) {
        config.postgres.port = port;
    }
    config.postgres.database =
        env("POLYSTORE_TEST_POSTGRES_DB").unwrap_or_else(|| "polystore_test".to_owned());
    if let Some(user) = env("POLYSTORE_TEST_POSTGRES_USER") {
        config.postgres.user = user;
    }
    if let Some(password) = env("POLYSTORE_TEST_POSTGRES_PASSWORD") {
        config.postgres.password = password;
    }
    config.postgres.connect_timeout_secs = 5;
    Some(config)
}

/// Live `MongoDB` settings, or `None` when the suite should be skipped.
#[must_use]
pub fn live_mongo_config() -> Option<DatabaseConfig> {
    let uri = env("POLYSTORE_TEST_MONGODB_URI")?;
    let mut config = test_database_config("mongodb");
    config.mongodb.uri = uri;
    config.mongodb.server_selection_timeout_ms = Some(5_000);
    Some(config)
}

/// Whether the live `MongoDB` deployment supports transactions.
#[must_use]
pub fn live_mongo_transactions() -> bool {
    env("POLYSTORE_TEST_MONGODB_TRANSACTIONS").is_some()
}

/// A table or collection name no other test in this run will use.
///
/// Lower-case, so it is a bare SQL identifier.
#[must_use]
pub fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let stamp = chrono::Utc::now().timestamp_micros();
    format!("{prefix}_{}_{stamp}_{n}", std::process::id()).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_differ() {
        let a = unique_name("users");
        let b = unique_name("users");
        assert_ne!(a, b);
        assert!(a.starts_with("users_"));
    }
}
