//! Configuration types.
//!
//! Every section implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a partially-specified TOML file deserializes cleanly.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Placeholder shown instead of secrets.
const REDACTED: &str = "***";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage engine selection and connection settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingSection,
}

/// Storage engine selection and connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Engine tag: `mongodb` or `postgres`.
    pub engine: String,
    /// Document engine settings.
    pub mongodb: MongoSection,
    /// Relational engine settings.
    pub postgres: PostgresSection,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "postgres".to_owned(),
            mongodb: MongoSection::default(),
            postgres: PostgresSection::default(),
        }
    }
}

impl DatabaseConfig {
    /// Same settings with a different engine tag.
    #[must_use]
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }
}

/// `MongoDB` connection settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoSection {
    /// Connection string; the database name is taken from its path.
    #[serde(serialize_with = "serialize_redacted_uri")]
    pub uri: String,
    /// Maximum connections in the driver pool.
    pub max_pool_size: Option<u32>,
    /// How long to wait for a usable server before failing an operation.
    pub server_selection_timeout_ms: Option<u64>,
    /// Application name reported to the server.
    pub app_name: Option<String>,
}

impl Default for MongoSection {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017/polystore".to_owned(),
            max_pool_size: Some(10),
            server_selection_timeout_ms: Some(30_000),
            app_name: Some("polystore".to_owned()),
        }
    }
}

impl fmt::Debug for MongoSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoSection")
            .field("uri", &redact_uri(&self.uri))
            .field("max_pool_size", &self.max_pool_size)
            .field(
                "server_selection_timeout_ms",
                &self.server_selection_timeout_ms,
            )
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// `PostgreSQL` connection settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSection {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login role.
    pub user: String,
    /// Login password. Never serialized.
    #[serde(skip_serializing)]
    pub password: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Seconds an idle pooled connection is kept.
    pub idle_timeout_secs: u64,
    /// Seconds to wait for a connection before failing.
    pub connect_timeout_secs: u64,
}

impl Default for PostgresSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5432,
            database: "polystore".to_owned(),
            user: "postgres".to_owned(),
            password: "postgres".to_owned(),
            pool_size: 10,
            idle_timeout_secs: 10,
            connect_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for PostgresSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .field("pool_size", &self.pool_size)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default level: `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// Output format: `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Extra per-target filter directives, e.g. `sqlx=warn`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

/// Replace the user-info part of a connection URI with `***`.
///
/// ```
/// use polystore_config::redact_uri;
///
/// assert_eq!(
///     redact_uri("mongodb://admin:hunter2@db:27017/app"),
///     "mongodb://***@db:27017/app"
/// );
/// assert_eq!(redact_uri("mongodb://db:27017/app"), "mongodb://db:27017/app");
/// ```
#[must_use]
pub fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_owned();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let authority = rest.get(..authority_end).unwrap_or(rest);
    match authority.rfind('@') {
        Some(at) => {
            let tail = rest.get(at..).unwrap_or_default();
            format!("{scheme}://{REDACTED}{tail}")
        },
        None => uri.to_owned(),
    }
}

fn serialize_redacted_uri<S: Serializer>(uri: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&redact_uri(uri))
}
