//! Polystore configuration.
//!
//! Configuration is layered, later layers winning per field:
//!
//! 1. Embedded defaults (`defaults.toml`)
//! 2. Workspace `polystore.toml`
//! 3. Explicit file (`--config`)
//! 4. Environment variables, only for fields no file set
//!
//! `${VAR}` references inside string values are resolved after merging.
//!
//! # Environment variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DB_TYPE` | `database.engine` |
//! | `MONGODB_URI` | `database.mongodb.uri` |
//! | `POSTGRES_HOST` | `database.postgres.host` |
//! | `POSTGRES_PORT` | `database.postgres.port` |
//! | `POSTGRES_DB` | `database.postgres.database` |
//! | `POSTGRES_USER` | `database.postgres.user` |
//! | `POSTGRES_PASSWORD` | `database.postgres.password` |
//! | `POSTGRES_POOL_SIZE` | `database.postgres.pool_size` |
//! | `POSTGRES_IDLE_TIMEOUT_SECS` | `database.postgres.idle_timeout_secs` |
//! | `POLYSTORE_LOG_LEVEL` | `logging.level` |

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod env;
mod error;
mod loader;
mod merge;
mod show;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{WORKSPACE_CONFIG_FILE, load, load_file, load_with_env};
pub use merge::{ConfigLayer, FieldSources};
pub use show::ResolvedConfig;
pub use types::{Config, DatabaseConfig, LoggingSection, MongoSection, PostgresSection, redact_uri};
pub use validate::validate;
