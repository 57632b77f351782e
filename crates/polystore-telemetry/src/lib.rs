//! Polystore Telemetry - logging setup.
//!
//! Library crates only emit `tracing` events; binaries call
//! [`setup_logging`] once at start-up.
//!
//! ```rust,no_run
//! use polystore_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), polystore_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("sqlx=warn");
//! setup_logging(&config)?;
//! tracing::info!(engine = "postgres", "storage ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};
