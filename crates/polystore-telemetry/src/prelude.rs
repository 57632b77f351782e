//! Common imports for logging setup.
//!
//! ```
//! use polystore_telemetry::prelude::*;
//! ```

pub use crate::{
    FileRotation, LogConfig, LogFormat, LogTarget, TelemetryError, TelemetryResult,
    setup_default_logging, setup_logging,
};
