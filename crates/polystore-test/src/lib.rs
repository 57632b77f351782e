//! Polystore Test - Shared test utilities.
//!
//! Fixtures for descriptors, records and database configuration, plus
//! environment-gated helpers for suites that need a live database.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! polystore-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use polystore_test::prelude::*;
//!
//! #[tokio::test]
//! async fn test_round_trip() {
//!     let Some(config) = live_postgres_config() else {
//!         return;
//!     };
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod live;
pub mod logging;

pub use fixtures::*;
pub use live::*;
pub use logging::*;
