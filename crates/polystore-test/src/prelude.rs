//! Common imports for tests.

pub use crate::fixtures::*;
pub use crate::live::*;
pub use crate::logging::init_test_tracing;
