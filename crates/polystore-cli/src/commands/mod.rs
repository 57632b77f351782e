//! CLI subcommands.

pub(crate) mod config;
pub(crate) mod entities;
pub(crate) mod ping;
pub(crate) mod schema;
pub(crate) mod sync;
