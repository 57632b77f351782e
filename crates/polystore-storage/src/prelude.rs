//! Common imports for storage consumers.
//!
//! ```
//! use polystore_storage::prelude::*;
//! ```

pub use crate::{
    ConnectionState, DeleteOutcome, Engine, EngineKind, EntityModel, ModelFactory, Record,
    Storage, StorageEngine, StorageError, StorageResult, Transaction, UpdateOutcome,
};
