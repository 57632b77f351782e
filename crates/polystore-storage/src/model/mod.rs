//! Entity models.
//!
//! An [`EntityModel`] binds one [`EntitySchema`] to the active engine and
//! exposes the same CRUD surface whichever engine that is. Models hold no
//! per-call state and are shared as `Arc<dyn EntityModel>`.
//!
//! Every write and read also has a `*_in` form taking the [`Transaction`]
//! handed out by [`Engine::transaction`](crate::Engine::transaction), so a
//! multi-step unit of work is written once for both engines.

pub mod factory;
pub mod mongo;
pub mod postgres;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use polystore_schema::{EntitySchema, Record};

use crate::engine::Transaction;
use crate::error::{StorageError, StorageResult};

/// Result of [`EntityModel::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Records matched by the filter.
    pub matched: u64,
    /// Records changed.
    pub modified: u64,
    /// Updated records, where the engine returns them.
    pub records: Vec<Record>,
}

/// Result of [`EntityModel::delete`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    /// Records removed.
    pub deleted: u64,
    /// Removed records, where the engine returns them.
    pub records: Vec<Record>,
}

/// Uniform CRUD over one entity.
///
/// Filters are equality maps. An empty filter matches every record, so an
/// empty-filter `update` or `delete` touches the whole table or collection.
#[async_trait]
pub trait EntityModel: Send + Sync + std::fmt::Debug {
    /// Descriptor this model is bound to.
    fn schema(&self) -> &Arc<EntitySchema>;

    /// Insert `data` and return the stored record, identity and timestamps
    /// included.
    async fn create(&self, data: Record) -> StorageResult<Record>;

    /// All records matching `filter`.
    async fn find(&self, filter: Record) -> StorageResult<Vec<Record>>;

    /// The first record matching `filter`, if any.
    async fn find_one(&self, filter: Record) -> StorageResult<Option<Record>>;

    /// Apply `patch` to every record matching `filter`, refreshing
    /// `updatedAt`.
    async fn update(&self, filter: Record, patch: Record) -> StorageResult<UpdateOutcome>;

    /// Remove every record matching `filter`.
    async fn delete(&self, filter: Record) -> StorageResult<DeleteOutcome>;

    /// [`EntityModel::create`] inside `tx`.
    async fn create_in(&self, tx: &mut Transaction, data: Record) -> StorageResult<Record>;

    /// [`EntityModel::find`] inside `tx`.
    async fn find_in(&self, tx: &mut Transaction, filter: Record) -> StorageResult<Vec<Record>>;

    /// [`EntityModel::find_one`] inside `tx`.
    async fn find_one_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
    ) -> StorageResult<Option<Record>>;

    /// [`EntityModel::update`] inside `tx`.
    async fn update_in(
        &self,
        tx: &mut Transaction,
        filter: Record,
        patch: Record,
    ) -> StorageResult<UpdateOutcome>;

    /// [`EntityModel::delete`] inside `tx`.
    async fn delete_in(&self, tx: &mut Transaction, filter: Record) -> StorageResult<DeleteOutcome>;

    /// Create the backing table or collection and its indexes if absent.
    async fn ensure_schema(&self) -> StorageResult<()>;

    /// Like [`EntityModel::find_one`], but a miss is
    /// [`StorageError::NotFound`].
    async fn find_required(&self, filter: Record) -> StorageResult<Record> {
        self.find_one(filter)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: self.schema().entity_name().to_owned(),
            })
    }
}
