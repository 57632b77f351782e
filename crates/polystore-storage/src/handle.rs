//! Process-wide storage handle.
//!
//! [`Storage`] owns at most one engine. It is created once at process start,
//! wrapped in an `Arc`, and passed to whatever needs it.

use polystore_config::DatabaseConfig;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::engine::{Engine, EngineKind, StorageEngine};
use crate::error::{StorageError, StorageResult};
use crate::factory::create_engine;

/// Lazily-initialized owner of the active storage engine.
pub struct Storage {
    config: DatabaseConfig,
    slot: RwLock<Option<Engine>>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("engine", &self.config.engine)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// A handle for `config`. Nothing connects until [`Storage::initialize`].
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            slot: RwLock::new(None),
        }
    }

    /// Database settings the handle was built with.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The configured engine kind. No I/O.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedEngineType`] for an unknown tag.
    pub fn engine_kind(&self) -> StorageResult<EngineKind> {
        EngineKind::parse(&self.config.engine)
    }

    /// Create and connect the engine on first call; later calls return the
    /// same instance.
    ///
    /// Concurrent first callers queue on the slot's write lock: one connects,
    /// the rest find the slot filled and return that engine.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedEngineType`] or
    /// [`StorageError::Connection`]. The slot stays empty on failure, so a
    /// later call tries again.
    pub async fn initialize(&self) -> StorageResult<Engine> {
        if let Some(engine) = self.slot.read().await.as_ref() {
            return Ok(engine.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(engine) = slot.as_ref() {
            debug!("storage initialized by a concurrent caller");
            return Ok(engine.clone());
        }

        let engine = create_engine(&self.config.engine, &self.config)?;
        engine.connect().await?;
        info!(engine = %engine.kind(), "storage initialized");
        *slot = Some(engine.clone());
        Ok(engine)
    }

    /// The active engine.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotInitialized`] before [`Storage::initialize`]
    /// or after [`Storage::close`].
    pub async fn get(&self) -> StorageResult<Engine> {
        self.slot
            .read()
            .await
            .clone()
            .ok_or(StorageError::NotInitialized)
    }

    /// Whether an engine is held. Returns `false` while the slot is locked
    /// for initialization.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.try_read().is_ok_and(|slot| slot.is_some())
    }

    /// Disconnect and drop the engine so a later [`Storage::initialize`]
    /// starts fresh. A no-op when nothing is held.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Disconnection`]; the engine stays held.
    pub async fn close(&self) -> StorageResult<()> {
        let mut slot = self.slot.write().await;
        let Some(engine) = slot.as_ref() else {
            return Ok(());
        };
        engine.disconnect().await?;
        info!(engine = %engine.kind(), "storage closed");
        *slot = None;
        Ok(())
    }
}
