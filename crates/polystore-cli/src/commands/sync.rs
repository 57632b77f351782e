//! `polystore sync` - create missing tables or collections.

use std::sync::Arc;

use anyhow::Result;
use polystore_config::DatabaseConfig;
use polystore_storage::{ModelFactory, Storage};
use tracing::info;

use crate::theme::Theme;

/// Ensure the schema of each entity in `entities`, or of every registered
/// entity when empty. Entities are synced in registration order so that
/// referenced tables exist first.
pub(crate) async fn sync(config: &DatabaseConfig, entities: &[String]) -> Result<()> {
    let storage = Arc::new(Storage::new(config.clone()));
    storage.initialize().await?;

    let result = sync_all(&storage, entities).await;
    storage.close().await?;
    result
}

async fn sync_all(storage: &Arc<Storage>, entities: &[String]) -> Result<()> {
    let factory = ModelFactory::with_builtins(Arc::clone(storage))?;
    let names: Vec<String> = if entities.is_empty() {
        factory.registry().names().map(str::to_owned).collect()
    } else {
        entities.to_vec()
    };

    for name in &names {
        let model = factory.create_model(name).await?;
        match model.ensure_schema().await {
            Ok(()) => {
                info!(entity = %name, "schema synced");
                println!("{}", Theme::success(model.schema().entity_name()));
            },
            Err(e) => {
                println!("{}", Theme::error(&format!("{name}: {e}")));
                return Err(e.into());
            },
        }
    }
    Ok(())
}
