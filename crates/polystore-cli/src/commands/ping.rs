//! `polystore ping` - check that the configured engine is reachable.

use anyhow::Result;
use polystore_config::DatabaseConfig;
use polystore_storage::{Storage, StorageEngine};

use crate::theme::Theme;

/// Connect, report, disconnect.
pub(crate) async fn ping(config: &DatabaseConfig) -> Result<()> {
    let storage = Storage::new(config.clone());
    let kind = storage.engine_kind()?;
    println!("{}", Theme::info(&format!("Connecting to {kind}...")));

    match storage.initialize().await {
        Ok(engine) => {
            println!(
                "{}",
                Theme::success(&format!("{} is {}", engine.kind(), engine.state()))
            );
            storage.close().await?;
            Ok(())
        },
        Err(e) => {
            println!("{}", Theme::error(&e.to_string()));
            Err(e.into())
        },
    }
}
