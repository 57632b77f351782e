//! `polystore entities` - list registered entities.

use anyhow::Result;
use polystore_schema::SchemaRegistry;

use crate::theme::Theme;

/// Print every registered entity with its storage names.
pub(crate) fn list_entities() -> Result<()> {
    let registry = SchemaRegistry::with_builtins()?;

    println!("{}", Theme::header("Entities"));
    println!("{}", Theme::separator());
    for schema in registry.iter() {
        println!(
            "  {:<12} table {:<12} collection {:<12} {}",
            schema.entity_name(),
            schema.table_name(),
            schema.collection_name(),
            Theme::dimmed(&format!("{} fields", schema.fields().len())),
        );
    }
    Ok(())
}
