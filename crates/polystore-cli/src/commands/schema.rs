//! `polystore schema` - print an entity's compiled schema.

use anyhow::{Context, Result, anyhow};
use polystore_schema::SchemaRegistry;

use crate::Target;

/// Render `entity` for `target`. No I/O beyond stdout.
pub(crate) fn render_schema(registry: &SchemaRegistry, entity: &str, target: Target) -> Result<String> {
    let schema = registry
        .resolve(entity)
        .ok_or_else(|| anyhow!("unknown entity '{entity}'"))?;
    Ok(match target {
        Target::Relational => schema.to_relational_schema()?.to_sql(),
        Target::Document => {
            let document = schema.to_document_schema()?;
            serde_json::to_string_pretty(&document.json_schema())
                .context("failed to render $jsonSchema")?
        },
    })
}

/// Print the compiled schema of `entity`.
pub(crate) fn show_schema(entity: &str, target: Target) -> Result<()> {
    let registry = SchemaRegistry::with_builtins()?;
    println!("{}", render_schema(&registry, entity, target)?);
    Ok(())
}
