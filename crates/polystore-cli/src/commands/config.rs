//! `polystore config` - show the resolved configuration.

use anyhow::{Context, Result};
use polystore_config::ResolvedConfig;

use crate::theme::Theme;

/// Print the merged configuration, annotated with the layer each value
/// came from. Secrets are redacted.
pub(crate) fn show_config(resolved: &ResolvedConfig) -> Result<()> {
    if resolved.loaded_files.is_empty() {
        println!("{}", Theme::dimmed("# no config files loaded; defaults and environment only"));
    }
    for file in &resolved.loaded_files {
        println!("{}", Theme::dimmed(&format!("# loaded {file}")));
    }
    let rendered = resolved
        .to_annotated_toml()
        .context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
