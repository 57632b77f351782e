//! Source-annotated display of the resolved configuration.

use std::fmt::{self, Write as _};

use crate::merge::{ConfigLayer, FieldSources};
use crate::types::Config;

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded, in precedence order.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Layer that set the field at `path`, if tracked.
    #[must_use]
    pub fn source_of(&self, path: &str) -> Option<&ConfigLayer> {
        self.field_sources.get(path)
    }

    /// Render as TOML with a `# <layer>` comment after each field.
    ///
    /// Secrets never appear: the password is not serialized and credentials
    /// in the `MongoDB` URI are masked.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_annotated_toml(&self) -> Result<String, fmt::Error> {
        let rendered = toml::to_string_pretty(&self.config).map_err(|_| fmt::Error)?;
        let mut output = String::from("# Resolved Polystore configuration\n");
        if !self.loaded_files.is_empty() {
            output.push_str("#\n# Loaded files (in precedence order):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        output.push('\n');

        let mut section = String::new();
        for line in rendered.lines() {
            let trimmed = line.trim();
            if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                section = name.to_owned();
                writeln!(output, "{line}")?;
                continue;
            }
            let annotation = trimmed.split_once('=').and_then(|(key, _)| {
                let key = key.trim();
                let path = if section.is_empty() {
                    key.to_owned()
                } else {
                    format!("{section}.{key}")
                };
                self.field_sources.get(&path)
            });
            match annotation {
                Some(layer) => writeln!(output, "{line}  # {layer}")?,
                None => writeln!(output, "{line}")?,
            }
        }
        Ok(output)
    }
}
