//! Load options from a JSON file, resolving command text files next to it.

use crate::config::{validate, DatabaseOptions};
use crate::error::{Error, Result};
use std::path::Path;

/// Read and validate options from a JSON file.
pub async fn load_options(path: impl AsRef<Path>) -> Result<DatabaseOptions> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let mut options: DatabaseOptions = serde_json::from_str(&text)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_command_files(&mut options, base_dir).await?;
    validate(&options)?;
    tracing::debug!(path = %path.display(), commands = options.sql_commands.len(), "options loaded");
    Ok(options)
}

/// Parse options from a JSON string. Command text files are resolved against the working directory.
pub async fn load_options_from_str(json: &str) -> Result<DatabaseOptions> {
    let mut options: DatabaseOptions = serde_json::from_str(json)?;
    resolve_command_files(&mut options, Path::new(".")).await?;
    validate(&options)?;
    Ok(options)
}

async fn resolve_command_files(options: &mut DatabaseOptions, base_dir: &Path) -> Result<()> {
    for (name, command) in options.sql_commands.iter_mut() {
        let Some(file) = command.command_text_file.as_deref().filter(|f| !f.is_empty()) else {
            continue;
        };
        let file_path = base_dir.join(file);
        command.command_text = tokio::fs::read_to_string(&file_path).await.map_err(|e| {
            Error::configuration(format!(
                "sql command '{}': cannot read {}: {}",
                name,
                file_path.display(),
                e
            ))
        })?;
    }
    Ok(())
}
