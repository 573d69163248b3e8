//! One-time index bootstrap: create the target index from a schema template
//! when it does not exist yet.

use std::path::Path;

use anyhow::{Context, Result};
use gmi_core::error::GmiError;
use tracing::info;

use crate::client::EsClient;

/// Make sure `index` exists, creating it from `template_path` if needed.
///
/// Any failure here is fatal to startup: indexing cannot proceed without a
/// target index.
pub async fn ensure_index(client: &EsClient, index: &str, template_path: &Path) -> Result<()> {
    info!("[elastic] initializing index {index}");

    let exists = client
        .index_exists(index)
        .await
        .map_err(|e| GmiError::Bootstrap(format!("existence check for {index} failed: {e}")))?;

    if exists {
        info!("[elastic] index {index} exists, nothing to do");
        return Ok(());
    }

    let template = load_template(template_path)?;
    client
        .create_index(index, template)
        .await
        .map_err(|e| GmiError::Bootstrap(format!("unable to create index {index}: {e}")))?;

    info!("[elastic] created index {index}");
    Ok(())
}

/// Read the schema template and check that it is a JSON object.
pub fn load_template(path: &Path) -> Result<String> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("unable to create index, error opening {}", path.display()))?;
    let parsed: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| GmiError::Bootstrap(format!("template {} is not valid JSON: {e}", path.display())))?;
    if !parsed.is_object() {
        return Err(GmiError::Bootstrap(format!("template {} must be a JSON object", path.display())).into());
    }
    Ok(body)
}
