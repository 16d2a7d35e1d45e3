//! Skill Template Loader
//!
//! Templates are static YAML records in a directory, read on every listing
//! request so edits show up without a restart.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Load all templates in `dir`, sorted by file name.
///
/// A missing directory yields an empty list. Files whose YAML document is
/// empty are skipped.
pub async fn load_templates(dir: &Path) -> Result<Vec<serde_json::Value>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        debug!("Template directory {} not found", dir.display());
        return Ok(Vec::new());
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read template directory {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_template = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| TEMPLATE_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if is_template && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read template {}", path.display()))?;

        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse template {}", path.display()))?;

        if value.is_null() {
            warn!("Skipping empty template {}", path.display());
            continue;
        }

        templates.push(serde_json::to_value(value).context("Template is not JSON-representable")?);
    }

    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let templates = load_templates(&temp.path().join("nope")).await.unwrap();
        assert!(templates.is_empty());
    }

    #[tokio::test]
    async fn test_loads_sorted_yaml_only() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("git-commit.yml"), "id: git-commit\nname: Git Commit\n").unwrap();
        std::fs::write(temp.path().join("email-digest.yaml"), "id: email-digest\nbins: []\n").unwrap();
        std::fs::write(temp.path().join("README.md"), "# not a template").unwrap();
        std::fs::write(temp.path().join("empty.yaml"), "").unwrap();

        let templates = load_templates(temp.path()).await.unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0]["id"], "email-digest");
        assert_eq!(templates[1]["id"], "git-commit");
    }

    #[tokio::test]
    async fn test_invalid_template_is_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bad.yaml"), "id: [unclosed").unwrap();
        assert!(load_templates(temp.path()).await.is_err());
    }
}
