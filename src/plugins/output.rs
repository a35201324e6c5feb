//! Change-aware file output for plugins. Files are rewritten only when
//! their bytes differ.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Written,
    Unchanged,
}

/// A file to be generated, relative to a plugin's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub content: String,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

pub async fn write_if_changed(path: &Path, content: &str) -> Result<WriteResult> {
    match tokio::fs::read(path).await {
        Ok(existing) if existing == content.as_bytes() => {
            debug!(path = %path.display(), "output unchanged");
            return Ok(WriteResult::Unchanged);
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write output file: {:?}", path))?;
    debug!(path = %path.display(), bytes = content.len(), "output written");
    Ok(WriteResult::Written)
}

/// Write every file under `base`, in order.
pub async fn write_all(base: &Path, files: &[OutputFile]) -> Result<Vec<WriteResult>> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        results.push(write_if_changed(&base.join(&file.path), &file.content).await?);
    }
    Ok(results)
}

/// Set `key=value` in an env file, creating the file when absent.
pub async fn upsert_env_var(path: &Path, key: &str, value: &str) -> Result<WriteResult> {
    let existing = read_optional(path).await?.unwrap_or_default();
    write_if_changed(path, &upsert_env_line(&existing, key, value)).await
}

/// Remove `key` from an env file. Missing file or key is not an error.
pub async fn remove_env_var(path: &Path, key: &str) -> Result<WriteResult> {
    let Some(existing) = read_optional(path).await? else {
        return Ok(WriteResult::Unchanged);
    };
    match remove_env_line(&existing, key) {
        Some(updated) => write_if_changed(path, &updated).await,
        None => Ok(WriteResult::Unchanged),
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }
}

/// Origin of an HTTP spec URL, used as the default API base URL.
///
/// Local spec paths have no meaningful origin and yield an empty string.
pub fn base_url_of(spec_url: &str) -> String {
    match url::Url::parse(spec_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.origin().ascii_serialization(),
        _ => String::new(),
    }
}

fn env_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line);
    line.split_once('=').map(|(k, _)| k.trim())
}

pub fn upsert_env_line(content: &str, key: &str, value: &str) -> String {
    let entry = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            if env_key(line) == Some(key) {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// `None` when the key is not present.
pub fn remove_env_line(content: &str, key: &str) -> Option<String> {
    let before = content.lines().count();
    let kept: Vec<&str> = content.lines().filter(|l| env_key(l) != Some(key)).collect();
    if kept.len() == before {
        return None;
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rewrites_only_when_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.ts");
        assert_eq!(write_if_changed(&path, "a").await.unwrap(), WriteResult::Written);
        assert_eq!(write_if_changed(&path, "a").await.unwrap(), WriteResult::Unchanged);
        assert_eq!(write_if_changed(&path, "b").await.unwrap(), WriteResult::Written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "b");
    }

    #[test]
    fn env_lines_are_replaced_in_place() {
        let content = "# api\nexport PETSTORE_BASE_URL=old\nOTHER=1\n";
        assert_eq!(
            upsert_env_line(content, "PETSTORE_BASE_URL", "https://ex"),
            "# api\nPETSTORE_BASE_URL=https://ex\nOTHER=1\n"
        );
        assert_eq!(upsert_env_line("", "A", "1"), "A=1\n");
        assert_eq!(upsert_env_line("B=2", "A", "1"), "B=2\nA=1\n");
    }

    #[test]
    fn env_removal_reports_absence() {
        assert_eq!(remove_env_line("A=1\nB=2\n", "A").as_deref(), Some("B=2\n"));
        assert_eq!(remove_env_line("A=1\n", "A").as_deref(), Some(""));
        assert_eq!(remove_env_line("B=2\n", "A"), None);
    }

    #[test]
    fn base_url_is_the_spec_origin() {
        assert_eq!(base_url_of("https://ex.com:8443/v1/openapi.json"), "https://ex.com:8443");
        assert_eq!(base_url_of("http://localhost/spec.yaml"), "http://localhost");
        assert_eq!(base_url_of("./specs/petstore.yaml"), "");
        assert_eq!(base_url_of("file:///tmp/spec.yaml"), "");
    }

    #[tokio::test]
    async fn env_file_is_created_and_removal_is_a_no_op_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        assert_eq!(
            remove_env_var(&path, "A").await.unwrap(),
            WriteResult::Unchanged
        );
        assert!(!path.exists());

        upsert_env_var(&path, "A", "1").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=1\n");
        assert_eq!(
            remove_env_var(&path, "MISSING").await.unwrap(),
            WriteResult::Unchanged
        );
        remove_env_var(&path, "A").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
