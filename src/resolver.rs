//! Fetching and parsing of source documents.

use crate::config::SourceConfig;
use crate::error::SyncError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Turns a source's `specUrl` into a parsed document.
#[async_trait]
pub trait SpecResolver: Send + Sync {
    async fn resolve(&self, source: &SourceConfig) -> Result<Value, SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// Detect by extension, falling back to sniffing the content.
    pub fn detect(location: &str, content: &str) -> Self {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("json") => SpecFormat::Json,
            Some("yaml") | Some("yml") => SpecFormat::Yaml,
            _ if content.trim_start().starts_with('{') => SpecFormat::Json,
            _ => SpecFormat::Yaml,
        }
    }
}

/// Parse document text in the given format.
pub fn parse_document(
    source_id: &str,
    format: SpecFormat,
    content: &str,
) -> Result<Value, SyncError> {
    let parsed = match format {
        SpecFormat::Json => serde_json::from_str::<Value>(content).map_err(|e| e.to_string()),
        SpecFormat::Yaml => serde_yaml::from_str::<Value>(content).map_err(|e| e.to_string()),
    };
    match parsed {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(SyncError::spec_parse(source_id, "document root is not an object")),
        Err(reason) => Err(SyncError::spec_parse(source_id, reason)),
    }
}

/// Resolves `http(s)://` URLs over the network and everything else from disk.
#[derive(Debug, Clone, Default)]
pub struct DefaultSpecResolver {
    client: reqwest::Client,
}

impl DefaultSpecResolver {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_remote(&self, source: &SourceConfig) -> Result<String, SyncError> {
        let fetch_error = |reason: String| SyncError::SpecFetch {
            source_id: source.id.clone(),
            url: source.spec_url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&source.spec_url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {status}")));
        }
        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }

    async fn read_local(&self, source: &SourceConfig) -> Result<String, SyncError> {
        let path = local_path(&source.spec_url).ok_or_else(|| SyncError::SpecFetch {
            source_id: source.id.clone(),
            url: source.spec_url.clone(),
            reason: "not a valid file URL".to_string(),
        })?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SyncError::SpecFetch {
                source_id: source.id.clone(),
                url: source.spec_url.clone(),
                reason: format!("{}: {e}", path.display()),
            })
    }
}

#[async_trait]
impl SpecResolver for DefaultSpecResolver {
    async fn resolve(&self, source: &SourceConfig) -> Result<Value, SyncError> {
        let content = if is_remote(&source.spec_url) {
            self.fetch_remote(source).await?
        } else {
            self.read_local(source).await?
        };
        let format = SpecFormat::detect(&source.spec_url, &content);
        debug!(source = %source.id, ?format, bytes = content.len(), "spec fetched");
        parse_document(&source.id, format, &content)
    }
}

pub fn is_remote(spec_url: &str) -> bool {
    spec_url.starts_with("http://") || spec_url.starts_with("https://")
}

/// Filesystem path for `file://` URLs and bare paths.
pub fn local_path(spec_url: &str) -> Option<PathBuf> {
    if spec_url.starts_with("file://") {
        url::Url::parse(spec_url).ok()?.to_file_path().ok()
    } else {
        Some(PathBuf::from(spec_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(spec_url: &str) -> SourceConfig {
        SourceConfig {
            id: "pets".into(),
            name: "Pets".into(),
            spec_url: spec_url.into(),
        }
    }

    #[test]
    fn format_detection() {
        assert_eq!(SpecFormat::detect("api.JSON", "openapi: 3"), SpecFormat::Json);
        assert_eq!(SpecFormat::detect("https://x/api.yml?v=2", "{"), SpecFormat::Yaml);
        assert_eq!(SpecFormat::detect("https://x/spec", "  {\"openapi\":1}"), SpecFormat::Json);
        assert_eq!(SpecFormat::detect("https://x/spec", "openapi: 3.0.0"), SpecFormat::Yaml);
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        assert!(matches!(
            parse_document("pets", SpecFormat::Json, "{ not json"),
            Err(SyncError::SpecParse { .. })
        ));
        assert!(matches!(
            parse_document("pets", SpecFormat::Yaml, "- just\n- a list\n"),
            Err(SyncError::SpecParse { .. })
        ));
        let yaml = "openapi: 3.0.0\ninfo:\n  title: x\n";
        let doc = parse_document("pets", SpecFormat::Yaml, yaml).unwrap();
        assert_eq!(doc["info"]["title"], "x");
    }

    #[test]
    fn yaml_keeps_declaration_order() {
        let doc = parse_document("pets", SpecFormat::Yaml, "paths:\n  /z: {}\n  /a: {}\n").unwrap();
        let keys: Vec<_> = doc["paths"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["/z", "/a"]);
    }

    #[test]
    fn file_urls_map_to_paths() {
        assert_eq!(local_path("./spec.yaml"), Some(PathBuf::from("./spec.yaml")));
        assert!(local_path("file:///tmp/spec.yaml").is_some());
        assert!(!is_remote("file:///tmp/spec.yaml"));
        assert!(is_remote("https://example.com/openapi.json"));
    }

    #[tokio::test]
    async fn local_files_are_read_and_missing_ones_fail_to_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        std::fs::write(&path, r#"{"openapi": "3.0.0"}"#).unwrap();

        let resolver = DefaultSpecResolver::new();
        let doc = resolver.resolve(&source(path.to_str().unwrap())).await.unwrap();
        assert_eq!(doc["openapi"], "3.0.0");

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            resolver.resolve(&source(missing.to_str().unwrap())).await,
            Err(SyncError::SpecFetch { .. })
        ));
    }
}
