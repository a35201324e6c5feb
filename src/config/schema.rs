use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub version: String,

    /// Output root handed to plugins.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Maximum number of sources processed at once; `1` means sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Overall sync timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub generators: Vec<GeneratorConfig>,
}

/// One configured OpenAPI specification.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub spec_url: String,
}

impl SourceConfig {
    /// Source ids name output directories, so they must be a single plain
    /// path component.
    pub fn has_valid_id(&self) -> bool {
        !self.id.is_empty()
            && self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Plugin identifier, e.g. `react`, `next` or `nest`.
    pub generator: String,

    /// Overrides the project root for this generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_options")]
    pub options: serde_json::Value,
}

impl GeneratorConfig {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            root_dir: None,
            enabled: true,
            options: default_options(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_concurrency() -> usize {
    1
}

fn default_options() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl ProjectConfig {
    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn enabled_generators(&self) -> impl Iterator<Item = &GeneratorConfig> {
        self.generators.iter().filter(|g| g.enabled)
    }

    /// Structural checks that do not need the plugin registry.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.sources.is_empty() {
            return Err(SyncError::Config("no sources configured".to_string()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "source '{}' has an empty id",
                    source.name
                )));
            }
            if !source.has_valid_id() {
                return Err(SyncError::Config(format!(
                    "source id '{}' may only contain letters, digits, '-' and '_'",
                    source.id
                )));
            }
            if source.spec_url.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "source '{}' has no specUrl",
                    source.id
                )));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(SyncError::Config(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }

        if self.enabled_generators().next().is_none() {
            return Err(SyncError::Config("no enabled generators configured".to_string()));
        }

        Ok(())
    }

    /// Output root for one generator, falling back to the project root.
    pub fn generator_root(&self, generator: &GeneratorConfig) -> PathBuf {
        generator
            .root_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.clone())
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            root_dir: default_root_dir(),
            concurrency: default_concurrency(),
            timeout_secs: None,
            sources: vec![],
            generators: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_yaml_with_defaults() {
        let yaml = r#"
version: "1.0"
rootDir: src/api
sources:
  - id: petstore
    name: Pet Store
    specUrl: https://ex/a.json
generators:
  - generator: react
  - generator: next
    rootDir: app/api
    enabled: false
    options:
      serverOnly: true
"#;
        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("src/api"));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.timeout_secs, None);
        assert_eq!(config.sources[0].spec_url, "https://ex/a.json");
        assert!(config.generators[0].enabled);
        assert!(config.generators[0].options.is_object());
        assert_eq!(config.enabled_generators().count(), 1);
        assert_eq!(
            config.generator_root(&config.generators[1]),
            PathBuf::from("app/api")
        );
        assert_eq!(
            config.generator_root(&config.generators[0]),
            PathBuf::from("src/api")
        );
        assert_eq!(config.generators[1].options["serverOnly"], true);
        config.validate().unwrap();
    }

    fn source(id: &str) -> SourceConfig {
        SourceConfig {
            id: id.to_string(),
            name: id.to_string(),
            spec_url: format!("https://ex/{id}.json"),
        }
    }

    #[test]
    fn validation_rejects_unusable_projects() {
        let mut config = ProjectConfig::default();
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        config.sources = vec![source("a"), source("a")];
        config.generators = vec![GeneratorConfig::new("react")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate source id 'a'"));

        config.sources = vec![source("a"), source("")];
        assert!(config.validate().is_err());

        for id in ["../escaped", "/abs", "nested/dir", "a.b", "..", "sp ace"] {
            config.sources = vec![source(id)];
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("may only contain"), "{id}: {err}");
        }
        config.sources = vec![source("billing-api"), source("pets_v2")];
        config.validate().unwrap();

        config.sources = vec![source("a")];
        config.generators[0].enabled = false;
        assert!(config.validate().unwrap_err().to_string().contains("no enabled generators"));

        config.generators[0].enabled = true;
        config.validate().unwrap();
    }
}
