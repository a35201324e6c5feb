use super::schema::ProjectConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./openapi-sync.yaml";

/// A loaded configuration together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ProjectConfig,
    pub path: PathBuf,
}

/// Load configuration from file or return default.
///
/// Relative `rootDir` and spec paths are rebased onto the config file's
/// directory so the project can be synced from any working directory.
pub fn load_config(custom_path: Option<&Path>) -> Result<LoadedConfig> {
    let config_path = match custom_path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    };

    let config = if config_path.exists() {
        let config = read_config_file(&config_path)?;
        rebase(config, config_path.parent().unwrap_or(Path::new(".")))
    } else if custom_path.is_some() {
        // Custom path specified but doesn't exist - error
        anyhow::bail!("Config file not found: {:?}", config_path);
    } else {
        // Default path doesn't exist - use built-in defaults
        ProjectConfig::default()
    };

    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}

/// Read a config file verbatim, without rebasing relative paths.
///
/// Used when the file is edited and written back.
pub fn read_config_file(path: &Path) -> Result<ProjectConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Write configuration back to disk, creating parent directories.
pub fn save_config(path: &Path, config: &ProjectConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    let content = serde_yaml::to_string(config).context("Failed to serialize config")?;
    fs::write(path, content).with_context(|| format!("Failed to write config file: {:?}", path))
}

/// Merge config with CLI arguments (CLI takes precedence)
pub fn merge_with_cli_args(
    mut config: ProjectConfig,
    root_dir: Option<PathBuf>,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
) -> ProjectConfig {
    if let Some(root_dir) = root_dir {
        config.root_dir = root_dir;
    }

    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }

    if timeout_secs.is_some() {
        config.timeout_secs = timeout_secs;
    }

    config
}

fn rebase(mut config: ProjectConfig, base: &Path) -> ProjectConfig {
    if base.as_os_str().is_empty() {
        return config;
    }

    if config.root_dir.is_relative() {
        config.root_dir = base.join(&config.root_dir);
    }

    for generator in &mut config.generators {
        if let Some(root) = generator.root_dir.as_mut().filter(|r| r.is_relative()) {
            *root = base.join(&*root);
        }
    }

    for source in &mut config.sources {
        if is_local_path(&source.spec_url) && Path::new(&source.spec_url).is_relative() {
            source.spec_url = base.join(&source.spec_url).to_string_lossy().into_owned();
        }
    }

    config
}

fn is_local_path(spec_url: &str) -> bool {
    !spec_url.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneratorConfig, SourceConfig};

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("absent.yaml");
        assert!(load_config(Some(&explicit)).is_err());
    }

    #[test]
    fn relative_paths_are_rebased_on_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openapi-sync.yaml");
        fs::write(
            &path,
            r#"
version: "1.0"
rootDir: out
sources:
  - id: local
    name: Local
    specUrl: specs/local.yaml
  - id: remote
    name: Remote
    specUrl: https://ex/a.json
generators:
  - generator: react
"#,
        )
        .unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config.root_dir, dir.path().join("out"));
        assert_eq!(
            PathBuf::from(&loaded.config.sources[0].spec_url),
            dir.path().join("specs/local.yaml")
        );
        assert_eq!(loaded.config.sources[1].spec_url, "https://ex/a.json");
    }

    #[test]
    fn save_then_load_keeps_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/openapi-sync.yaml");
        let mut config = ProjectConfig::default();
        config.sources.push(SourceConfig {
            id: "petstore".into(),
            name: "Pet Store".into(),
            spec_url: "https://ex/a.json".into(),
        });
        config.generators.push(GeneratorConfig::new("react"));
        save_config(&path, &config).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config.sources, config.sources);
        assert_eq!(loaded.config.generators, config.generators);
    }

    #[test]
    fn cli_arguments_take_precedence() {
        let config = merge_with_cli_args(
            ProjectConfig::default(),
            Some(PathBuf::from("elsewhere")),
            Some(4),
            Some(30),
        );
        assert_eq!(config.root_dir, PathBuf::from("elsewhere"));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.timeout_secs, Some(30));

        let untouched = merge_with_cli_args(config.clone(), None, None, None);
        assert_eq!(untouched, config);
    }
}
