//! Project lifecycle around the sync pipeline: onboarding, source
//! bookkeeping and post-build hooks.

use crate::config::{
    read_config_file, save_config, GeneratorConfig, ProjectConfig, SourceConfig,
};
use crate::plugins::{LifecycleContext, Plugin, PluginRegistry, PostInit, SourceContext};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Directory holding the config file; `.` for a bare file name.
pub fn project_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn instantiate(registry: &PluginRegistry, generator: &str) -> Result<Arc<dyn Plugin>> {
    registry.instantiate(generator).with_context(|| {
        format!(
            "Unknown generator '{generator}' (available: {})",
            registry.available_generators().join(", ")
        )
    })
}

/// Root directory for a generator of a config read verbatim from disk,
/// anchored at the project directory.
fn anchored_root(
    config: &ProjectConfig,
    generator: &GeneratorConfig,
    project_dir: &Path,
) -> PathBuf {
    let root = config.generator_root(generator);
    if root.is_relative() {
        project_dir.join(root)
    } else {
        root
    }
}

/// Write a starter config and run each plugin's `init` hook.
///
/// Every `post_init` callback runs after all plugins have been initialised;
/// their lines are returned for display.
pub async fn init_project(
    config_path: &Path,
    generators: &[String],
    root_dir: Option<PathBuf>,
    registry: &PluginRegistry,
) -> Result<Vec<String>> {
    if config_path.exists() {
        bail!("Config file already exists: {:?}", config_path);
    }
    if generators.is_empty() {
        bail!("At least one generator is required");
    }

    let mut config = ProjectConfig::default();
    if let Some(root_dir) = root_dir {
        config.root_dir = root_dir;
    }
    let mut plugins = Vec::with_capacity(generators.len());
    for generator in generators {
        plugins.push(instantiate(registry, generator)?);
        config.generators.push(GeneratorConfig::new(generator.clone()));
    }
    save_config(config_path, &config)?;
    info!(path = %config_path.display(), "config created");

    let dir = project_dir(config_path);
    let mut post_init: Vec<PostInit> = Vec::new();
    for (plugin, generator) in plugins.iter().zip(&config.generators) {
        let root = anchored_root(&config, generator, &dir);
        let ctx = LifecycleContext {
            project_dir: &dir,
            root_dir: &root,
            sources: &config.sources,
            options: &generator.options,
        };
        let outcome = plugin
            .init(&ctx)
            .await
            .with_context(|| format!("Failed to initialise generator '{}'", generator.generator))?;
        post_init.extend(outcome.post_init);
    }

    Ok(post_init.into_iter().flat_map(|callback| callback()).collect())
}

/// Register a source in the config file and let plugins do their bookkeeping.
pub async fn add_source(
    config_path: &Path,
    source: SourceConfig,
    registry: &PluginRegistry,
) -> Result<()> {
    if !source.has_valid_id() {
        bail!(
            "Invalid source id '{}': use letters, digits, '-' and '_'",
            source.id
        );
    }
    let mut config = read_config_file(config_path)?;
    if config.source(&source.id).is_some() {
        bail!("Source '{}' already exists", source.id);
    }
    config.sources.push(source.clone());
    save_config(config_path, &config)?;
    info!(source = %source.id, "source added");

    run_source_hooks(&config, config_path, &source, registry, Hook::Add).await
}

/// Remove a source from the config file and undo plugin bookkeeping.
pub async fn remove_source(
    config_path: &Path,
    source_id: &str,
    registry: &PluginRegistry,
) -> Result<SourceConfig> {
    let mut config = read_config_file(config_path)?;
    let Some(index) = config.sources.iter().position(|s| s.id == source_id) else {
        bail!("Source '{source_id}' not found");
    };
    let source = config.sources.remove(index);
    save_config(config_path, &config)?;
    info!(source = %source.id, "source removed");

    run_source_hooks(&config, config_path, &source, registry, Hook::Remove).await?;
    Ok(source)
}

#[derive(Clone, Copy)]
enum Hook {
    Add,
    Remove,
}

async fn run_source_hooks(
    config: &ProjectConfig,
    config_path: &Path,
    source: &SourceConfig,
    registry: &PluginRegistry,
    hook: Hook,
) -> Result<()> {
    let dir = project_dir(config_path);
    for generator in config.enabled_generators() {
        let plugin = instantiate(registry, &generator.generator)?;
        let root = anchored_root(config, generator, &dir);
        let ctx = SourceContext {
            project_dir: &dir,
            root_dir: &root,
            source,
            options: &generator.options,
        };
        let result = match hook {
            Hook::Add => plugin.add_source(&ctx).await,
            Hook::Remove => plugin.remove_source(&ctx).await,
        };
        result.with_context(|| {
            format!(
                "Generator '{}' failed to update source bookkeeping",
                generator.generator
            )
        })?;
    }
    Ok(())
}

/// Run each enabled plugin's `post_build` hook after a successful sync.
///
/// `config` is the one the sync ran with: loaded through
/// [`crate::config::load_config`] and merged with CLI overrides. Its
/// generator roots are used as they are, so hooks see the directories the
/// sync wrote to.
pub async fn post_build(
    config: &ProjectConfig,
    project_dir: &Path,
    registry: &PluginRegistry,
) -> Result<()> {
    for generator in config.enabled_generators() {
        let plugin = instantiate(registry, &generator.generator)?;
        let root = config.generator_root(generator);
        let ctx = LifecycleContext {
            project_dir,
            root_dir: &root,
            sources: &config.sources,
            options: &generator.options,
        };
        plugin
            .post_build(&ctx)
            .await
            .with_context(|| format!("Generator '{}' post-build failed", generator.generator))?;
    }
    Ok(())
}
