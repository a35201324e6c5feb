pub mod nest;
pub mod next;
pub mod output;
pub mod react;
pub mod typescript;

use crate::config::SourceConfig;
use crate::conflicts::ConflictResolution;
use crate::descriptors::{Descriptor, ResourceDescriptor, RestData, SchemaData};
use crate::error::SyncError;
use crate::stats::StatsCounter;
use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use nest::NestPlugin;
pub use next::NextPlugin;
pub use react::ReactPlugin;

/// Version of the pipeline that plugins declare compatibility with.
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMeta {
    pub name: String,
    pub version: String,
    /// Semver range of supported core versions.
    pub compat: String,
    /// Generator identifier the plugin is selected by.
    pub generator: String,
}

/// A named block of documentation for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentationTab {
    pub name: String,
    /// Syntax highlighting hint for presentation layers.
    pub language: String,
    pub content: String,
}

impl DocumentationTab {
    pub fn new(
        name: impl Into<String>,
        language: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            content: content.into(),
        }
    }
}

/// Everything a plugin gets for one `generate` call.
pub struct GenerationContext<'a> {
    pub root_dir: &'a Path,
    pub source: &'a SourceConfig,
    pub stats: &'a mut StatsCounter,
    pub conflicts: &'a ConflictResolution,
    pub options: &'a Value,
}

impl GenerationContext<'_> {
    /// Operation ids whose generated names need a postfix.
    pub fn potentially_conflicting_operation_ids(&self) -> &BTreeSet<String> {
        self.conflicts.conflicting_operation_ids()
    }

    /// Per-source output directory, keeping sources isolated from each other.
    pub fn source_dir(&self) -> PathBuf {
        self.root_dir.join(&self.source.id)
    }
}

/// Context for project-level lifecycle hooks.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleContext<'a> {
    pub project_dir: &'a Path,
    pub root_dir: &'a Path,
    pub sources: &'a [SourceConfig],
    pub options: &'a Value,
}

/// Context for source bookkeeping hooks.
#[derive(Debug, Clone, Copy)]
pub struct SourceContext<'a> {
    pub project_dir: &'a Path,
    pub root_dir: &'a Path,
    pub source: &'a SourceConfig,
    pub options: &'a Value,
}

/// Callback run after every other onboarding step; returns lines to show.
pub type PostInit = Box<dyn FnOnce() -> Vec<String> + Send>;

#[derive(Default)]
pub struct InitOutcome {
    pub post_init: Option<PostInit>,
}

impl fmt::Debug for InitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitOutcome")
            .field("post_init", &self.post_init.is_some())
            .finish()
    }
}

/// A generator backend for one target framework.
///
/// `generate` owns all writes for the descriptors it is given and must be
/// idempotent: the same descriptors and root produce byte-identical output.
/// Documentation methods are pure. The lifecycle hooks are optional and are
/// invoked by the project workflow, never by the sync pipeline itself.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn meta(&self) -> PluginMeta;

    /// Reject generator options this plugin does not understand.
    fn validate_options(&self, _options: &Value) -> Result<()> {
        Ok(())
    }

    async fn generate(
        &self,
        descriptors: &[Descriptor],
        ctx: &mut GenerationContext<'_>,
    ) -> Result<()>;

    fn schema_documentation(
        &self,
        descriptor: &ResourceDescriptor<SchemaData>,
    ) -> Vec<DocumentationTab>;

    /// Tabs for one endpoint. Symbol names carry the postfix `conflicts`
    /// assigns, matching what [`Plugin::generate`] writes.
    fn endpoint_documentation(
        &self,
        descriptor: &ResourceDescriptor<RestData>,
        conflicts: &ConflictResolution,
    ) -> Vec<DocumentationTab>;

    async fn init(&self, _ctx: &LifecycleContext<'_>) -> Result<InitOutcome> {
        Ok(InitOutcome::default())
    }

    async fn post_build(&self, _ctx: &LifecycleContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn add_source(&self, _ctx: &SourceContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn remove_source(&self, _ctx: &SourceContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Documentation tabs for any descriptor.
pub fn documentation(
    plugin: &dyn Plugin,
    descriptor: &Descriptor,
    conflicts: &ConflictResolution,
) -> Vec<DocumentationTab> {
    match descriptor {
        Descriptor::Rest(d) => plugin.endpoint_documentation(d, conflicts),
        Descriptor::Schema(d) => plugin.schema_documentation(d),
    }
}

/// Reject plugins whose compat range does not accept `core`.
pub fn check_compat(meta: &PluginMeta, core: &str) -> Result<(), SyncError> {
    let incompatible = || SyncError::IncompatiblePlugin {
        plugin: meta.name.clone(),
        version: meta.version.clone(),
        compat: meta.compat.clone(),
        core: core.to_string(),
    };
    let req = semver::VersionReq::parse(&meta.compat).map_err(|_| incompatible())?;
    let version = semver::Version::parse(core).map_err(|_| incompatible())?;
    if req.matches(&version) {
        Ok(())
    } else {
        Err(incompatible())
    }
}

/// Parse plugin options into the plugin's declared options type.
pub fn parse_options<T: serde::de::DeserializeOwned + Default>(options: &Value) -> Result<T> {
    match options {
        Value::Null => Ok(T::default()),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Explicitly registered plugin factories keyed by generator identifier.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: IndexMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the react, next and nest plugins.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register("react", Arc::new(|| Arc::new(ReactPlugin) as Arc<dyn Plugin>));
        registry.register("next", Arc::new(|| Arc::new(NextPlugin) as Arc<dyn Plugin>));
        registry.register("nest", Arc::new(|| Arc::new(NestPlugin) as Arc<dyn Plugin>));

        registry
    }

    pub fn register(&mut self, generator: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(generator.into(), factory);
    }

    /// Register an existing instance under its own generator identifier.
    pub fn register_instance(&mut self, plugin: Arc<dyn Plugin>) {
        let generator = plugin.meta().generator;
        self.register(generator, Arc::new(move || Arc::clone(&plugin)));
    }

    pub fn instantiate(&self, generator: &str) -> Option<Arc<dyn Plugin>> {
        self.factories.get(generator).map(|factory| factory())
    }

    pub fn available_generators(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("generators", &self.available_generators())
            .finish()
    }
}
