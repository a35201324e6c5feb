//! Drives a sync: config resolution, then per source fetch, descriptor
//! building, conflict resolution and generation, reported step by step.

use crate::config::{GeneratorConfig, ProjectConfig, SourceConfig};
use crate::conflicts::{resolve_conflicts, ConflictResolution};
use crate::descriptors::{build_descriptors, Descriptor};
use crate::error::SyncError;
use crate::plugins::{
    check_compat, documentation, DocumentationTab, GenerationContext, Plugin, PluginRegistry,
    CORE_VERSION,
};
use crate::progress::{ProgressSender, Step, StepReporter};
use crate::resolver::SpecResolver;
use crate::stats::{StatsCounter, StatsSnapshot};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one sync, available once the terminal event has been sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    /// One entry per configured source, in configuration order.
    pub sources: Vec<SourceReport>,
}

impl SyncReport {
    pub fn source(&self, source_id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    fn failed() -> Self {
        Self {
            success: false,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source_id: String,
    pub success: bool,
    /// Counters gathered while generating; `None` when generation never ran
    /// to completion.
    pub stats: Option<StatsSnapshot>,
}

impl SourceReport {
    fn failed(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            success: false,
            stats: None,
        }
    }
}

/// A plugin resolved from configuration, ready to generate.
#[derive(Clone)]
struct ConfiguredPlugin {
    generator: String,
    plugin: Arc<dyn Plugin>,
    root_dir: PathBuf,
    options: serde_json::Value,
}

/// State shared read-only by every source unit of one run.
struct RunShared {
    resolver: Arc<dyn SpecResolver>,
    plugins: Vec<ConfiguredPlugin>,
}

pub struct Orchestrator {
    config: ProjectConfig,
    registry: PluginRegistry,
    resolver: Arc<dyn SpecResolver>,
}

impl Orchestrator {
    pub fn new(
        config: ProjectConfig,
        registry: PluginRegistry,
        resolver: Arc<dyn SpecResolver>,
    ) -> Self {
        Self {
            config,
            registry,
            resolver,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Run every configured source through the pipeline.
    ///
    /// Emits exactly one terminal event on `progress`, after every source has
    /// finished, whether sources fail, plugins fail or `cancel` fires.
    pub async fn sync(&self, progress: ProgressSender, cancel: CancellationToken) -> SyncReport {
        let cancel = cancel.child_token();
        let timer = self.config.timeout_secs.map(|secs| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                warn!(timeout_secs = secs, "sync timed out, cancelling");
                token.cancel();
            })
        });

        let report = self.run(&progress, &cancel).await;

        if let Some(timer) = timer {
            timer.abort();
        }
        info!(success = report.success, sources = report.sources.len(), "sync finished");
        progress.done(report.success);
        report
    }

    async fn run(&self, progress: &ProgressSender, cancel: &CancellationToken) -> SyncReport {
        let plugins = {
            let reporter = progress.reporter(None);
            reporter.started(Step::ResolvingConfig);
            match self.resolve_plugins() {
                Ok(plugins) => {
                    reporter.success(Step::ResolvingConfig);
                    plugins
                }
                Err(e) => {
                    error!(error = %e, "configuration rejected");
                    reporter.error(Step::ResolvingConfig, e.to_string());
                    return SyncReport::failed();
                }
            }
        };

        let shared = Arc::new(RunShared {
            resolver: Arc::clone(&self.resolver),
            plugins,
        });

        let sources = if self.config.concurrency <= 1 {
            self.run_sequential(&shared, progress, cancel).await
        } else {
            self.run_concurrent(&shared, progress, cancel).await
        };

        SyncReport {
            success: sources.iter().all(|s| s.success),
            sources,
        }
    }

    async fn run_sequential(
        &self,
        shared: &Arc<RunShared>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Vec<SourceReport> {
        let mut reports = Vec::with_capacity(self.config.sources.len());
        for source in &self.config.sources {
            let reporter = progress.reporter(Some(&source.id));
            let report = run_source(Arc::clone(shared), source.clone(), reporter, cancel.clone());
            reports.push(report.await);
        }
        reports
    }

    async fn run_concurrent(
        &self,
        shared: &Arc<RunShared>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Vec<SourceReport> {
        let sources = &self.config.sources;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut set = JoinSet::new();

        for (index, source) in sources.iter().enumerate() {
            let shared = Arc::clone(shared);
            let source = source.clone();
            let reporter = progress.reporter(Some(&source.id));
            let cancel = cancel.clone();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, run_source(shared, source, reporter, cancel).await)
            });
        }

        let mut slots: Vec<Option<SourceReport>> = vec![None; sources.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!(error = %e, "source task failed"),
            }
        }

        slots
            .into_iter()
            .zip(sources)
            .map(|(slot, source)| slot.unwrap_or_else(|| SourceReport::failed(&source.id)))
            .collect()
    }

    /// Validate configuration and instantiate the enabled plugins.
    fn resolve_plugins(&self) -> Result<Vec<ConfiguredPlugin>, SyncError> {
        self.config.validate()?;

        self.config
            .enabled_generators()
            .map(|generator| self.resolve_plugin(generator))
            .collect()
    }

    fn resolve_plugin(&self, generator: &GeneratorConfig) -> Result<ConfiguredPlugin, SyncError> {
        let plugin = self.instantiate(&generator.generator)?;
        let meta = plugin.meta();
        check_compat(&meta, CORE_VERSION)?;
        plugin.validate_options(&generator.options).map_err(|e| {
            SyncError::Config(format!(
                "invalid options for generator '{}': {e:#}",
                generator.generator
            ))
        })?;
        debug!(
            generator = %generator.generator,
            plugin = %meta.name,
            version = %meta.version,
            "plugin ready"
        );

        Ok(ConfiguredPlugin {
            generator: generator.generator.clone(),
            plugin,
            root_dir: self.config.generator_root(generator),
            options: generator.options.clone(),
        })
    }

    fn instantiate(&self, generator: &str) -> Result<Arc<dyn Plugin>, SyncError> {
        self.registry.instantiate(generator).ok_or_else(|| {
            SyncError::Config(format!(
                "unknown generator '{generator}' (available: {})",
                self.registry.available_generators().join(", ")
            ))
        })
    }

    /// Fetch a source and build its descriptors, outside of any sync run.
    pub async fn descriptors(&self, source_id: &str) -> Result<Vec<Descriptor>, SyncError> {
        let source = self
            .config
            .source(source_id)
            .ok_or_else(|| SyncError::Config(format!("unknown source '{source_id}'")))?;
        let document = self.resolver.resolve(source).await?;
        build_descriptors(&document, &source.id)
    }

    /// Documentation tabs a generator produces for one descriptor.
    ///
    /// `conflicts` must come from the same source's descriptors so endpoint
    /// tabs name the symbols a sync actually generates.
    pub fn documentation(
        &self,
        generator: &str,
        descriptor: &Descriptor,
        conflicts: &ConflictResolution,
    ) -> Result<Vec<DocumentationTab>, SyncError> {
        let plugin = self.instantiate(generator)?;
        Ok(documentation(plugin.as_ref(), descriptor, conflicts))
    }
}

/// Report `step` around `fut`, racing it against cancellation.
///
/// A panic inside `fut` ends the step with [`SyncError::Panicked`].
async fn run_step<T, F>(
    reporter: &StepReporter,
    cancel: &CancellationToken,
    step: Step,
    fut: F,
) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    let source_id = reporter.source_id().unwrap_or_default();
    reporter.started(step);
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled { step }),
        result = AssertUnwindSafe(fut).catch_unwind() => result.unwrap_or_else(|payload| {
            Err(SyncError::Panicked {
                source_id: source_id.to_string(),
                step,
                reason: panic_reason(payload.as_ref()),
            })
        }),
    };
    match &outcome {
        Ok(_) => reporter.success(step),
        Err(e) => {
            warn!(source = source_id, %step, error = %e, "step failed");
            reporter.error(step, e.to_string());
        }
    }
    outcome
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

async fn run_source(
    shared: Arc<RunShared>,
    source: SourceConfig,
    reporter: StepReporter,
    cancel: CancellationToken,
) -> SourceReport {
    info!(source = %source.id, spec = %source.spec_url, "syncing source");

    let prepared = async {
        let fetch = shared.resolver.resolve(&source);
        let document = run_step(&reporter, &cancel, Step::FetchingSpec, fetch).await?;
        let descriptors = run_step(&reporter, &cancel, Step::BuildingDescriptors, async {
            build_descriptors(&document, &source.id)
        })
        .await?;
        let conflicts = run_step(&reporter, &cancel, Step::ResolvingConflicts, async {
            resolve_conflicts(&descriptors)
        })
        .await?;
        Ok::<_, SyncError>((descriptors, conflicts))
    }
    .await;

    let (descriptors, conflicts) = match prepared {
        Ok(prepared) => prepared,
        Err(_) => return SourceReport::failed(&source.id),
    };
    debug!(
        source = %source.id,
        descriptors = descriptors.len(),
        conflicting = conflicts.conflicting_operation_ids().len(),
        postfixed = conflicts.postfixes().len(),
        "descriptors ready"
    );

    let mut stats = StatsCounter::new(&source.id);
    let generated = run_step(
        &reporter,
        &cancel,
        Step::Generating,
        generate_all(&shared.plugins, &source, &descriptors, &conflicts, &mut stats),
    )
    .await;

    let stats = match &generated {
        Err(SyncError::Cancelled { .. }) => None,
        _ => Some(stats.snapshot()),
    };
    SourceReport {
        source_id: source.id,
        success: generated.is_ok(),
        stats,
    }
}

/// Run every plugin in configured order; one failing or panicking plugin
/// does not stop the others, but fails the source.
async fn generate_all(
    plugins: &[ConfiguredPlugin],
    source: &SourceConfig,
    descriptors: &[Descriptor],
    conflicts: &ConflictResolution,
    stats: &mut StatsCounter,
) -> Result<(), SyncError> {
    let mut failed = Vec::new();
    let mut reasons = Vec::new();

    for configured in plugins {
        let mut ctx = GenerationContext {
            root_dir: &configured.root_dir,
            source,
            stats: &mut *stats,
            conflicts,
            options: &configured.options,
        };
        let generated = AssertUnwindSafe(configured.plugin.generate(descriptors, &mut ctx))
            .catch_unwind()
            .await;
        let reason = match generated {
            Ok(Ok(())) => {
                debug!(source = %source.id, generator = %configured.generator, "generated");
                continue;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => format!("panicked: {}", panic_reason(payload.as_ref())),
        };
        warn!(
            source = %source.id,
            generator = %configured.generator,
            error = %reason,
            "generation failed"
        );
        failed.push(configured.generator.clone());
        reasons.push(format!("{}: {reason}", configured.generator));
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(SyncError::PluginGeneration {
            plugin: failed.join(", "),
            source_id: source.id.clone(),
            reason: reasons.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{channel, StepStatus, SyncEvent};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StaticResolver(Value);

    #[async_trait]
    impl SpecResolver for StaticResolver {
        async fn resolve(&self, _source: &SourceConfig) -> Result<Value, SyncError> {
            Ok(self.0.clone())
        }
    }

    struct PanickingResolver;

    #[async_trait]
    impl SpecResolver for PanickingResolver {
        async fn resolve(&self, _source: &SourceConfig) -> Result<Value, SyncError> {
            panic!("resolver bug")
        }
    }

    fn config(root: &std::path::Path) -> ProjectConfig {
        ProjectConfig {
            root_dir: root.to_path_buf(),
            sources: vec![SourceConfig {
                id: "petstore".into(),
                name: "Petstore".into(),
                spec_url: "https://ex/a.json".into(),
            }],
            generators: vec![GeneratorConfig::new("react")],
            ..ProjectConfig::default()
        }
    }

    fn document() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "Petstore", "version": "1"},
            "paths": {"/pets": {"get": {
                "operationId": "listPets",
                "responses": {"200": {"description": "ok"}}
            }}}
        })
    }

    fn steps(events: &[SyncEvent]) -> Vec<(Step, StepStatus)> {
        events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::Status { step, status, .. } => Some((*step, *status)),
                SyncEvent::Done { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn successful_run_walks_every_step_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            config(dir.path()),
            PluginRegistry::builtin(),
            Arc::new(StaticResolver(document())),
        );
        let (tx, rx) = channel();
        let report = orchestrator.sync(tx, CancellationToken::new()).await;
        let events = rx.collect().await;

        assert!(report.success);
        assert_eq!(
            steps(&events),
            vec![
                (Step::ResolvingConfig, StepStatus::Started),
                (Step::ResolvingConfig, StepStatus::Success),
                (Step::FetchingSpec, StepStatus::Started),
                (Step::FetchingSpec, StepStatus::Success),
                (Step::BuildingDescriptors, StepStatus::Started),
                (Step::BuildingDescriptors, StepStatus::Success),
                (Step::ResolvingConflicts, StepStatus::Started),
                (Step::ResolvingConflicts, StepStatus::Success),
                (Step::Generating, StepStatus::Started),
                (Step::Generating, StepStatus::Success),
            ]
        );
        assert_eq!(events.last(), Some(&SyncEvent::Done { success: true }));
        let stats = report.source("petstore").unwrap().stats.as_ref().unwrap();
        assert_eq!(stats.get("Endpoints"), 1);
    }

    #[tokio::test]
    async fn unknown_generator_fails_config_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.generators = vec![GeneratorConfig::new("angular")];
        let resolver = Arc::new(StaticResolver(document()));
        let orchestrator = Orchestrator::new(config, PluginRegistry::builtin(), resolver);
        let (tx, rx) = channel();
        let report = orchestrator.sync(tx, CancellationToken::new()).await;
        let events = rx.collect().await;

        assert!(!report.success);
        assert!(report.sources.is_empty());
        assert_eq!(events.len(), 3);
        match &events[1] {
            SyncEvent::Status { status, source_id, error, .. } => {
                assert_eq!(*status, StepStatus::Error);
                assert!(source_id.is_none());
                assert!(error.as_deref().unwrap().contains("unknown generator 'angular'"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(events[2], SyncEvent::Done { success: false });
    }

    #[tokio::test]
    async fn invalid_plugin_options_are_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.generators[0].options = json!({"nope": 1});
        let resolver = Arc::new(StaticResolver(document()));
        let orchestrator = Orchestrator::new(config, PluginRegistry::builtin(), resolver);
        let (tx, rx) = channel();
        orchestrator.sync(tx, CancellationToken::new()).await;
        let events = rx.collect().await;
        assert_eq!(
            steps(&events),
            vec![
                (Step::ResolvingConfig, StepStatus::Started),
                (Step::ResolvingConfig, StepStatus::Error),
            ]
        );
    }

    #[tokio::test]
    async fn panicking_step_becomes_an_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let orchestrator =
            Orchestrator::new(config, PluginRegistry::builtin(), Arc::new(PanickingResolver));
        let (tx, rx) = channel();
        let report = orchestrator.sync(tx, CancellationToken::new()).await;
        let events = rx.collect().await;

        assert!(!report.success);
        assert_eq!(report.sources[0].stats, None);
        assert_eq!(
            steps(&events)[2..],
            [
                (Step::FetchingSpec, StepStatus::Started),
                (Step::FetchingSpec, StepStatus::Error),
            ]
        );
        match &events[events.len() - 2] {
            SyncEvent::Status { error: Some(error), .. } => {
                assert!(error.contains("FETCHING_SPEC panicked for source 'petstore'"));
                assert!(error.contains("resolver bug"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(events.last(), Some(&SyncEvent::Done { success: false }));
    }

    #[tokio::test]
    async fn documentation_is_available_without_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            config(dir.path()),
            PluginRegistry::builtin(),
            Arc::new(StaticResolver(document())),
        );
        let descriptors = orchestrator.descriptors("petstore").await.unwrap();
        let conflicts = resolve_conflicts(&descriptors).unwrap();
        let tabs = orchestrator
            .documentation("nest", &descriptors[0], &conflicts)
            .unwrap();
        assert_eq!(tabs[0].name, "Usage");
        assert!(matches!(
            orchestrator.documentation("vue", &descriptors[0], &conflicts),
            Err(SyncError::Config(_))
        ));
        assert!(orchestrator.descriptors("missing").await.is_err());
        assert!(!dir.path().join("petstore").exists());
    }
}
