use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use openapi_sync::config::{load_config, merge_with_cli_args, LoadedConfig, SourceConfig};
use openapi_sync::conflicts::resolve_conflicts;
use openapi_sync::descriptors::Descriptor;
use openapi_sync::progress::{channel, ProgressReceiver, StepStatus, SyncEvent};
use openapi_sync::{workflow, DefaultSpecResolver, Orchestrator, PluginRegistry, SyncReport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file (overrides default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline internals to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Regenerate bindings for every configured source
    Sync {
        /// Output root for generated code
        #[arg(long)]
        root_dir: Option<PathBuf>,

        /// Number of sources processed at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Abort the sync after this many seconds
        #[arg(long = "timeout")]
        timeout_secs: Option<u64>,

        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show documentation tabs for one descriptor
    Docs {
        #[arg(long)]
        source: String,

        #[arg(long)]
        descriptor: String,

        /// Generator whose documentation to show; defaults to the first enabled one
        #[arg(long)]
        generator: Option<String>,
    },
    /// Create a config file and initialise generators
    Init {
        /// Generators to enable
        #[arg(short, long = "generator", required = true)]
        generators: Vec<String>,

        #[arg(long)]
        root_dir: Option<PathBuf>,
    },
    /// Add an OpenAPI source to the project
    AddSource {
        #[arg(long)]
        id: String,

        /// Display name; defaults to the id
        #[arg(long)]
        name: Option<String>,

        /// URL or path of the OpenAPI document
        #[arg(long)]
        spec_url: String,
    },
    /// Remove a source from the project
    RemoveSource { id: String },
    /// List descriptor ids of a source
    List {
        #[arg(long)]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(openapi_sync::config::loader::DEFAULT_CONFIG_PATH));
    let registry = PluginRegistry::builtin();

    match args.command {
        Command::Sync {
            root_dir,
            concurrency,
            timeout_secs,
            json,
        } => {
            let loaded = load_config(args.config.as_deref())?;
            sync(loaded, root_dir, concurrency, timeout_secs, json, registry).await
        }
        Command::Docs {
            source,
            descriptor,
            generator,
        } => {
            let loaded = load_config(args.config.as_deref())?;
            docs(loaded, &source, &descriptor, generator, registry).await
        }
        Command::Init { generators, root_dir } => {
            let hints =
                workflow::init_project(&config_path, &generators, root_dir, &registry).await?;
            println!("✅ Created {:?}", config_path);
            for hint in hints {
                println!("👉 {hint}");
            }
            Ok(())
        }
        Command::AddSource { id, name, spec_url } => {
            let source = SourceConfig {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                spec_url,
            };
            let id = source.id.clone();
            workflow::add_source(&config_path, source, &registry).await?;
            println!("✅ Added source '{id}'");
            Ok(())
        }
        Command::RemoveSource { id } => {
            workflow::remove_source(&config_path, &id, &registry).await?;
            println!("🗑️  Removed source '{id}'");
            Ok(())
        }
        Command::List { source } => {
            let loaded = load_config(args.config.as_deref())?;
            let orchestrator = orchestrator(loaded.config, registry);
            for descriptor in orchestrator.descriptors(&source).await? {
                println!("{}", descriptor.id());
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();
}

fn orchestrator(
    config: openapi_sync::config::ProjectConfig,
    registry: PluginRegistry,
) -> Orchestrator {
    Orchestrator::new(config, registry, Arc::new(DefaultSpecResolver::new()))
}

async fn sync(
    loaded: LoadedConfig,
    root_dir: Option<PathBuf>,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
    json: bool,
    registry: PluginRegistry,
) -> Result<()> {
    let project_dir = workflow::project_dir(&loaded.path);
    let config = merge_with_cli_args(loaded.config, root_dir, concurrency, timeout_secs);
    let orchestrator = orchestrator(config, registry.clone());

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling sync");
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = channel();
    let printer = tokio::spawn(print_events(rx, json));
    let report = orchestrator.sync(tx, cancel).await;
    ctrl_c.abort();
    printer.await.context("Progress printer failed")?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_stats(&report);
    }

    if !report.success {
        bail!("Sync failed");
    }

    workflow::post_build(orchestrator.config(), &project_dir, &registry).await?;
    Ok(())
}

async fn print_events(mut rx: ProgressReceiver, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize event"),
            }
        } else {
            print_event(&event);
        }
        if event.is_done() {
            break;
        }
    }
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Status {
            status,
            source_id,
            step,
            error,
        } => {
            let scope = source_id.as_deref().unwrap_or("project");
            match status {
                StepStatus::Started => println!("⏳ [{scope}] {step}"),
                StepStatus::Success => println!("✅ [{scope}] {step}"),
                StepStatus::Error => {
                    println!("❌ [{scope}] {step}: {}", error.as_deref().unwrap_or("failed"))
                }
            }
        }
        SyncEvent::Done { success: true } => println!("🎉 Sync complete"),
        SyncEvent::Done { success: false } => println!("⚠️  Sync finished with errors"),
    }
}

fn print_stats(report: &SyncReport) {
    for source in &report.sources {
        let Some(stats) = &source.stats else {
            continue;
        };
        println!("\n📊 {}", source.source_id);
        let width = stats.counts.keys().map(|k| k.len()).max().unwrap_or(0);
        for (category, count) in &stats.counts {
            println!("   {category:<width$}  {count:>6}");
        }
    }
}

async fn docs(
    loaded: LoadedConfig,
    source_id: &str,
    descriptor_id: &str,
    generator: Option<String>,
    registry: PluginRegistry,
) -> Result<()> {
    let generator = match generator {
        Some(generator) => generator,
        None => loaded
            .config
            .enabled_generators()
            .next()
            .map(|g| g.generator.clone())
            .context("No enabled generator configured; pass --generator")?,
    };
    let orchestrator = orchestrator(loaded.config, registry);

    let descriptors = orchestrator.descriptors(source_id).await?;
    let descriptor: &Descriptor = descriptors
        .iter()
        .find(|d| d.id() == descriptor_id)
        .with_context(|| {
            format!("Descriptor '{descriptor_id}' not found in source '{source_id}'")
        })?;
    let conflicts = resolve_conflicts(&descriptors)?;

    for tab in orchestrator.documentation(&generator, descriptor, &conflicts)? {
        println!("── {} ({}) ──", tab.name, tab.language);
        println!("{}", tab.content);
    }
    Ok(())
}
