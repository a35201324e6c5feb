//! Synchronizes OpenAPI documents into framework-specific bindings.
//!
//! A sync resolves each configured source, normalizes it into descriptors,
//! disambiguates colliding operation names and hands the result to the
//! configured generator plugins, streaming [`progress::SyncEvent`]s as it goes.

pub mod config;
pub mod conflicts;
pub mod descriptors;
pub mod error;
pub mod orchestrator;
pub mod plugins;
pub mod progress;
pub mod resolver;
pub mod stats;
pub mod workflow;

pub use error::SyncError;
pub use orchestrator::{Orchestrator, SourceReport, SyncReport};
pub use plugins::{Plugin, PluginRegistry};
pub use progress::{channel, ProgressReceiver, ProgressSender, Step, StepStatus, SyncEvent};
pub use resolver::{DefaultSpecResolver, SpecResolver};
pub use stats::{StatsCounter, StatsSnapshot};
