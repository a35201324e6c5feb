//! Ordered progress events for a sync run.
//!
//! The orchestrator is the only writer. Source units receive a [`StepReporter`]
//! that can emit step status only; the terminal [`SyncEvent::Done`] can only be
//! produced by [`ProgressSender::done`], which consumes the sender, so a run
//! emits it at most once and nothing can follow it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Pipeline step a status event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    ResolvingConfig,
    FetchingSpec,
    BuildingDescriptors,
    ResolvingConflicts,
    Generating,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ResolvingConfig => "RESOLVING_CONFIG",
            Step::FetchingSpec => "FETCHING_SPEC",
            Step::BuildingDescriptors => "BUILDING_DESCRIPTORS",
            Step::ResolvingConflicts => "RESOLVING_CONFLICTS",
            Step::Generating => "GENERATING",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncEvent {
    Status {
        status: StepStatus,
        /// `None` for project-wide steps such as [`Step::ResolvingConfig`].
        #[serde(rename = "sourceId", skip_serializing_if = "Option::is_none")]
        source_id: Option<String>,
        step: Step,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Done {
        success: bool,
    },
}

impl SyncEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, SyncEvent::Done { .. })
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Owning end of the channel. Emits the terminal event.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ProgressSender {
    /// Status-only handle for one unit of work.
    pub fn reporter(&self, source_id: Option<&str>) -> StepReporter {
        StepReporter {
            tx: self.tx.clone(),
            source_id: source_id.map(str::to_string),
        }
    }

    /// Emit the terminal event and close this end of the channel.
    ///
    /// Callers must drop every [`StepReporter`] first; the orchestrator does so
    /// by joining all source units before calling this.
    pub fn done(self, success: bool) {
        send(&self.tx, SyncEvent::Done { success });
    }
}

/// Emits step status for a single source (or for the project as a whole).
#[derive(Debug, Clone)]
pub struct StepReporter {
    tx: mpsc::UnboundedSender<SyncEvent>,
    source_id: Option<String>,
}

impl StepReporter {
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn started(&self, step: Step) {
        self.emit(StepStatus::Started, step, None);
    }

    pub fn success(&self, step: Step) {
        self.emit(StepStatus::Success, step, None);
    }

    pub fn error(&self, step: Step, detail: impl Into<String>) {
        self.emit(StepStatus::Error, step, Some(detail.into()));
    }

    fn emit(&self, status: StepStatus, step: Step, error: Option<String>) {
        send(
            &self.tx,
            SyncEvent::Status {
                status,
                source_id: self.source_id.clone(),
                step,
                error,
            },
        );
    }
}

fn send(tx: &mpsc::UnboundedSender<SyncEvent>, event: SyncEvent) {
    // A vanished consumer must not stop generation.
    if tx.send(event).is_err() {
        debug!("progress receiver dropped, event discarded");
    }
}

/// Consuming end of the channel.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl ProgressReceiver {
    /// Next event, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        self.rx.recv().await
    }

    /// Drain events until the terminal event (inclusive) or channel close.
    pub async fn collect(mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            let done = event.is_done();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }
}
