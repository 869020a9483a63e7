//! Engine-facing seam: request keys, dependency lookups, and sinks.
//!
//! The evaluator never blocks a worker thread on an unresolved dependency;
//! lookups return not-ready and the attempt suspends cooperatively. The
//! engine reschedules the same key once more values are available.

use crate::artifact::{Artifact, ArtifactValue};
use crate::causes::Cause;
use crate::desired::{OutputGroupContext, TopLevelObject};
use crate::error::ExitDetail;
use crate::report::{Diagnostic, StoredEvent};
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable identity of one completion request: a top-level object plus the
/// output-group context it was requested under. Stable across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletionKey {
    pub label: Label,
    pub context: OutputGroupContext,
}

impl CompletionKey {
    pub fn new(label: Label, context: OutputGroupContext) -> Self {
        CompletionKey { label, context }
    }
}

/// Failure of the action that should have produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// Transitive root causes, in the order the failing action reported them.
    pub root_causes: Vec<Cause>,
    pub detail: ExitDetail,
    pub catastrophic: bool,
}

/// Per-artifact result of the batched dependency fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Dependency not computed yet; the attempt will suspend.
    NotReady,
    Value(ArtifactValue),
    /// A requested source input was never produced.
    SourceMissing(ExitDetail),
    ActionFailed(ActionFailure),
}

/// Batched fetch results keyed by artifact exec path.
///
/// A batch never aborts as a whole: each entry carries its own outcome, and
/// absent entries read as not-ready.
#[derive(Debug, Clone, Default)]
pub struct ArtifactBatch {
    outcomes: HashMap<String, FetchOutcome>,
}

impl ArtifactBatch {
    pub fn insert(&mut self, exec_path: impl Into<String>, outcome: FetchOutcome) {
        self.outcomes.insert(exec_path.into(), outcome);
    }

    pub fn outcome(&self, exec_path: &str) -> Option<&FetchOutcome> {
        self.outcomes.get(exec_path)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Handle the engine passes into each evaluation attempt.
///
/// Interrupts model engine-side cancellation: `take_interrupt` observes and
/// clears a pending interrupt, `raise_interrupt` re-arms it. The evaluator
/// defers a pending interrupt across mandatory event emission so a terminal
/// event is never half-delivered.
pub trait Environment {
    /// Workspace identity, or `None` while unresolved.
    fn workspace_name(&self) -> Option<String>;

    /// Execution root the attempt resolves artifact paths under.
    fn exec_root(&self) -> String;

    /// Top-level object for `label`, or `None` while unresolved.
    fn top_level_object(&self, label: &Label) -> Option<Arc<TopLevelObject>>;

    /// Batched metadata fetch with per-artifact outcomes.
    fn fetch_artifacts(&self, artifacts: &[Arc<Artifact>]) -> ArtifactBatch;

    /// Whether any lookup this attempt returned not-ready.
    fn values_missing(&self) -> bool;

    /// Whether the engine is bubbling an error in no-keep-going mode.
    fn in_error_bubbling(&self) -> bool;

    /// Observe and clear a pending interrupt.
    fn take_interrupt(&self) -> bool;

    /// Re-arm a previously taken interrupt for the engine to honor.
    fn raise_interrupt(&self);

    /// Deliver a terminal event. Consumes the event; the engine buffers it
    /// for deferred replay.
    fn post(&self, event: StoredEvent);

    /// Deliver a diagnostic message, plain or location-tagged.
    fn handle(&self, diagnostic: Diagnostic);
}
