//! Result reporting: completion flavors and replay-stored terminal events.
//!
//! Different top-level result kinds (targets, aspects) shape their events
//! differently; the evaluator stays generic and dispatches through the
//! `Completor` capability instead of knowing the kinds.

use crate::artifact::Artifact;
use crate::causes::{Cause, RootCauses};
use crate::context::CompletionContext;
use crate::desired::{DesiredArtifacts, TopLevelObject};
use crate::engine::CompletionKey;
use crate::types::Location;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A diagnostic message, optionally anchored to a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub location: Option<Location>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            location: None,
            message: message.into(),
        }
    }

    pub fn at(location: Location, message: impl Into<String>) -> Self {
        Diagnostic {
            location: Some(location),
            message: message.into(),
        }
    }
}

/// Prefix for synthesized failure messages: a real source span when the
/// object has one, its label otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationId {
    Span(Location),
    Prefix(String),
}

/// Per-cause summary carried in failure events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CauseSummary {
    pub label: String,
    pub message: String,
    pub catastrophic: bool,
}

impl From<&Cause> for CauseSummary {
    fn from(cause: &Cause) -> Self {
        CauseSummary {
            label: cause.label.to_string(),
            message: cause.detail.message.clone(),
            catastrophic: cause.is_catastrophic(),
        }
    }
}

/// Payload of a terminal completion event.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionEventData {
    pub ts: String,
    pub label: String,
    pub kind: String,
    pub success: bool,
    /// Output group -> built artifact exec paths. On success this is the
    /// user-visible groups; on failure, the built subset only.
    pub output_groups: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<CauseSummary>,
}

impl CompletionEventData {
    fn with_now(
        label: &CompletionKey,
        kind: impl Into<String>,
        success: bool,
        output_groups: BTreeMap<String, Vec<String>>,
        causes: Vec<CauseSummary>,
    ) -> Self {
        CompletionEventData {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            label: label.label.to_string(),
            kind: kind.into(),
            success,
            output_groups,
            causes,
        }
    }
}

/// A terminal event the engine must buffer for deferred replay.
///
/// Construction is what marks the event stored, and the value is single-use:
/// it is consumed by `Environment::post`, so a branch that creates an event
/// and forgets to deliver it does not compile past the `must_use` lint and
/// has nothing else it can do with the value.
#[derive(Debug)]
#[must_use = "stored events must be posted on the same control-flow path"]
pub struct StoredEvent {
    data: CompletionEventData,
}

impl StoredEvent {
    fn new(data: CompletionEventData) -> Self {
        StoredEvent { data }
    }

    pub fn data(&self) -> &CompletionEventData {
        &self.data
    }

    pub fn into_data(self) -> CompletionEventData {
        self.data
    }

    /// Always true; the replay marking is a construction invariant rather
    /// than a flag that could be left unset.
    pub fn replayable(&self) -> bool {
        true
    }
}

/// Completion flavor: how one result kind shapes its events and value.
pub trait Completor: Send + Sync {
    type Value;

    /// Diagnostic reporting an absent input artifact.
    fn root_cause_error(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        cause: &Cause,
    ) -> Diagnostic;

    /// Prefix for the synthesized failure message.
    fn location_identifier(&self, key: &CompletionKey, object: &TopLevelObject) -> LocationId;

    /// Failed completion event over the built subset.
    fn failed(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        causes: &RootCauses,
        ctx: &CompletionContext,
        built_groups: &BTreeMap<String, Vec<Arc<Artifact>>>,
    ) -> StoredEvent;

    /// Succeeded completion event over the user-visible groups.
    fn succeeded(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        ctx: &CompletionContext,
        desired: &DesiredArtifacts,
    ) -> StoredEvent;

    /// Flavor-specific completion value for a successful attempt.
    fn value(&self) -> Self::Value;
}

fn group_paths(groups: &BTreeMap<String, Vec<Arc<Artifact>>>) -> BTreeMap<String, Vec<String>> {
    groups
        .iter()
        .map(|(name, artifacts)| {
            (
                name.clone(),
                artifacts.iter().map(|a| a.exec_path.clone()).collect(),
            )
        })
        .collect()
}

fn visible_group_paths(desired: &DesiredArtifacts) -> BTreeMap<String, Vec<String>> {
    desired
        .by_group
        .iter()
        .filter(|(_, group)| group.user_visible)
        .map(|(name, group)| {
            (
                name.clone(),
                group.artifacts.iter().map(|a| a.exec_path.clone()).collect(),
            )
        })
        .collect()
}

fn cause_summaries(causes: &RootCauses) -> Vec<CauseSummary> {
    causes.iter().map(CauseSummary::from).collect()
}

/// Target completion flavor.
#[derive(Debug, Default)]
pub struct TargetCompletor;

/// Marker value for a completed target request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCompletionValue;

impl Completor for TargetCompletor {
    type Value = TargetCompletionValue;

    fn root_cause_error(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        cause: &Cause,
    ) -> Diagnostic {
        match &object.location {
            Some(location) => Diagnostic::at(location.clone(), cause.detail.message.clone()),
            None => Diagnostic::error(format!("{} {}", key.label, cause.detail.message)),
        }
    }

    fn location_identifier(&self, key: &CompletionKey, object: &TopLevelObject) -> LocationId {
        match &object.location {
            Some(location) => LocationId::Span(location.clone()),
            None => LocationId::Prefix(key.label.to_string()),
        }
    }

    fn failed(
        &self,
        key: &CompletionKey,
        _object: &TopLevelObject,
        causes: &RootCauses,
        _ctx: &CompletionContext,
        built_groups: &BTreeMap<String, Vec<Arc<Artifact>>>,
    ) -> StoredEvent {
        StoredEvent::new(CompletionEventData::with_now(
            key,
            "target-complete",
            false,
            group_paths(built_groups),
            cause_summaries(causes),
        ))
    }

    fn succeeded(
        &self,
        key: &CompletionKey,
        _object: &TopLevelObject,
        _ctx: &CompletionContext,
        desired: &DesiredArtifacts,
    ) -> StoredEvent {
        StoredEvent::new(CompletionEventData::with_now(
            key,
            "target-complete",
            true,
            visible_group_paths(desired),
            Vec::new(),
        ))
    }

    fn value(&self) -> TargetCompletionValue {
        TargetCompletionValue
    }
}

/// Aspect completion flavor. Events carry the aspect name so transports can
/// distinguish them from the underlying target's own completion.
#[derive(Debug)]
pub struct AspectCompletor {
    pub aspect: String,
}

impl AspectCompletor {
    pub fn new(aspect: impl Into<String>) -> Self {
        AspectCompletor {
            aspect: aspect.into(),
        }
    }

    fn prefix(&self, key: &CompletionKey) -> String {
        format!("{} ({})", key.label, self.aspect)
    }
}

/// Marker value for a completed aspect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectCompletionValue;

impl Completor for AspectCompletor {
    type Value = AspectCompletionValue;

    fn root_cause_error(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        cause: &Cause,
    ) -> Diagnostic {
        match &object.location {
            Some(location) => Diagnostic::at(location.clone(), cause.detail.message.clone()),
            None => Diagnostic::error(format!("{} {}", self.prefix(key), cause.detail.message)),
        }
    }

    fn location_identifier(&self, key: &CompletionKey, object: &TopLevelObject) -> LocationId {
        match &object.location {
            Some(location) => LocationId::Span(location.clone()),
            None => LocationId::Prefix(self.prefix(key)),
        }
    }

    fn failed(
        &self,
        key: &CompletionKey,
        _object: &TopLevelObject,
        causes: &RootCauses,
        _ctx: &CompletionContext,
        built_groups: &BTreeMap<String, Vec<Arc<Artifact>>>,
    ) -> StoredEvent {
        StoredEvent::new(CompletionEventData::with_now(
            key,
            format!("aspect-complete/{}", self.aspect),
            false,
            group_paths(built_groups),
            cause_summaries(causes),
        ))
    }

    fn succeeded(
        &self,
        key: &CompletionKey,
        _object: &TopLevelObject,
        _ctx: &CompletionContext,
        desired: &DesiredArtifacts,
    ) -> StoredEvent {
        StoredEvent::new(CompletionEventData::with_now(
            key,
            format!("aspect-complete/{}", self.aspect),
            true,
            visible_group_paths(desired),
            Vec::new(),
        ))
    }

    fn value(&self) -> AspectCompletionValue {
        AspectCompletionValue
    }
}
