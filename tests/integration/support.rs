//! Shared mocks and fixtures for completion-stage integration tests.
#![allow(dead_code)]

use lintel::artifact::{Artifact, ArtifactValue, FileMetadata};
use lintel::causes::Cause;
use lintel::completion::CompletionEvaluator;
use lintel::config::LintelConfig;
use lintel::context::CompletionContext;
use lintel::desired::{OutputGroupContext, OutputGroupRequest, TopLevelObject};
use lintel::engine::{ActionFailure, ArtifactBatch, CompletionKey, Environment, FetchOutcome};
use lintel::error::{ExitCode, ExitDetail, ValidationError};
use lintel::metrics::ArtifactMetrics;
use lintel::report::{CompletionEventData, Diagnostic, StoredEvent, TargetCompletor};
use lintel::types::{digest_bytes, ActionId, Label};
use lintel::validator::{LostOutputs, MetadataProvider, OutputValidator};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn label() -> Label {
    Label::new("//pkg:lib")
}

pub fn derived(path: &str) -> Arc<Artifact> {
    Arc::new(Artifact::derived(
        path,
        label(),
        ActionId::new(format!("gen {path}")),
    ))
}

pub fn source(path: &str) -> Arc<Artifact> {
    Arc::new(Artifact::source(path, label()))
}

pub fn tree(path: &str) -> Arc<Artifact> {
    Arc::new(Artifact::tree(path, label(), ActionId::new(format!("tree {path}"))))
}

pub fn fileset(path: &str) -> Arc<Artifact> {
    Arc::new(Artifact::fileset(path, label(), ActionId::new(format!("fs {path}"))))
}

pub fn file_value(path: &str, size: u64) -> FetchOutcome {
    FetchOutcome::Value(ArtifactValue::File(FileMetadata::local(
        digest_bytes(path.as_bytes()),
        size,
    )))
}

pub fn remote_file_value(path: &str, size: u64) -> FetchOutcome {
    FetchOutcome::Value(ArtifactValue::File(FileMetadata::remote(
        digest_bytes(path.as_bytes()),
        size,
    )))
}

pub fn missing_source(path: &str) -> FetchOutcome {
    FetchOutcome::SourceMissing(ExitDetail::new(
        ExitCode::SourceArtifactMissing,
        format!("missing input file '{path}'"),
    ))
}

pub fn action_failed(message: &str, catastrophic: bool) -> FetchOutcome {
    let detail = ExitDetail::new(ExitCode::ActionFailed, message);
    FetchOutcome::ActionFailed(ActionFailure {
        root_causes: vec![Cause::action_failed(label(), detail.clone(), catastrophic)],
        detail,
        catastrophic,
    })
}

/// Top-level object with one artifact list per named output group.
pub fn object(groups: &[(&str, Vec<Arc<Artifact>>)]) -> TopLevelObject {
    let output_groups: BTreeMap<String, Vec<Arc<Artifact>>> = groups
        .iter()
        .map(|(name, artifacts)| (name.to_string(), artifacts.clone()))
        .collect();
    TopLevelObject {
        label: label(),
        location: None,
        output_groups,
        baseline_coverage: None,
    }
}

pub fn request_for(groups: &[OutputGroupRequest]) -> CompletionKey {
    CompletionKey::new(
        label(),
        OutputGroupContext {
            groups: groups.to_vec(),
            expand_filesets: true,
        },
    )
}

pub fn default_request() -> CompletionKey {
    request_for(&[OutputGroupRequest::visible("default")])
}

pub fn evaluator(metrics: Arc<ArtifactMetrics>) -> CompletionEvaluator<TargetCompletor> {
    CompletionEvaluator::new(TargetCompletor, LintelConfig::default(), metrics)
}

/// Engine stand-in with scripted dependency outcomes.
///
/// Tracks `values_missing` the way the engine does: any lookup that came back
/// not-ready flips it for the remainder of the attempt.
pub struct MockEnv {
    pub workspace: Option<String>,
    pub objects: HashMap<Label, Arc<TopLevelObject>>,
    pub outcomes: HashMap<String, FetchOutcome>,
    pub bubbling: bool,
    pub interrupt_on_post: bool,
    interrupt: AtomicBool,
    missing: AtomicBool,
    events: Mutex<Vec<CompletionEventData>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl MockEnv {
    pub fn new(object: TopLevelObject) -> Self {
        let mut objects = HashMap::new();
        objects.insert(object.label.clone(), Arc::new(object));
        MockEnv {
            workspace: Some("workspace".to_string()),
            objects,
            outcomes: HashMap::new(),
            bubbling: false,
            interrupt_on_post: false,
            interrupt: AtomicBool::new(false),
            missing: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    pub fn resolve(&mut self, path: &str, outcome: FetchOutcome) {
        self.outcomes.insert(path.to_string(), outcome);
    }

    pub fn set_interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn interrupt_pending(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<CompletionEventData> {
        self.events.lock().clone()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }
}

impl Environment for MockEnv {
    fn workspace_name(&self) -> Option<String> {
        if self.workspace.is_none() {
            self.missing.store(true, Ordering::SeqCst);
        }
        self.workspace.clone()
    }

    fn exec_root(&self) -> String {
        "/exec".to_string()
    }

    fn top_level_object(&self, label: &Label) -> Option<Arc<TopLevelObject>> {
        let found = self.objects.get(label).cloned();
        if found.is_none() {
            self.missing.store(true, Ordering::SeqCst);
        }
        found
    }

    fn fetch_artifacts(&self, artifacts: &[Arc<Artifact>]) -> ArtifactBatch {
        let mut batch = ArtifactBatch::default();
        for artifact in artifacts {
            match self.outcomes.get(&artifact.exec_path) {
                Some(FetchOutcome::NotReady) | None => {
                    self.missing.store(true, Ordering::SeqCst);
                }
                Some(outcome) => {
                    batch.insert(artifact.exec_path.as_str(), outcome.clone());
                }
            }
        }
        batch
    }

    fn values_missing(&self) -> bool {
        self.missing.load(Ordering::SeqCst)
    }

    fn in_error_bubbling(&self) -> bool {
        self.bubbling
    }

    fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::SeqCst)
    }

    fn raise_interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    fn post(&self, event: StoredEvent) {
        assert!(event.replayable());
        self.events.lock().push(event.into_data());
        if self.interrupt_on_post {
            self.interrupt.store(true, Ordering::SeqCst);
        }
    }

    fn handle(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }
}

/// Validator that reports the configured losses on every call, as long as the
/// owning artifact is among the candidates.
pub struct StaticLossValidator {
    lose: Vec<(String, Arc<Artifact>)>,
}

impl StaticLossValidator {
    pub fn new(lose: Vec<(String, Arc<Artifact>)>) -> Self {
        StaticLossValidator { lose }
    }
}

impl OutputValidator for StaticLossValidator {
    fn validate(
        &self,
        candidates: &[Arc<Artifact>],
        _ctx: &CompletionContext,
        metadata: &dyn MetadataProvider,
    ) -> Result<LostOutputs, ValidationError> {
        let mut lost = LostOutputs::default();
        for (path, owner) in &self.lose {
            if candidates.iter().any(|c| c.exec_path == owner.exec_path) {
                let digest = metadata
                    .metadata_for(path)
                    .map(|m| m.digest)
                    .unwrap_or_default();
                lost.record(path.clone(), digest, [owner.clone()]);
            }
        }
        Ok(lost)
    }
}

/// Validator that reports the configured losses once, then nothing: the
/// shape of a loss that a successful rewind repaired.
pub struct LoseOnceValidator {
    lose: Mutex<Vec<(String, Arc<Artifact>)>>,
}

impl LoseOnceValidator {
    pub fn new(lose: Vec<(String, Arc<Artifact>)>) -> Self {
        LoseOnceValidator {
            lose: Mutex::new(lose),
        }
    }
}

impl OutputValidator for LoseOnceValidator {
    fn validate(
        &self,
        _candidates: &[Arc<Artifact>],
        _ctx: &CompletionContext,
        metadata: &dyn MetadataProvider,
    ) -> Result<LostOutputs, ValidationError> {
        let mut lost = LostOutputs::default();
        for (path, owner) in self.lose.lock().drain(..) {
            let digest = metadata
                .metadata_for(&path)
                .map(|m| m.digest)
                .unwrap_or_default();
            lost.record(path, digest, [owner]);
        }
        Ok(lost)
    }
}

/// Validator that never loses anything but records the candidate sets it was
/// handed, for asserting what reached it.
#[derive(Default)]
pub struct RecordingValidator {
    pub seen: Mutex<Vec<Vec<String>>>,
}

impl OutputValidator for RecordingValidator {
    fn validate(
        &self,
        candidates: &[Arc<Artifact>],
        _ctx: &CompletionContext,
        _metadata: &dyn MetadataProvider,
    ) -> Result<LostOutputs, ValidationError> {
        self.seen
            .lock()
            .push(candidates.iter().map(|c| c.exec_path.clone()).collect());
        Ok(LostOutputs::default())
    }
}

/// Validator whose infrastructure is down.
pub struct FailingValidator;

impl OutputValidator for FailingValidator {
    fn validate(
        &self,
        _candidates: &[Arc<Artifact>],
        _ctx: &CompletionContext,
        _metadata: &dyn MetadataProvider,
    ) -> Result<LostOutputs, ValidationError> {
        Err(ValidationError::StoreUnreachable(
            "index host refused connection".to_string(),
        ))
    }
}
