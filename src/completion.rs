//! Completion evaluation: the suspend/resume step that closes out a build
//! request.
//!
//! One attempt resolves the desired artifact set, classifies every artifact,
//! aggregates root causes, validates that already-built important outputs are
//! still retrievable, and either reports a terminal event or asks the engine
//! to rewind or re-invoke. All working state is freshly allocated per
//! invocation, so re-invoking the same key with more dependencies resolved
//! converges to the same aggregate state as a single fully-resolved call.

use crate::artifact::{Artifact, ArtifactValue};
use crate::causes::{source_error_summary, Cause, RootCauses};
use crate::config::LintelConfig;
use crate::context::{CompletionContext, ContextBuilder};
use crate::desired::{desired_artifacts, filter_built_groups, DesiredArtifacts, TopLevelObject};
use crate::engine::{CompletionKey, Environment, FetchOutcome};
use crate::error::{CompletionError, ExitDetail};
use crate::metrics::ArtifactMetrics;
use crate::prefetch::{ensure_top_level_outputs, OutputChecker, Prefetcher, TrustAll};
use crate::report::{Completor, Diagnostic, LocationId};
use crate::rewind::{ActionRewind, RewindCoordinator, RewindPlan};
use crate::types::digest_hex;
use crate::validator::{validation_candidates, OutputValidator};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one evaluation attempt that did not fail the attempt.
#[derive(Debug)]
pub enum Completion<V> {
    /// Terminal success with the flavor-specific completion value.
    Done(V),
    /// Re-invoke later, once more dependency values are available.
    Suspend,
    /// Rewind: invalidate the plan's actions, then re-evaluate.
    Reset(RewindPlan),
}

/// Orchestrates one suspend/resume completion step for a result flavor.
pub struct CompletionEvaluator<C: Completor> {
    completor: C,
    config: LintelConfig,
    metrics: Arc<ArtifactMetrics>,
    validator: Option<Arc<dyn OutputValidator>>,
    rewinder: Arc<dyn RewindCoordinator>,
    prefetcher: Option<Arc<dyn Prefetcher>>,
    output_checker: Arc<dyn OutputChecker>,
}

impl<C: Completor> CompletionEvaluator<C> {
    pub fn new(completor: C, config: LintelConfig, metrics: Arc<ArtifactMetrics>) -> Self {
        let rewinder = Arc::new(ActionRewind::new(config.rewind.attempt_limit));
        CompletionEvaluator {
            completor,
            config,
            metrics,
            validator: None,
            rewinder,
            prefetcher: None,
            output_checker: Arc::new(TrustAll),
        }
    }

    /// Register the important-output validator. Absent means skip
    /// validation and never rewind.
    pub fn with_validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_rewinder(mut self, rewinder: Arc<dyn RewindCoordinator>) -> Self {
        self.rewinder = rewinder;
        self
    }

    pub fn with_prefetcher(
        mut self,
        prefetcher: Arc<dyn Prefetcher>,
        output_checker: Arc<dyn OutputChecker>,
    ) -> Self {
        self.prefetcher = Some(prefetcher);
        self.output_checker = output_checker;
        self
    }

    /// Evaluate one attempt for `key`.
    ///
    /// Suspends with no side effects while the workspace identity or the
    /// top-level object are unresolved; otherwise classifies whatever did
    /// resolve, reports failures before suspending again, and reaches a
    /// terminal outcome only once everything is accounted for.
    pub async fn evaluate(
        &self,
        key: &CompletionKey,
        env: &dyn Environment,
    ) -> Result<Completion<C::Value>, CompletionError> {
        // An interrupt between suspension points stops the attempt before
        // any new side effects; error bubbling still proceeds so that known
        // failures get reported.
        if !env.in_error_bubbling() && env.take_interrupt() {
            return Err(CompletionError::Interrupted);
        }

        let Some(workspace) = env.workspace_name() else {
            return Ok(Completion::Suspend);
        };
        let Some(object) = env.top_level_object(&key.label) else {
            return Ok(Completion::Suspend);
        };

        let desired = desired_artifacts(&object, &key.context);
        let request = desired.to_request();
        let batch = env.fetch_artifacts(&request);

        let all_important = desired.all_important();
        let important_paths: HashSet<&str> = desired
            .important
            .iter()
            .map(|a| a.exec_path.as_str())
            .collect();

        let mut builder =
            ContextBuilder::new(env.exec_root(), workspace, key.context.expand_filesets);
        let mut causes = RootCauses::new();
        let mut built: HashSet<String> = HashSet::new();
        let mut first_action_failure: Option<(ExitDetail, bool)> = None;

        for artifact in &request {
            let Some(outcome) = batch.outcome(&artifact.exec_path) else {
                continue;
            };
            match outcome {
                FetchOutcome::NotReady => {}
                FetchOutcome::Value(value) => {
                    if desired.is_baseline_coverage(artifact) {
                        if let ArtifactValue::File(metadata) = value {
                            builder.set_baseline_coverage(metadata.clone());
                        }
                    }
                    built.insert(artifact.exec_path.clone());
                    let important =
                        all_important || important_paths.contains(artifact.exec_path.as_str());
                    builder.add(artifact, value, important);
                }
                FetchOutcome::SourceMissing(detail) => {
                    self.handle_source_error(
                        key,
                        &object,
                        artifact,
                        detail.clone(),
                        &mut causes,
                        env,
                    );
                }
                FetchOutcome::ActionFailed(failure) => {
                    if failure.root_causes.is_empty() {
                        causes.record(Cause::action_failed(
                            artifact.owner.clone(),
                            failure.detail.clone(),
                            failure.catastrophic,
                        ));
                    } else {
                        causes.extend(failure.root_causes.iter().cloned());
                    }
                    // Prefer a catastrophic failure as the one to propagate.
                    let replace = match &first_action_failure {
                        None => true,
                        Some((_, catastrophic)) => !catastrophic && failure.catastrophic,
                    };
                    if replace {
                        first_action_failure =
                            Some((failure.detail.clone(), failure.catastrophic));
                    }
                }
            }
        }

        let (ctx, attempt_metrics) = builder.finish();

        if !causes.is_empty() {
            let mut reset = None;
            if !built.is_empty() {
                // Error bubbling may interrupt at any moment; the interrupt
                // must not keep the built subset from being validated or the
                // failure event from being posted.
                let deferred_interrupt = env.in_error_bubbling() && env.take_interrupt();
                let candidates: Vec<Arc<Artifact>> = desired
                    .important
                    .iter()
                    .filter(|a| built.contains(&a.exec_path))
                    .cloned()
                    .collect();
                let outcome = self.check_important_outputs(
                    key,
                    &object,
                    env,
                    candidates,
                    &mut causes,
                    &ctx,
                    &desired,
                    &mut built,
                );
                if deferred_interrupt {
                    env.raise_interrupt();
                }
                reset = outcome?;
            }
            self.post_failed(key, &object, &causes, &ctx, &desired, &built, env);
            if let Some(plan) = reset {
                // Posting precedes the reset: without keep-going the rewind
                // is ignored and this was the only chance to report; with
                // keep-going the buffered event is superseded by the
                // post-rewind attempt's.
                return Ok(Completion::Reset(plan));
            }
            if let Some((detail, catastrophic)) = first_action_failure {
                return Err(CompletionError::ActionFailed {
                    detail,
                    catastrophic,
                });
            }
            let summary = source_error_summary(&causes);
            let code = summary.code;
            let message = match self.completor.location_identifier(key, &object) {
                LocationId::Span(location) => {
                    env.handle(Diagnostic::at(location, summary.message.clone()));
                    summary.message
                }
                LocationId::Prefix(prefix) => {
                    let message = format!("{} {}", prefix, summary.message);
                    env.handle(Diagnostic::error(message.clone()));
                    message
                }
            };
            return Err(CompletionError::SourceArtifactMissing {
                detail: ExitDetail::new(code, message),
            });
        }

        // Missing values are only checked after error reporting: in
        // keep-going bubbling the causes recorded above must surface even
        // while other values are still pending.
        if env.values_missing() {
            return Ok(Completion::Suspend);
        }

        if let Some(plan) = self.check_important_outputs(
            key,
            &object,
            env,
            desired.important.clone(),
            &mut causes,
            &ctx,
            &desired,
            &mut built,
        )? {
            // Nothing failed; the outputs only became unavailable. Rewind
            // without a failure event and report once they are regenerated.
            return Ok(Completion::Reset(plan));
        }

        if self.config.download.deferred {
            if let Some(prefetcher) = &self.prefetcher {
                ensure_top_level_outputs(
                    &desired.important,
                    &ctx,
                    prefetcher.as_ref(),
                    self.output_checker.as_ref(),
                    self.config.download.wait(),
                )
                .await?;
            }
        }

        let event = self.completor.succeeded(key, &object, &ctx, &desired);
        // Event emission is mandatory; a pending interrupt waits until the
        // event is durably queued, then is re-armed for the engine.
        let deferred_interrupt = env.take_interrupt();
        env.post(event);
        self.metrics.merge(attempt_metrics);
        if deferred_interrupt {
            env.raise_interrupt();
        }
        debug!(
            label = %key.label,
            artifacts = ctx.resolved_len(),
            "completion succeeded"
        );
        Ok(Completion::Done(self.completor.value()))
    }

    fn handle_source_error(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        artifact: &Artifact,
        detail: ExitDetail,
        causes: &mut RootCauses,
        env: &dyn Environment,
    ) {
        if !artifact.is_source() {
            warn!(
                path = %artifact.exec_path,
                "derived artifact reported a missing-source value"
            );
        }
        let cause = Cause::source_missing(key.label.clone(), detail);
        env.handle(self.completor.root_cause_error(key, object, &cause));
        causes.record(cause);
    }

    /// Run the validator over `candidates` and, when outputs are lost, ask
    /// the rewind coordinator for a plan.
    ///
    /// Validator and rewind failures post the failure event here, with their
    /// cause recorded, before the error unwinds the attempt.
    #[allow(clippy::too_many_arguments)]
    fn check_important_outputs(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        env: &dyn Environment,
        candidates: Vec<Arc<Artifact>>,
        causes: &mut RootCauses,
        ctx: &CompletionContext,
        desired: &DesiredArtifacts,
        built: &mut HashSet<String>,
    ) -> Result<Option<RewindPlan>, CompletionError> {
        let Some(validator) = &self.validator else {
            return Ok(None);
        };
        let candidates = validation_candidates(&candidates, key.context.expand_filesets);
        let lost = match validator.validate(&candidates, ctx, ctx) {
            Ok(lost) => lost,
            Err(err) => {
                let cause = Cause::validation(key.label.clone(), err.exit_detail());
                return Err(self.fail_capability(
                    key,
                    object,
                    env,
                    causes,
                    ctx,
                    desired,
                    built,
                    cause,
                    err.into(),
                ));
            }
        };
        if lost.is_empty() {
            return Ok(None);
        }
        debug!(label = %key.label, lost = lost.len(), "important outputs lost");

        // Lost outputs must not be reported as built; if rewinding succeeds
        // the next attempt re-reports them after regeneration.
        for (path, digest) in lost.iter() {
            debug!(
                path = %path,
                last_digest = %digest_hex(digest),
                "output no longer retrievable"
            );
            built.remove(path);
            for owner in lost.owners_of(path) {
                built.remove(&owner.exec_path);
            }
        }

        match self.rewinder.plan(key, &lost) {
            Ok(plan) => Ok(Some(plan)),
            Err(err) => {
                let cause = Cause::rewind(key.label.clone(), err.exit_detail());
                Err(self.fail_capability(
                    key,
                    object,
                    env,
                    causes,
                    ctx,
                    desired,
                    built,
                    cause,
                    err.into(),
                ))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fail_capability(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        env: &dyn Environment,
        causes: &mut RootCauses,
        ctx: &CompletionContext,
        desired: &DesiredArtifacts,
        built: &HashSet<String>,
        cause: Cause,
        err: CompletionError,
    ) -> CompletionError {
        env.handle(self.completor.root_cause_error(key, object, &cause));
        causes.record(cause);
        self.post_failed(key, object, causes, ctx, desired, built, env);
        err
    }

    #[allow(clippy::too_many_arguments)]
    fn post_failed(
        &self,
        key: &CompletionKey,
        object: &TopLevelObject,
        causes: &RootCauses,
        ctx: &CompletionContext,
        desired: &DesiredArtifacts,
        built: &HashSet<String>,
        env: &dyn Environment,
    ) {
        // Event emission is mandatory; a pending interrupt waits until the
        // event is durably queued, then is re-armed for the engine.
        let deferred_interrupt = env.take_interrupt();
        let built_groups = filter_built_groups(&desired.by_group, built);
        let event = self
            .completor
            .failed(key, object, causes, ctx, &built_groups);
        env.post(event);
        if deferred_interrupt {
            env.raise_interrupt();
        }
    }
}
