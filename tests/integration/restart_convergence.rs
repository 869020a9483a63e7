//! Restart-driven re-evaluation: a suspended attempt followed by a resumed
//! one must converge to the state a single fully-resolved attempt produces,
//! with side effects happening at most once.

use super::support::*;
use lintel::completion::Completion;
use lintel::metrics::ArtifactMetrics;
use std::sync::Arc;

#[tokio::test]
async fn resumed_attempt_converges_to_the_single_shot_cause_set() {
    let groups = || {
        object(&[(
            "default",
            vec![derived("out/a"), source("pkg/b.src"), derived("out/c")],
        )])
    };

    // First invocation: only out/a resolved, nothing failed yet.
    let mut partial = MockEnv::new(groups());
    partial.resolve("out/a", file_value("out/a", 10));
    let evaluator = evaluator(Arc::new(ArtifactMetrics::new()));
    let outcome = evaluator.evaluate(&default_request(), &partial).await.unwrap();
    assert!(matches!(outcome, Completion::Suspend));
    assert!(partial.events().is_empty());

    // Second invocation: everything resolved, two failures.
    let mut resumed = MockEnv::new(groups());
    resumed.resolve("out/a", file_value("out/a", 10));
    resumed.resolve("pkg/b.src", missing_source("pkg/b.src"));
    resumed.resolve("out/c", action_failed("compile failed", false));
    evaluator
        .evaluate(&default_request(), &resumed)
        .await
        .unwrap_err();

    // Control: one invocation with everything pre-resolved.
    let mut single = MockEnv::new(groups());
    single.resolve("out/a", file_value("out/a", 10));
    single.resolve("pkg/b.src", missing_source("pkg/b.src"));
    single.resolve("out/c", action_failed("compile failed", false));
    evaluator
        .evaluate(&default_request(), &single)
        .await
        .unwrap_err();

    let resumed_events = resumed.events();
    let single_events = single.events();
    assert_eq!(resumed_events.len(), 1);
    assert_eq!(single_events.len(), 1);
    assert_eq!(resumed_events[0].causes, single_events[0].causes);
    assert_eq!(resumed_events[0].output_groups, single_events[0].output_groups);
}

#[tokio::test]
async fn suspended_attempts_merge_no_metrics_and_the_success_merges_once() {
    let groups = || object(&[("default", vec![derived("out/a"), derived("out/b")])]);

    let metrics = Arc::new(ArtifactMetrics::new());
    let evaluator = evaluator(metrics.clone());

    let mut partial = MockEnv::new(groups());
    partial.resolve("out/a", file_value("out/a", 10));
    let outcome = evaluator.evaluate(&default_request(), &partial).await.unwrap();
    assert!(matches!(outcome, Completion::Suspend));
    // Partial work from the abandoned invocation is discarded, not merged.
    assert!(metrics.snapshot().is_empty());

    let mut full = MockEnv::new(groups());
    full.resolve("out/a", file_value("out/a", 10));
    full.resolve("out/b", file_value("out/b", 20));
    let outcome = evaluator.evaluate(&default_request(), &full).await.unwrap();
    assert!(matches!(outcome, Completion::Done(_)));

    // A replay bug would double these; the delta lands exactly once.
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.output_files, 2);
    assert_eq!(snapshot.output_bytes, 30);
}

#[tokio::test]
async fn bubbling_reports_known_failures_while_values_are_pending() {
    let groups = || {
        object(&[(
            "default",
            vec![source("pkg/b.src"), derived("out/pending")],
        )])
    };

    let mut env = MockEnv::new(groups());
    env.bubbling = true;
    env.resolve("pkg/b.src", missing_source("pkg/b.src"));
    // out/pending never resolves, but the missing source must surface now.

    let evaluator = evaluator(Arc::new(ArtifactMetrics::new()));
    let err = evaluator
        .evaluate(&default_request(), &env)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("input file(s) do not exist"));
    assert_eq!(env.events().len(), 1);
    assert!(!env.events()[0].success);
}

#[tokio::test]
async fn bubbling_interrupt_is_deferred_across_validation_and_reporting() {
    let a = derived("out/a");
    let mut env = MockEnv::new(object(&[(
        "default",
        vec![a, source("pkg/b.src")],
    )]));
    env.bubbling = true;
    env.set_interrupt();
    env.resolve("out/a", file_value("out/a", 10));
    env.resolve("pkg/b.src", missing_source("pkg/b.src"));

    let validator = Arc::new(RecordingValidator::default());
    let evaluator =
        evaluator(Arc::new(ArtifactMetrics::new())).with_validator(validator.clone());
    evaluator
        .evaluate(&default_request(), &env)
        .await
        .unwrap_err();

    // The interrupt did not stop the built subset from being validated or
    // the failure event from going out, and it is pending again afterwards.
    assert_eq!(validator.seen.lock().len(), 1);
    assert_eq!(env.events().len(), 1);
    assert!(env.interrupt_pending());
}
