//! Output prefetching and the final top-level materialization pass.
//!
//! In deferred-download mode an action's outputs may exist only in remote
//! storage when completion runs. The final pass localizes whatever the
//! output checker still wants on disk, joining the whole batch at a single
//! bounded wait point.

use crate::artifact::{Artifact, FileMetadata};
use crate::context::CompletionContext;
use crate::error::{CompletionError, PrefetchError};
use crate::types::ActionId;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Scheduling priority for a prefetch batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Why a prefetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Inputs,
    Outputs,
}

/// Localizes remote output bytes onto disk.
#[async_trait]
pub trait Prefetcher: Send + Sync {
    /// Localize `outputs` of `action`. Completion of the future means the
    /// bytes are on disk.
    async fn prefetch(
        &self,
        action: &ActionId,
        outputs: Vec<Arc<Artifact>>,
        priority: Priority,
        reason: Reason,
    ) -> Result<(), PrefetchError>;
}

/// Decides whether an already-built output still needs to be localized.
pub trait OutputChecker: Send + Sync {
    fn should_download(&self, exec_path: &str, metadata: &FileMetadata) -> bool;
}

/// Trusts every output to be materialized already, short-circuiting the
/// final materialization pass.
#[derive(Debug, Default)]
pub struct TrustAll;

impl OutputChecker for TrustAll {
    fn should_download(&self, _exec_path: &str, _metadata: &FileMetadata) -> bool {
        false
    }
}

/// Downloads outputs whose bytes live only in remote storage.
#[derive(Debug, Default)]
pub struct RemoteOnly;

impl OutputChecker for RemoteOnly {
    fn should_download(&self, _exec_path: &str, metadata: &FileMetadata) -> bool {
        metadata.remote
    }
}

fn wants_download(
    artifact: &Arc<Artifact>,
    ctx: &CompletionContext,
    checker: &dyn OutputChecker,
) -> bool {
    if artifact.is_tree() {
        // Metadata can be absent during error bubbling; only download
        // outputs that were actually generated.
        let Some(tree) = ctx.tree(&artifact.exec_path) else {
            return false;
        };
        tree.children
            .iter()
            .any(|(child, metadata)| checker.should_download(child, metadata))
    } else {
        match ctx.metadata(&artifact.exec_path) {
            Some(metadata) => checker.should_download(&artifact.exec_path, metadata),
            None => false,
        }
    }
}

/// Best-effort materialization of important outputs before the success event.
///
/// Issues one prefetch per artifact that still wants bytes and joins the
/// batch at a single wait point bounded by `wait`. Any failure is a fatal,
/// non-retryable download error for this attempt.
pub async fn ensure_top_level_outputs(
    important: &[Arc<Artifact>],
    ctx: &CompletionContext,
    prefetcher: &dyn Prefetcher,
    checker: &dyn OutputChecker,
    wait: Duration,
) -> Result<(), CompletionError> {
    let mut batch = FuturesUnordered::new();
    for artifact in important {
        let Some(action) = artifact.generating_action() else {
            continue; // source artifacts live in the workspace
        };
        if wants_download(artifact, ctx, checker) {
            batch.push(prefetcher.prefetch(
                action,
                vec![artifact.clone()],
                Priority::Low,
                Reason::Outputs,
            ));
        }
    }
    if batch.is_empty() {
        return Ok(());
    }
    debug!(outputs = batch.len(), "materializing top-level outputs");

    let drain = async {
        while let Some(result) = batch.next().await {
            result?;
        }
        Ok::<(), PrefetchError>(())
    };
    match tokio::time::timeout(wait, drain).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(CompletionError::Download(err)),
        Err(_) => Err(CompletionError::Download(PrefetchError::new(format!(
            "timed out after {}s waiting for top-level outputs",
            wait.as_secs()
        )))),
    }
}
