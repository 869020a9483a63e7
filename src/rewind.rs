//! Rewind planning: turn a set of lost outputs into minimal re-execution.

use crate::engine::CompletionKey;
use crate::error::RewindError;
use crate::types::ActionId;
use crate::validator::LostOutputs;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Minimal re-execution plan for a set of lost outputs.
///
/// Correlated to the originating request so the engine re-invokes the same
/// evaluator once the invalidated actions have re-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewindPlan {
    pub request: CompletionKey,
    /// Upstream actions whose outputs must be regenerated.
    pub invalidate: BTreeSet<ActionId>,
    /// Artifact keys to re-evaluate once the actions re-run.
    pub reevaluate: BTreeSet<String>,
}

/// Policy turning lost outputs into a rewind plan, or failing permanently.
pub trait RewindCoordinator: Send + Sync {
    fn plan(&self, request: &CompletionKey, lost: &LostOutputs)
        -> Result<RewindPlan, RewindError>;
}

/// Default coordinator: identify each lost output's generating action through
/// its ownership links and bound the number of rewind attempts per request.
///
/// Attempt bookkeeping is process-wide and outlives individual invocations;
/// it is the only state here, and bumping it is a single commutative update.
#[derive(Debug)]
pub struct ActionRewind {
    attempt_limit: u32,
    attempts: Mutex<HashMap<CompletionKey, u32>>,
}

impl ActionRewind {
    pub fn new(attempt_limit: u32) -> Self {
        ActionRewind {
            attempt_limit,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Rewind attempts recorded so far for `request`.
    pub fn attempts_for(&self, request: &CompletionKey) -> u32 {
        self.attempts.lock().get(request).copied().unwrap_or(0)
    }
}

impl RewindCoordinator for ActionRewind {
    fn plan(
        &self,
        request: &CompletionKey,
        lost: &LostOutputs,
    ) -> Result<RewindPlan, RewindError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(request.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt > self.attempt_limit {
            return Err(RewindError::AttemptsExhausted {
                label: request.label.clone(),
                limit: self.attempt_limit,
            });
        }

        let mut invalidate = BTreeSet::new();
        let mut reevaluate = BTreeSet::new();
        for (path, _digest) in lost.iter() {
            let owners = lost.owners_of(path);
            if owners.is_empty() {
                return Err(RewindError::UnknownGenerator { path: path.clone() });
            }
            for owner in owners {
                let Some(action) = owner.generating_action() else {
                    return Err(RewindError::UnknownGenerator {
                        path: owner.exec_path.clone(),
                    });
                };
                invalidate.insert(action.clone());
                reevaluate.insert(owner.exec_path.clone());
            }
        }

        debug!(
            label = %request.label,
            attempt,
            lost = lost.len(),
            actions = invalidate.len(),
            "planned rewind for lost outputs"
        );
        Ok(RewindPlan {
            request: request.clone(),
            invalidate,
            reevaluate,
        })
    }
}
