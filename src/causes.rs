//! Root-cause aggregation across an artifact set.
//!
//! Accumulation is first-seen-ordered and deduplicated. Restarts may resolve
//! artifacts in any order, so the aggregate must be commutative over
//! insertion of duplicates and the primary-cause selection deterministic.

use crate::error::{ExitCode, ExitDetail};
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Why a completion attempt cannot succeed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cause {
    pub label: Label,
    pub kind: CauseKind,
    pub detail: ExitDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CauseKind {
    /// A requested source input was never produced.
    SourceMissing,
    /// An upstream action failed.
    ActionFailed { catastrophic: bool },
    /// The important-output validator hit an infrastructure problem.
    Validation,
    /// Lost outputs could not be rewound.
    Rewind,
}

impl Cause {
    pub fn source_missing(label: Label, detail: ExitDetail) -> Self {
        Cause {
            label,
            kind: CauseKind::SourceMissing,
            detail,
        }
    }

    pub fn action_failed(label: Label, detail: ExitDetail, catastrophic: bool) -> Self {
        Cause {
            label,
            kind: CauseKind::ActionFailed { catastrophic },
            detail,
        }
    }

    pub fn validation(label: Label, detail: ExitDetail) -> Self {
        Cause {
            label,
            kind: CauseKind::Validation,
            detail,
        }
    }

    pub fn rewind(label: Label, detail: ExitDetail) -> Self {
        Cause {
            label,
            kind: CauseKind::Rewind,
            detail,
        }
    }

    pub fn is_catastrophic(&self) -> bool {
        matches!(self.kind, CauseKind::ActionFailed { catastrophic: true })
    }
}

/// Deduplicated, first-seen-ordered accumulation of causes.
///
/// Never empty when an attempt is reported failed; never non-empty when it is
/// reported succeeded.
#[derive(Debug, Clone, Default)]
pub struct RootCauses {
    order: Vec<Cause>,
    seen: HashSet<Cause>,
}

impl RootCauses {
    pub fn new() -> Self {
        RootCauses::default()
    }

    /// Record a cause; duplicates keep their original position.
    pub fn record(&mut self, cause: Cause) {
        if self.seen.insert(cause.clone()) {
            self.order.push(cause);
        }
    }

    pub fn extend(&mut self, causes: impl IntoIterator<Item = Cause>) {
        for cause in causes {
            self.record(cause);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn has_catastrophe(&self) -> bool {
        self.order.iter().any(Cause::is_catastrophic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cause> {
        self.order.iter()
    }

    /// The cause to surface: a catastrophic action failure strictly outranks
    /// any non-catastrophic cause; otherwise the first recorded wins.
    pub fn primary(&self) -> Option<&Cause> {
        self.order
            .iter()
            .find(|c| c.is_catastrophic())
            .or_else(|| self.order.first())
    }
}

/// Summarize missing-source causes into the single user-facing message.
///
/// When no missing-source cause exists, the primary cause's detail is used
/// unchanged.
pub fn source_error_summary(causes: &RootCauses) -> ExitDetail {
    let missing = causes
        .iter()
        .filter(|c| matches!(c.kind, CauseKind::SourceMissing))
        .count();
    if missing > 0 {
        ExitDetail::new(
            ExitCode::SourceArtifactMissing,
            format!("{} input file(s) do not exist", missing),
        )
    } else if let Some(primary) = causes.primary() {
        primary.detail.clone()
    } else {
        ExitDetail::new(ExitCode::SourceArtifactMissing, "unknown failure".to_string())
    }
}
