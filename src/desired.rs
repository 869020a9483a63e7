//! Desired-artifact resolution for a completion request.
//!
//! Pure derivation: the same object and output-group context always yield a
//! structurally identical set, which is what makes re-evaluation after an
//! engine restart reproducible.

use crate::artifact::Artifact;
use crate::types::{Label, Location};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One requested output group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputGroupRequest {
    pub name: String,
    /// User-visible groups feed build events; others (validation outputs,
    /// for example) are built but never reported.
    pub user_visible: bool,
}

impl OutputGroupRequest {
    pub fn visible(name: impl Into<String>) -> Self {
        OutputGroupRequest {
            name: name.into(),
            user_visible: true,
        }
    }

    pub fn hidden(name: impl Into<String>) -> Self {
        OutputGroupRequest {
            name: name.into(),
            user_visible: false,
        }
    }
}

/// Which output groups a completion request covers and how filesets are
/// treated. Stable across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputGroupContext {
    pub groups: Vec<OutputGroupRequest>,
    pub expand_filesets: bool,
}

/// The analysis-time view of a top-level object (target or aspect result).
#[derive(Debug, Clone)]
pub struct TopLevelObject {
    pub label: Label,
    pub location: Option<Location>,
    /// Output group name -> artifacts, as declared at analysis time.
    pub output_groups: BTreeMap<String, Vec<Arc<Artifact>>>,
    /// Baseline coverage artifact; present only when the object carries an
    /// instrumentation capability that declared one.
    pub baseline_coverage: Option<Arc<Artifact>>,
}

/// Artifacts in one output group as they will be reported.
#[derive(Debug, Clone, Default)]
pub struct GroupArtifacts {
    pub artifacts: Vec<Arc<Artifact>>,
    pub user_visible: bool,
}

/// The full and important artifact sets for one completion request.
#[derive(Debug, Clone, Default)]
pub struct DesiredArtifacts {
    /// Every group artifact the request must build, deduplicated, in
    /// first-group-seen order.
    pub all: Vec<Arc<Artifact>>,
    /// Subset whose presence or loss is user-visible, plus baseline coverage
    /// when the object is coverage-capable.
    pub important: Vec<Arc<Artifact>>,
    pub by_group: BTreeMap<String, GroupArtifacts>,
    pub baseline_coverage: Option<Arc<Artifact>>,
}

impl DesiredArtifacts {
    /// Whether every requested group is user-visible, in which case the
    /// important set covers the full set.
    pub fn all_important(&self) -> bool {
        self.by_group.values().all(|g| g.user_visible)
    }

    /// The fetch list: every group artifact plus baseline coverage.
    pub fn to_request(&self) -> Vec<Arc<Artifact>> {
        let mut request = self.all.clone();
        if let Some(coverage) = &self.baseline_coverage {
            request.push(coverage.clone());
        }
        request
    }

    pub fn is_baseline_coverage(&self, artifact: &Artifact) -> bool {
        self.baseline_coverage
            .as_ref()
            .is_some_and(|c| c.exec_path == artifact.exec_path)
    }
}

/// Derive the desired artifact set for `object` under `ctx`.
///
/// Requested groups the object does not declare contribute nothing. Baseline
/// coverage is appended independently of which groups were requested.
pub fn desired_artifacts(object: &TopLevelObject, ctx: &OutputGroupContext) -> DesiredArtifacts {
    let mut out = DesiredArtifacts::default();
    let mut seen_all: HashSet<&str> = HashSet::new();
    let mut seen_important: HashSet<&str> = HashSet::new();

    for request in &ctx.groups {
        let Some(artifacts) = object.output_groups.get(&request.name) else {
            continue;
        };
        let mut group = GroupArtifacts {
            artifacts: Vec::with_capacity(artifacts.len()),
            user_visible: request.user_visible,
        };
        for artifact in artifacts {
            group.artifacts.push(artifact.clone());
            if seen_all.insert(artifact.exec_path.as_str()) {
                out.all.push(artifact.clone());
            }
            if request.user_visible && seen_important.insert(artifact.exec_path.as_str()) {
                out.important.push(artifact.clone());
            }
        }
        out.by_group.insert(request.name.clone(), group);
    }

    if let Some(coverage) = &object.baseline_coverage {
        out.baseline_coverage = Some(coverage.clone());
        if seen_important.insert(coverage.exec_path.as_str()) {
            out.important.push(coverage.clone());
        }
    }

    out
}

/// Restrict reported groups to artifacts that were actually built.
///
/// Groups left empty are dropped so a failure event never claims a group it
/// produced nothing for.
pub fn filter_built_groups(
    by_group: &BTreeMap<String, GroupArtifacts>,
    built: &HashSet<String>,
) -> BTreeMap<String, Vec<Arc<Artifact>>> {
    let mut out = BTreeMap::new();
    for (name, group) in by_group {
        let kept: Vec<Arc<Artifact>> = group
            .artifacts
            .iter()
            .filter(|a| built.contains(&a.exec_path))
            .cloned()
            .collect();
        if !kept.is_empty() {
            out.insert(name.clone(), kept);
        }
    }
    out
}
