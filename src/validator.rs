//! Important-output validation: detect outputs that were already counted as
//! built but can no longer be retrieved.

use crate::artifact::{Artifact, FileMetadata};
use crate::context::CompletionContext;
use crate::error::ValidationError;
use crate::types::Digest;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Metadata lookups a validator may perform.
pub trait MetadataProvider {
    fn metadata_for(&self, exec_path: &str) -> Option<&FileMetadata>;
}

impl MetadataProvider for CompletionContext {
    fn metadata_for(&self, exec_path: &str) -> Option<&FileMetadata> {
        self.important_metadata(exec_path)
    }
}

/// Outputs previously counted as built that can no longer be retrieved,
/// keyed by exec path with their last-known digest, plus back-links to the
/// requested artifacts that own each loss (direct or transitive).
#[derive(Debug, Clone, Default)]
pub struct LostOutputs {
    digests: BTreeMap<String, Digest>,
    owners: HashMap<String, Vec<Arc<Artifact>>>,
}

impl LostOutputs {
    /// Record a lost output together with the requested artifacts owning it.
    /// A directly lost artifact owns itself; a lost tree child is owned by
    /// its tree.
    pub fn record(
        &mut self,
        exec_path: impl Into<String>,
        digest: Digest,
        owners: impl IntoIterator<Item = Arc<Artifact>>,
    ) {
        let exec_path = exec_path.into();
        self.owners
            .entry(exec_path.clone())
            .or_default()
            .extend(owners);
        self.digests.insert(exec_path, digest);
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Lost outputs in exec-path order, for deterministic planning.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Digest)> {
        self.digests.iter()
    }

    pub fn owners_of(&self, exec_path: &str) -> &[Arc<Artifact>] {
        self.owners
            .get(exec_path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Validation candidates for a request: fileset artifacts are excluded when
/// the request does not expand filesets.
pub fn validation_candidates(
    candidates: &[Arc<Artifact>],
    expand_filesets: bool,
) -> Vec<Arc<Artifact>> {
    if expand_filesets {
        candidates.to_vec()
    } else {
        candidates
            .iter()
            .filter(|a| !a.is_fileset())
            .cloned()
            .collect()
    }
}

/// Checks whether already-built important outputs are still retrievable.
///
/// Implementations must be safe to invoke more than once per logical request
/// across restarts: everything they need is read from the call and everything
/// they learn is returned from it. Infrastructure problems fail the attempt
/// through `ValidationError`; ordinary losses are data, not errors.
pub trait OutputValidator: Send + Sync {
    fn validate(
        &self,
        candidates: &[Arc<Artifact>],
        ctx: &CompletionContext,
        metadata: &dyn MetadataProvider,
    ) -> Result<LostOutputs, ValidationError>;
}
