//! Completion context: the read-only snapshot handed to validators and
//! terminal events once the artifact set is final.

use crate::artifact::{Artifact, ArtifactValue, FileMetadata, FilesetTree, TreeValue};
use crate::metrics::FileMetrics;
use std::collections::HashMap;

/// Read-only snapshot of everything resolved for one attempt.
///
/// The important-only map exists because failure events retain the context
/// until delivery; validation-only groups can dwarf the important set, and
/// events must not keep all of it alive.
#[derive(Debug, Clone, Default)]
pub struct CompletionContext {
    full: HashMap<String, FileMetadata>,
    important: HashMap<String, FileMetadata>,
    trees: HashMap<String, TreeValue>,
    filesets: HashMap<String, FilesetTree>,
    baseline_coverage: Option<FileMetadata>,
    expand_filesets: bool,
    exec_root: String,
    workspace: String,
}

impl CompletionContext {
    pub fn metadata(&self, exec_path: &str) -> Option<&FileMetadata> {
        self.full.get(exec_path)
    }

    pub fn important_metadata(&self, exec_path: &str) -> Option<&FileMetadata> {
        self.important.get(exec_path)
    }

    pub fn tree(&self, exec_path: &str) -> Option<&TreeValue> {
        self.trees.get(exec_path)
    }

    pub fn fileset(&self, exec_path: &str) -> Option<&FilesetTree> {
        self.filesets.get(exec_path)
    }

    pub fn baseline_coverage(&self) -> Option<&FileMetadata> {
        self.baseline_coverage.as_ref()
    }

    pub fn expand_filesets(&self) -> bool {
        self.expand_filesets
    }

    pub fn exec_root(&self) -> &str {
        &self.exec_root
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn resolved_len(&self) -> usize {
        self.full.len()
    }
}

/// Builds the context in a single classification pass.
///
/// Each artifact is added exactly once; the important-only map is populated
/// by the same call, so the attempt's metrics delta counts every file once no
/// matter how the important and full sets overlap.
#[derive(Debug)]
pub struct ContextBuilder {
    ctx: CompletionContext,
    metrics: FileMetrics,
}

impl ContextBuilder {
    pub fn new(
        exec_root: impl Into<String>,
        workspace: impl Into<String>,
        expand_filesets: bool,
    ) -> Self {
        ContextBuilder {
            ctx: CompletionContext {
                expand_filesets,
                exec_root: exec_root.into(),
                workspace: workspace.into(),
                ..CompletionContext::default()
            },
            metrics: FileMetrics::default(),
        }
    }

    /// Record a resolved artifact value. `important` controls whether the
    /// important-only map also receives its metadata.
    pub fn add(&mut self, artifact: &Artifact, value: &ArtifactValue, important: bool) {
        match value {
            ArtifactValue::File(metadata) => {
                self.insert(&artifact.exec_path, metadata.clone(), important);
            }
            ArtifactValue::Tree(tree) => {
                for (child, metadata) in &tree.children {
                    self.insert(child, metadata.clone(), important);
                }
                self.ctx.trees.insert(artifact.exec_path.clone(), tree.clone());
            }
            ArtifactValue::Fileset { metadata, tree } => {
                self.insert(&artifact.exec_path, metadata.clone(), important);
                self.ctx
                    .filesets
                    .insert(artifact.exec_path.clone(), tree.clone());
            }
        }
    }

    pub fn set_baseline_coverage(&mut self, metadata: FileMetadata) {
        self.ctx.baseline_coverage = Some(metadata);
    }

    fn insert(&mut self, exec_path: &str, metadata: FileMetadata, important: bool) {
        self.metrics.count(&metadata);
        if important {
            self.ctx
                .important
                .insert(exec_path.to_string(), metadata.clone());
        }
        self.ctx.full.insert(exec_path.to_string(), metadata);
    }

    /// Freeze the snapshot and hand back the attempt's metrics delta.
    pub fn finish(self) -> (CompletionContext, FileMetrics) {
        (self.ctx, self.metrics)
    }
}
