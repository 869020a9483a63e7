//! Build metrics: per-attempt deltas merged into a process-wide accumulator.

use crate::artifact::FileMetadata;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Per-attempt metrics delta. Merge is commutative and associative so that
/// concurrently completing requests can fold in their deltas in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub output_files: u64,
    pub output_bytes: u64,
}

impl FileMetrics {
    /// Count one materialized file. Called exactly once per file within an
    /// attempt's single classification pass.
    pub fn count(&mut self, metadata: &FileMetadata) {
        self.output_files = self.output_files.saturating_add(1);
        self.output_bytes = self.output_bytes.saturating_add(metadata.size);
    }

    pub fn merge(&mut self, other: FileMetrics) {
        self.output_files = self.output_files.saturating_add(other.output_files);
        self.output_bytes = self.output_bytes.saturating_add(other.output_bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.output_files == 0 && self.output_bytes == 0
    }
}

/// Process-wide accumulator for top-level artifact metrics.
///
/// Deltas are merged exactly once per successful attempt; that guarantee is
/// owned by the evaluator's control flow, not by deduplication here. Partial
/// work from abandoned invocations is simply dropped with the invocation.
#[derive(Debug, Default)]
pub struct ArtifactMetrics {
    inner: Mutex<FileMetrics>,
}

impl ArtifactMetrics {
    pub fn new() -> Self {
        ArtifactMetrics::default()
    }

    pub fn merge(&self, delta: FileMetrics) {
        self.inner.lock().merge(delta);
    }

    pub fn snapshot(&self) -> FileMetrics {
        *self.inner.lock()
    }
}
