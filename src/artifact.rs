//! Artifact model: identities, metadata, and resolved values.

use crate::types::{ActionId, Digest, Label};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an artifact comes to exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Checked-in source file; has no generating action.
    Source,
    /// Single file produced by an action.
    Derived { action: ActionId },
    /// Directory produced by an action, expanded into child files.
    Tree { action: ActionId },
    /// Symlink manifest produced by an action.
    Fileset { action: ActionId },
}

/// A node in the artifact graph, identified by its exec-root-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub exec_path: String,
    pub owner: Label,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn source(exec_path: impl Into<String>, owner: Label) -> Self {
        Artifact {
            exec_path: exec_path.into(),
            owner,
            kind: ArtifactKind::Source,
        }
    }

    pub fn derived(exec_path: impl Into<String>, owner: Label, action: ActionId) -> Self {
        Artifact {
            exec_path: exec_path.into(),
            owner,
            kind: ArtifactKind::Derived { action },
        }
    }

    pub fn tree(exec_path: impl Into<String>, owner: Label, action: ActionId) -> Self {
        Artifact {
            exec_path: exec_path.into(),
            owner,
            kind: ArtifactKind::Tree { action },
        }
    }

    pub fn fileset(exec_path: impl Into<String>, owner: Label, action: ActionId) -> Self {
        Artifact {
            exec_path: exec_path.into(),
            owner,
            kind: ArtifactKind::Fileset { action },
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self.kind, ArtifactKind::Source)
    }

    pub fn is_tree(&self) -> bool {
        matches!(self.kind, ArtifactKind::Tree { .. })
    }

    pub fn is_fileset(&self) -> bool {
        matches!(self.kind, ArtifactKind::Fileset { .. })
    }

    /// The action that produces this artifact, if it is derived at all.
    pub fn generating_action(&self) -> Option<&ActionId> {
        match &self.kind {
            ArtifactKind::Source => None,
            ArtifactKind::Derived { action }
            | ArtifactKind::Tree { action }
            | ArtifactKind::Fileset { action } => Some(action),
        }
    }
}

/// Metadata for a single materialized file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub digest: Digest,
    pub size: u64,
    /// Whether the bytes currently live only in remote storage.
    pub remote: bool,
}

impl FileMetadata {
    pub fn local(digest: Digest, size: u64) -> Self {
        FileMetadata {
            digest,
            size,
            remote: false,
        }
    }

    pub fn remote(digest: Digest, size: u64) -> Self {
        FileMetadata {
            digest,
            size,
            remote: true,
        }
    }
}

/// Expanded contents of a tree artifact, keyed by child exec path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeValue {
    pub children: BTreeMap<String, FileMetadata>,
}

impl TreeValue {
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A fileset symlink: link name relative to the fileset root, plus target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesetLink {
    pub name: String,
    pub target: String,
}

/// Expanded fileset manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesetTree {
    pub links: Vec<FilesetLink>,
}

/// Resolved value of one requested artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactValue {
    File(FileMetadata),
    Tree(TreeValue),
    Fileset {
        metadata: FileMetadata,
        tree: FilesetTree,
    },
}
