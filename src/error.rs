//! Error types for the completion stage.
//!
//! Every terminal error is folded into the failure event before it unwinds
//! the attempt; the error value itself only signals attempt termination and
//! never carries cross-attempt state.

use crate::types::Label;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured exit classification attached to causes and terminal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitCode {
    SourceArtifactMissing,
    ActionFailed,
    OutputValidation,
    RewindUnrecoverable,
    TopLevelOutputsDownload,
    Interrupted,
}

/// Exit code plus the message surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitDetail {
    pub code: ExitCode,
    pub message: String,
}

impl ExitDetail {
    pub fn new(code: ExitCode, message: impl Into<String>) -> Self {
        ExitDetail {
            code,
            message: message.into(),
        }
    }
}

/// Validator infrastructure failures (store unreachable, corrupt index).
///
/// Treated exactly like an action failure: recorded as a cause, reported in
/// the failure event, fatal for the attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("output store unreachable: {0}")]
    StoreUnreachable(String),

    #[error("output index corrupt: {0}")]
    CorruptIndex(String),
}

impl ValidationError {
    pub fn exit_detail(&self) -> ExitDetail {
        ExitDetail::new(ExitCode::OutputValidation, self.to_string())
    }
}

/// Permanent rewind planning failures. There is no recovery; the attempt
/// fails with the lost outputs reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RewindError {
    #[error("no generating action known for lost output {path}")]
    UnknownGenerator { path: String },

    #[error("rewind attempt limit ({limit}) exceeded for {label}")]
    AttemptsExhausted { label: Label, limit: u32 },
}

impl RewindError {
    pub fn exit_detail(&self) -> ExitDetail {
        ExitDetail::new(ExitCode::RewindUnrecoverable, self.to_string())
    }
}

/// Fatal, non-retryable download failure: the outputs are known present
/// upstream but failed to localize. Distinct from a lost-output rewind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PrefetchError {
    pub message: String,
}

impl PrefetchError {
    pub fn new(message: impl Into<String>) -> Self {
        PrefetchError {
            message: message.into(),
        }
    }

    pub fn exit_detail(&self) -> ExitDetail {
        ExitDetail::new(ExitCode::TopLevelOutputsDownload, self.to_string())
    }
}

/// Configuration and logging-setup failures, raised before any attempt runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid log format: {0} (must be 'json' or 'text')")]
    InvalidLogFormat(String),
}

/// Terminal errors for one completion attempt.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("{}", .detail.message)]
    SourceArtifactMissing { detail: ExitDetail },

    #[error("{}", .detail.message)]
    ActionFailed {
        detail: ExitDetail,
        catastrophic: bool,
    },

    #[error("output validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("rewind failed: {0}")]
    Rewind(#[from] RewindError),

    #[error("top-level output download failed: {0}")]
    Download(#[from] PrefetchError),

    #[error("completion interrupted")]
    Interrupted,
}

impl CompletionError {
    /// Catastrophic failures override ordinary cause selection and terminate
    /// the build once chosen.
    pub fn is_catastrophic(&self) -> bool {
        matches!(
            self,
            CompletionError::ActionFailed {
                catastrophic: true,
                ..
            }
        )
    }

    /// Transient errors permit an attempt-level retry by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Download(_))
    }

    /// Structured exit classification the caller reports the attempt under.
    pub fn exit_detail(&self) -> ExitDetail {
        match self {
            CompletionError::SourceArtifactMissing { detail } => detail.clone(),
            CompletionError::ActionFailed { detail, .. } => detail.clone(),
            CompletionError::Validation(err) => err.exit_detail(),
            CompletionError::Rewind(err) => err.exit_detail(),
            CompletionError::Download(err) => err.exit_detail(),
            CompletionError::Interrupted => {
                ExitDetail::new(ExitCode::Interrupted, self.to_string())
            }
        }
    }
}
