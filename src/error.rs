//! Unified error type for braid operations.
//!
//! Defines [`BraidError`], the error type for tracker and orchestrator
//! operations. Error messages are designed to be agent-friendly: each
//! variant includes a clear description of what went wrong and actionable
//! guidance on how to proceed.
//!
//! Per-file merge failures are NOT errors: they surface as
//! `MergeResult { success: false, .. }` entries so that sibling files in
//! the same batch still complete. Only setup and storage problems use
//! this type.

use std::fmt;
use std::path::PathBuf;

use crate::hash::ValidationError;
use crate::model::snapshot::TaskId;

// ---------------------------------------------------------------------------
// BraidError
// ---------------------------------------------------------------------------

/// Unified error type for braid tracker and orchestrator operations.
#[derive(Debug)]
pub enum BraidError {
    /// A merge was requested for a task/file pair with no captured baseline.
    MissingBaseline {
        /// The task that has no baseline for the file.
        task: TaskId,
        /// The file path lacking a baseline.
        path: PathBuf,
    },

    /// The requested task is not known to the tracker.
    UnknownTask {
        /// The task identifier that was not found.
        task: TaskId,
    },

    /// A task identifier failed validation.
    InvalidTaskId {
        /// The invalid identifier that was provided.
        name: String,
        /// Why the identifier is invalid.
        reason: String,
    },

    /// A persisted evolution record could not be read or written.
    Storage {
        /// Path of the affected record.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// An I/O error occurred while reading baselines or writing merged files.
    Io(std::io::Error),
}

impl fmt::Display for BraidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBaseline { task, path } => {
                write!(
                    f,
                    "no baseline captured for task '{task}' on '{}'.\n  To fix: call capture_baselines for the file before recording modifications or merging.",
                    path.display()
                )
            }
            Self::UnknownTask { task } => {
                write!(
                    f,
                    "task '{task}' is not tracked.\n  To fix: capture baselines for the task first, or check the task id."
                )
            }
            Self::InvalidTaskId { name, reason } => {
                write!(
                    f,
                    "invalid task id '{name}': {reason}\n  Task ids must be lowercase alphanumeric with hyphens, 1-64 characters.\n  Examples: task-1, fix-auth, agent-7b"
                )
            }
            Self::Storage { path, detail } => {
                write!(
                    f,
                    "storage error for '{}': {detail}\n  To fix: check the state directory exists and is writable; the rest of the batch proceeds.",
                    path.display()
                )
            }
            Self::Io(err) => {
                write!(
                    f,
                    "I/O error: {err}\n  To fix: check file permissions and that the worktree path exists."
                )
            }
        }
    }
}

impl std::error::Error for BraidError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<std::io::Error> for BraidError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ValidationError> for BraidError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidTaskId {
            name: err.value,
            reason: err.reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
