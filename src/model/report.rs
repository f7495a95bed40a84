//! Merge results and reports.
//!
//! [`MergeResult`] is the per-file outcome record handed back to
//! collaborators; [`MergeReport`] aggregates a whole merge operation for
//! JSON persistence and CLI/status-line consumption. Both tolerate unknown
//! fields on input and default absent optional fields, so records written
//! by a newer version still load.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::snapshot::TaskId;

// ---------------------------------------------------------------------------
// MergeResult
// ---------------------------------------------------------------------------

/// The outcome of one per-file merge attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    /// Path of the merged file, relative to the worktree root.
    pub file_path: PathBuf,

    /// The merged content, present iff the merge succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,

    /// Whether this file produced a usable merged result.
    pub success: bool,

    /// Whether the result came from the deterministic ladder (as opposed to
    /// resolver escalation).
    pub was_auto_merged: bool,

    /// Why the merge failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MergeResult {
    /// A successful deterministic merge.
    #[must_use]
    pub fn auto_merged(file_path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            merged_content: Some(content.into()),
            success: true,
            was_auto_merged: true,
            error: None,
        }
    }

    /// A successful merge produced by the external resolver.
    #[must_use]
    pub fn resolved(file_path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            merged_content: Some(content.into()),
            success: true,
            was_auto_merged: false,
            error: None,
        }
    }

    /// A per-file failure. Never aborts the surrounding batch.
    #[must_use]
    pub fn failed(file_path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            merged_content: None,
            success: false,
            was_auto_merged: false,
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for MergeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "{}: merged ({})",
                self.file_path.display(),
                if self.was_auto_merged {
                    "auto"
                } else {
                    "resolved"
                }
            )
        } else {
            write!(
                f,
                "{}: failed ({})",
                self.file_path.display(),
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

// ---------------------------------------------------------------------------
// MergeStats
// ---------------------------------------------------------------------------

/// Aggregate counters for one merge operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Files for which a merge was attempted.
    pub files_processed: usize,
    /// Files resolved by the deterministic ladder alone.
    pub files_auto_merged: usize,
    /// Escalations handed to the external resolver.
    pub ai_calls_made: usize,
    /// Wall-clock duration of the whole operation.
    pub duration_seconds: f64,
}

// ---------------------------------------------------------------------------
// MergeReport
// ---------------------------------------------------------------------------

/// The aggregated outcome of a merge operation across tasks and files.
///
/// `success` is true iff every per-file result succeeded. An operation with
/// nothing to do is a successful empty report, never an error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    /// The tasks that participated, in request order.
    #[serde(default)]
    pub tasks_merged: Vec<TaskId>,

    /// True iff all per-file results succeeded.
    pub success: bool,

    /// Aggregate counters.
    #[serde(default)]
    pub stats: MergeStats,

    /// One result per distinct file, keyed by path.
    #[serde(default)]
    pub results: Vec<MergeResult>,
}

impl MergeReport {
    /// Build a report from per-file results.
    #[must_use]
    pub fn from_results(
        tasks_merged: Vec<TaskId>,
        results: Vec<MergeResult>,
        ai_calls_made: usize,
        duration_seconds: f64,
    ) -> Self {
        let stats = MergeStats {
            files_processed: results.len(),
            files_auto_merged: results.iter().filter(|r| r.was_auto_merged).count(),
            ai_calls_made,
            duration_seconds,
        };
        Self {
            tasks_merged,
            success: results.iter().all(|r| r.success),
            stats,
            results,
        }
    }

    /// A well-formed report for an operation with nothing to do.
    #[must_use]
    pub fn empty(tasks_merged: Vec<TaskId>) -> Self {
        Self {
            tasks_merged,
            success: true,
            stats: MergeStats::default(),
            results: Vec::new(),
        }
    }

    /// Iterate over the failed per-file results.
    pub fn failures(&self) -> impl Iterator<Item = &MergeResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "merged {} task(s): {}/{} file(s) ok, {} auto, {} escalated, {:.2}s",
            self.tasks_merged.len(),
            self.results.iter().filter(|r| r.success).count(),
            self.stats.files_processed,
            self.stats.files_auto_merged,
            self.stats.ai_calls_made,
            self.stats.duration_seconds
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
