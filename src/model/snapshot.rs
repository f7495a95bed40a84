//! Task snapshots and per-file evolution records.
//!
//! A [`TaskSnapshot`] is one task's recorded cumulative change to one file
//! since that file's baseline was captured. A [`FileEvolution`] aggregates
//! the baseline identity plus every participating task's snapshot for one
//! file. The tracker owns all instances of both; other components receive
//! read-only views.
//!
//! All record types serialize to self-describing JSON and tolerate unknown
//! fields on input, so persisted records written by newer versions still
//! load.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::hash::{ContentHash, ErrorKind, ValidationError};
use crate::model::change::SemanticChange;

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// A validated task identifier.
///
/// Task ids must be lowercase alphanumeric with hyphens, 1-64 characters.
/// Examples: `task-1`, `fix-auth`, `agent-7b`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// The maximum length of a task id.
    pub const MAX_LEN: usize = 64;

    /// Create a new `TaskId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains invalid
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the task id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::TaskId,
                value: s.to_owned(),
                reason: "task id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::TaskId,
                value: s.to_owned(),
                reason: format!(
                    "task id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(ValidationError {
                kind: ErrorKind::TaskId,
                value: s.to_owned(),
                reason: "task id must not start or end with a hyphen".to_owned(),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError {
                kind: ErrorKind::TaskId,
                value: s.to_owned(),
                reason: "task id must contain only lowercase letters (a-z), digits (0-9), and hyphens (-)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current wall-clock time as unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// ---------------------------------------------------------------------------
// TaskSnapshot
// ---------------------------------------------------------------------------

/// One task's cumulative effect on one file since baseline.
///
/// Lifecycle: created empty (no changes, `completed_at` absent) when the
/// task's baseline for the file is captured; updated with fresh hashes,
/// changes, and `completed_at` each time a modification is recorded;
/// removed when the task is cleaned up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// The task this snapshot belongs to.
    pub task_id: TaskId,

    /// Free-text rationale for the task's work. May be empty.
    #[serde(default)]
    pub task_intent: String,

    /// When the baseline for this task+file was captured (epoch millis).
    pub started_at: u64,

    /// When the latest modification was recorded (epoch millis). Absent
    /// while the task is still in progress on this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,

    /// Hash of the content this task started from.
    pub content_hash_before: ContentHash,

    /// Hash of the task's latest recorded content.
    pub content_hash_after: ContentHash,

    /// Cumulative semantic changes since baseline, in source order.
    #[serde(default)]
    pub changes: Vec<SemanticChange>,
}

impl TaskSnapshot {
    /// Create an empty in-progress snapshot at baseline capture time.
    #[must_use]
    pub fn at_baseline(task_id: TaskId, intent: impl Into<String>, baseline: ContentHash) -> Self {
        Self {
            task_id,
            task_intent: intent.into(),
            started_at: now_millis(),
            completed_at: None,
            content_hash_before: baseline.clone(),
            content_hash_after: baseline,
            changes: Vec::new(),
        }
    }

    /// Returns `true` once a modification has been recorded.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Returns `true` iff every recorded change is additive.
    ///
    /// Vacuously true for an empty snapshot.
    #[must_use]
    pub fn is_additive_only(&self) -> bool {
        self.changes.iter().all(SemanticChange::is_additive)
    }
}

impl fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} change(s){}",
            self.task_id,
            self.changes.len(),
            if self.is_completed() {
                ""
            } else {
                " (in progress)"
            }
        )
    }
}

// ---------------------------------------------------------------------------
// FileEvolution
// ---------------------------------------------------------------------------

/// The full per-file history: baseline identity plus one snapshot per task
/// that has touched the file.
///
/// Snapshots are kept in insertion order and keyed by task id; a task may
/// update its own snapshot repeatedly but contributes exactly one entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvolution {
    /// Path of the tracked file, relative to the worktree root.
    pub file_path: PathBuf,

    /// Opaque reference to the state the file was in before any
    /// participating task touched it (a commit id, or `"worktree"` when the
    /// baseline was captured from the working copy).
    pub baseline_commit: String,

    /// Content address of the baseline bytes.
    pub baseline_hash: ContentHash,

    /// One snapshot per participating task, in first-touch order.
    #[serde(default)]
    pub task_snapshots: Vec<TaskSnapshot>,
}

impl FileEvolution {
    /// Create a fresh evolution with no snapshots.
    #[must_use]
    pub fn new(
        file_path: impl Into<PathBuf>,
        baseline_commit: impl Into<String>,
        baseline_hash: ContentHash,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            baseline_commit: baseline_commit.into(),
            baseline_hash,
            task_snapshots: Vec::new(),
        }
    }

    /// Look up the snapshot for a task, if any.
    #[must_use]
    pub fn snapshot(&self, task_id: &TaskId) -> Option<&TaskSnapshot> {
        self.task_snapshots.iter().find(|s| &s.task_id == task_id)
    }

    /// Insert or replace the snapshot for `snapshot.task_id`.
    ///
    /// Keeps the one-entry-per-task invariant: a replacement occupies the
    /// original insertion slot.
    pub fn upsert_snapshot(&mut self, snapshot: TaskSnapshot) {
        match self
            .task_snapshots
            .iter_mut()
            .find(|s| s.task_id == snapshot.task_id)
        {
            Some(slot) => *slot = snapshot,
            None => self.task_snapshots.push(snapshot),
        }
    }

    /// Remove the snapshot for a task. Returns `true` if one was removed.
    pub fn remove_task(&mut self, task_id: &TaskId) -> bool {
        let before = self.task_snapshots.len();
        self.task_snapshots.retain(|s| &s.task_id != task_id);
        self.task_snapshots.len() != before
    }

    /// Ids of every task that has touched this file, in first-touch order.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.task_snapshots.iter().map(|s| &s.task_id)
    }

    /// Returns `true` when more than one task has touched this file.
    #[must_use]
    pub fn is_multi_task(&self) -> bool {
        self.task_snapshots.len() > 1
    }
}

// ---------------------------------------------------------------------------
// EvolutionSummary
// ---------------------------------------------------------------------------

/// Aggregate counts over all tracked evolutions, for status reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionSummary {
    /// Number of files with a captured baseline.
    pub total_files_tracked: usize,
    /// Number of distinct tasks with at least one snapshot.
    pub total_tasks: usize,
    /// Total snapshot count across all files.
    pub total_snapshots: usize,
    /// Files touched by more than one task.
    pub files_with_multiple_tasks: usize,
}

impl fmt::Display for EvolutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s), {} task(s), {} snapshot(s), {} shared file(s)",
            self.total_files_tracked,
            self.total_tasks,
            self.total_snapshots,
            self.files_with_multiple_tasks
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_content;
    use crate::model::change::{ChangeKind, FILE_TOP, SemanticChange, function_scope};

    fn task(name: &str) -> TaskId {
        TaskId::new(name).unwrap()
    }

    fn baseline_snapshot(name: &str) -> TaskSnapshot {
        TaskSnapshot::at_baseline(task(name), "add logging", hash_content("def f(): pass"))
    }

    // -- TaskId --

    #[test]
    fn task_id_valid() {
        let id = TaskId::new("task-1").unwrap();
        assert_eq!(id.as_str(), "task-1");
    }

    #[test]
    fn task_id_rejects_empty() {
        assert!(TaskId::new("").is_err());
    }

    #[test]
    fn task_id_rejects_uppercase() {
        assert!(TaskId::new("Task-1").is_err());
    }

    #[test]
    fn task_id_rejects_underscore() {
        assert!(TaskId::new("task_1").is_err());
    }

    #[test]
    fn task_id_rejects_edge_hyphens() {
        assert!(TaskId::new("-task").is_err());
        assert!(TaskId::new("task-").is_err());
    }

    #[test]
    fn task_id_rejects_too_long() {
        assert!(TaskId::new(&"a".repeat(65)).is_err());
        assert!(TaskId::new(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn task_id_serde_roundtrip() {
        let id = task("fix-auth");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"fix-auth\"");
        let decoded: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn task_id_serde_rejects_invalid() {
        assert!(serde_json::from_str::<TaskId>("\"NOT VALID\"").is_err());
    }

    // -- TaskSnapshot --

    #[test]
    fn at_baseline_starts_in_progress() {
        let snap = baseline_snapshot("task-1");
        assert!(!snap.is_completed());
        assert!(snap.changes.is_empty());
        assert_eq!(snap.content_hash_before, snap.content_hash_after);
        assert!(snap.started_at > 0);
    }

    #[test]
    fn snapshot_additive_only_vacuous() {
        assert!(baseline_snapshot("task-1").is_additive_only());
    }

    #[test]
    fn snapshot_additive_only_with_modification() {
        let mut snap = baseline_snapshot("task-1");
        snap.changes.push(SemanticChange::new(
            ChangeKind::ModifyFunction,
            "f",
            function_scope("f"),
            1,
            1,
        ));
        assert!(!snap.is_additive_only());
    }

    #[test]
    fn snapshot_serde_roundtrip_all_fields() {
        let mut snap = baseline_snapshot("task-2");
        snap.completed_at = Some(snap.started_at + 1200);
        snap.content_hash_after = hash_content("import os\ndef f(): pass");
        snap.changes.push(
            SemanticChange::new(ChangeKind::AddImport, "os", FILE_TOP, 1, 1)
                .with_content("import os"),
        );

        let json = serde_json::to_string(&snap).unwrap();
        let decoded: TaskSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn snapshot_serde_tolerates_unknown_fields() {
        let mut json: serde_json::Value =
            serde_json::to_value(baseline_snapshot("task-1")).unwrap();
        json["future_field"] = serde_json::json!({"nested": true});
        let decoded: TaskSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.task_id, task("task-1"));
    }

    #[test]
    fn snapshot_display() {
        let snap = baseline_snapshot("task-1");
        let text = format!("{snap}");
        assert!(text.contains("task-1"));
        assert!(text.contains("in progress"));
    }

    // -- FileEvolution --

    #[test]
    fn upsert_keeps_one_entry_per_task() {
        let mut evo = FileEvolution::new("a.py", "worktree", hash_content("base"));
        evo.upsert_snapshot(baseline_snapshot("task-1"));
        evo.upsert_snapshot(baseline_snapshot("task-2"));

        let mut updated = baseline_snapshot("task-1");
        updated.completed_at = Some(updated.started_at);
        evo.upsert_snapshot(updated);

        assert_eq!(evo.task_snapshots.len(), 2);
        // Replacement stays in the original slot.
        assert_eq!(evo.task_snapshots[0].task_id, task("task-1"));
        assert!(evo.task_snapshots[0].is_completed());
    }

    #[test]
    fn remove_task_reports_presence() {
        let mut evo = FileEvolution::new("a.py", "worktree", hash_content("base"));
        evo.upsert_snapshot(baseline_snapshot("task-1"));
        assert!(evo.remove_task(&task("task-1")));
        assert!(!evo.remove_task(&task("task-1")));
        assert!(evo.task_snapshots.is_empty());
    }

    #[test]
    fn multi_task_detection() {
        let mut evo = FileEvolution::new("a.py", "worktree", hash_content("base"));
        assert!(!evo.is_multi_task());
        evo.upsert_snapshot(baseline_snapshot("task-1"));
        assert!(!evo.is_multi_task());
        evo.upsert_snapshot(baseline_snapshot("task-2"));
        assert!(evo.is_multi_task());
    }

    #[test]
    fn evolution_serde_roundtrip() {
        let mut evo = FileEvolution::new("src/app.ts", "abc123", hash_content("base"));
        evo.upsert_snapshot(baseline_snapshot("task-1"));
        let json = serde_json::to_string(&evo).unwrap();
        let decoded: FileEvolution = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, evo);
    }

    // -- EvolutionSummary --

    #[test]
    fn summary_display() {
        let summary = EvolutionSummary {
            total_files_tracked: 3,
            total_tasks: 2,
            total_snapshots: 4,
            files_with_multiple_tasks: 1,
        };
        let text = format!("{summary}");
        assert!(text.contains("3 file(s)"));
        assert!(text.contains("2 task(s)"));
        assert!(text.contains("1 shared file(s)"));
    }
}
