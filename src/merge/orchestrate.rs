//! The merge orchestrator facade.
//!
//! [`MergeOrchestrator`] composes the tracker, detector, auto-merger, and
//! batch runner behind four operations:
//!
//! - [`MergeOrchestrator::merge_task`]: single-task convenience; pulls the
//!   task's changed files and three-way contents from the injected
//!   [`TaskContentSource`], merges concurrently, optionally writes back.
//! - [`MergeOrchestrator::merge_tasks`]: multi-task merge; files touched by
//!   more than one task are classified by the conflict detector, compatible
//!   files merge automatically, and incompatible files escalate.
//! - [`MergeOrchestrator::preview_merge`]: the read-only picture. No writes.
//! - [`MergeOrchestrator::write_merged_files`]: write-back of successful
//!   results; a no-op under dry-run.
//!
//! Setup problems (no tasks, no files, a source that cannot enumerate)
//! produce a well-formed report instead of an error; per-file problems stay
//! per-file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BraidError;
use crate::merge::auto::{AutoMerger, ConflictResolver, JobSide, MergeJob};
use crate::merge::runner::{RunnerLimits, run_batch};
use crate::model::report::{MergeReport, MergeResult};
use crate::model::snapshot::{EvolutionSummary, TaskId};
use crate::track::EvolutionTracker;

// ---------------------------------------------------------------------------
// TaskContentSource
// ---------------------------------------------------------------------------

/// The three-way contents of one file for one task.
#[derive(Clone, Debug, Default)]
pub struct TaskFileContents {
    /// Content on the merge target branch. `None` if the file does not
    /// exist there.
    pub main: Option<String>,
    /// Content on the task's branch. `None` if the task deleted the file.
    pub task: Option<String>,
    /// Content at the merge base, when one exists.
    pub base: Option<String>,
}

/// Version-control collaborator: supplies per-task file lists and
/// three-way contents, derived from diffing the task's branch against its
/// target. The engine never invokes the source-control executable itself.
#[async_trait]
pub trait TaskContentSource: Send + Sync {
    /// Files the task changed relative to the merge target.
    async fn changed_files(&self, task_id: &TaskId) -> Result<Vec<PathBuf>, BraidError>;

    /// Three-way contents for one changed file.
    async fn contents(
        &self,
        task_id: &TaskId,
        file_path: &Path,
    ) -> Result<TaskFileContents, BraidError>;
}

// ---------------------------------------------------------------------------
// Requests and previews
// ---------------------------------------------------------------------------

/// One task's entry in a multi-task merge.
#[derive(Clone, Debug)]
pub struct TaskMergeRequest {
    /// The task to merge.
    pub task_id: TaskId,
    /// Worktree to write this merge's files into, overriding the
    /// orchestrator's root. First request with a path wins.
    pub worktree_path: Option<PathBuf>,
}

impl TaskMergeRequest {
    /// A request writing into the orchestrator's default worktree.
    #[must_use]
    pub const fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            worktree_path: None,
        }
    }
}

/// One task's slice of a merge preview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPreview {
    /// The previewed task.
    pub task_id: TaskId,
    /// Files the task has recorded modifications for.
    pub files_modified: Vec<PathBuf>,
}

/// Read-only picture of what a merge would do.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePreview {
    /// Per-task modification lists.
    #[serde(default)]
    pub tasks: Vec<TaskPreview>,
    /// Every file at least one task modified.
    #[serde(default)]
    pub files_to_merge: Vec<PathBuf>,
    /// Files whose snapshots genuinely conflict.
    #[serde(default)]
    pub conflicting_files: Vec<PathBuf>,
    /// Tracker-wide counts.
    #[serde(default)]
    pub summary: EvolutionSummary,
}

// ---------------------------------------------------------------------------
// MergeOrchestrator
// ---------------------------------------------------------------------------

/// Facade composing tracker, detector, merger, and runner.
pub struct MergeOrchestrator {
    tracker: EvolutionTracker,
    merger: Arc<AutoMerger>,
    resolver: Option<Arc<dyn ConflictResolver>>,
    source: Arc<dyn TaskContentSource>,
    limits: RunnerLimits,
    worktree_root: PathBuf,
    dry_run: bool,
}

impl MergeOrchestrator {
    /// Create an orchestrator over a content source and worktree root.
    #[must_use]
    pub fn new(source: Arc<dyn TaskContentSource>, worktree_root: impl Into<PathBuf>) -> Self {
        let worktree_root = worktree_root.into();
        Self {
            tracker: EvolutionTracker::new(worktree_root.clone()),
            merger: Arc::new(AutoMerger::new()),
            resolver: None,
            source,
            limits: RunnerLimits::default(),
            worktree_root,
            dry_run: false,
        }
    }

    /// Attach the external resolver used on escalation.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(Arc::clone(&resolver));
        self.merger = Arc::new(AutoMerger::new().with_resolver(resolver));
        self
    }

    /// Apply loaded configuration: runner limits, analyzer languages, and
    /// escalation enablement. Disabling escalation detaches any resolver,
    /// so conflicting files fail per file instead of escalating.
    #[must_use]
    pub fn with_config(mut self, config: &crate::config::BraidConfig) -> Self {
        self.limits = config.runner_limits();
        self.tracker = self.tracker.with_analyzer(config.semantic_analyzer());

        let mut merger = AutoMerger::new().with_analyzer(config.semantic_analyzer());
        if config.merge.escalation
            && let Some(resolver) = &self.resolver
        {
            merger = merger.with_resolver(Arc::clone(resolver));
        }
        self.merger = Arc::new(merger);
        self
    }

    /// Override the runner's concurrency and deadline budget.
    #[must_use]
    pub fn with_limits(mut self, limits: RunnerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the tracker (e.g. one restored from a state directory).
    #[must_use]
    pub fn with_tracker(mut self, tracker: EvolutionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Preview mode: no file is ever written.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The evolution tracker (read access).
    #[must_use]
    pub const fn tracker(&self) -> &EvolutionTracker {
        &self.tracker
    }

    /// The evolution tracker (write access, for capture/record/cleanup).
    pub fn tracker_mut(&mut self) -> &mut EvolutionTracker {
        &mut self.tracker
    }

    // -----------------------------------------------------------------------
    // merge_task
    // -----------------------------------------------------------------------

    /// Merge one task's branch against the merge target.
    ///
    /// Pulls the changed-file list and three-way contents from the content
    /// source, merges every file concurrently, and (unless dry-run) writes
    /// merged files under `worktree_path` or the orchestrator's root.
    pub async fn merge_task(
        &self,
        task_id: &TaskId,
        worktree_path: Option<&Path>,
    ) -> MergeReport {
        let started = Instant::now();
        let calls_before = self.merger.ai_calls_made();

        let files = match self.source.changed_files(task_id).await {
            Ok(files) => files,
            Err(error) => {
                tracing::warn!(task = %task_id, %error, "cannot enumerate changed files");
                let mut report = MergeReport::empty(vec![task_id.clone()]);
                report.success = false;
                return report;
            }
        };
        if files.is_empty() {
            tracing::info!(task = %task_id, "nothing to merge");
            return MergeReport::empty(vec![task_id.clone()]);
        }

        let mut jobs: Vec<MergeJob> = Vec::new();
        let mut prefailed: Vec<MergeResult> = Vec::new();
        let mut seen: BTreeSet<PathBuf> = BTreeSet::new();

        for path in files {
            if !seen.insert(path.clone()) {
                continue;
            }
            match self.source.contents(task_id, &path).await {
                Err(error) => {
                    prefailed.push(MergeResult::failed(
                        path,
                        format!("failed to load contents: {error}"),
                    ));
                }
                Ok(contents) => {
                    let Some(task_text) = contents.task else {
                        prefailed.push(MergeResult::failed(
                            path,
                            "task content unavailable (deleted or unreadable)",
                        ));
                        continue;
                    };
                    let context = self
                        .tracker
                        .snapshot(task_id, &path)
                        .map(|s| s.changes.clone())
                        .unwrap_or_default();
                    let base = contents
                        .base
                        .or_else(|| self.tracker.baseline_content(&path).map(ToOwned::to_owned));
                    jobs.push(MergeJob {
                        file_path: path,
                        main_content: contents.main.unwrap_or_default(),
                        base_content: base,
                        sides: vec![JobSide {
                            task_id: Some(task_id.clone()),
                            content: task_text,
                            conflicting_changes: context,
                        }],
                    });
                }
            }
        }

        let mut results = run_batch(jobs, Arc::clone(&self.merger), &self.limits).await;
        results.extend(prefailed);

        let report = MergeReport::from_results(
            vec![task_id.clone()],
            results,
            self.merger.ai_calls_made() - calls_before,
            started.elapsed().as_secs_f64(),
        );

        let root = worktree_path.unwrap_or(&self.worktree_root).to_path_buf();
        self.write_into(&root, &report).await;
        tracing::info!(task = %task_id, %report, "merge_task finished");
        report
    }

    // -----------------------------------------------------------------------
    // merge_tasks
    // -----------------------------------------------------------------------

    /// Merge several tasks' edits into one result set.
    ///
    /// Files touched by more than one task are classified by the conflict
    /// detector; compatible files merge deterministically, incompatible
    /// files escalate to the resolver (or fail without one). Task sides
    /// fold in request order.
    pub async fn merge_tasks(&self, requests: &[TaskMergeRequest]) -> MergeReport {
        let started = Instant::now();
        let calls_before = self.merger.ai_calls_made();
        let task_ids: Vec<TaskId> = requests.iter().map(|r| r.task_id.clone()).collect();

        if requests.is_empty() {
            return MergeReport::empty(Vec::new());
        }

        let files = self.tracker.get_files_modified_by_tasks(&task_ids);
        if files.is_empty() {
            tracing::info!(tasks = task_ids.len(), "no tracked modifications to merge");
            return MergeReport::empty(task_ids);
        }

        let mut jobs: Vec<MergeJob> = Vec::new();
        let mut prefailed: Vec<MergeResult> = Vec::new();

        for (path, touched) in files {
            // The verdict is advisory for logging and previews: the merger
            // re-derives safety from the texts themselves, so a stale
            // snapshot cannot force an unsafe union. RequiresResolution
            // files simply skip straight to the ladder + escalation path.
            let verdict = self.tracker.classify_file(&path, &task_ids);
            tracing::debug!(path = %path.display(), %verdict, tasks = touched.len(), "classified file");

            match self.build_multi_task_job(&path, requests, &touched).await {
                Ok(job) => jobs.push(job),
                Err(result) => prefailed.push(*result),
            }
        }

        let mut results = run_batch(jobs, Arc::clone(&self.merger), &self.limits).await;
        results.extend(prefailed);

        let report = MergeReport::from_results(
            task_ids,
            results,
            self.merger.ai_calls_made() - calls_before,
            started.elapsed().as_secs_f64(),
        );

        let root = requests
            .iter()
            .find_map(|r| r.worktree_path.clone())
            .unwrap_or_else(|| self.worktree_root.clone());
        self.write_into(&root, &report).await;
        tracing::info!(%report, "merge_tasks finished");
        report
    }

    async fn build_multi_task_job(
        &self,
        path: &Path,
        requests: &[TaskMergeRequest],
        touched: &BTreeSet<TaskId>,
    ) -> Result<MergeJob, Box<MergeResult>> {
        let mut sides: Vec<JobSide> = Vec::new();
        let mut main: Option<String> = None;
        let mut base: Option<String> = None;

        for request in requests {
            if !touched.contains(&request.task_id) {
                continue;
            }
            let contents = match self.source.contents(&request.task_id, path).await {
                Ok(contents) => contents,
                Err(error) => {
                    return Err(Box::new(MergeResult::failed(
                        path,
                        format!("failed to load contents: {error}"),
                    )));
                }
            };
            if main.is_none() {
                main = contents.main;
            }
            if base.is_none() {
                base = contents.base;
            }
            let Some(task_text) = contents.task else {
                return Err(Box::new(MergeResult::failed(
                    path,
                    format!(
                        "task '{}' content unavailable for '{}'",
                        request.task_id,
                        path.display()
                    ),
                )));
            };
            let context = self
                .tracker
                .snapshot(&request.task_id, path)
                .map(|s| s.changes.clone())
                .unwrap_or_default();
            sides.push(JobSide {
                task_id: Some(request.task_id.clone()),
                content: task_text,
                conflicting_changes: context,
            });
        }

        let base =
            base.or_else(|| self.tracker.baseline_content(path).map(ToOwned::to_owned));
        let main = main.or_else(|| base.clone()).unwrap_or_default();

        Ok(MergeJob {
            file_path: path.to_path_buf(),
            main_content: main,
            base_content: base,
            sides,
        })
    }

    // -----------------------------------------------------------------------
    // preview_merge
    // -----------------------------------------------------------------------

    /// Read-only preview: per-task files, merge set, conflicts, summary.
    #[must_use]
    pub fn preview_merge(&self, task_ids: &[TaskId]) -> MergePreview {
        let tasks = task_ids
            .iter()
            .map(|id| TaskPreview {
                task_id: id.clone(),
                files_modified: self
                    .tracker
                    .get_files_modified_by_tasks(std::slice::from_ref(id))
                    .into_keys()
                    .collect(),
            })
            .collect();

        let files_to_merge: Vec<PathBuf> = self
            .tracker
            .get_files_modified_by_tasks(task_ids)
            .into_keys()
            .collect();
        let conflicting_files: Vec<PathBuf> = self
            .tracker
            .get_conflicting_files(task_ids)
            .into_iter()
            .collect();

        MergePreview {
            tasks,
            files_to_merge,
            conflicting_files,
            summary: self.tracker.get_evolution_summary(),
        }
    }

    // -----------------------------------------------------------------------
    // write-back
    // -----------------------------------------------------------------------

    /// Write every successful merged file under the orchestrator's
    /// worktree root. Returns the written paths; empty under dry-run.
    ///
    /// # Errors
    /// Infallible today; kept fallible for embedders that layer storage
    /// behind it. Per-file write failures are logged and skipped.
    pub async fn write_merged_files(
        &self,
        report: &MergeReport,
    ) -> Result<Vec<PathBuf>, BraidError> {
        Ok(self.write_into(&self.worktree_root, report).await)
    }

    async fn write_into(&self, root: &Path, report: &MergeReport) -> Vec<PathBuf> {
        if self.dry_run {
            tracing::info!("dry-run: skipping write-back");
            return Vec::new();
        }

        let mut written = Vec::new();
        for result in &report.results {
            let Some(content) = result.merged_content.as_ref().filter(|_| result.success)
            else {
                continue;
            };
            let target = root.join(&result.file_path);
            if let Some(parent) = target.parent()
                && let Err(error) = tokio::fs::create_dir_all(parent).await
            {
                tracing::warn!(path = %target.display(), %error, "cannot create parent directory");
                continue;
            }
            match tokio::fs::write(&target, content).await {
                Ok(()) => written.push(result.file_path.clone()),
                Err(error) => {
                    tracing::warn!(path = %target.display(), %error, "failed to write merged file");
                }
            }
        }
        tracing::info!(files = written.len(), root = %root.display(), "wrote merged files");
        written
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
