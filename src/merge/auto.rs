//! The auto-merge decision ladder and resolver escalation.
//!
//! [`AutoMerger`] decides each file's merge in strict cost order:
//!
//! 1. **Textual ladder** (cheapest, always first): identical contents win
//!    outright; when only one side diverged from the known base, the
//!    diverged side wins. No parsing happens before these checks.
//! 2. **Union merge**: remaining divergent sides that are all additive and
//!    structurally disjoint are composed deterministically
//!    (see [`crate::merge::union`]).
//! 3. **Escalation**: everything else goes to the external
//!    [`ConflictResolver`], an opaque, possibly slow, possibly unavailable
//!    collaborator. With no resolver configured the file fails with a
//!    requires-resolution error; sibling files are unaffected.
//!
//! Escalations are counted in an atomic shared with the orchestrator's
//! report stats.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::analyze::SemanticAnalyzer;
use crate::merge::union::additive_union;
use crate::model::change::SemanticChange;
use crate::model::report::MergeResult;
use crate::model::snapshot::TaskId;

// ---------------------------------------------------------------------------
// ConflictResolver
// ---------------------------------------------------------------------------

/// A request handed to the external resolver on escalation.
#[derive(Clone, Debug)]
pub struct ResolveRequest {
    /// Path of the conflicted file.
    pub file_path: PathBuf,
    /// Content on the merge target side.
    pub main_content: String,
    /// Content on the task side.
    pub task_content: String,
    /// Common base content, when known.
    pub base_content: Option<String>,
    /// The semantic changes that made the file unmergeable, for context.
    pub conflicting_changes: Vec<SemanticChange>,
}

/// Why the external resolver could not produce a merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// The resolver backend is not reachable or not configured.
    Unavailable,
    /// The resolver ran but failed to produce a merged text.
    Failed(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "resolver unavailable"),
            Self::Failed(detail) => write!(f, "{detail}"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// External conflict-resolution collaborator.
///
/// The engine treats implementations as opaque and never assumes success;
/// a slow call is cancellable at the await point when the batch deadline
/// fires.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Produce a merged text for a genuinely conflicting file.
    async fn resolve(&self, request: ResolveRequest) -> Result<String, ResolveError>;
}

// ---------------------------------------------------------------------------
// Merge jobs
// ---------------------------------------------------------------------------

/// One side of a per-file merge job: a task's version of the file.
#[derive(Clone, Debug)]
pub struct JobSide {
    /// The contributing task, when known.
    pub task_id: Option<TaskId>,
    /// The task's full file content.
    pub content: String,
    /// The task's semantic changes, passed to the resolver as context.
    pub conflicting_changes: Vec<SemanticChange>,
}

impl JobSide {
    /// A side with no tracked task identity or change context.
    #[must_use]
    pub fn bare(content: impl Into<String>) -> Self {
        Self {
            task_id: None,
            content: content.into(),
            conflicting_changes: Vec::new(),
        }
    }
}

/// A per-file merge job: the main content, the common base (when known),
/// and one side per contributing task, folded in order.
#[derive(Clone, Debug)]
pub struct MergeJob {
    /// Path of the file, relative to the worktree root.
    pub file_path: PathBuf,
    /// Content on the merge target side.
    pub main_content: String,
    /// Common base content, when known.
    pub base_content: Option<String>,
    /// Task sides, folded in order.
    pub sides: Vec<JobSide>,
}

impl MergeJob {
    /// The classic three-way single-task job.
    #[must_use]
    pub fn three_way(
        file_path: impl Into<PathBuf>,
        main_content: impl Into<String>,
        task_content: impl Into<String>,
        base_content: Option<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            main_content: main_content.into(),
            base_content,
            sides: vec![JobSide::bare(task_content)],
        }
    }
}

// ---------------------------------------------------------------------------
// AutoMerger
// ---------------------------------------------------------------------------

/// The per-file merge decision procedure.
pub struct AutoMerger {
    analyzer: SemanticAnalyzer,
    resolver: Option<Arc<dyn ConflictResolver>>,
    ai_calls: AtomicUsize,
}

impl Default for AutoMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoMerger {
    /// A merger with no resolver: conflicts fail instead of escalating.
    #[must_use]
    pub fn new() -> Self {
        Self {
            analyzer: SemanticAnalyzer::new(),
            resolver: None,
            ai_calls: AtomicUsize::new(0),
        }
    }

    /// Attach the external resolver used on escalation.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use a specific analyzer for union-merge reconstruction.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: SemanticAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Total escalations since construction.
    #[must_use]
    pub fn ai_calls_made(&self) -> usize {
        self.ai_calls.load(Ordering::Relaxed)
    }

    /// Merge one file three ways.
    pub async fn merge(
        &self,
        file_path: &Path,
        main_content: &str,
        task_content: &str,
        base_content: Option<&str>,
    ) -> MergeResult {
        self.merge_file(MergeJob::three_way(
            file_path,
            main_content,
            task_content,
            base_content.map(ToOwned::to_owned),
        ))
        .await
    }

    /// Run the full decision procedure for one job.
    pub async fn merge_file(&self, job: MergeJob) -> MergeResult {
        let base = job.base_content.as_deref();

        // Step 1: fold every side the textual ladder can absorb. These
        // equality checks are strictly cheaper than any parse and always
        // run first.
        let mut current = job.main_content.clone();
        let mut pending: Vec<&JobSide> = Vec::new();
        for side in &job.sides {
            match textual_ladder(&current, &side.content, base) {
                Some(text) => current = text,
                None => pending.push(side),
            }
        }
        if pending.is_empty() {
            tracing::debug!(path = %job.file_path.display(), "merged textually");
            return MergeResult::auto_merged(job.file_path, current);
        }

        // Step 2: deterministic union of the remaining divergence.
        if let Some(base_text) = base {
            let mut divergent: Vec<&str> = Vec::new();
            if current != base_text {
                divergent.push(current.as_str());
            }
            for side in &pending {
                divergent.push(side.content.as_str());
            }
            if let Some(merged) =
                additive_union(&job.file_path, base_text, &divergent, &self.analyzer)
            {
                tracing::debug!(
                    path = %job.file_path.display(),
                    sides = divergent.len(),
                    "merged by additive union"
                );
                return MergeResult::auto_merged(job.file_path, merged);
            }
        }

        // Step 3: escalate each remaining side in order.
        for side in pending {
            match self.escalate(&job.file_path, &current, side, base).await {
                Ok(text) => current = text,
                Err(error) => {
                    tracing::warn!(path = %job.file_path.display(), %error, "merge failed");
                    return MergeResult::failed(job.file_path, error);
                }
            }
        }
        MergeResult::resolved(job.file_path, current)
    }

    async fn escalate(
        &self,
        file_path: &Path,
        main_content: &str,
        side: &JobSide,
        base_content: Option<&str>,
    ) -> Result<String, String> {
        let Some(resolver) = &self.resolver else {
            return Err(
                "requires resolution: both sides changed and no resolver is configured"
                    .to_owned(),
            );
        };

        self.ai_calls.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            path = %file_path.display(),
            task = side.task_id.as_ref().map_or("unknown", TaskId::as_str),
            "escalating to resolver"
        );

        let request = ResolveRequest {
            file_path: file_path.to_path_buf(),
            main_content: main_content.to_owned(),
            task_content: side.content.clone(),
            base_content: base_content.map(ToOwned::to_owned),
            conflicting_changes: side.conflicting_changes.clone(),
        };
        resolver
            .resolve(request)
            .await
            .map_err(|e| format!("resolver failed: {e}"))
    }
}

/// Steps 1-3 of the textual ladder. `None` means both sides diverged (or
/// no base is known and the contents differ).
fn textual_ladder(main: &str, task: &str, base: Option<&str>) -> Option<String> {
    if main == task {
        return Some(main.to_owned());
    }
    if base == Some(task) {
        return Some(main.to_owned());
    }
    if base == Some(main) {
        return Some(task.to_owned());
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
