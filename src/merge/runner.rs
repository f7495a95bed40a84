//! Bounded-parallel merge batch runner.
//!
//! Runs one merge attempt per distinct file concurrently: a semaphore caps
//! in-flight attempts at a fixed worker budget (file counts can be large
//! and each escalation may hit a rate-limited resolver), a `JoinSet`
//! collects results, and a whole-batch deadline aborts still-running
//! attempts. Attempts that completed before the deadline keep their
//! results; every unfinished file is reported as a timeout failure, never
//! silently dropped. A panicked attempt likewise fails only its own file.
//!
//! No state is shared between concurrent attempts: each reads only the
//! text blobs in its job and writes only its own result slot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::merge::auto::{AutoMerger, MergeJob};
use crate::model::report::MergeResult;

// ---------------------------------------------------------------------------
// RunnerLimits
// ---------------------------------------------------------------------------

/// Concurrency and deadline budget for one batch.
#[derive(Clone, Debug)]
pub struct RunnerLimits {
    /// Maximum concurrent per-file merge attempts.
    pub max_parallel: usize,
    /// Wall-clock deadline for the whole batch.
    pub batch_timeout: Duration,
}

impl Default for RunnerLimits {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            batch_timeout: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// run_batch
// ---------------------------------------------------------------------------

/// Run every job's merge decision concurrently and return one
/// [`MergeResult`] per job, in job order.
///
/// Jobs are expected to carry distinct file paths (one job per distinct
/// file). A single failing, panicking, or timed-out attempt never fails
/// the batch.
pub async fn run_batch(
    jobs: Vec<MergeJob>,
    merger: Arc<AutoMerger>,
    limits: &RunnerLimits,
) -> Vec<MergeResult> {
    if jobs.is_empty() {
        return Vec::new();
    }

    let order: Vec<PathBuf> = jobs.iter().map(|j| j.file_path.clone()).collect();
    let semaphore = Arc::new(Semaphore::new(limits.max_parallel.max(1)));
    let mut join_set: JoinSet<MergeResult> = JoinSet::new();
    let mut task_paths: HashMap<tokio::task::Id, PathBuf> = HashMap::new();

    tracing::info!(
        files = jobs.len(),
        max_parallel = limits.max_parallel,
        timeout_secs = limits.batch_timeout.as_secs(),
        "starting merge batch"
    );

    for job in jobs {
        let path = job.file_path.clone();
        let permits = Arc::clone(&semaphore);
        let merger = Arc::clone(&merger);
        let handle = join_set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            merger.merge_file(job).await
        });
        task_paths.insert(handle.id(), path);
    }

    let deadline = Instant::now() + limits.batch_timeout;
    let mut timed_out = false;
    let mut results: HashMap<PathBuf, MergeResult> = HashMap::new();

    while !join_set.is_empty() {
        tokio::select! {
            () = tokio::time::sleep_until(deadline), if !timed_out => {
                tracing::warn!(
                    pending = join_set.len(),
                    "batch deadline reached, cancelling remaining merges"
                );
                timed_out = true;
                join_set.abort_all();
            }
            joined = join_set.join_next_with_id() => {
                match joined {
                    Some(Ok((_, result))) => {
                        results.insert(result.file_path.clone(), result);
                    }
                    Some(Err(join_error)) => {
                        let path = task_paths
                            .get(&join_error.id())
                            .cloned()
                            .unwrap_or_default();
                        let error = if join_error.is_cancelled() {
                            format!(
                                "merge timed out after {:.1}s",
                                limits.batch_timeout.as_secs_f64()
                            )
                        } else {
                            format!("merge attempt panicked: {join_error}")
                        };
                        results.insert(path.clone(), MergeResult::failed(path, error));
                    }
                    None => break,
                }
            }
        }
    }

    // Complete one-to-one correspondence by file path, in job order.
    let mut ordered = Vec::with_capacity(order.len());
    for path in order {
        let result = results.remove(&path).unwrap_or_else(|| {
            MergeResult::failed(
                path.clone(),
                format!(
                    "merge timed out after {:.1}s",
                    limits.batch_timeout.as_secs_f64()
                ),
            )
        });
        ordered.push(result);
    }

    let failed = ordered.iter().filter(|r| !r.success).count();
    tracing::info!(
        files = ordered.len(),
        failed,
        timed_out,
        "merge batch finished"
    );
    ordered
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::merge::auto::{ConflictResolver, ResolveError, ResolveRequest};

    fn diverged_job(name: &str) -> MergeJob {
        MergeJob::three_way(name, "main\n", "task\n", Some("base\n".to_owned()))
    }

    fn clean_job(name: &str) -> MergeJob {
        MergeJob::three_way(name, "same\n", "same\n", None)
    }

    /// Resolver that fails only for one path.
    struct FailsFor {
        path: PathBuf,
    }

    #[async_trait]
    impl ConflictResolver for FailsFor {
        async fn resolve(&self, request: ResolveRequest) -> Result<String, ResolveError> {
            if request.file_path == self.path {
                Err(ResolveError::Failed("injected failure".to_owned()))
            } else {
                Ok(format!("resolved:{}", request.file_path.display()))
            }
        }
    }

    /// Resolver that never returns.
    struct NeverReturns;

    #[async_trait]
    impl ConflictResolver for NeverReturns {
        async fn resolve(&self, _request: ResolveRequest) -> Result<String, ResolveError> {
            std::future::pending::<()>().await;
            unreachable!("pending future never completes")
        }
    }

    /// Resolver that records its peak concurrency.
    struct Gauged {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ConflictResolver for Gauged {
        async fn resolve(&self, request: ResolveRequest) -> Result<String, ResolveError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("resolved:{}", request.file_path.display()))
        }
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let results = run_batch(vec![], Arc::new(AutoMerger::new()), &RunnerLimits::default())
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_are_one_to_one_in_job_order() {
        let jobs = vec![clean_job("c.txt"), clean_job("a.txt"), clean_job("b.txt")];
        let results = run_batch(jobs, Arc::new(AutoMerger::new()), &RunnerLimits::default())
            .await;
        let paths: Vec<&Path> = results.iter().map(|r| r.file_path.as_path()).collect();
        assert_eq!(
            paths,
            vec![Path::new("c.txt"), Path::new("a.txt"), Path::new("b.txt")]
        );
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn one_failure_leaves_siblings_unaffected() {
        let merger = Arc::new(AutoMerger::new().with_resolver(Arc::new(FailsFor {
            path: PathBuf::from("bad.txt"),
        })));
        let jobs = vec![
            diverged_job("ok-1.txt"),
            diverged_job("bad.txt"),
            diverged_job("ok-2.txt"),
        ];
        let results = run_batch(jobs, merger, &RunnerLimits::default()).await;

        assert_eq!(results.len(), 3);
        let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].file_path, Path::new("bad.txt"));
        assert!(failed[0].error.as_deref().unwrap().contains("injected failure"));
    }

    #[tokio::test]
    async fn timeout_fails_unfinished_files_and_keeps_finished_ones() {
        let merger = Arc::new(AutoMerger::new().with_resolver(Arc::new(NeverReturns)));
        let jobs = vec![clean_job("fast.txt"), diverged_job("stuck.txt")];
        let limits = RunnerLimits {
            max_parallel: 4,
            batch_timeout: Duration::from_millis(200),
        };

        let started = std::time::Instant::now();
        let results = run_batch(jobs, merger, &limits).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 2);
        let fast = results.iter().find(|r| r.file_path == Path::new("fast.txt"));
        assert!(fast.unwrap().success, "completed file keeps its result");
        let stuck = results
            .iter()
            .find(|r| r.file_path == Path::new("stuck.txt"))
            .unwrap();
        assert!(!stuck.success);
        assert!(stuck.error.as_deref().unwrap().contains("timed out"));
        assert!(
            elapsed < Duration::from_secs(5),
            "returns at the timeout bound, not indefinitely (took {elapsed:?})"
        );
    }

    #[tokio::test]
    async fn parallelism_is_bounded() {
        let gauge = Arc::new(Gauged {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let resolver: Arc<dyn ConflictResolver> = gauge.clone();
        let merger = Arc::new(AutoMerger::new().with_resolver(resolver));
        let jobs: Vec<MergeJob> = (0..12)
            .map(|i| diverged_job(&format!("f-{i}.txt")))
            .collect();
        let limits = RunnerLimits {
            max_parallel: 3,
            batch_timeout: Duration::from_secs(30),
        };

        let results = run_batch(jobs, merger, &limits).await;
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.success));
        assert!(
            gauge.peak.load(Ordering::SeqCst) <= 3,
            "peak concurrency {} exceeded the worker budget",
            gauge.peak.load(Ordering::SeqCst)
        );
    }
}
