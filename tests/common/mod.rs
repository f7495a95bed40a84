//! Shared test helpers for braid integration tests.
//!
//! All tests use temp directories as worktrees; no side effects outside
//! them. The in-memory [`MapSource`] stands in for the version-control
//! collaborator, and the resolver stubs exercise the escalation paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use braid::error::BraidError;
use braid::merge::{ConflictResolver, ResolveError, ResolveRequest, TaskContentSource, TaskFileContents};
use braid::model::snapshot::TaskId;

/// Shorthand for a validated task id.
pub fn task(name: &str) -> TaskId {
    TaskId::new(name).expect("valid task id")
}

/// Seed a file inside a temp worktree.
pub fn seed(dir: &Path, name: &str, content: &str) {
    if let Some(parent) = Path::new(name).parent() {
        std::fs::create_dir_all(dir.join(parent)).expect("create parent dirs");
    }
    std::fs::write(dir.join(name), content).expect("seed file");
}

/// In-memory version-control collaborator.
#[derive(Default)]
pub struct MapSource {
    files: HashMap<(TaskId, PathBuf), TaskFileContents>,
}

impl MapSource {
    pub fn insert(
        &mut self,
        task_id: &TaskId,
        path: &str,
        main: Option<&str>,
        task_text: Option<&str>,
        base: Option<&str>,
    ) {
        self.files.insert(
            (task_id.clone(), PathBuf::from(path)),
            TaskFileContents {
                main: main.map(ToOwned::to_owned),
                task: task_text.map(ToOwned::to_owned),
                base: base.map(ToOwned::to_owned),
            },
        );
    }
}

#[async_trait]
impl TaskContentSource for MapSource {
    async fn changed_files(&self, task_id: &TaskId) -> Result<Vec<PathBuf>, BraidError> {
        let mut files: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|(id, _)| id == task_id)
            .map(|(_, path)| path.clone())
            .collect();
        files.sort();
        Ok(files)
    }

    async fn contents(
        &self,
        task_id: &TaskId,
        file_path: &Path,
    ) -> Result<TaskFileContents, BraidError> {
        Ok(self
            .files
            .get(&(task_id.clone(), file_path.to_path_buf()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolver that fails for one path and succeeds elsewhere.
pub struct FailsFor {
    pub path: PathBuf,
}

#[async_trait]
impl ConflictResolver for FailsFor {
    async fn resolve(&self, request: ResolveRequest) -> Result<String, ResolveError> {
        if request.file_path == self.path {
            Err(ResolveError::Failed("injected resolver failure".to_owned()))
        } else {
            Ok(format!("resolved:{}\n{}", request.file_path.display(), request.task_content))
        }
    }
}

/// Resolver that never returns, for timeout scenarios.
pub struct NeverReturns;

#[async_trait]
impl ConflictResolver for NeverReturns {
    async fn resolve(&self, _request: ResolveRequest) -> Result<String, ResolveError> {
        std::future::pending::<()>().await;
        unreachable!("pending future never completes")
    }
}
