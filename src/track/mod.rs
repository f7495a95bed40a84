//! Per-file evolution tracking across concurrent tasks.
//!
//! The [`EvolutionTracker`] owns every [`FileEvolution`] and
//! [`TaskSnapshot`]: it captures baselines, records per-task modifications
//! (always re-analyzed against the original baseline, so a snapshot holds
//! the cumulative change), answers queries about which tasks touched which
//! files, and cleans up after finished tasks. Other components receive
//! read-only views and never mutate tracker state.
//!
//! # Persistence
//!
//! With a configured `state_dir`, every mutation writes the affected
//! file's evolution as a JSON record named by its [`storage_key`], and
//! baseline blobs are stored content-addressed under `state_dir/blobs/`.
//! A persistence failure is scoped to the affected record: it is logged
//! and the operation proceeds.
//!
//! # Concurrency
//!
//! Mutations take `&mut self`; the exclusive borrow enforces the
//! caller-side write serialization the merge pipeline relies on. Queries
//! take `&self` and may run concurrently with each other.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::analyze::SemanticAnalyzer;
use crate::detect::{ConflictDetector, ConflictVerdict};
use crate::error::BraidError;
use crate::hash::{ContentHash, hash_content, storage_key};
use crate::model::snapshot::{
    EvolutionSummary, FileEvolution, TaskId, TaskSnapshot, now_millis,
};

/// Baseline commit marker for content captured from the working copy.
const WORKTREE_BASELINE: &str = "worktree";

// ---------------------------------------------------------------------------
// EvolutionTracker
// ---------------------------------------------------------------------------

/// Owner of all per-file evolution state.
#[derive(Debug)]
pub struct EvolutionTracker {
    analyzer: SemanticAnalyzer,
    detector: ConflictDetector,
    /// Per-file histories, keyed by worktree-relative path.
    evolutions: BTreeMap<PathBuf, FileEvolution>,
    /// Content-addressed baseline blobs, stored once and shared by every
    /// evolution whose baseline hashes to the same digest.
    baselines: HashMap<ContentHash, String>,
    /// Root used to read on-disk content at baseline capture time.
    worktree_root: PathBuf,
    /// Optional JSON persistence directory.
    state_dir: Option<PathBuf>,
}

impl EvolutionTracker {
    /// Create a tracker reading baselines from `worktree_root`.
    #[must_use]
    pub fn new(worktree_root: impl Into<PathBuf>) -> Self {
        Self {
            analyzer: SemanticAnalyzer::new(),
            detector: ConflictDetector::new(),
            evolutions: BTreeMap::new(),
            baselines: HashMap::new(),
            worktree_root: worktree_root.into(),
            state_dir: None,
        }
    }

    /// Use a specific analyzer (e.g. restricted to configured languages).
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: SemanticAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Persist evolution records under `dir` as they change.
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    // -----------------------------------------------------------------------
    // Baseline capture
    // -----------------------------------------------------------------------

    /// Capture baselines for a task across a set of files.
    ///
    /// For each path, creates a [`FileEvolution`] recording the content on
    /// disk at call time as the baseline (missing files baseline as empty),
    /// or reuses the existing evolution when another task already captured
    /// one. Inserts an empty in-progress [`TaskSnapshot`] for `task_id`,
    /// reusing the existing snapshot if this task already captured the file.
    ///
    /// Returns the evolution for each path.
    ///
    /// # Errors
    /// Returns an error if on-disk content exists but cannot be read.
    pub fn capture_baselines(
        &mut self,
        task_id: &TaskId,
        file_paths: &[PathBuf],
        intent: &str,
    ) -> Result<BTreeMap<PathBuf, FileEvolution>, BraidError> {
        let mut captured = BTreeMap::new();

        for path in file_paths {
            if !self.evolutions.contains_key(path) {
                let content = self.read_worktree_content(path)?;
                let baseline_hash = hash_content(&content);
                self.baselines
                    .entry(baseline_hash.clone())
                    .or_insert(content);
                self.evolutions.insert(
                    path.clone(),
                    FileEvolution::new(path.clone(), WORKTREE_BASELINE, baseline_hash),
                );
                self.persist_blob_for(path);
            }

            // The borrow of evolutions must not overlap persist_evolution.
            let evolution_snapshot = {
                let evolution = self
                    .evolutions
                    .get_mut(path)
                    .unwrap_or_else(|| unreachable!("evolution inserted above"));
                if evolution.snapshot(task_id).is_none() {
                    evolution.upsert_snapshot(TaskSnapshot::at_baseline(
                        task_id.clone(),
                        intent,
                        evolution.baseline_hash.clone(),
                    ));
                }
                evolution.clone()
            };

            self.persist_evolution(&evolution_snapshot);
            tracing::debug!(task = %task_id, path = %path.display(), "captured baseline");
            captured.insert(path.clone(), evolution_snapshot);
        }

        Ok(captured)
    }

    // -----------------------------------------------------------------------
    // Modification recording
    // -----------------------------------------------------------------------

    /// Record a task's modification of one file.
    ///
    /// The semantic analysis always runs against the file's ORIGINAL
    /// baseline content, not `old_content` from this call, so repeated
    /// records for the same task+file keep the snapshot cumulative since
    /// baseline. `old_content` seeds the baseline only when the path was
    /// never captured.
    ///
    /// # Errors
    /// Infallible today beyond id plumbing; kept fallible for storage-layer
    /// evolution.
    pub fn record_modification(
        &mut self,
        task_id: &TaskId,
        file_path: &Path,
        old_content: &str,
        new_content: &str,
    ) -> Result<TaskSnapshot, BraidError> {
        if !self.evolutions.contains_key(file_path) {
            let baseline_hash = hash_content(old_content);
            self.baselines
                .entry(baseline_hash.clone())
                .or_insert_with(|| old_content.to_owned());
            self.evolutions.insert(
                file_path.to_path_buf(),
                FileEvolution::new(file_path, WORKTREE_BASELINE, baseline_hash),
            );
            self.persist_blob_for(file_path);
        }

        let (baseline_hash, baseline_content) = {
            let evolution = self
                .evolutions
                .get(file_path)
                .unwrap_or_else(|| unreachable!("evolution inserted above"));
            let hash = evolution.baseline_hash.clone();
            let content = self.baselines.get(&hash).cloned().unwrap_or_default();
            (hash, content)
        };

        let analysis = self
            .analyzer
            .analyze(file_path, &baseline_content, new_content);

        let evolution_snapshot = {
            let evolution = self
                .evolutions
                .get_mut(file_path)
                .unwrap_or_else(|| unreachable!("evolution inserted above"));

            let mut snapshot = evolution.snapshot(task_id).cloned().unwrap_or_else(|| {
                TaskSnapshot::at_baseline(task_id.clone(), "", baseline_hash.clone())
            });
            snapshot.completed_at = Some(now_millis());
            snapshot.content_hash_after = hash_content(new_content);
            snapshot.changes = analysis.changes;

            evolution.upsert_snapshot(snapshot);
            evolution.clone()
        };

        self.persist_evolution(&evolution_snapshot);

        let snapshot = evolution_snapshot
            .snapshot(task_id)
            .cloned()
            .unwrap_or_else(|| unreachable!("snapshot upserted above"));
        tracing::debug!(
            task = %task_id,
            path = %file_path.display(),
            changes = snapshot.changes.len(),
            "recorded modification"
        );
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Every snapshot belonging to a task, in path order.
    #[must_use]
    pub fn get_task_modifications(&self, task_id: &TaskId) -> Vec<TaskSnapshot> {
        self.evolutions
            .values()
            .filter_map(|evo| evo.snapshot(task_id).cloned())
            .collect()
    }

    /// Which of the given tasks modified which files.
    ///
    /// Only completed snapshots count as modifications; a captured-but-
    /// untouched baseline does not.
    #[must_use]
    pub fn get_files_modified_by_tasks(
        &self,
        task_ids: &[TaskId],
    ) -> BTreeMap<PathBuf, BTreeSet<TaskId>> {
        let mut map = BTreeMap::new();
        for (path, evolution) in &self.evolutions {
            let touched: BTreeSet<TaskId> = task_ids
                .iter()
                .filter(|id| evolution.snapshot(id).is_some_and(TaskSnapshot::is_completed))
                .cloned()
                .collect();
            if !touched.is_empty() {
                map.insert(path.clone(), touched);
            }
        }
        map
    }

    /// Files where the given tasks' snapshots genuinely conflict
    /// (pairwise verdict [`ConflictVerdict::RequiresResolution`]).
    #[must_use]
    pub fn get_conflicting_files(&self, task_ids: &[TaskId]) -> BTreeSet<PathBuf> {
        let mut conflicting = BTreeSet::new();
        for (path, evolution) in &self.evolutions {
            let snapshots: Vec<&TaskSnapshot> = task_ids
                .iter()
                .filter_map(|id| evolution.snapshot(id))
                .filter(|s| s.is_completed())
                .collect();
            if snapshots.len() < 2 {
                continue;
            }
            if self.detector.classify(&snapshots) == ConflictVerdict::RequiresResolution {
                conflicting.insert(path.clone());
            }
        }
        conflicting
    }

    /// The verdict for one file across the given tasks.
    #[must_use]
    pub fn classify_file(&self, file_path: &Path, task_ids: &[TaskId]) -> ConflictVerdict {
        self.evolutions.get(file_path).map_or(
            ConflictVerdict::NoConflict,
            |evolution| {
                let snapshots: Vec<&TaskSnapshot> = task_ids
                    .iter()
                    .filter_map(|id| evolution.snapshot(id))
                    .filter(|s| s.is_completed())
                    .collect();
                self.detector.classify(&snapshots)
            },
        )
    }

    /// Read-only view of one file's evolution.
    #[must_use]
    pub fn evolution(&self, file_path: &Path) -> Option<&FileEvolution> {
        self.evolutions.get(file_path)
    }

    /// Read-only view of one task's snapshot for one file.
    #[must_use]
    pub fn snapshot(&self, task_id: &TaskId, file_path: &Path) -> Option<&TaskSnapshot> {
        self.evolutions
            .get(file_path)
            .and_then(|evo| evo.snapshot(task_id))
    }

    /// Baseline content for a tracked file.
    #[must_use]
    pub fn baseline_content(&self, file_path: &Path) -> Option<&str> {
        self.evolutions
            .get(file_path)
            .and_then(|evo| self.baselines.get(&evo.baseline_hash))
            .map(String::as_str)
    }

    /// Aggregate counts for status reporting.
    #[must_use]
    pub fn get_evolution_summary(&self) -> EvolutionSummary {
        let mut tasks = BTreeSet::new();
        let mut total_snapshots = 0;
        let mut shared = 0;
        for evolution in self.evolutions.values() {
            total_snapshots += evolution.task_snapshots.len();
            if evolution.is_multi_task() {
                shared += 1;
            }
            for id in evolution.task_ids() {
                tasks.insert(id.clone());
            }
        }
        EvolutionSummary {
            total_files_tracked: self.evolutions.len(),
            total_tasks: tasks.len(),
            total_snapshots,
            files_with_multiple_tasks: shared,
        }
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Remove a task's snapshots from every file it touched.
    ///
    /// With `remove_baselines`, evolutions left with no snapshots are
    /// dropped and baseline blobs no longer referenced by any remaining
    /// evolution are discarded.
    pub fn cleanup_task(&mut self, task_id: &TaskId, remove_baselines: bool) {
        let mut dirty: Vec<PathBuf> = Vec::new();
        for (path, evolution) in &mut self.evolutions {
            if evolution.remove_task(task_id) {
                dirty.push(path.clone());
            }
        }

        let mut dropped: Vec<PathBuf> = Vec::new();
        if remove_baselines {
            let empty: Vec<PathBuf> = self
                .evolutions
                .iter()
                .filter(|(_, evo)| evo.task_snapshots.is_empty())
                .map(|(path, _)| path.clone())
                .collect();
            for path in empty {
                self.evolutions.remove(&path);
                dirty.retain(|p| p != &path);
                dropped.push(path);
            }

            let referenced: BTreeSet<ContentHash> = self
                .evolutions
                .values()
                .map(|evo| evo.baseline_hash.clone())
                .collect();
            self.baselines.retain(|hash, _| referenced.contains(hash));
        }

        for path in &dirty {
            if let Some(evolution) = self.evolutions.get(path) {
                let evolution = evolution.clone();
                self.persist_evolution(&evolution);
            }
        }
        for path in &dropped {
            self.remove_persisted(path);
        }

        tracing::debug!(task = %task_id, remove_baselines, "cleaned up task");
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load previously persisted evolution records and baseline blobs.
    ///
    /// Corrupt records are skipped with a warning; the rest load (a
    /// storage failure is fatal for the affected record only).
    ///
    /// # Errors
    /// Returns an error if the state directory itself cannot be read.
    pub fn load_state(&mut self) -> Result<usize, BraidError> {
        let Some(dir) = self.state_dir.clone() else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| {
                    serde_json::from_str::<FileEvolution>(&text).map_err(|e| e.to_string())
                }) {
                Ok(evolution) => {
                    self.load_blob(&evolution.baseline_hash, &dir);
                    self.evolutions
                        .insert(evolution.file_path.clone(), evolution);
                    loaded += 1;
                }
                Err(detail) => {
                    tracing::warn!(record = %path.display(), %detail, "skipping corrupt evolution record");
                }
            }
        }
        tracing::info!(count = loaded, dir = %dir.display(), "loaded evolution state");
        Ok(loaded)
    }

    fn load_blob(&mut self, hash: &ContentHash, dir: &Path) {
        if self.baselines.contains_key(hash) {
            return;
        }
        let blob_path = dir.join("blobs").join(hash.as_str());
        match fs::read_to_string(&blob_path) {
            Ok(content) => {
                self.baselines.insert(hash.clone(), content);
            }
            Err(e) => {
                tracing::warn!(blob = %blob_path.display(), error = %e, "baseline blob missing");
            }
        }
    }

    fn persist_evolution(&self, evolution: &FileEvolution) {
        let Some(dir) = &self.state_dir else { return };
        let record_path = dir.join(format!("{}.json", storage_key(&evolution.file_path)));
        let result = fs::create_dir_all(dir)
            .map_err(|e| e.to_string())
            .and_then(|()| {
                serde_json::to_string_pretty(evolution).map_err(|e| e.to_string())
            })
            .and_then(|json| fs::write(&record_path, json).map_err(|e| e.to_string()));
        if let Err(detail) = result {
            tracing::warn!(record = %record_path.display(), %detail, "failed to persist evolution record");
        }
    }

    fn persist_blob_for(&self, file_path: &Path) {
        let Some(dir) = &self.state_dir else { return };
        let Some(evolution) = self.evolutions.get(file_path) else {
            return;
        };
        let Some(content) = self.baselines.get(&evolution.baseline_hash) else {
            return;
        };
        let blobs = dir.join("blobs");
        let blob_path = blobs.join(evolution.baseline_hash.as_str());
        if blob_path.exists() {
            return;
        }
        let result = fs::create_dir_all(&blobs)
            .and_then(|()| fs::write(&blob_path, content));
        if let Err(e) = result {
            tracing::warn!(blob = %blob_path.display(), error = %e, "failed to persist baseline blob");
        }
    }

    fn remove_persisted(&self, file_path: &Path) {
        let Some(dir) = &self.state_dir else { return };
        let record_path = dir.join(format!("{}.json", storage_key(file_path)));
        if let Err(e) = fs::remove_file(&record_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(record = %record_path.display(), error = %e, "failed to remove evolution record");
        }
    }

    fn read_worktree_content(&self, path: &Path) -> Result<String, BraidError> {
        let on_disk = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.worktree_root.join(path)
        };
        match fs::read_to_string(&on_disk) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(BraidError::Io(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::change::ChangeKind;

    fn task(name: &str) -> TaskId {
        TaskId::new(name).unwrap()
    }

    fn tracker_with_file(name: &str, content: &str) -> (tempfile::TempDir, EvolutionTracker) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(name), content).expect("write seed file");
        let tracker = EvolutionTracker::new(dir.path());
        (dir, tracker)
    }

    // -- capture --

    #[test]
    fn capture_reads_disk_content_as_baseline() {
        let (_dir, mut tracker) = tracker_with_file("app.py", "def f(): pass\n");
        let captured = tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("app.py")], "add import")
            .unwrap();

        let evo = &captured[&PathBuf::from("app.py")];
        assert_eq!(evo.baseline_hash, hash_content("def f(): pass\n"));
        assert_eq!(evo.task_snapshots.len(), 1);
        assert!(!evo.task_snapshots[0].is_completed());
        assert_eq!(
            tracker.baseline_content(Path::new("app.py")),
            Some("def f(): pass\n")
        );
    }

    #[test]
    fn capture_missing_file_baselines_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut tracker = EvolutionTracker::new(dir.path());
        let captured = tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("new.py")], "")
            .unwrap();
        assert_eq!(
            captured[&PathBuf::from("new.py")].baseline_hash,
            hash_content("")
        );
    }

    #[test]
    fn second_task_reuses_existing_baseline() {
        let (dir, mut tracker) = tracker_with_file("app.py", "original\n");
        tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("app.py")], "")
            .unwrap();

        // The file changes on disk between captures; the baseline must not.
        fs::write(dir.path().join("app.py"), "changed\n").expect("rewrite");
        let captured = tracker
            .capture_baselines(&task("task-2"), &[PathBuf::from("app.py")], "")
            .unwrap();

        let evo = &captured[&PathBuf::from("app.py")];
        assert_eq!(evo.baseline_hash, hash_content("original\n"));
        assert_eq!(evo.task_snapshots.len(), 2);
    }

    #[test]
    fn identical_baselines_stored_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.py"), "same\n").expect("write");
        fs::write(dir.path().join("b.py"), "same\n").expect("write");
        let mut tracker = EvolutionTracker::new(dir.path());
        tracker
            .capture_baselines(
                &task("task-1"),
                &[PathBuf::from("a.py"), PathBuf::from("b.py")],
                "",
            )
            .unwrap();
        assert_eq!(tracker.baselines.len(), 1);
    }

    // -- record --

    #[test]
    fn record_analyzes_against_baseline() {
        let (_dir, mut tracker) = tracker_with_file("app.py", "def f():\n    pass\n");
        tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("app.py")], "")
            .unwrap();

        let snap = tracker
            .record_modification(
                &task("task-1"),
                Path::new("app.py"),
                "def f():\n    pass\n",
                "import os\n\ndef f():\n    pass\n",
            )
            .unwrap();

        assert!(snap.is_completed());
        assert_eq!(snap.changes.len(), 1);
        assert_eq!(snap.changes[0].change_type, ChangeKind::AddImport);
        assert_eq!(snap.content_hash_before, hash_content("def f():\n    pass\n"));
        assert_eq!(
            snap.content_hash_after,
            hash_content("import os\n\ndef f():\n    pass\n")
        );
    }

    #[test]
    fn repeated_records_stay_cumulative() {
        let (_dir, mut tracker) = tracker_with_file("app.py", "def f():\n    pass\n");
        tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("app.py")], "")
            .unwrap();

        let step_1 = "import os\n\ndef f():\n    pass\n";
        tracker
            .record_modification(
                &task("task-1"),
                Path::new("app.py"),
                "def f():\n    pass\n",
                step_1,
            )
            .unwrap();

        // Second record passes the intermediate text as "old"; the analysis
        // must still run against the ORIGINAL baseline, reporting both the
        // import and the new function.
        let step_2 = "import os\n\ndef f():\n    pass\n\ndef g():\n    return 1\n";
        let snap = tracker
            .record_modification(&task("task-1"), Path::new("app.py"), step_1, step_2)
            .unwrap();

        let kinds: Vec<ChangeKind> = snap.changes.iter().map(|c| c.change_type).collect();
        assert!(kinds.contains(&ChangeKind::AddImport));
        assert!(kinds.contains(&ChangeKind::AddFunction));
        // Before-hash still chains to the baseline, not to step_1.
        assert_eq!(snap.content_hash_before, hash_content("def f():\n    pass\n"));
    }

    #[test]
    fn record_without_capture_seeds_baseline_from_old_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut tracker = EvolutionTracker::new(dir.path());
        let snap = tracker
            .record_modification(
                &task("task-1"),
                Path::new("app.py"),
                "def f(): pass\n",
                "import sys\ndef f(): pass\n",
            )
            .unwrap();
        assert_eq!(snap.content_hash_before, hash_content("def f(): pass\n"));
        assert_eq!(snap.changes[0].change_type, ChangeKind::AddImport);
    }

    // -- queries --

    fn seeded_two_task_tracker() -> (tempfile::TempDir, EvolutionTracker) {
        let (dir, mut tracker) = tracker_with_file("app.py", "def f():\n    pass\n");
        let paths = [PathBuf::from("app.py")];
        tracker
            .capture_baselines(&task("task-1"), &paths, "imports")
            .unwrap();
        tracker
            .capture_baselines(&task("task-2"), &paths, "helpers")
            .unwrap();
        tracker
            .record_modification(
                &task("task-1"),
                Path::new("app.py"),
                "def f():\n    pass\n",
                "import os\n\ndef f():\n    pass\n",
            )
            .unwrap();
        tracker
            .record_modification(
                &task("task-2"),
                Path::new("app.py"),
                "def f():\n    pass\n",
                "def f():\n    pass\n\ndef g():\n    return 1\n",
            )
            .unwrap();
        (dir, tracker)
    }

    #[test]
    fn files_modified_by_tasks_requires_completion() {
        let (_dir, mut tracker) = tracker_with_file("app.py", "x = 1\n");
        tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("app.py")], "")
            .unwrap();

        // Captured but never modified: not reported.
        assert!(
            tracker
                .get_files_modified_by_tasks(&[task("task-1")])
                .is_empty()
        );

        tracker
            .record_modification(&task("task-1"), Path::new("app.py"), "x = 1\n", "x = 2\n")
            .unwrap();
        let modified = tracker.get_files_modified_by_tasks(&[task("task-1")]);
        assert_eq!(modified.len(), 1);
        assert!(modified[&PathBuf::from("app.py")].contains(&task("task-1")));
    }

    #[test]
    fn compatible_edits_are_not_conflicting() {
        let (_dir, tracker) = seeded_two_task_tracker();
        // import + new function: additive and disjoint.
        let conflicting = tracker.get_conflicting_files(&[task("task-1"), task("task-2")]);
        assert!(conflicting.is_empty());
        assert_eq!(
            tracker.classify_file(Path::new("app.py"), &[task("task-1"), task("task-2")]),
            ConflictVerdict::AutoMergeable
        );
    }

    #[test]
    fn same_function_edits_conflict() {
        let (_dir, mut tracker) = tracker_with_file("app.py", "def f():\n    pass\n");
        let paths = [PathBuf::from("app.py")];
        tracker.capture_baselines(&task("task-1"), &paths, "").unwrap();
        tracker.capture_baselines(&task("task-2"), &paths, "").unwrap();
        tracker
            .record_modification(
                &task("task-1"),
                Path::new("app.py"),
                "def f():\n    pass\n",
                "def f():\n    return 1\n",
            )
            .unwrap();
        tracker
            .record_modification(
                &task("task-2"),
                Path::new("app.py"),
                "def f():\n    pass\n",
                "def f():\n    return 2\n",
            )
            .unwrap();

        let conflicting = tracker.get_conflicting_files(&[task("task-1"), task("task-2")]);
        assert_eq!(conflicting.len(), 1);
        assert!(conflicting.contains(&PathBuf::from("app.py")));
    }

    #[test]
    fn task_modifications_lists_snapshots() {
        let (_dir, tracker) = seeded_two_task_tracker();
        let mods = tracker.get_task_modifications(&task("task-1"));
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].task_id, task("task-1"));
    }

    #[test]
    fn summary_counts() {
        let (_dir, tracker) = seeded_two_task_tracker();
        let summary = tracker.get_evolution_summary();
        assert_eq!(summary.total_files_tracked, 1);
        assert_eq!(summary.total_tasks, 2);
        assert_eq!(summary.total_snapshots, 2);
        assert_eq!(summary.files_with_multiple_tasks, 1);
    }

    // -- cleanup --

    #[test]
    fn cleanup_removes_snapshots_keeps_baseline() {
        let (_dir, mut tracker) = seeded_two_task_tracker();
        tracker.cleanup_task(&task("task-1"), false);

        let evo = tracker.evolution(Path::new("app.py")).unwrap();
        assert_eq!(evo.task_snapshots.len(), 1);
        assert!(tracker.baseline_content(Path::new("app.py")).is_some());
    }

    #[test]
    fn cleanup_with_remove_baselines_drops_orphans() {
        let (_dir, mut tracker) = seeded_two_task_tracker();
        tracker.cleanup_task(&task("task-1"), true);
        // task-2 still references the file; evolution stays.
        assert!(tracker.evolution(Path::new("app.py")).is_some());

        tracker.cleanup_task(&task("task-2"), true);
        assert!(tracker.evolution(Path::new("app.py")).is_none());
        assert!(tracker.baselines.is_empty());
    }

    // -- persistence --

    #[test]
    fn state_round_trips_through_disk() {
        let work = tempfile::tempdir().expect("tempdir");
        let state = tempfile::tempdir().expect("tempdir");
        fs::write(work.path().join("app.py"), "def f():\n    pass\n").expect("write");

        let mut tracker =
            EvolutionTracker::new(work.path()).with_state_dir(state.path());
        tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("app.py")], "imports")
            .unwrap();
        tracker
            .record_modification(
                &task("task-1"),
                Path::new("app.py"),
                "def f():\n    pass\n",
                "import os\n\ndef f():\n    pass\n",
            )
            .unwrap();

        // Record is named by the storage key.
        assert!(state.path().join("app_py.json").exists());

        let mut restored =
            EvolutionTracker::new(work.path()).with_state_dir(state.path());
        let loaded = restored.load_state().unwrap();
        assert_eq!(loaded, 1);

        let snap = restored
            .snapshot(&task("task-1"), Path::new("app.py"))
            .unwrap();
        assert_eq!(snap.changes.len(), 1);
        assert_eq!(
            restored.baseline_content(Path::new("app.py")),
            Some("def f():\n    pass\n")
        );
    }

    #[test]
    fn corrupt_record_is_skipped_not_fatal() {
        let work = tempfile::tempdir().expect("tempdir");
        let state = tempfile::tempdir().expect("tempdir");
        fs::write(work.path().join("app.py"), "x = 1\n").expect("write");

        let mut tracker =
            EvolutionTracker::new(work.path()).with_state_dir(state.path());
        tracker
            .capture_baselines(&task("task-1"), &[PathBuf::from("app.py")], "")
            .unwrap();
        fs::write(state.path().join("broken.json"), "{not json").expect("write");

        let mut restored =
            EvolutionTracker::new(work.path()).with_state_dir(state.path());
        let loaded = restored.load_state().unwrap();
        assert_eq!(loaded, 1, "good record loads, corrupt record is skipped");
    }
}
