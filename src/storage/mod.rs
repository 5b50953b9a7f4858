//! Filesystem-backed storage for ideas, tasks, and iterations.
//!
//! # Layout
//!
//! ```text
//! <base-dir>/
//! ├── ideas/ideas.jsonl              one IdeaRecord per line, append-only
//! ├── iterations/<ts>_iteration.json one IterationLog per executed iteration
//! ├── snapshots/
//! └── state/
//!     ├── tasks.json                 the task queue
//!     └── iteration_state.json       counts + stagnation history
//! ```

pub mod iteration_state;

pub use iteration_state::{IterationState, StatePersistence, STATE_FILENAME};

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{IdeaRecord, IterationLog, Task};

/// Suffix of iteration log filenames.
pub const ITERATION_SUFFIX: &str = "_iteration.json";

/// Root of all persisted loop data.
#[derive(Debug, Clone)]
pub struct StateStore {
    base_dir: PathBuf,
    state: StatePersistence,
}

impl StateStore {
    /// Create a store rooted at `base_dir`. Nothing is touched on disk.
    #[must_use]
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let state = StatePersistence::new(base_dir.join("state"));
        Self { base_dir, state }
    }

    /// Root directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `ideas/`
    #[must_use]
    pub fn ideas_dir(&self) -> PathBuf {
        self.base_dir.join("ideas")
    }

    /// `iterations/`
    #[must_use]
    pub fn iterations_dir(&self) -> PathBuf {
        self.base_dir.join("iterations")
    }

    /// `snapshots/`
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.base_dir.join("snapshots")
    }

    /// `state/`
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("state")
    }

    /// `state/tasks.json`
    #[must_use]
    pub fn tasks_file(&self) -> PathBuf {
        self.state_dir().join("tasks.json")
    }

    /// `ideas/ideas.jsonl`
    #[must_use]
    pub fn ideas_file(&self) -> PathBuf {
        self.ideas_dir().join("ideas.jsonl")
    }

    /// `state/iteration_state.json`
    #[must_use]
    pub fn iteration_state_file(&self) -> PathBuf {
        self.state.state_path()
    }

    /// Create the directory layout and seed empty state files.
    ///
    /// Existing files are left untouched.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.base_dir.clone(),
            self.ideas_dir(),
            self.iterations_dir(),
            self.snapshots_dir(),
            self.state_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }

        if !self.tasks_file().exists() {
            std::fs::write(self.tasks_file(), "[]")?;
        }
        if !self.state.exists() {
            self.state.save(&IterationState::default())?;
        }
        Ok(())
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Load the task queue. A missing file is an empty queue.
    pub fn load_tasks(&self) -> Result<Vec<Task>> {
        let path = self.tasks_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Replace the task queue on disk.
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        std::fs::create_dir_all(self.state_dir())?;
        let path = self.tasks_file();
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, serde_json::to_string_pretty(tasks)?)?;
        std::fs::rename(&temp_path, &path)?;
        debug!("Saved {} tasks", tasks.len());
        Ok(())
    }

    // =========================================================================
    // Ideas
    // =========================================================================

    /// Append idea records as JSON lines.
    pub fn append_ideas(&self, ideas: &[IdeaRecord]) -> Result<()> {
        if ideas.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(self.ideas_dir())?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.ideas_file())?;
        for idea in ideas {
            writeln!(file, "{}", serde_json::to_string(idea)?)?;
        }
        Ok(())
    }

    /// All stored records whose id is in `ids`, in file order.
    ///
    /// Revisions of one idea share an id, so the last match is the newest.
    /// Malformed lines are skipped.
    pub fn load_ideas_by_ids<I, S>(&self, ids: I) -> Result<Vec<IdeaRecord>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = self.ideas_file();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let wanted: HashSet<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
        let reader = BufReader::new(std::fs::File::open(&path)?);
        let mut matches = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IdeaRecord>(&line) {
                Ok(idea) if wanted.contains(&idea.id) => matches.push(idea),
                Ok(_) => {}
                Err(e) => warn!("Skipping malformed idea on line {}: {}", index + 1, e),
            }
        }
        Ok(matches)
    }

    /// Newest stored revision of one idea.
    pub fn latest_idea(&self, id: &str) -> Result<Option<IdeaRecord>> {
        Ok(self.load_ideas_by_ids([id])?.pop())
    }

    // =========================================================================
    // Iteration logs
    // =========================================================================

    /// Write one iteration log and return its path.
    pub fn record_iteration(&self, iteration: &IterationLog) -> Result<PathBuf> {
        std::fs::create_dir_all(self.iterations_dir())?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%9f");
        let path = self
            .iterations_dir()
            .join(format!("{}{}", timestamp, ITERATION_SUFFIX));
        std::fs::write(&path, serde_json::to_string_pretty(iteration)?)?;
        Ok(path)
    }

    /// Path of the newest iteration log, if any.
    pub fn latest_iteration(&self) -> Result<Option<PathBuf>> {
        let dir = self.iterations_dir();
        if !dir.exists() {
            return Ok(None);
        }
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(ITERATION_SUFFIX))
            })
            .collect();
        candidates.sort();
        Ok(candidates.pop())
    }

    // =========================================================================
    // Iteration state
    // =========================================================================

    /// Load counts and stagnation history, starting fresh on corruption.
    #[must_use]
    pub fn load_iteration_state(&self) -> IterationState {
        self.state.load_or_default()
    }

    /// Persist counts and stagnation history.
    pub fn save_iteration_state(&self, state: &IterationState) -> Result<()> {
        self.state.save(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iteration::Mode;
    use crate::models::TaskType;
    use tempfile::TempDir;

    fn idea(id: &str, summary: &str) -> IdeaRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": "Sample",
            "summary": summary,
            "novelty_score": 0.7,
        }))
        .unwrap()
    }

    #[test]
    fn test_ensure_layout() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path());
        store.ensure_layout().unwrap();

        assert!(temp.path().join("state/tasks.json").exists());
        assert!(temp.path().join("state/iteration_state.json").exists());
        assert!(temp.path().join("ideas").is_dir());
        assert!(temp.path().join("iterations").is_dir());
        assert!(temp.path().join("snapshots").is_dir());
        assert!(store.load_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_layout_keeps_existing_tasks() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path());
        store.ensure_layout().unwrap();
        store
            .save_tasks(&[Task::new("1", TaskType::Plan, 10)])
            .unwrap();

        store.ensure_layout().unwrap();
        assert_eq!(store.load_tasks().unwrap().len(), 1);
    }

    #[test]
    fn test_task_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path());
        store.ensure_layout().unwrap();

        store
            .save_tasks(&[Task::new("1", TaskType::Plan, 10).with_note("seed")])
            .unwrap();
        let loaded = store.load_tasks().unwrap();
        assert_eq!(loaded[0].id, "1");
        assert_eq!(loaded[0].note(), Some("seed"));
    }

    #[test]
    fn test_ideas_append_and_lookup() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path());
        store.ensure_layout().unwrap();

        store
            .append_ideas(&[idea("idea-1", "first"), idea("idea-2", "other")])
            .unwrap();
        store.append_ideas(&[idea("idea-1", "revised")]).unwrap();

        let content = std::fs::read_to_string(store.ideas_file()).unwrap();
        assert!(content.contains("idea-1"));

        let found = store.load_ideas_by_ids(["idea-1"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.latest_idea("idea-1").unwrap().unwrap().summary, "revised");
        assert!(store.latest_idea("missing").unwrap().is_none());
    }

    #[test]
    fn test_ideas_skip_malformed_lines() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path());
        store.ensure_layout().unwrap();

        store.append_ideas(&[idea("idea-1", "ok")]).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.ideas_file())
            .unwrap();
        writeln!(file, "{{broken").unwrap();

        assert_eq!(store.load_ideas_by_ids(["idea-1"]).unwrap().len(), 1);
    }

    #[test]
    fn test_record_and_latest_iteration() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path());
        store.ensure_layout().unwrap();

        assert!(store.latest_iteration().unwrap().is_none());

        let first = store
            .record_iteration(&IterationLog::new("iter-1", Mode::Explore, "note"))
            .unwrap();
        let second = store
            .record_iteration(&IterationLog::new("iter-2", Mode::Deepen, "note"))
            .unwrap();

        assert!(first.exists());
        assert_ne!(first, second);
        assert_eq!(store.latest_iteration().unwrap(), Some(second));
    }

    #[test]
    fn test_iteration_state_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path());
        store.ensure_layout().unwrap();

        let mut state = store.load_iteration_state();
        state.counts.record(Mode::Deepen);
        store.save_iteration_state(&state).unwrap();

        assert_eq!(store.load_iteration_state().counts.deepen_count, 1);
    }
}
