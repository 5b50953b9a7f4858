//! In-memory view of the task queue.
//!
//! The queue is loaded from and saved back to `state/tasks.json` by the
//! orchestrator around each iteration; this module only manipulates the
//! list.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{BizloopError, Result};
use crate::iteration::Mode;
use crate::models::{IdeaRecord, Meta, Task, TaskStatus, TaskType};

/// Id of the task seeded into an empty queue.
pub const SEED_TASK_ID: &str = "planner-initialize";

/// Priority of the seed task.
pub const SEED_PRIORITY: i64 = 100;

/// Shake-up priority when no novelty score is available.
pub const DEFAULT_SHAKE_UP_PRIORITY: i64 = 50;

/// Recent summaries attached to a shake-up task.
pub const SHAKE_UP_SUMMARY_COUNT: usize = 3;

/// Ordered collection of tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQueue {
    tasks: Vec<Task>,
}

impl TaskQueue {
    /// Wrap a loaded task list.
    #[must_use]
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// All tasks in file order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Consume the queue, returning the task list for saving.
    #[must_use]
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    /// Total number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue holds no tasks at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of tasks ready to run.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_ready()).count()
    }

    /// Add the planner seed task if the queue is empty.
    ///
    /// Returns true if a task was added.
    pub fn seed_if_empty(&mut self) -> bool {
        if !self.tasks.is_empty() {
            return false;
        }
        self.tasks.push(
            Task::new(SEED_TASK_ID, TaskType::Plan, SEED_PRIORITY)
                .with_note("Initialize task queue based on project config"),
        );
        true
    }

    /// Append a task.
    ///
    /// Ids are unique within the queue: a task whose id is already present
    /// is not added and false is returned.
    pub fn push(&mut self, task: Task) -> bool {
        if self.get(&task.id).is_some() {
            return false;
        }
        self.tasks.push(task);
        true
    }

    /// `base` if no task uses it yet, otherwise `base-2`, `base-3`, ...
    #[must_use]
    pub fn unique_id(&self, base: &str) -> String {
        if self.get(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| self.get(id).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Highest-priority ready task; the earliest one wins ties.
    #[must_use]
    pub fn next_ready(&self) -> Option<&Task> {
        Self::best(self.tasks.iter().filter(|t| t.is_ready()))
    }

    /// Highest-priority ready task for `mode`, falling back to any ready
    /// task when none matches.
    #[must_use]
    pub fn next_ready_for(&self, mode: Mode) -> Option<&Task> {
        Self::best(
            self.tasks
                .iter()
                .filter(|t| t.is_ready() && t.task_type.mode() == mode),
        )
        .or_else(|| self.next_ready())
    }

    /// Whether a ready task of the given type is queued.
    #[must_use]
    pub fn contains_ready(&self, task_type: TaskType) -> bool {
        self.tasks
            .iter()
            .any(|t| t.is_ready() && t.task_type == task_type)
    }

    /// Look up a task by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Mark a task done, recording when it ran.
    pub fn mark_done(&mut self, id: &str, now: DateTime<Utc>) -> Result<&mut Task> {
        self.set_status(id, TaskStatus::Done, now)
    }

    /// Mark a task failed, recording when it ran.
    pub fn mark_failed(&mut self, id: &str, now: DateTime<Utc>) -> Result<&mut Task> {
        self.set_status(id, TaskStatus::Failed, now)
    }

    fn set_status(
        &mut self,
        id: &str,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<&mut Task> {
        // a ready task wins over older entries that share its id
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id && t.is_ready())
            .or_else(|| self.tasks.iter().position(|t| t.id == id))
            .ok_or_else(|| BizloopError::UnknownTask { id: id.to_string() })?;
        let task = &mut self.tasks[index];
        task.status = status;
        task.last_run_at = Some(now);
        Ok(task)
    }

    fn best<'a>(tasks: impl Iterator<Item = &'a Task>) -> Option<&'a Task> {
        // max_by_key keeps the last maximum, so compare manually to keep the first
        tasks.fold(None::<&'a Task>, |best, task| match best {
            Some(b) if b.priority >= task.priority => Some(b),
            _ => Some(task),
        })
    }
}

/// Build the corrective task issued when the loop has stalled.
///
/// Targets `idea` when known, otherwise the project as a whole. Priority
/// follows the idea's novelty so more novel ideas get shaken sooner.
#[must_use]
pub fn shake_up_task(
    idea: Option<&IdeaRecord>,
    recent_summaries: &[String],
    now: DateTime<Utc>,
) -> Task {
    let stamp = now.format("%H%M%S");
    let skip = recent_summaries.len().saturating_sub(SHAKE_UP_SUMMARY_COUNT);
    let recent: Vec<Value> = recent_summaries[skip..]
        .iter()
        .map(|s| Value::String(s.clone()))
        .collect();

    let mut meta = Meta::new();
    meta.insert(
        "note".to_string(),
        Value::String("Idea updates appear stalled; force different directions".to_string()),
    );
    meta.insert("recent_summaries".to_string(), Value::Array(recent));

    let (id, priority, related) = match idea {
        Some(idea) => {
            meta.insert("idea_id".to_string(), Value::String(idea.id.clone()));
            let priority = if idea.novelty_score > 0.0 {
                (idea.novelty_score * 100.0).round() as i64
            } else {
                DEFAULT_SHAKE_UP_PRIORITY
            };
            (
                format!("shake-{}-{}", idea.id, stamp),
                priority,
                vec![idea.id.clone()],
            )
        }
        None => (
            format!("shake-project-{}", stamp),
            DEFAULT_SHAKE_UP_PRIORITY,
            Vec::new(),
        ),
    };

    Task {
        id,
        task_type: TaskType::ShakeUpIdea,
        priority,
        related_idea_ids: related,
        status: TaskStatus::Ready,
        created_at: now,
        last_run_at: None,
        meta: Some(meta),
    }
}
