//! Records exchanged between the loop, the task queue and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::iteration::Mode;

/// Free-form metadata attached to tasks and iteration logs.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// A business idea produced or revised by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub value_proposition: String,
    #[serde(default)]
    pub revenue_model: String,
    #[serde(default)]
    pub brand_fit_score: f64,
    #[serde(default)]
    pub novelty_score: f64,
    #[serde(default)]
    pub feasibility_score: f64,
    #[serde(default = "default_idea_status")]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_idea_status() -> String {
    "draft".to_string()
}

/// Kind of work a task asks for.
///
/// Each type belongs to one [`Mode`], which is how the scheduler's decision
/// is matched against the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Plan,
    Ideate,
    Critic,
    Edit,
    ShakeUpIdea,
    Research,
}

impl TaskType {
    /// The mode a task of this type runs in.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Plan | Self::Ideate | Self::Research | Self::ShakeUpIdea => Mode::Explore,
            Self::Critic | Self::Edit => Mode::Deepen,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Plan => "plan",
            Self::Ideate => "ideate",
            Self::Critic => "critic",
            Self::Edit => "edit",
            Self::ShakeUpIdea => "shake_up_idea",
            Self::Research => "research",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ready,
    InProgress,
    Done,
    Failed,
}

/// A unit of work in the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: i64,
    #[serde(default)]
    pub related_idea_ids: Vec<String>,
    pub status: TaskStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

impl Task {
    /// Create a ready task with no related ideas or metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, task_type: TaskType, priority: i64) -> Self {
        Self {
            id: id.into(),
            task_type,
            priority,
            related_idea_ids: Vec::new(),
            status: TaskStatus::Ready,
            created_at: Utc::now(),
            last_run_at: None,
            meta: None,
        }
    }

    /// Attach a metadata note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.meta
            .get_or_insert_with(Meta::new)
            .insert("note".to_string(), serde_json::Value::String(note.into()));
        self
    }

    /// Whether the task can be picked up.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == TaskStatus::Ready
    }

    /// The `note` metadata entry, if any.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.meta.as_ref()?.get("note")?.as_str()
    }
}

/// One executed iteration, written to `iterations/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationLog {
    pub iteration_id: String,
    pub mode: Mode,
    pub task_summary: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub details: Option<Meta>,
}

impl IterationLog {
    /// Create a log entry stamped with the current time.
    #[must_use]
    pub fn new(iteration_id: impl Into<String>, mode: Mode, task_summary: impl Into<String>) -> Self {
        Self {
            iteration_id: iteration_id.into(),
            mode,
            task_summary: task_summary.into(),
            created_at: Utc::now(),
            details: None,
        }
    }
}
