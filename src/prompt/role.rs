//! Roles the model is asked to play.

use serde::{Deserialize, Serialize};

use crate::models::TaskType;

/// Persona for one iteration, chosen from the task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Ideator,
    Critic,
    Editor,
    Researcher,
}

impl Role {
    /// Role that handles a task of the given type.
    ///
    /// Shake-up tasks are handled by the ideator with extra instructions.
    #[must_use]
    pub fn for_task(task_type: TaskType) -> Self {
        match task_type {
            TaskType::Plan => Self::Planner,
            TaskType::Ideate | TaskType::ShakeUpIdea => Self::Ideator,
            TaskType::Critic => Self::Critic,
            TaskType::Edit => Self::Editor,
            TaskType::Research => Self::Researcher,
        }
    }

    /// Lowercase name used inside prompts.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Ideator => "ideator",
            Self::Critic => "critic",
            Self::Editor => "editor",
            Self::Researcher => "researcher",
        }
    }

    /// What the role must produce this iteration.
    #[must_use]
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Planner => {
                "Propose follow-up tasks that move the project forward. \
                 Return JSON with the keys follow_up_tasks (list) and summary."
            }
            Self::Ideator => {
                "Generate business ideas that follow the provided templates. \
                 Return JSON with the keys ideas (list of idea records), follow_up_tasks and summary."
            }
            Self::Critic => {
                "Review the existing ideas and suggest improvements. \
                 Return JSON with the keys ideas (optional list of revisions), \
                 follow_up_tasks (list) and summary."
            }
            Self::Editor => {
                "Polish the selected ideas and state whether they are ready. \
                 Return JSON with the keys ideas (list), follow_up_tasks (optional list) and summary."
            }
            Self::Researcher => {
                "Research the requested topic from what you already know and summarize it briefly. \
                 Return JSON with the keys ideas (optional list of insights or opportunities), \
                 follow_up_tasks (further research or action items) and summary."
            }
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
