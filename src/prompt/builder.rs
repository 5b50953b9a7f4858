//! Assembles the three Harmony messages for one task.
//!
//! Each message is built from a list of lines joined with newlines:
//!
//! - **system**: who the model is (IP persona, brand promise, taboos)
//! - **developer**: IP spec, project settings, iteration policy, role and
//!   the JSON output contract
//! - **user**: the role's instruction plus task-specific context

use serde_json::{json, Value};

use super::Role;
use crate::config::{IpProfile, ProjectConfig};
use crate::llm::ModelRequest;
use crate::models::{IdeaRecord, Task, TaskType};
use crate::queue::SHAKE_UP_SUMMARY_COUNT;

/// Output contract repeated in the developer and user messages.
const JSON_CONTRACT: &str =
    "Respond with JSON only. Required keys: ideas (list), follow_up_tasks (list), summary (string).";

/// Builds [`ModelRequest`]s from the loaded configuration.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    ip: IpProfile,
    project: ProjectConfig,
}

impl PromptBuilder {
    /// Create a builder for one IP and project.
    #[must_use]
    pub fn new(ip: IpProfile, project: ProjectConfig) -> Self {
        Self { ip, project }
    }

    /// The IP profile prompts are written for.
    #[must_use]
    pub fn ip_profile(&self) -> &IpProfile {
        &self.ip
    }

    /// The project prompts are written for.
    #[must_use]
    pub fn project_config(&self) -> &ProjectConfig {
        &self.project
    }

    /// Build the request for `task`.
    ///
    /// `recent_summaries` is only used by shake-up tasks, which see the last
    /// few entries so they can steer away from them.
    #[must_use]
    pub fn build(
        &self,
        task: &Task,
        related_ideas: &[IdeaRecord],
        recent_summaries: &[String],
    ) -> ModelRequest {
        let role = Role::for_task(task.task_type);
        ModelRequest {
            system: self.system_message(),
            developer: self.developer_message(role),
            user: self.user_message(task, role, related_ideas, recent_summaries),
        }
    }

    fn system_message(&self) -> String {
        let ip = &self.ip;
        format!(
            "You are {}, {}. Brand promise: {}. Avoid: {}.",
            ip.ip_name,
            ip.essence,
            ip.brand_promise,
            ip.taboos.join(", ")
        )
    }

    fn developer_message(&self, role: Role) -> String {
        let ip = &self.ip;
        let project = &self.project;
        let constraints = project
            .constraints
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        let policy = serde_json::to_value(&project.iteration_policy)
            .map(|v| v.to_string())
            .unwrap_or_default();

        let lines = vec![
            "# IP Specification".to_string(),
            format!("Name: {}", ip.ip_name),
            format!("Essence: {}", ip.essence),
            format!("Personality: {}", ip.core_personality.join(", ")),
            format!("Visual motifs: {}", ip.visual_motifs.join(", ")),
            format!("Taboos: {}", ip.taboos.join(", ")),
            String::new(),
            "# Project Settings".to_string(),
            format!("Project: {}", project.project_name),
            format!("Goal: {}", project.goal_type),
            format!("Target audience: {}", ip.target_audience),
            format!("Constraints: {}", constraints),
            format!("Idea templates: {}", project.idea_templates.join(" | ")),
            format!("Iteration policy: {}", policy),
            String::new(),
            "# Role".to_string(),
            format!("Act as the {} for this iteration.", role),
            JSON_CONTRACT.to_string(),
            "Do not add plain-text explanations or any other format.".to_string(),
        ];
        lines.join("\n")
    }

    fn user_message(
        &self,
        task: &Task,
        role: Role,
        related_ideas: &[IdeaRecord],
        recent_summaries: &[String],
    ) -> String {
        let mut lines = vec![
            format!("Act as the {} for this iteration.", role),
            JSON_CONTRACT.to_string(),
            "Do not return any text outside the JSON.".to_string(),
        ];

        if !related_ideas.is_empty() {
            lines.push("## Related Ideas".to_string());
            lines.extend(related_ideas.iter().map(|idea| format!(" - {}", idea_line(idea))));
        }

        if task.task_type == TaskType::ShakeUpIdea {
            lines.push(
                "Shake up the idea. Return JSON with the keys ideas (at least two directions), \
                 follow_up_tasks and summary."
                    .to_string(),
            );
            if !recent_summaries.is_empty() {
                lines.push("Recent summaries to avoid repeating:".to_string());
                let skip = recent_summaries.len().saturating_sub(SHAKE_UP_SUMMARY_COUNT);
                lines.extend(recent_summaries[skip..].iter().map(|s| format!(" - {}", s)));
            }
            lines.push(
                "Make sure the new directions clearly differ from the recent updates.".to_string(),
            );
        } else {
            lines.push(role.instruction().to_string());
        }

        if let Some(meta) = task.meta.as_ref().filter(|m| !m.is_empty()) {
            lines.push(format!("Task notes: {}", Value::Object(meta.clone())));
        }

        let related = if task.related_idea_ids.is_empty() {
            "none".to_string()
        } else {
            task.related_idea_ids.join(", ")
        };
        lines.push(format!("Related idea ids: {}", related));

        lines.join("\n")
    }
}

fn idea_line(idea: &IdeaRecord) -> String {
    json!({
        "id": idea.id,
        "title": idea.title,
        "summary": idea.summary,
        "tags": idea.tags,
        "scores": {
            "brand_fit": idea.brand_fit_score,
            "novelty": idea.novelty_score,
            "feasibility": idea.feasibility_score,
        },
    })
    .to_string()
}
