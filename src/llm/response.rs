//! Parsing of raw model output.
//!
//! Models are asked for a JSON object with `ideas`, `follow_up_tasks` and
//! `summary`. In practice they wrap it in markdown fences or ignore the
//! contract entirely, so parsing never fails: anything that is not a JSON
//! object is kept as a plain note.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{IdeaRecord, Meta, Task, TaskStatus, TaskType};

/// Priority of follow-up tasks that do not state one.
pub const DEFAULT_FOLLOW_UP_PRIORITY: i64 = 10;

/// A task the model asked to queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default = "default_follow_up_priority")]
    pub priority: i64,
    #[serde(default)]
    pub related_idea_ids: Vec<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

fn default_follow_up_priority() -> i64 {
    DEFAULT_FOLLOW_UP_PRIORITY
}

impl FollowUpTask {
    /// Turn the request into a ready task, generating an id when missing.
    #[must_use]
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut meta = self.meta.unwrap_or_default();
        if let Some(note) = self.note {
            meta.insert("note".to_string(), Value::String(note));
        }

        Task {
            id,
            task_type: self.task_type,
            priority: self.priority,
            related_idea_ids: self.related_idea_ids,
            status: TaskStatus::Ready,
            created_at: now,
            last_run_at: None,
            meta: (!meta.is_empty()).then_some(meta),
        }
    }
}

/// Structured view of one model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub ideas: Vec<IdeaRecord>,
    pub follow_up_tasks: Vec<FollowUpTask>,
    pub summary: Option<String>,
    /// Raw text when the reply was not a JSON object.
    pub note: Option<String>,
}

impl ModelResponse {
    /// Parse a raw reply.
    ///
    /// Malformed entries inside `ideas` or `follow_up_tasks` are dropped
    /// with a warning; the rest of the reply is kept.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Some(object) = extract_object(raw) else {
            debug!("Model reply is not JSON, keeping it as a note");
            let note = raw.trim();
            return Self {
                note: (!note.is_empty()).then(|| note.to_string()),
                ..Self::default()
            };
        };

        let ideas = entries(&object, "ideas")
            .filter_map(|value| parse_idea(value.clone()))
            .collect();

        let follow_up_tasks = entries(&object, "follow_up_tasks")
            .filter_map(|value| match serde_json::from_value::<FollowUpTask>(value.clone()) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!("Dropping malformed follow-up task: {}", e);
                    None
                }
            })
            .collect();

        let summary = object
            .get("summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            ideas,
            follow_up_tasks,
            summary,
            note: None,
        }
    }

    /// Text fed to the stagnation detector.
    ///
    /// Idea summaries joined by newlines, else the reply summary, else the
    /// raw note.
    #[must_use]
    pub fn digest(&self) -> String {
        let summaries: Vec<&str> = self
            .ideas
            .iter()
            .map(|idea| idea.summary.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        if !summaries.is_empty() {
            return summaries.join("\n");
        }
        self.llm_note().unwrap_or_default().to_string()
    }

    /// Short note stored on the executed task.
    #[must_use]
    pub fn llm_note(&self) -> Option<&str> {
        self.summary.as_deref().or(self.note.as_deref())
    }
}

fn entries<'a>(
    object: &'a serde_json::Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Value> {
    object
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn parse_idea(mut value: Value) -> Option<IdeaRecord> {
    if let Some(object) = value.as_object_mut() {
        let has_id = object
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            object.insert(
                "id".to_string(),
                Value::String(format!("idea-{}", Uuid::new_v4())),
            );
        }
    }
    match serde_json::from_value(value) {
        Ok(idea) => Some(idea),
        Err(e) => {
            warn!("Dropping malformed idea: {}", e);
            None
        }
    }
}

/// Find the JSON object in a reply, looking inside ```json fences first.
fn extract_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = raw.trim();
    let candidates = [Some(trimmed), fenced_block(trimmed), brace_span(trimmed)];
    candidates
        .into_iter()
        .flatten()
        .find_map(|text| match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(object)) => Some(object),
            _ => None,
        })
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // skip the info string, e.g. "json"
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{
        "ideas": [
            {"id": "idea-1", "title": "Helper", "summary": "Drafts reports", "novelty_score": 0.8},
            {"title": "Coach", "summary": "Weekly coaching"}
        ],
        "follow_up_tasks": [
            {"id": "critic-1", "type": "critic", "priority": 30, "related_idea_ids": ["idea-1"]},
            {"type": "edit", "note": "polish"}
        ],
        "summary": "Two new ideas"
    }"#;

    #[test]
    fn test_parse_full_reply() {
        let response = ModelResponse::parse(REPLY);
        assert_eq!(response.ideas.len(), 2);
        assert_eq!(response.ideas[0].id, "idea-1");
        assert!(response.ideas[1].id.starts_with("idea-"));
        assert_eq!(response.follow_up_tasks.len(), 2);
        assert_eq!(response.summary.as_deref(), Some("Two new ideas"));
        assert!(response.note.is_none());
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = format!("Here you go:\n```json\n{}\n```\nThanks", REPLY);
        let response = ModelResponse::parse(&raw);
        assert_eq!(response.ideas.len(), 2);
        assert_eq!(response.summary.as_deref(), Some("Two new ideas"));
    }

    #[test]
    fn test_parse_plain_text() {
        let response = ModelResponse::parse("note from llm\n");
        assert!(response.ideas.is_empty());
        assert_eq!(response.note.as_deref(), Some("note from llm"));
        assert_eq!(response.llm_note(), Some("note from llm"));
        assert_eq!(response.digest(), "note from llm");
    }

    #[test]
    fn test_parse_json_array_is_note() {
        let response = ModelResponse::parse("[1, 2]");
        assert_eq!(response.note.as_deref(), Some("[1, 2]"));
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let response = ModelResponse::parse(
            r#"{"ideas": [{"id": "x"}], "follow_up_tasks": [{"type": "dance"}], "summary": "s"}"#,
        );
        assert!(response.ideas.is_empty());
        assert!(response.follow_up_tasks.is_empty());
        assert_eq!(response.digest(), "s");
    }

    #[test]
    fn test_digest_prefers_idea_summaries() {
        let response = ModelResponse::parse(REPLY);
        assert_eq!(response.digest(), "Drafts reports\nWeekly coaching");
        assert_eq!(response.llm_note(), Some("Two new ideas"));
    }

    #[test]
    fn test_digest_empty_reply() {
        assert_eq!(ModelResponse::parse("").digest(), "");
        assert_eq!(ModelResponse::parse("{}").digest(), "");
    }

    #[test]
    fn test_follow_up_into_task() {
        let response = ModelResponse::parse(REPLY);
        let now = Utc::now();
        let tasks: Vec<Task> = response
            .follow_up_tasks
            .into_iter()
            .map(|t| t.into_task(now))
            .collect();

        assert_eq!(tasks[0].id, "critic-1");
        assert_eq!(tasks[0].priority, 30);
        assert!(tasks[0].meta.is_none());

        assert!(Uuid::parse_str(&tasks[1].id).is_ok());
        assert_eq!(tasks[1].task_type, TaskType::Edit);
        assert_eq!(tasks[1].priority, DEFAULT_FOLLOW_UP_PRIORITY);
        assert_eq!(tasks[1].note(), Some("polish"));
        assert!(tasks.iter().all(Task::is_ready));
    }
}
