//! The idea loop orchestrator.
//!
//! [`AgentLoop`] ties the pieces together for one base directory:
//!
//! ```text
//!   decide ──> pick task ──> build prompt ──> model ──> parse reply
//!     ^                                                     │
//!     │        pending summary, counts, history             v
//!     └──────────── iteration_state.json <──── store ideas, queue follow-ups,
//!                                              write iteration log
//! ```
//!
//! All state is reloaded from and written back to disk, so a loop can be
//! driven one command at a time from the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{load_configs, validate_configs, IpProfile, ProjectConfig};
use crate::error::Result;
use crate::iteration::{Decision, IterationCounts, IterationScheduler, Mode};
use crate::llm::{ModelClient, ModelResponse};
use crate::models::{IdeaRecord, IterationLog, Meta, Task, TaskType};
use crate::prompt::PromptBuilder;
use crate::queue::{shake_up_task, TaskQueue, SHAKE_UP_SUMMARY_COUNT};
use crate::storage::{IterationState, StateStore};

/// Configuration the loop runs under.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub ip_profile: IpProfile,
    pub project_config: ProjectConfig,
}

/// What one call to [`AgentLoop::run_next`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// A task was executed.
    Executed(IterationReport),
    /// No task was ready.
    Idle { decision: Decision },
}

/// Details of an executed iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationReport {
    pub decision: Decision,
    pub task_id: String,
    pub task_type: TaskType,
    /// Mode of the executed task, which is what gets counted.
    pub mode: Mode,
    pub ideas_added: usize,
    pub follow_ups_added: usize,
    pub summary: String,
    pub log_path: PathBuf,
}

/// Snapshot shown by `bizloop status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    pub task_count: usize,
    pub ready_tasks: usize,
    pub latest_iteration: String,
    pub explore_count: u64,
    pub deepen_count: u64,
    pub next_mode: Mode,
}

/// Runs iterations against one base directory.
#[derive(Debug)]
pub struct AgentLoop {
    store: StateStore,
    context: AgentContext,
    prompts: PromptBuilder,
    scheduler: IterationScheduler,
    state: IterationState,
}

impl AgentLoop {
    /// Create a loop over `base_dir`, resuming any persisted state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the profile or project settings are
    /// invalid.
    pub fn new<P: AsRef<Path>>(base_dir: P, context: AgentContext) -> Result<Self> {
        validate_configs(&context.ip_profile, &context.project_config)?;
        let policy = context.project_config.policy()?;

        let store = StateStore::new(base_dir);
        let state = store.load_iteration_state();
        let scheduler = IterationScheduler::with_history(policy, state.summaries.iter().cloned());
        let prompts = PromptBuilder::new(
            context.ip_profile.clone(),
            context.project_config.clone(),
        );

        Ok(Self {
            store,
            context,
            prompts,
            scheduler,
            state,
        })
    }

    /// Load configuration from `config_dir` and create the loop.
    pub fn from_config_dir<P: AsRef<Path>, Q: AsRef<Path>>(base_dir: P, config_dir: Q) -> Result<Self> {
        let (ip_profile, project_config) = load_configs(config_dir.as_ref())?;
        Self::new(
            base_dir,
            AgentContext {
                ip_profile,
                project_config,
            },
        )
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Configuration in use.
    #[must_use]
    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    /// Persisted counts.
    #[must_use]
    pub fn counts(&self) -> &IterationCounts {
        &self.state.counts
    }

    /// Create the storage layout and seed an empty queue.
    ///
    /// Returns true if the seed task was added.
    pub fn initialize(&mut self) -> Result<bool> {
        self.store.ensure_layout()?;

        let mut queue = TaskQueue::new(self.store.load_tasks()?);
        let seeded = queue.seed_if_empty();
        if seeded {
            self.store.save_tasks(queue.tasks())?;
            info!("Seeded task queue for {}", self.context.project_config.project_name);
        }
        Ok(seeded)
    }

    /// Decide the next mode, consuming the pending summary.
    ///
    /// On a stall a shake-up task is queued for the most recent idea unless
    /// one is already waiting.
    pub fn decide(&mut self) -> Result<Decision> {
        let pending = self.state.pending_summary.take();
        let decision = self.scheduler.decide(&self.state.counts, pending.as_deref());
        self.state.summaries = self.scheduler.detector().history().iter().cloned().collect();

        if decision.shake_up_required {
            self.enqueue_shake_up()?;
        }
        self.store.save_iteration_state(&self.state)?;
        Ok(decision)
    }

    /// The decision [`decide`](Self::decide) would make, without side effects.
    #[must_use]
    pub fn preview_decision(&self) -> Decision {
        let mut scheduler = self.scheduler.clone();
        scheduler.decide(&self.state.counts, self.state.pending_summary.as_deref())
    }

    fn enqueue_shake_up(&self) -> Result<bool> {
        let mut queue = TaskQueue::new(self.store.load_tasks()?);
        if queue.contains_ready(TaskType::ShakeUpIdea) {
            debug!("Shake-up already queued, not adding another");
            return Ok(false);
        }

        let idea = match self.state.last_idea_id.as_deref() {
            Some(id) => self.store.latest_idea(id)?,
            None => None,
        };
        let recent = self.scheduler.detector().recent(SHAKE_UP_SUMMARY_COUNT);
        let mut task = shake_up_task(idea.as_ref(), &recent, Utc::now());
        task.id = queue.unique_id(&task.id);

        info!(
            "Queued shake-up task {} (priority {})",
            task.id, task.priority
        );
        queue.push(task);
        self.store.save_tasks(queue.tasks())?;
        Ok(true)
    }

    /// Run one iteration with `client`.
    ///
    /// # Errors
    ///
    /// A failed model call marks the task failed, saves the queue and
    /// returns the model error. Counts are not advanced in that case.
    pub async fn run_next(&mut self, client: &dyn ModelClient) -> Result<IterationOutcome> {
        let decision = self.decide()?;
        let mut queue = TaskQueue::new(self.store.load_tasks()?);

        let Some(task) = queue.next_ready_for(decision.mode).cloned() else {
            info!("No ready tasks; nothing to do");
            return Ok(IterationOutcome::Idle { decision });
        };
        if task.task_type.mode() != decision.mode {
            debug!(
                "No ready {} task, running {} task {} instead",
                decision.mode, task.task_type, task.id
            );
        }

        let related = latest_revisions(self.store.load_ideas_by_ids(&task.related_idea_ids)?);
        let recent = self.scheduler.detector().recent(SHAKE_UP_SUMMARY_COUNT);
        let request = self.prompts.build(&task, &related, &recent);

        info!(
            "Running {} task {} with {}",
            task.task_type,
            task.id,
            client.model_name()
        );
        let raw = match client.run(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Task {} failed: {}", task.id, e);
                let failed = queue.mark_failed(&task.id, Utc::now())?;
                failed
                    .meta
                    .get_or_insert_with(Meta::new)
                    .insert("error".to_string(), Value::String(e.to_string()));
                self.store.save_tasks(queue.tasks())?;
                return Err(e);
            }
        };

        let response = ModelResponse::parse(&raw);
        let now = Utc::now();

        self.store.append_ideas(&response.ideas)?;

        let mut follow_ups_added = 0;
        for follow_up in response.follow_up_tasks.iter().cloned() {
            let new_task = follow_up.into_task(now);
            let id = new_task.id.clone();
            if !queue.push(new_task) {
                warn!("Ignoring follow-up with duplicate id {}", id);
                continue;
            }
            follow_ups_added += 1;
        }

        let done = queue.mark_done(&task.id, now)?;
        if let Some(note) = response.llm_note() {
            done.meta
                .get_or_insert_with(Meta::new)
                .insert("llm_note".to_string(), Value::String(note.to_string()));
        }
        let done = done.clone();
        self.store.save_tasks(queue.tasks())?;

        let mode = task.task_type.mode();
        let summary = response.digest();
        let mut details = self.log_details();
        details.insert("task_type".to_string(), Value::String(task.task_type.to_string()));
        details.insert("decided_mode".to_string(), Value::String(decision.mode.to_string()));
        details.insert("stalled".to_string(), Value::Bool(decision.stalled));
        details.insert("model".to_string(), Value::String(client.model_name().to_string()));
        details.insert(
            "idea_ids".to_string(),
            Value::Array(
                response
                    .ideas
                    .iter()
                    .map(|idea| Value::String(idea.id.clone()))
                    .collect(),
            ),
        );
        details.insert("summary".to_string(), Value::String(summary.clone()));
        let log_path = self.write_log(Some(&done), mode, details)?;

        self.state.counts.record(mode);
        self.state.pending_summary = Some(summary.clone());
        if let Some(idea) = response.ideas.last() {
            self.state.last_idea_id = Some(idea.id.clone());
        }
        self.store.save_iteration_state(&self.state)?;

        Ok(IterationOutcome::Executed(IterationReport {
            decision,
            task_id: task.id,
            task_type: task.task_type,
            mode,
            ideas_added: response.ideas.len(),
            follow_ups_added,
            summary,
            log_path,
        }))
    }

    /// Write a placeholder iteration log for `task` without calling a model.
    ///
    /// Counts are left unchanged.
    pub fn record_iteration(&self, task: Option<&Task>, mode: Mode) -> Result<PathBuf> {
        self.write_log(task, mode, self.log_details())
    }

    /// Highest-priority ready task, if any.
    pub fn next_task(&self) -> Result<Option<Task>> {
        Ok(TaskQueue::new(self.store.load_tasks()?).next_ready().cloned())
    }

    /// Balancer recommendation for the next iteration.
    #[must_use]
    pub fn baseline_mode(&self) -> Mode {
        self.scheduler.baseline(&self.state.counts)
    }

    /// Current queue and iteration status.
    pub fn status(&self) -> Result<AgentStatus> {
        let queue = TaskQueue::new(self.store.load_tasks()?);
        let latest_iteration = self
            .store
            .latest_iteration()?
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "none".to_string());

        Ok(AgentStatus {
            task_count: queue.len(),
            ready_tasks: queue.ready_count(),
            latest_iteration,
            explore_count: self.state.counts.explore_count,
            deepen_count: self.state.counts.deepen_count,
            next_mode: self.baseline_mode(),
        })
    }

    fn log_details(&self) -> Meta {
        let mut details = Meta::new();
        details.insert(
            "project_name".to_string(),
            Value::String(self.context.project_config.project_name.clone()),
        );
        details.insert(
            "ip_name".to_string(),
            Value::String(self.context.ip_profile.ip_name.clone()),
        );
        details
    }

    fn write_log(&self, task: Option<&Task>, mode: Mode, details: Meta) -> Result<PathBuf> {
        let (iteration_id, task_summary) = match task {
            Some(task) => (task.id.clone(), task.note().unwrap_or("no-op").to_string()),
            None => ("no-task".to_string(), "no-op".to_string()),
        };
        let mut log = IterationLog::new(iteration_id, mode, task_summary);
        log.details = Some(details);
        let path = self.store.record_iteration(&log)?;
        debug!("Recorded iteration at {}", path.display());
        Ok(path)
    }
}

/// Keep only the newest revision of each idea, in first-seen order.
fn latest_revisions(ideas: Vec<IdeaRecord>) -> Vec<IdeaRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut newest: HashMap<String, IdeaRecord> = HashMap::new();
    for idea in ideas {
        if !newest.contains_key(&idea.id) {
            order.push(idea.id.clone());
        }
        newest.insert(idea.id.clone(), idea);
    }
    order
        .into_iter()
        .filter_map(|id| newest.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures;
    use crate::error::BizloopError;
    use crate::llm::MockModelClient;
    use crate::models::TaskStatus;
    use crate::queue::SEED_TASK_ID;
    use tempfile::TempDir;

    fn context() -> AgentContext {
        AgentContext {
            ip_profile: fixtures::ip_profile(),
            project_config: fixtures::project_config(),
        }
    }

    fn agent(dir: &Path) -> AgentLoop {
        let mut agent = AgentLoop::new(dir, context()).unwrap();
        agent.initialize().unwrap();
        agent
    }

    fn reply(idea_id: &str, summary: &str) -> String {
        serde_json::json!({
            "ideas": [{"id": idea_id, "title": "T", "summary": summary, "novelty_score": 0.9}],
            "follow_up_tasks": [],
            "summary": summary,
        })
        .to_string()
    }

    #[test]
    fn test_initialize_seeds_queue_once() {
        let temp = TempDir::new().unwrap();
        let mut agent = agent(temp.path());
        assert!(!agent.initialize().unwrap());

        let tasks = agent.store().load_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, SEED_TASK_ID);
    }

    #[test]
    fn test_new_rejects_invalid_policy() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context();
        ctx.project_config.iteration_policy.explore_ratio = Some(0.9);
        ctx.project_config.iteration_policy.deepening_ratio = Some(0.9);
        assert!(matches!(
            AgentLoop::new(temp.path(), ctx),
            Err(BizloopError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_status_after_initialize() {
        let temp = TempDir::new().unwrap();
        let status = agent(temp.path()).status().unwrap();
        assert_eq!(status.task_count, 1);
        assert_eq!(status.ready_tasks, 1);
        assert_eq!(status.latest_iteration, "none");
        assert_eq!(status.next_mode, Mode::Explore);
    }

    #[test]
    fn test_record_iteration_placeholder() {
        let temp = TempDir::new().unwrap();
        let agent = agent(temp.path());
        let task = agent.next_task().unwrap();
        let path = agent.record_iteration(task.as_ref(), Mode::Explore).unwrap();

        let log: IterationLog =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(log.iteration_id, SEED_TASK_ID);
        assert_eq!(log.mode, Mode::Explore);
        assert_eq!(log.task_summary, "Initialize task queue based on project config");
        assert_eq!(log.details.unwrap()["ip_name"], "Demo");
        assert_eq!(agent.counts().total(), 0);
    }

    #[tokio::test]
    async fn test_run_next_plain_text_reply() {
        let temp = TempDir::new().unwrap();
        let mut agent = agent(temp.path());
        let client = MockModelClient::new().with_response("note from llm");

        let outcome = agent.run_next(&client).await.unwrap();
        let IterationOutcome::Executed(report) = outcome else {
            panic!("expected an executed iteration");
        };
        assert_eq!(report.task_id, SEED_TASK_ID);
        assert_eq!(report.mode, Mode::Explore);

        let tasks = agent.store().load_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[0].meta.as_ref().unwrap()["llm_note"], "note from llm");

        let latest = agent.store().latest_iteration().unwrap().unwrap();
        let data: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(latest).unwrap()).unwrap();
        assert_eq!(data["mode"], "explore");

        assert_eq!(agent.counts().explore_count, 1);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_next_stores_ideas_and_follow_ups() {
        let temp = TempDir::new().unwrap();
        let mut agent = agent(temp.path());
        let client = MockModelClient::new().with_response(
            r#"{
                "ideas": [{"id": "idea-1", "title": "Helper", "summary": "Drafts reports"}],
                "follow_up_tasks": [
                    {"id": "critic-1", "type": "critic", "priority": 40, "related_idea_ids": ["idea-1"]},
                    {"type": "ideate"}
                ],
                "summary": "One idea"
            }"#,
        );

        let IterationOutcome::Executed(report) = agent.run_next(&client).await.unwrap() else {
            panic!("expected an executed iteration");
        };
        assert_eq!(report.ideas_added, 1);
        assert_eq!(report.follow_ups_added, 2);
        assert_eq!(report.summary, "Drafts reports");

        assert!(agent.store().latest_idea("idea-1").unwrap().is_some());
        let tasks = agent.store().load_tasks().unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks[2].id.len() >= 32);

        // deepen is now owed and a critic task is ready
        let IterationOutcome::Executed(second) = agent.run_next(&client).await.unwrap() else {
            panic!("expected an executed iteration");
        };
        assert_eq!(second.decision.mode, Mode::Deepen);
        assert_eq!(second.task_id, "critic-1");

        let requests = client.requests();
        assert!(requests[1].user.contains("## Related Ideas"));
        assert!(requests[1].user.contains("Act as the critic"));
    }

    #[tokio::test]
    async fn test_run_next_idle_when_queue_drained() {
        let temp = TempDir::new().unwrap();
        let mut agent = agent(temp.path());
        let client = MockModelClient::new().with_response("{}");

        agent.run_next(&client).await.unwrap();
        let outcome = agent.run_next(&client).await.unwrap();
        assert!(matches!(outcome, IterationOutcome::Idle { .. }));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_run_next_model_failure_marks_task_failed() {
        let temp = TempDir::new().unwrap();
        let mut agent = agent(temp.path());
        let client = MockModelClient::new().with_error("connection refused");

        let err = agent.run_next(&client).await.unwrap_err();
        assert!(matches!(err, BizloopError::Model { .. }));

        let tasks = agent.store().load_tasks().unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(tasks[0].meta.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(agent.counts().total(), 0);
        assert!(agent.store().latest_iteration().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let temp = TempDir::new().unwrap();
        {
            let mut agent = agent(temp.path());
            let client = MockModelClient::new().with_response(&reply("idea-1", "alpha beta"));
            agent.run_next(&client).await.unwrap();
        }

        let agent = AgentLoop::new(temp.path(), context()).unwrap();
        assert_eq!(agent.counts().explore_count, 1);
        let state = agent.store().load_iteration_state();
        assert_eq!(state.pending_summary.as_deref(), Some("alpha beta"));
        assert_eq!(state.last_idea_id.as_deref(), Some("idea-1"));
    }

    #[tokio::test]
    async fn test_repeated_replies_queue_one_shake_up() {
        let temp = TempDir::new().unwrap();
        let mut agent = agent(temp.path());
        let client = MockModelClient::new().with_response(&reply("idea-stall", "same words again"));

        // keep the queue stocked so every iteration executes
        let mut queue = TaskQueue::new(agent.store().load_tasks().unwrap());
        for i in 0..10 {
            queue.push(Task::new(format!("ideate-{i}"), TaskType::Ideate, 1));
            queue.push(Task::new(format!("edit-{i}"), TaskType::Edit, 1));
        }
        agent.store().save_tasks(queue.tasks()).unwrap();

        let mut stalls = 0;
        for _ in 0..5 {
            if let IterationOutcome::Executed(report) = agent.run_next(&client).await.unwrap() {
                if report.decision.stalled {
                    stalls += 1;
                    assert_eq!(report.decision.mode, Mode::Explore);
                }
            }
        }
        assert!(stalls >= 1);

        let shake_ups: Vec<Task> = agent
            .store()
            .load_tasks()
            .unwrap()
            .into_iter()
            .filter(|t| t.task_type == TaskType::ShakeUpIdea)
            .collect();
        assert!(!shake_ups.is_empty());
        assert!(shake_ups[0].id.starts_with("shake-idea-stall-"));
        assert_eq!(shake_ups[0].priority, 90);
        assert!(shake_ups.iter().filter(|t| t.is_ready()).count() <= 1);
    }

    #[tokio::test]
    async fn test_back_to_back_shake_ups_each_run_once() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context();
        ctx.project_config.iteration_policy.stagnation_threshold = Some(0.0);
        ctx.project_config.iteration_policy.stagnation_runs = Some(1);
        let mut agent = AgentLoop::new(temp.path(), ctx).unwrap();
        agent.initialize().unwrap();
        let client = MockModelClient::new().with_response("{}");

        let mut queue = TaskQueue::new(agent.store().load_tasks().unwrap());
        for i in 0..20 {
            queue.push(Task::new(format!("ideate-{i}"), TaskType::Ideate, 1));
            queue.push(Task::new(format!("edit-{i}"), TaskType::Edit, 1));
        }
        agent.store().save_tasks(queue.tasks()).unwrap();

        // every decision after the second stalls, well within one second
        let mut ran = Vec::new();
        for _ in 0..8 {
            if let IterationOutcome::Executed(report) = agent.run_next(&client).await.unwrap() {
                ran.push(report.task_id);
            }
        }
        let shake_runs = ran.iter().filter(|id| id.starts_with("shake-")).count();
        assert!(shake_runs >= 5, "ran {ran:?}");

        let mut unique = ran.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ran.len(), "a task ran twice: {ran:?}");

        let tasks = agent.store().load_tasks().unwrap();
        let mut ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), tasks.len());

        let ready_shakes = tasks
            .iter()
            .filter(|t| t.task_type == TaskType::ShakeUpIdea && t.is_ready())
            .count();
        assert!(ready_shakes <= 1);
    }

    #[test]
    fn test_preview_decision_has_no_side_effects() {
        let temp = TempDir::new().unwrap();
        let agent = agent(temp.path());
        let first = agent.preview_decision();
        let second = agent.preview_decision();
        assert_eq!(first, second);
        assert!(agent.store().load_iteration_state().summaries.is_empty());
    }

    #[test]
    fn test_latest_revisions() {
        let idea = |id: &str, summary: &str| -> IdeaRecord {
            serde_json::from_value(serde_json::json!({"id": id, "title": "t", "summary": summary}))
                .unwrap()
        };
        let ideas = latest_revisions(vec![idea("a", "1"), idea("b", "1"), idea("a", "2")]);
        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[0].id, "a");
        assert_eq!(ideas[0].summary, "2");
    }
}
