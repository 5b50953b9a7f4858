//! Model client abstraction for the idea loop.
//!
//! The loop talks to a model through the [`ModelClient`] trait so that the
//! real backend ([`HarmonyClient`]) and the test double
//! ([`MockModelClient`]) are interchangeable.
//!
//! # Architecture
//!
//! - **Object-safe**: the orchestrator takes `&dyn ModelClient`
//! - **Thread-safe**: `Send + Sync` bounds for use across tasks
//! - **Async-first**: calls are async so the runtime is never blocked
//!
//! # Example
//!
//! ```rust,ignore
//! use bizloop::llm::{HarmonyClient, ModelClient, ModelResponse};
//!
//! let client = HarmonyClient::new().with_model("gpt-oss-20b");
//! let raw = client.run(&request).await?;
//! let response = ModelResponse::parse(&raw);
//! ```

pub mod harmony;
pub mod response;

pub use harmony::HarmonyClient;
pub use response::{FollowUpTask, ModelResponse, DEFAULT_FOLLOW_UP_PRIORITY};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BizloopError, Result};

/// The three Harmony messages sent for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system: String,
    pub developer: String,
    pub user: String,
}

/// Abstraction for model calls.
///
/// Implementations return the raw reply text; parsing is left to
/// [`ModelResponse::parse`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one request and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`BizloopError::Model`] or [`BizloopError::ModelTimeout`] if
    /// the backend cannot be reached or answers with an error.
    async fn run(&self, request: &ModelRequest) -> Result<String>;

    /// Model identifier, e.g. `gpt-oss-20b`.
    fn model_name(&self) -> &str;
}

/// Mock model client for testing.
///
/// Returns a canned reply (or error), counts calls and keeps every request
/// it was given.
///
/// # Example
///
/// ```rust,ignore
/// use bizloop::llm::MockModelClient;
///
/// let client = MockModelClient::new().with_response(r#"{"summary": "ok"}"#);
/// client.run(&request).await?;
/// assert_eq!(client.call_count(), 1);
/// ```
#[derive(Debug)]
pub struct MockModelClient {
    response: String,
    error: Option<String>,
    model: String,
    call_count: AtomicU32,
    requests: Mutex<Vec<ModelRequest>>,
}

impl Default for MockModelClient {
    fn default() -> Self {
        Self {
            response: String::new(),
            error: None,
            model: "mock-model".to_string(),
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockModelClient {
    /// Create a new mock client with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reply to return.
    #[must_use]
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail every call.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model_name(mut self, name: &str) -> Self {
        self.model = name.to_string();
        self
    }

    /// Number of times `run` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn run(&self, request: &ModelRequest) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(ref error) = self.error {
            return Err(BizloopError::model(error.clone()));
        }
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
