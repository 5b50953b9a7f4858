//! Harmony client for gpt-oss models.
//!
//! Talks to an OpenAI-compatible chat completions endpoint, as served by
//! vLLM or Ollama, sending the system, developer and user messages of a
//! [`ModelRequest`] in that order.
//!
//! Requests go through a `curl` subprocess, so `curl` must be on `PATH`.
//!
//! # Example
//!
//! ```rust,ignore
//! use bizloop::llm::{HarmonyClient, ModelClient};
//!
//! let client = HarmonyClient::new()
//!     .with_base_url("http://localhost:11434/v1")
//!     .with_timeout(300);
//! let raw = client.run(&request).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ModelClient, ModelRequest};
use crate::error::{BizloopError, IntoBizloopError, Result};

/// curl exit status for an operation timeout.
const CURL_TIMEOUT_EXIT: i32 = 28;

/// A chat message in the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request body for the chat completions API.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Choice in API response.
#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Response from the chat completions API.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

/// Client for a Harmony-format model behind an OpenAI-compatible server.
#[derive(Debug, Clone)]
pub struct HarmonyClient {
    base_url: String,
    model: String,
    timeout_secs: u64,
    api_key: Option<String>,
    temperature: Option<f32>,
}

impl Default for HarmonyClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HarmonyClient {
    /// Default API base URL (local vLLM).
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8000/v1";

    /// Default model id.
    pub const DEFAULT_MODEL: &'static str = "gpt-oss-20b";

    /// Default timeout for requests (2 minutes).
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Create a client with default endpoint, model and timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            api_key: None,
            temperature: None,
        }
    }

    /// Set the API base URL. A trailing slash is ignored.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the model id.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Send a bearer token with each request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request timeout in seconds.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, request: &ModelRequest) -> ChatCompletionRequest {
        let message = |role: &str, content: &str| ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        };
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                message("system", &request.system),
                message("developer", &request.developer),
                message("user", &request.user),
            ],
            temperature: self.temperature,
        }
    }

    async fn post(&self, body: &ChatCompletionRequest) -> Result<String> {
        which::which("curl").map_err(|_| BizloopError::MissingTool {
            tool: "curl".to_string(),
        })?;

        let body_json = serde_json::to_string(body)?;
        let url = self.endpoint();
        let timeout = self.timeout_secs.to_string();

        let mut args = vec![
            "-sS".to_string(),
            "-X".to_string(),
            "POST".to_string(),
            url,
            "-H".to_string(),
            "Content-Type: application/json".to_string(),
        ];
        if let Some(ref key) = self.api_key {
            args.push("-H".to_string());
            args.push(format!("Authorization: Bearer {}", key));
        }
        args.extend(["-d".to_string(), body_json, "--max-time".to_string(), timeout]);

        let output = tokio::process::Command::new("curl")
            .args(&args)
            .output()
            .await
            .map_err(|e| BizloopError::model(format!("Failed to execute curl: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if output.status.code() == Some(CURL_TIMEOUT_EXIT) || stderr.contains("timed out") {
                return Err(BizloopError::ModelTimeout {
                    timeout_secs: self.timeout_secs,
                });
            }
            return Err(BizloopError::model(format!("curl failed: {}", stderr.trim())));
        }

        String::from_utf8(output.stdout).into_bizloop_model()
    }
}

/// Pull the reply text out of a chat completions response body.
fn parse_completion(body: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        BizloopError::model(format!("Failed to parse response: {} - Body: {}", e, body))
    })?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .unwrap_or("Unknown error");
        return Err(BizloopError::model(message.to_string()));
    }

    let response: ChatCompletionResponse = serde_json::from_value(value)
        .map_err(|e| BizloopError::model(format!("Unexpected response shape: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| BizloopError::model("Response contained no choices"))
}

#[async_trait]
impl ModelClient for HarmonyClient {
    async fn run(&self, request: &ModelRequest) -> Result<String> {
        let body = self.request_body(request);
        debug!(
            "Sending request to {} at {} ({} chars user prompt)",
            self.model,
            self.base_url,
            request.user.len()
        );
        let raw = self.post(&body).await?;
        parse_completion(&raw)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let client = HarmonyClient::new();
        assert_eq!(client.base_url(), "http://localhost:8000/v1");
        assert_eq!(client.model_name(), "gpt-oss-20b");
        assert_eq!(client.timeout_secs(), 120);
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        let client = HarmonyClient::new().with_base_url("http://localhost:11434/v1/");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_request_body_message_order() {
        let client = HarmonyClient::new().with_model("gpt-oss-120b");
        let body = client.request_body(&ModelRequest {
            system: "s".to_string(),
            developer: "d".to_string(),
            user: "u".to_string(),
        });
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-oss-120b");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "developer");
        assert_eq!(json["messages"][2]["role"], "user");
        assert_eq!(json["messages"][2]["content"], "u");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"summary\": \"ok\"}"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), r#"{"summary": "ok"}"#);
    }

    #[test]
    fn test_parse_completion_api_error() {
        let body = r#"{"error": {"message": "model not loaded", "type": "invalid_request"}}"#;
        let err = parse_completion(body).unwrap_err();
        assert!(matches!(err, BizloopError::Model { .. }));
        assert!(err.to_string().contains("model not loaded"));
    }

    #[test]
    fn test_parse_completion_no_choices() {
        assert!(parse_completion(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn test_parse_completion_not_json() {
        let err = parse_completion("<html>502</html>").unwrap_err();
        assert!(err.to_string().contains("Failed to parse response"));
    }
}
