//! Analysis engine client
//!
//! The engine is an opaque text-completion service: a prompt goes in, a
//! diagnosis comes out or the call fails. The concrete client speaks the
//! OpenAI-compatible `/chat/completions` protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Default bound on a single analysis call
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a senior site reliability engineer. \
You analyse host monitoring data and give short, concrete operational advice.";

/// Errors from the analysis engine
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("engine returned no choices")]
    EmptyResponse,

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// A text-completion service that turns a prompt into a diagnosis
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn analyze(&self, prompt: &str) -> Result<String, AnalysisError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// [`AnalysisEngine`] for any OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct OpenAiCompatibleEngine {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenAiCompatibleEngine {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: None,
            temperature: None,
        })
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_for(&self, prompt: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl AnalysisEngine for OpenAiCompatibleEngine {
    fn name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, prompt: &str) -> Result<String, AnalysisError> {
        let request = self.request_for(prompt);

        debug!(
            model = %self.model,
            prompt_length = prompt.len(),
            "Calling analysis engine"
        );

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Analysis engine request failed");
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        debug!(usage = ?chat.usage, "Analysis engine response received");

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AnalysisError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn completion(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
        })
        .to_string()
    }

    fn engine_for(server: &mockito::ServerGuard, api_key: &str) -> OpenAiCompatibleEngine {
        OpenAiCompatibleEngine::new(
            &format!("{}/v1/", server.url()),
            api_key,
            "gpt-4o-mini",
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let engine = OpenAiCompatibleEngine::new(
            "https://llm.internal/v1/",
            "",
            "m",
            DEFAULT_ANALYSIS_TIMEOUT,
        )
        .unwrap();
        assert_eq!(engine.endpoint(), "https://llm.internal/v1/chat/completions");
    }

    #[test]
    fn test_request_includes_system_prompt_and_options() {
        let engine = OpenAiCompatibleEngine::new("http://x", "", "m", DEFAULT_ANALYSIS_TIMEOUT)
            .unwrap()
            .with_max_tokens(Some(500))
            .with_temperature(Some(0.2));

        let json = serde_json::to_value(engine.request_for("hello")).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert_eq!(json["max_tokens"], 500);
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let engine = OpenAiCompatibleEngine::new("http://x", "", "m", DEFAULT_ANALYSIS_TIMEOUT)
            .unwrap()
            .with_system_prompt("");

        let request = engine.request_for("hello");
        assert_eq!(request.messages.len(), 1);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_analyze_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({"model": "gpt-4o-mini"})),
                Matcher::Regex("node is hot".to_string()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(completion("[Current state] CPU saturated"))
            .create_async()
            .await;

        let text = engine_for(&server, "sk-test")
            .analyze("node is hot")
            .await
            .unwrap();

        assert_eq!(text, "[Current state] CPU saturated");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_auth_header_without_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", Matcher::Missing)
            .with_body(completion("ok"))
            .create_async()
            .await;

        engine_for(&server, "").analyze("p").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let err = engine_for(&server, "k").analyze("p").await.unwrap_err();
        match err {
            AnalysisError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = engine_for(&server, "k").analyze("p").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_blank_content_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_body(completion("   "))
            .create_async()
            .await;

        let err = engine_for(&server, "k").analyze("p").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_body("not json")
            .create_async()
            .await;

        let err = engine_for(&server, "k").analyze("p").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Http(_)));
    }
}
