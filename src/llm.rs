//! Ollama client for the vision and text completion services.
//!
//! The same server hosts both models: a vision model reads claim photos and a
//! text model compares narratives and weather reports. Every call is a single
//! non-streaming `/api/chat` request bounded by the configured timeout.

use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the LLM subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("Ollama is not available at {url}")]
    #[diagnostic(
        code(intake::llm::unavailable),
        help("Start Ollama with `ollama serve` or point `ollama.base_url` at a running server.")
    )]
    Unavailable { url: String },

    #[error("Ollama request failed: {message}")]
    #[diagnostic(
        code(intake::llm::request_failed),
        help("Check that Ollama is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("Ollama returned HTTP {status}: {message}")]
    #[diagnostic(
        code(intake::llm::http_status),
        help("A 404 usually means the model is not pulled; run `damage-intake probe --pull`.")
    )]
    HttpStatus { status: u16, message: String },

    #[error("Failed to parse Ollama response: {message}")]
    #[diagnostic(
        code(intake::llm::parse_error),
        help("The model returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("Ollama request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(intake::llm::timeout),
        help("Increase `ollama.timeout_secs` or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("failed to pull model \"{model}\": {message}")]
    #[diagnostic(
        code(intake::llm::model_pull),
        help("Check your internet connection or manually run: ollama pull {model}")
    )]
    ModelPull { model: String, message: String },
}

impl LlmError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::RequestFailed { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::ParseError { .. } | Self::ModelPull { .. } => false,
        }
    }
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Configuration for the Ollama client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model used to describe photos. Must accept images.
    pub vision_model: String,
    /// Model used for narrative comparison and weather corroboration.
    pub text_model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            vision_model: "llama3.2-vision".into(),
            text_model: "granite3-dense:8b".into(),
            timeout_secs: 120,
        }
    }
}

/// A chat message, optionally carrying base64 images.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Always "user"; every request is a single user turn.
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Client for the Ollama REST API.
#[derive(Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    agent: ureq::Agent,
}

impl OllamaClient {
    /// Create a new Ollama client with the given configuration.
    pub fn new(config: OllamaConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// List the models available on the server via `/api/tags`.
    pub fn probe(&self) -> LlmResult<Vec<String>> {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();

        let resp = agent
            .get(&url)
            .call()
            .map_err(|e| self.request_error(e, 5))?;
        let body = resp.into_string().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;
        let tags: TagsResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::ParseError {
                message: e.to_string(),
            })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Ensure `model` is present, pulling it if necessary.
    ///
    /// Returns `true` when a pull was performed.
    pub fn ensure_model(&self, model: &str) -> LlmResult<bool> {
        let available = self.probe()?;
        if has_model(&available, model) {
            return Ok(false);
        }

        tracing::info!(model, "pulling model, this may take a few minutes");

        let url = format!("{}/api/pull", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(600)) // pulls can be slow
            .build();

        let body = serde_json::json!({
            "name": model,
            "stream": false,
        });

        agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(|e| LlmError::ModelPull {
                model: model.to_string(),
                message: e.to_string(),
            })?;
        Ok(true)
    }

    /// Single-turn chat completion against `model`; returns `message.content`.
    pub fn chat(&self, model: &str, messages: &[ChatMessage]) -> LlmResult<String> {
        let url = format!("{}/api/chat", self.config.base_url);
        let request = ChatRequest {
            model,
            messages,
            stream: false,
        };
        let body_str = serde_json::to_string(&request).map_err(|e| LlmError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        tracing::debug!(model, url = %url, "sending chat request");

        let resp = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e| self.request_error(e, self.config.timeout_secs))?;

        let resp_str = resp.into_string().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;

        parse_chat_response(&resp_str)
    }

    fn request_error(&self, err: ureq::Error, timeout_secs: u64) -> LlmError {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                LlmError::HttpStatus {
                    status,
                    message: preview(&body),
                }
            }
            ureq::Error::Transport(transport) => {
                if is_timeout(&transport) {
                    return LlmError::Timeout { timeout_secs };
                }
                match transport.kind() {
                    ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns => {
                        LlmError::Unavailable {
                            url: self.config.base_url.clone(),
                        }
                    }
                    _ => LlmError::RequestFailed {
                        message: transport.to_string(),
                    },
                }
            }
        }
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("vision_model", &self.config.vision_model)
            .field("text_model", &self.config.text_model)
            .finish()
    }
}

/// Whether `target` is in `available`, ignoring a `:tag` suffix on the server side.
pub fn has_model(available: &[String], target: &str) -> bool {
    available
        .iter()
        .any(|m| m == target || m.split(':').next() == Some(target))
}

fn parse_chat_response(body: &str) -> LlmResult<String> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| LlmError::ParseError {
        message: e.to_string(),
    })?;
    Ok(parsed.message.content)
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            );
        }
        source = err.source();
    }
    false
}

fn preview(body: &str) -> String {
    const LIMIT: usize = 500;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Bounded retry with exponential backoff. One attempt unless configured otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single()
    }
}

impl RetryPolicy {
    pub fn single() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T>(&self, label: &str, mut op: impl FnMut() -> LlmResult<T>) -> LlmResult<T> {
        let attempts = self.max_attempts.max(1);
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && e.is_transient() => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = attempts,
                        "{label}: retrying after transient failure"
                    );
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_client() -> OllamaClient {
        OllamaClient::new(OllamaConfig {
            base_url: "http://127.0.0.1:1".into(), // unreachable port
            timeout_secs: 2,
            ..Default::default()
        })
    }

    #[test]
    fn probe_unreachable_returns_error() {
        let result = unreachable_client().probe();
        assert!(result.is_err());
    }

    #[test]
    fn chat_when_unreachable_is_transient_error() {
        let err = unreachable_client()
            .chat("llama3.2-vision", &[ChatMessage::user("hello")])
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn default_config_values() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.vision_model, "llama3.2-vision");
        assert_eq!(config.text_model, "granite3-dense:8b");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn message_serialization_omits_empty_images() {
        let plain = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert!(plain.get("images").is_none());

        let with = serde_json::to_value(ChatMessage::user("hi").with_images(vec!["aGk=".into()]))
            .unwrap();
        assert_eq!(with["images"][0], "aGk=");
        assert_eq!(with["role"], "user");
    }

    #[test]
    fn chat_response_parsing() {
        let body = r#"{"model":"m","message":{"role":"assistant","content":"A fallen tree."},"done":true}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "A fallen tree.");

        let err = parse_chat_response(r#"{"done":true}"#).unwrap_err();
        assert!(matches!(err, LlmError::ParseError { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn has_model_ignores_tag_suffix() {
        let available = vec!["llama3.2-vision:latest".to_string(), "granite3-dense:8b".to_string()];
        assert!(has_model(&available, "llama3.2-vision"));
        assert!(has_model(&available, "granite3-dense:8b"));
        assert!(!has_model(&available, "mistral"));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(400);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 503);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn retry_stops_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::ZERO,
        };
        let mut calls = 0;
        let result: LlmResult<()> = policy.run("test", || {
            calls += 1;
            Err(LlmError::Timeout { timeout_secs: 1 })
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_does_not_repeat_permanent_failures() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Duration::ZERO,
        };
        let mut calls = 0;
        let result: LlmResult<()> = policy.run("test", || {
            calls += 1;
            Err(LlmError::ParseError {
                message: "bad".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn single_policy_makes_one_attempt() {
        let mut calls = 0;
        let result = RetryPolicy::single().run("test", || {
            calls += 1;
            if calls == 1 {
                Err(LlmError::Unavailable { url: "x".into() })
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_recovers_from_transient_failure() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result = policy.run("test", || {
            calls += 1;
            if calls == 1 {
                Err(LlmError::HttpStatus {
                    status: 503,
                    message: "busy".into(),
                })
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 2);
    }
}
