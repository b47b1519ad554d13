pub mod openai;
pub mod prompts;
pub mod retry;
pub mod streaming;
pub mod structured;

#[cfg(test)]
pub mod testing;

pub use openai::OpenAIClient;
pub use retry::RetryPolicy;
pub use streaming::{StreamEvent, StreamReceiver, StreamSender};
pub use structured::{invoke_structured, Structured};

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Temperature used for every self-correction attempt
pub const RETRY_TEMPERATURE: f32 = 0.1;

/// Extra instruction injected on retries after malformed classifier output
pub const STRICT_JSON_INSTRUCTION: &str = "Your previous reply could not be parsed. Respond with a single valid JSON object only. Do not wrap it in markdown code fences, do not add any text before or after it, and do not quote the object as a string.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// The agent on whose behalf a model call is made.
///
/// Callers always state this explicitly; nothing is inferred from prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Agent 1: labels the query and proposes a plan
    Classifier,
    /// Agent 2: extracts curated content from encyclopedia articles
    Extractor,
    /// Agent 3: writes the final user-facing answer
    Writer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Classifier => "classifier",
            AgentRole::Extractor => "extractor",
            AgentRole::Writer => "writer",
        }
    }

    /// Operation label used in error messages
    pub fn operation(&self) -> String {
        format!("{} call", self.as_str())
    }

    pub fn base_temperature(&self) -> f32 {
        match self {
            AgentRole::Classifier => 0.2,
            AgentRole::Extractor => 0.3,
            AgentRole::Writer => 0.7,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller wants to receive the generated text
#[derive(Debug, Clone, Default)]
pub enum InvokeMode {
    /// Accumulate the stream and return the full text
    #[default]
    Buffered,
    /// Forward each chunk live; the reply only carries a summary
    Streamed(StreamSender),
}

impl InvokeMode {
    pub fn is_streamed(&self) -> bool {
        matches!(self, InvokeMode::Streamed(_))
    }
}

/// A single model call
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub role: AgentRole,
    pub model: String,
    pub system_prompt: String,
    /// Either a plain string or a JSON value that is serialized into the user message
    pub input: Value,
    /// Number of previous failed attempts. Non-zero switches on strict JSON mode.
    pub retry_count: u32,
    pub mode: InvokeMode,
}

impl ModelRequest {
    pub fn new(
        role: AgentRole,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            role,
            model: model.into(),
            system_prompt: system_prompt.into(),
            input,
            retry_count: 0,
            mode: InvokeMode::Buffered,
        }
    }

    pub fn streamed(mut self, sender: StreamSender) -> Self {
        self.mode = InvokeMode::Streamed(sender);
        self
    }

    pub fn buffered(mut self) -> Self {
        self.mode = InvokeMode::Buffered;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn temperature(&self) -> f32 {
        let base = self.role.base_temperature();
        if self.retry_count > 0 {
            base.min(RETRY_TEMPERATURE)
        } else {
            base
        }
    }

    /// Build the chat messages sent to the endpoint
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt.clone())];
        if self.retry_count > 0 {
            messages.push(Message::system(STRICT_JSON_INSTRUCTION));
        }
        let content = match &self.input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        messages.push(Message::user(content));
        messages
    }
}

/// Quota exhaustion reported by the model endpoint (HTTP 429)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSignal {
    /// Cooldown advertised by the server, when it sent one
    pub retry_after_secs: Option<u64>,
    pub message: String,
}

/// Summary of a reply whose content was already delivered chunk by chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub chunks: usize,
    pub chars: usize,
}

/// Outcome of a successful model call
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Buffered(String),
    Streamed(StreamSummary),
    RateLimited(RateLimitSignal),
}

/// Issues prompts to a remote text-generation endpoint
#[async_trait]
pub trait ModelChannel: Send + Sync {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messages_serialize_object_input() {
        let request = ModelRequest::new(
            AgentRole::Classifier,
            "m",
            "classify",
            json!({"query": "btc price"}),
        );
        let messages = request.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, r#"{"query":"btc price"}"#);
    }

    #[test]
    fn test_retry_adds_strict_instruction_and_lowers_temperature() {
        let request = ModelRequest::new(AgentRole::Classifier, "m", "classify", json!("hi"));
        assert_eq!(request.temperature(), 0.2);

        let retry = request.with_retry_count(1);
        let messages = retry.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, STRICT_JSON_INSTRUCTION);
        assert_eq!(messages[2].content, "hi");
        assert_eq!(retry.temperature(), RETRY_TEMPERATURE);
    }
}
