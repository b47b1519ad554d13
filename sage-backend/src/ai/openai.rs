use crate::ai::streaming::{SseDecoder, SseFrame, StreamEvent};
use crate::ai::{
    InvokeMode, Message, ModelChannel, ModelReply, ModelRequest, RateLimitSignal, StreamSummary,
};
use crate::error::ModelError;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wall-clock limit for one complete model call, stream included
pub const MODEL_CALL_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Streaming client for OpenAI-compatible chat completion endpoints
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, max_tokens: Option<u32>) -> Result<Self, ModelError> {
        let endpoint_url = endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string();

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/event-stream"),
        );

        // Only add auth header if API key is provided and not empty
        if !api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ModelError::Serialization(format!("Invalid API key format: {}", e)))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ModelError::Network {
                operation: "client setup".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint_url,
            max_tokens: max_tokens.unwrap_or(4096),
            timeout: Duration::from_secs(MODEL_CALL_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn invoke_inner(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let operation = request.role.operation();
        let body = OpenAICompletionRequest {
            model: &request.model,
            messages: request.messages(),
            temperature: request.temperature(),
            max_tokens: self.max_tokens,
            stream: true,
        };

        log::info!(
            "[OPENAI] {} -> {} (model {}, retry {}, streamed: {})",
            request.role,
            self.endpoint,
            request.model,
            request.retry_count,
            request.mode.is_streamed()
        );
        log::debug!(
            "[OPENAI] Full request:\n{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network {
                operation: operation.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();
            log::warn!(
                "[OPENAI] {} rate limited (retry after {:?}s)",
                request.role,
                retry_after_secs
            );
            return Ok(ModelReply::RateLimited(RateLimitSignal {
                retry_after_secs,
                message: error_message(&error_text),
            }));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Http {
                operation,
                status: status.as_u16(),
                message: error_message(&error_text),
            });
        }

        let mut decoder = SseDecoder::new();
        let mut content = String::new();
        let mut summary = StreamSummary::default();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| ModelError::Network {
                operation: operation.clone(),
                message: format!("stream interrupted: {}", e),
            })?;
            for frame in decoder.push(&bytes) {
                self.deliver(frame, &request.mode, &mut content, &mut summary)
                    .await;
            }
            if decoder.is_done() {
                break;
            }
        }
        for frame in decoder.finish() {
            self.deliver(frame, &request.mode, &mut content, &mut summary)
                .await;
        }

        if summary.chunks == 0 {
            return Err(ModelError::EmptyResponse { operation });
        }

        log::info!(
            "[OPENAI] {} finished: {} chunks, {} chars",
            request.role,
            summary.chunks,
            summary.chars
        );

        match request.mode {
            InvokeMode::Buffered => Ok(ModelReply::Buffered(content)),
            InvokeMode::Streamed(_) => Ok(ModelReply::Streamed(summary)),
        }
    }

    async fn deliver(
        &self,
        frame: SseFrame,
        mode: &InvokeMode,
        content: &mut String,
        summary: &mut StreamSummary,
    ) {
        let SseFrame::Delta(text) = frame else {
            return;
        };
        summary.chunks += 1;
        summary.chars += text.chars().count();
        match mode {
            InvokeMode::Buffered => content.push_str(&text),
            InvokeMode::Streamed(sender) => {
                if sender.send(StreamEvent::ContentDelta { content: text }).await.is_err() {
                    log::debug!("[OPENAI] Stream receiver dropped, discarding chunk");
                }
            }
        }
    }
}

/// Pull the human-readable message out of an error body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "empty error body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl ModelChannel for OpenAIClient {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        match tokio::time::timeout(self.timeout, self.invoke_inner(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                operation: request.role.operation(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}
