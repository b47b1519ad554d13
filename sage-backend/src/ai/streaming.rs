//! Streaming response types and the server-sent-event decoder
//!
//! The model endpoint answers with `data: {...}` lines terminated by
//! `data: [DONE]`. Chunk boundaries are arbitrary, so the decoder keeps a byte
//! buffer and only interprets complete lines.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Events delivered to a streaming client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Content is being generated incrementally
    ContentDelta { content: String },
    /// The turn finished
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        budget: Option<Value>,
    },
    /// The model endpoint is out of quota
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },
    /// The turn ended with an error
    Error { message: String },
}

/// Sender for stream events
pub type StreamSender = mpsc::Sender<StreamEvent>;

/// Receiver for stream events
pub type StreamReceiver = mpsc::Receiver<StreamEvent>;

/// Create a new stream channel with specified buffer size
pub fn create_stream_channel(buffer_size: usize) -> (StreamSender, StreamReceiver) {
    mpsc::channel(buffer_size)
}

/// Create a stream channel with default buffer size (32)
pub fn create_default_stream_channel() -> (StreamSender, StreamReceiver) {
    create_stream_channel(32)
}

/// A decoded unit of the SSE stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Delta(String),
    Done,
}

/// Largest unparsed payload kept around while waiting for its continuation
const MAX_CARRY_BYTES: usize = 64 * 1024;

/// Incremental decoder for OpenAI-style chat completion streams
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Payload that failed to parse, retried with the next data line prepended
    carry: String,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes, returning every frame completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).to_string();
            if let Some(frame) = self.decode_line(&line) {
                frames.push(frame);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        frames
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.buffer.is_empty() || self.done {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).to_string();
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.trim();
        let payload = line.strip_prefix("data:")?.trim();

        if payload == "[DONE]" {
            self.done = true;
            return Some(SseFrame::Done);
        }
        if payload.is_empty() {
            return None;
        }

        let parsed = if self.carry.is_empty() {
            serde_json::from_str::<Value>(payload).ok()
        } else {
            let joined = format!("{}{}", self.carry, payload);
            match serde_json::from_str::<Value>(&joined) {
                Ok(v) => Some(v),
                // The carried fragment was garbage; the new payload may stand alone
                Err(_) => match serde_json::from_str::<Value>(payload) {
                    Ok(v) => {
                        log::debug!("[SSE] Dropping unparseable fragment ({} bytes)", self.carry.len());
                        self.carry.clear();
                        Some(v)
                    }
                    Err(_) => {
                        self.carry = joined;
                        None
                    }
                },
            }
        };

        let value = match parsed {
            Some(v) => {
                self.carry.clear();
                v
            }
            None => {
                if self.carry.is_empty() {
                    self.carry = payload.to_string();
                }
                if self.carry.len() > MAX_CARRY_BYTES {
                    log::warn!("[SSE] Discarding oversized unparseable fragment");
                    self.carry.clear();
                }
                return None;
            }
        };

        value
            .pointer("/choices/0/delta/content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| SseFrame::Delta(s.to_string()))
    }
}
