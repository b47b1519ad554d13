//! Scripted model channel for unit tests

use super::{
    AgentRole, InvokeMode, ModelChannel, ModelReply, ModelRequest, StreamEvent, StreamSummary,
};
use crate::error::ModelError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Replays queued replies per agent role and records every request.
///
/// A `Buffered` reply answering a streamed request is forwarded to the
/// request's sender as a single content delta.
#[derive(Default)]
pub struct ScriptedChannel {
    replies: Mutex<HashMap<AgentRole, VecDeque<Result<ModelReply, ModelError>>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, role: AgentRole, reply: ModelReply) {
        self.replies.lock().entry(role).or_default().push_back(Ok(reply));
    }

    pub fn push_text(&self, role: AgentRole, text: &str) {
        self.push_reply(role, ModelReply::Buffered(text.to_string()));
    }

    pub fn push_error(&self, role: AgentRole, error: ModelError) {
        self.replies.lock().entry(role).or_default().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, role: AgentRole) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelChannel for ScriptedChannel {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        self.requests.lock().push(request.clone());
        let next = self
            .replies
            .lock()
            .get_mut(&request.role)
            .and_then(|queue| queue.pop_front());

        let reply = match next {
            Some(reply) => reply?,
            None => {
                return Err(ModelError::EmptyResponse {
                    operation: request.role.operation(),
                })
            }
        };

        match (&request.mode, reply) {
            (InvokeMode::Streamed(sender), ModelReply::Buffered(text)) => {
                let chars = text.chars().count();
                let _ = sender.send(StreamEvent::ContentDelta { content: text }).await;
                Ok(ModelReply::Streamed(StreamSummary { chunks: 1, chars }))
            }
            (_, reply) => Ok(reply),
        }
    }
}
