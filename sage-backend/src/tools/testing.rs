//! In-process tools for orchestration and DAG tests

use crate::error::ToolError;
use crate::tools::registry::Tool;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

type Responder = Box<dyn Fn(&str, &Value) -> Result<ToolOutput, ToolError> + Send + Sync>;

/// Shared, ordered log of `start:<query>` / `end:<query>` entries
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Tool that answers from a closure and records every query it receives
pub struct StubTool {
    name: ToolName,
    respond: Responder,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    journal: Option<Journal>,
}

impl StubTool {
    pub fn with<F>(name: ToolName, respond: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        StubTool {
            name,
            respond: Box::new(respond),
            delay: None,
            calls: Mutex::new(Vec::new()),
            journal: None,
        }
    }

    pub fn ok(name: ToolName, data: Value) -> Self {
        Self::with(name, move |_, _| Ok(ToolOutput::new(data.clone())))
    }

    pub fn failing(name: ToolName, error: ToolError) -> Self {
        Self::with(name, move |_, _| Err(error.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

/// Network failure as a real adapter would report it
pub fn network_error(tool: ToolName) -> ToolError {
    ToolError::Network {
        tool: tool.to_string(),
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl Tool for StubTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name, "stub")
    }

    async fn execute(
        &self,
        query: &str,
        params: &Value,
        _context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.lock().push(query.to_string());
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("start:{}", query));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.respond)(query, params);
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("end:{}", query));
        }
        result
    }
}
