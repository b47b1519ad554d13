use crate::error::TaskFailure;
use crate::tools::ToolName;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::Display;

/// One node of a task graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub tool: String,
    /// May contain `{{taskId.field}}` references to dependency results
    pub query: String,
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Task {
    pub fn new(id: impl Into<String>, tool: impl Into<String>, query: impl Into<String>) -> Self {
        Task {
            id: id.into(),
            tool: tool.into(),
            query: query.into(),
            dependencies: Vec::new(),
            params: Value::Null,
        }
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Lifecycle of a task within one execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Output of a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub result: Value,
    /// Tool that actually produced the result
    pub tool: ToolName,
    /// Set when a sibling tool stood in for the requested one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<ToolName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Everything one `execute` call produced, available once all tasks settled
#[derive(Debug, Clone, Default, Serialize)]
pub struct DagReport {
    pub results: BTreeMap<String, TaskResult>,
    #[serde(serialize_with = "failures_as_text")]
    pub failures: BTreeMap<String, TaskFailure>,
    pub states: BTreeMap<String, TaskState>,
    pub warnings: Vec<String>,
}

impl DagReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

fn failures_as_text<S: Serializer>(
    failures: &BTreeMap<String, TaskFailure>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(failures.iter().map(|(id, failure)| (id, failure.to_string())))
}
