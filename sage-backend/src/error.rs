use thiserror::Error;

/// Failures of a single model invocation.
///
/// HTTP 429 is not an error here: quota exhaustion is reported as
/// [`crate::ai::ModelReply::RateLimited`].
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("{operation} failed: network error: {message}")]
    Network { operation: String, message: String },

    #[error("{operation} failed: model endpoint returned {status}: {message}")]
    Http {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("{operation} failed: no content received")]
    EmptyResponse { operation: String },

    #[error("{operation} produced malformed output after {attempts} attempt(s): {reason}")]
    MalformedOutput {
        operation: String,
        attempts: u32,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures raised by a tool adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{tool}' requires API key {key}")]
    MissingApiKey { tool: String, key: String },

    #[error("Tool '{tool}' is not configured: {setting} is unset")]
    NotConfigured { tool: String, setting: String },

    #[error("Tool '{tool}' request failed: {message}")]
    Network { tool: String, message: String },

    #[error("Tool '{tool}' returned HTTP {status}: {message}")]
    Http {
        tool: String,
        status: u16,
        message: String,
    },

    #[error("Tool '{tool}' returned an unusable response: {message}")]
    InvalidResponse { tool: String, message: String },

    #[error("Tool '{tool}' refused the request: {message}")]
    Blocked { tool: String, message: String },
}

/// Structural problems with a task graph. Raised before any task runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("Task at index {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Task '{task}' must declare 'dependencies' as an array")]
    InvalidDependencies { task: String },

    #[error("Duplicate task id '{0}'")]
    DuplicateId(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Task batch must be a JSON array")]
    NotAnArray,
}

/// Why a single DAG task did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskFailure {
    #[error("Task '{task}' failed: {error}")]
    Tool { task: String, error: ToolError },

    #[error("Task '{task}' skipped: dependency '{dependency}' failed")]
    DependencyFailed { task: String, dependency: String },
}

impl TaskFailure {
    /// The tool error at the root of this failure, if the task itself failed
    pub fn tool_error(&self) -> Option<&ToolError> {
        match self {
            TaskFailure::Tool { error, .. } => Some(error),
            TaskFailure::DependencyFailed { .. } => None,
        }
    }
}

/// Terminal errors of an orchestration turn. Their `Display` text is what the
/// user sees, so keep messages human readable.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("Could not classify the query: {0}")]
    Classification(ModelError),

    #[error("Classifier produced an invalid plan: {}", .0.join("; "))]
    InvalidClassification(Vec<String>),

    #[error(
        "Search capacity exceeded: {performed} searches already performed, {requested} more requested, limit is {limit}"
    )]
    CapacityExceeded {
        performed: u32,
        requested: u32,
        limit: u32,
    },

    #[error("Scrape capacity exceeded: {requested} pages requested ({performed} already scraped), per-turn limit {per_turn_limit}, total limit {total_limit}")]
    ScrapeCapacityExceeded {
        performed: u32,
        requested: u32,
        per_turn_limit: u32,
        total_limit: u32,
    },

    #[error("Classifier returned an empty search plan for a '{0}' query")]
    EmptyPlan(String),

    #[error("Sorry, I could not handle this request (classification '{0}')")]
    Unhandled(String),

    #[error("Search step failed: {0}")]
    Tool(ToolError),

    #[error("Could not write the final answer: {0}")]
    Synthesis(ModelError),
}
