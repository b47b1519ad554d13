//! Dependency-graph execution of tool tasks

pub mod executor;
pub mod placeholder;
pub mod types;
pub mod validate;

pub use executor::DagExecutor;
pub use placeholder::{resolve_placeholders, Resolved};
pub use types::{DagReport, Task, TaskResult, TaskState};
pub use validate::{parse_tasks, validate_graph};
