//! Runs a validated task graph with as much parallelism as its edges allow.
//!
//! Every task becomes one shared future. A task's future first awaits the
//! shared futures of its dependencies, so a task with several dependents
//! still runs exactly once. All futures are joined on the calling task.

use super::placeholder::resolve_placeholders;
use super::types::{DagReport, Task, TaskResult, TaskState};
use super::validate::{parse_tasks, validate_graph};
use crate::error::{DagError, TaskFailure, ToolError};
use crate::tools::{ToolName, ToolRegistry, ToolkitRegistry};
use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type TaskFuture = Shared<BoxFuture<'static, Result<TaskResult, TaskFailure>>>;

/// Bookkeeping shared by every task of one run
#[derive(Default)]
struct RunState {
    states: DashMap<String, TaskState>,
    results: DashMap<String, TaskResult>,
    warnings: Mutex<Vec<String>>,
}

impl RunState {
    fn set(&self, id: &str, state: TaskState) {
        self.states.insert(id.to_string(), state);
    }

    fn warn(&self, message: String) {
        log::warn!("[DAG] {}", message);
        self.warnings.lock().push(message);
    }
}

struct ExecContext {
    tools: Arc<ToolRegistry>,
    toolkits: Arc<ToolkitRegistry>,
    run: RunState,
}

pub struct DagExecutor {
    tools: Arc<ToolRegistry>,
    toolkits: Arc<ToolkitRegistry>,
}

impl DagExecutor {
    pub fn new(tools: Arc<ToolRegistry>, toolkits: Arc<ToolkitRegistry>) -> Self {
        DagExecutor { tools, toolkits }
    }

    /// Parse a raw JSON batch and execute it
    pub async fn execute_json(&self, batch: &Value) -> Result<DagReport, DagError> {
        let tasks = parse_tasks(batch)?;
        self.execute(tasks).await
    }

    /// Validate the graph, then run every task. Structural problems reject
    /// the batch before anything runs; per-task failures land in the report.
    pub async fn execute(&self, tasks: Vec<Task>) -> Result<DagReport, DagError> {
        let order = validate_graph(&tasks)?;
        log::info!("[DAG] Executing {} tasks", tasks.len());

        let shared = Arc::new(ExecContext {
            tools: self.tools.clone(),
            toolkits: self.toolkits.clone(),
            run: RunState::default(),
        });

        let by_id: HashMap<String, Task> = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        let mut futures: HashMap<String, TaskFuture> = HashMap::with_capacity(order.len());

        for id in &order {
            let Some(task) = by_id.get(id) else { continue };
            shared.run.set(id, TaskState::Pending);

            let deps: Vec<(String, TaskFuture)> = task
                .dependencies
                .iter()
                .filter_map(|dep| futures.get(dep).map(|f| (dep.clone(), f.clone())))
                .collect();

            let future = run_task(task.clone(), deps, shared.clone()).boxed().shared();
            futures.insert(id.clone(), future);
        }

        let outcomes = join_all(order.iter().filter_map(|id| futures.get(id).cloned())).await;

        let mut report = DagReport::default();
        for (id, outcome) in order.into_iter().zip(outcomes) {
            if let Err(failure) = outcome {
                report.failures.insert(id, failure);
            }
        }
        for entry in shared.run.results.iter() {
            report.results.insert(entry.key().clone(), entry.value().clone());
        }
        for entry in shared.run.states.iter() {
            report.states.insert(entry.key().clone(), *entry.value());
        }
        report.warnings = std::mem::take(&mut *shared.run.warnings.lock());

        log::info!(
            "[DAG] Finished: {} completed, {} failed",
            report.results.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

async fn run_task(
    task: Task,
    deps: Vec<(String, TaskFuture)>,
    shared: Arc<ExecContext>,
) -> Result<TaskResult, TaskFailure> {
    let outcomes = join_all(deps.iter().map(|(_, f)| f.clone())).await;

    let mut dep_results: HashMap<String, Value> = HashMap::with_capacity(deps.len());
    for ((dep_id, _), outcome) in deps.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                dep_results.insert(dep_id.clone(), result.result);
            }
            Err(_) => {
                log::info!("[DAG] Skipping '{}': dependency '{}' failed", task.id, dep_id);
                shared.run.set(&task.id, TaskState::Failed);
                return Err(TaskFailure::DependencyFailed {
                    task: task.id.clone(),
                    dependency: dep_id.clone(),
                });
            }
        }
    }

    shared.run.set(&task.id, TaskState::Running);
    let resolved = resolve_placeholders(&task.query, |id| dep_results.get(id).cloned());
    for placeholder in &resolved.unresolved {
        shared.run.warn(format!(
            "Task '{}': placeholder {} could not be resolved",
            task.id, placeholder
        ));
    }

    match execute_with_fallback(&shared, &task, &resolved.text).await {
        Ok(result) => {
            shared.run.results.insert(task.id.clone(), result.clone());
            shared.run.set(&task.id, TaskState::Completed);
            Ok(result)
        }
        Err(error) => {
            log::warn!("[DAG] Task '{}' failed: {}", task.id, error);
            shared.run.set(&task.id, TaskState::Failed);
            Err(TaskFailure::Tool {
                task: task.id.clone(),
                error,
            })
        }
    }
}

/// Run the task's tool; when it fails, try the other tools of its toolkit in
/// order. The primary tool's error is returned if every attempt fails.
async fn execute_with_fallback(
    shared: &ExecContext,
    task: &Task,
    query: &str,
) -> Result<TaskResult, ToolError> {
    let primary = shared.tools.resolve(&task.tool)?;
    let original = match shared.tools.execute_tool(primary, query, &task.params).await {
        Ok(output) => {
            return Ok(TaskResult {
                result: output.data,
                tool: primary,
                fallback_from: None,
                source_url: output.source_url,
            })
        }
        Err(e) => e,
    };

    let candidates: Vec<ToolName> = shared
        .toolkits
        .siblings(primary)
        .into_iter()
        .filter(|t| shared.tools.get(*t).is_some())
        .collect();

    for candidate in candidates {
        log::info!(
            "[DAG] Task '{}': {} failed, falling back to {}",
            task.id,
            primary,
            candidate
        );
        match shared.tools.execute_tool(candidate, query, &task.params).await {
            Ok(output) => {
                shared.run.warn(format!(
                    "Task '{}' served by fallback tool {} after {} failed: {}",
                    task.id, candidate, primary, original
                ));
                return Ok(TaskResult {
                    result: output.data,
                    tool: candidate,
                    fallback_from: Some(primary),
                    source_url: output.source_url,
                });
            }
            Err(e) => log::warn!("[DAG] Fallback {} for '{}' failed: {}", candidate, task.id, e),
        }
    }

    Err(original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{journal, network_error, Journal, StubTool};
    use crate::tools::{ToolContext, ToolOutput, Toolkit};
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new(ToolContext::new()))
    }

    fn web_search_toolkit() -> Arc<ToolkitRegistry> {
        Arc::new(ToolkitRegistry::new(vec![Toolkit {
            name: "web_search".to_string(),
            tools: vec![ToolName::SerperWebSearch, ToolName::WorkerWebSearch],
        }]))
    }

    fn register(tools: &ToolRegistry, stub: StubTool) -> Arc<StubTool> {
        let stub = Arc::new(stub);
        tools.register(stub.clone());
        stub
    }

    fn echo(name: ToolName, log: &Journal) -> StubTool {
        StubTool::with(name, |query, _| Ok(ToolOutput::new(json!({ "echo": query }))))
            .with_delay(Duration::from_millis(20))
            .with_journal(log.clone())
    }

    fn position(entries: &[String], entry: &str) -> usize {
        entries
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing journal entry {}", entry))
    }

    #[tokio::test]
    async fn test_diamond_runs_shared_dependency_once() {
        let tools = registry();
        let log = journal();
        let a = register(&tools, echo(ToolName::SerperWebSearch, &log));
        register(&tools, echo(ToolName::Coingecko, &log));
        register(&tools, echo(ToolName::Wheat, &log));
        register(&tools, echo(ToolName::SerperNewsSearch, &log));

        let tasks = vec![
            Task::new("d", "serper_news_search", "D").depends_on(["b", "c"]),
            Task::new("b", "coingecko", "B").depends_on(["a"]),
            Task::new("c", "wheat", "C").depends_on(["a"]),
            Task::new("a", "serper_web_search", "A"),
        ];
        let report = DagExecutor::new(tools, web_search_toolkit())
            .execute(tasks)
            .await
            .unwrap();

        assert!(report.is_complete_success());
        assert_eq!(a.call_count(), 1);

        let entries = log.lock().clone();
        assert_eq!(entries.len(), 8);
        assert!(position(&entries, "end:A") < position(&entries, "start:B"));
        assert!(position(&entries, "end:A") < position(&entries, "start:C"));
        assert!(position(&entries, "end:B") < position(&entries, "start:D"));
        assert!(position(&entries, "end:C") < position(&entries, "start:D"));
        // siblings overlap
        assert!(position(&entries, "start:C") < position(&entries, "end:B"));
        assert!(report.states.values().all(|s| *s == TaskState::Completed));
    }

    #[tokio::test]
    async fn test_blank_task_fields_run_nothing() {
        let tools = registry();
        let stub = register(&tools, StubTool::ok(ToolName::Wheat, json!({})));
        let executor = DagExecutor::new(tools, web_search_toolkit());

        let from_json = executor
            .execute_json(&json!([{"id": "a", "tool": "wheat", "query": "", "dependencies": []}]))
            .await;
        assert!(matches!(from_json, Err(DagError::MissingField { field: "query", .. })));

        let blank_id = executor.execute(vec![Task::new("", "wheat", "")]).await;
        assert!(matches!(blank_id, Err(DagError::MissingField { field: "id", .. })));

        let blank_tool = executor.execute(vec![Task::new("x", "", "q")]).await;
        assert!(matches!(blank_tool, Err(DagError::MissingField { field: "tool", .. })));

        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_graph_runs_nothing() {
        let tools = registry();
        let stub = register(&tools, StubTool::ok(ToolName::Wheat, json!({})));
        let tasks = vec![
            Task::new("a", "wheat", "x").depends_on(["b"]),
            Task::new("b", "wheat", "x").depends_on(["a"]),
        ];
        let result = DagExecutor::new(tools, web_search_toolkit()).execute(tasks).await;
        assert!(matches!(result, Err(DagError::Cycle { .. })));
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_placeholders_resolve_from_dependencies() {
        let tools = registry();
        register(
            &tools,
            StubTool::ok(ToolName::Coingecko, json!({"symbol": "BTC", "price": 64000})),
        );
        let news = register(
            &tools,
            StubTool::with(ToolName::SerperNewsSearch, |query, _| {
                Ok(ToolOutput::new(json!({ "query": query, "results": [] })))
            }),
        );

        let tasks = vec![
            Task::new("t1", "coingecko", "bitcoin"),
            Task::new("t2", "serper_news_search", "price of {{t1.symbol}} and {{ghost.id}}")
                .depends_on(["t1"]),
        ];
        let report = DagExecutor::new(tools, web_search_toolkit())
            .execute(tasks)
            .await
            .unwrap();

        assert_eq!(news.queries(), vec!["price of BTC and {{ghost.id}}"]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("{{ghost.id}}"));
    }

    #[tokio::test]
    async fn test_fallback_to_sibling_tool() {
        let tools = registry();
        register(
            &tools,
            StubTool::failing(ToolName::SerperWebSearch, network_error(ToolName::SerperWebSearch)),
        );
        let worker = register(
            &tools,
            StubTool::ok(ToolName::WorkerWebSearch, json!({"results": []})),
        );

        let report = DagExecutor::new(tools, web_search_toolkit())
            .execute(vec![Task::new("s", "serper_web_search", "rust")])
            .await
            .unwrap();

        let result = &report.results["s"];
        assert_eq!(result.tool, ToolName::WorkerWebSearch);
        assert_eq!(result.fallback_from, Some(ToolName::SerperWebSearch));
        assert_eq!(worker.queries(), vec!["rust"]);
    }

    #[tokio::test]
    async fn test_exhausted_fallback_keeps_original_error() {
        let tools = registry();
        let original = network_error(ToolName::SerperWebSearch);
        register(&tools, StubTool::failing(ToolName::SerperWebSearch, original.clone()));
        register(
            &tools,
            StubTool::failing(
                ToolName::WorkerWebSearch,
                ToolError::Http {
                    tool: "worker_web_search".to_string(),
                    status: 502,
                    message: "bad gateway".to_string(),
                },
            ),
        );

        let report = DagExecutor::new(tools, web_search_toolkit())
            .execute(vec![Task::new("s", "serper_web_search", "rust")])
            .await
            .unwrap();

        assert_eq!(report.failures["s"].tool_error(), Some(&original));
        assert_eq!(report.states["s"], TaskState::Failed);
    }

    #[tokio::test]
    async fn test_failure_poisons_only_dependents() {
        let tools = registry();
        register(&tools, StubTool::failing(ToolName::Coingecko, network_error(ToolName::Coingecko)));
        let weather = register(&tools, StubTool::ok(ToolName::Wheat, json!({"temperature": 3})));
        let news = register(&tools, StubTool::ok(ToolName::SerperNewsSearch, json!({"results": []})));

        let tasks = vec![
            Task::new("a", "coingecko", "btc"),
            Task::new("b", "serper_news_search", "{{a.price}}").depends_on(["a"]),
            Task::new("c", "wheat", "{{b.results}}").depends_on(["b"]),
            Task::new("d", "wheat", "Oslo"),
        ];
        let report = DagExecutor::new(tools, web_search_toolkit())
            .execute(tasks)
            .await
            .unwrap();

        assert!(report.failures["a"].tool_error().is_some());
        assert_eq!(
            report.failures["b"],
            TaskFailure::DependencyFailed {
                task: "b".to_string(),
                dependency: "a".to_string()
            }
        );
        assert_eq!(
            report.failures["c"],
            TaskFailure::DependencyFailed {
                task: "c".to_string(),
                dependency: "b".to_string()
            }
        );
        assert!(report.results.contains_key("d"));
        assert_eq!(news.call_count(), 0);
        assert_eq!(weather.queries(), vec!["Oslo"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_without_fallback() {
        let tools = registry();
        let report = DagExecutor::new(tools, web_search_toolkit())
            .execute_json(&json!([{"id": "x", "tool": "teleport", "query": "q", "dependencies": []}]))
            .await
            .unwrap();
        assert_eq!(
            report.failures["x"].tool_error(),
            Some(&ToolError::UnknownTool("teleport".to_string()))
        );
    }
}
