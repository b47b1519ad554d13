//! Structural checks on a task graph. Nothing runs unless the whole batch
//! passes.

use super::types::Task;
use crate::error::DagError;
use serde_json::Value;
use std::collections::HashMap;

/// Parse a raw JSON batch into tasks, reporting the first malformed entry
pub fn parse_tasks(batch: &Value) -> Result<Vec<Task>, DagError> {
    let items = batch.as_array().ok_or(DagError::NotAnArray)?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_task(index, item))
        .collect()
}

fn required_str(index: usize, item: &Value, field: &'static str) -> Result<String, DagError> {
    item.get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(DagError::MissingField { index, field })
}

fn parse_task(index: usize, item: &Value) -> Result<Task, DagError> {
    let id = required_str(index, item, "id")?;
    let tool = required_str(index, item, "tool")?;
    let query = required_str(index, item, "query")?;

    let dependencies = match item.get("dependencies") {
        None | Some(Value::Null) => {
            return Err(DagError::MissingField {
                index,
                field: "dependencies",
            })
        }
        Some(Value::Array(deps)) => deps
            .iter()
            .map(|d| d.as_str().map(str::to_string))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| DagError::InvalidDependencies { task: id.clone() })?,
        Some(_) => return Err(DagError::InvalidDependencies { task: id }),
    };

    Ok(Task {
        id,
        tool,
        query,
        dependencies,
        params: item.get("params").cloned().unwrap_or(Value::Null),
    })
}

fn check_fields(index: usize, task: &Task) -> Result<(), DagError> {
    let fields: [(&'static str, &str); 3] =
        [("id", &task.id), ("tool", &task.tool), ("query", &task.query)];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(DagError::MissingField { index, field });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Check ids and edges, then return task ids in dependency order
/// (every task after all of its dependencies).
pub fn validate_graph(tasks: &[Task]) -> Result<Vec<String>, DagError> {
    for (index, task) in tasks.iter().enumerate() {
        check_fields(index, task)?;
    }

    let mut by_id: HashMap<&str, &Task> = HashMap::with_capacity(tasks.len());
    for task in tasks {
        if by_id.insert(task.id.as_str(), task).is_some() {
            return Err(DagError::DuplicateId(task.id.clone()));
        }
    }

    for task in tasks {
        if let Some(missing) = task
            .dependencies
            .iter()
            .find(|dep| !by_id.contains_key(dep.as_str()))
        {
            return Err(DagError::UnknownDependency {
                task: task.id.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(tasks.len());
    let mut order = Vec::with_capacity(tasks.len());
    let mut path = Vec::new();
    for task in tasks {
        visit(task.id.as_str(), &by_id, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a Task>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), DagError> {
    match marks.get(id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|p| p.to_string()).collect();
            cycle.push(id.to_string());
            return Err(DagError::Cycle { path: cycle });
        }
        None => {}
    }

    marks.insert(id, Mark::Visiting);
    path.push(id);
    if let Some(&task) = by_id.get(id) {
        for dep in &task.dependencies {
            visit(dep.as_str(), by_id, marks, path, order)?;
        }
    }
    path.pop();
    marks.insert(id, Mark::Done);
    order.push(id.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_three_node_cycle_is_rejected() {
        let tasks = vec![
            Task::new("a", "coingecko", "x").depends_on(["c"]),
            Task::new("b", "coingecko", "x").depends_on(["a"]),
            Task::new("c", "coingecko", "x").depends_on(["b"]),
        ];
        match validate_graph(&tasks) {
            Err(DagError::Cycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tasks = vec![Task::new("a", "coingecko", "x").depends_on(["a"])];
        assert_eq!(
            validate_graph(&tasks),
            Err(DagError::Cycle {
                path: vec!["a".to_string(), "a".to_string()]
            })
        );
    }

    #[test]
    fn test_duplicate_and_unknown_ids() {
        let dup = vec![Task::new("a", "wheat", "x"), Task::new("a", "wheat", "y")];
        assert_eq!(validate_graph(&dup), Err(DagError::DuplicateId("a".to_string())));

        let unknown = vec![Task::new("a", "wheat", "x").depends_on(["ghost"])];
        assert_eq!(
            validate_graph(&unknown),
            Err(DagError::UnknownDependency {
                task: "a".to_string(),
                dependency: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_blank_fields_are_rejected() {
        let blank_query = vec![Task::new("a", "wheat", "x"), Task::new("b", "wheat", "  ")];
        assert_eq!(
            validate_graph(&blank_query),
            Err(DagError::MissingField { index: 1, field: "query" })
        );
        assert_eq!(
            validate_graph(&[Task::new("", "wheat", "x")]),
            Err(DagError::MissingField { index: 0, field: "id" })
        );
        assert_eq!(
            validate_graph(&[Task::new("x", "", "q")]),
            Err(DagError::MissingField { index: 0, field: "tool" })
        );
    }

    #[test]
    fn test_order_puts_dependencies_first() {
        let tasks = vec![
            Task::new("d", "wheat", "x").depends_on(["b", "c"]),
            Task::new("b", "wheat", "x").depends_on(["a"]),
            Task::new("c", "wheat", "x").depends_on(["a"]),
            Task::new("a", "wheat", "x"),
        ];
        let order = validate_graph(&tasks).unwrap();
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_parse_reports_malformed_entries() {
        assert_eq!(parse_tasks(&json!({"id": "a"})), Err(DagError::NotAnArray));
        assert_eq!(
            parse_tasks(&json!([{"id": "a", "query": "q", "dependencies": []}])),
            Err(DagError::MissingField { index: 0, field: "tool" })
        );
        assert_eq!(
            parse_tasks(&json!([
                {"id": "a", "tool": "wheat", "query": "q", "dependencies": []},
                {"id": "b", "tool": "wheat", "query": "q"}
            ])),
            Err(DagError::MissingField { index: 1, field: "dependencies" })
        );
        assert_eq!(
            parse_tasks(&json!([{"id": "a", "tool": "wheat", "query": "q", "dependencies": "b"}])),
            Err(DagError::InvalidDependencies { task: "a".to_string() })
        );
        assert_eq!(
            parse_tasks(&json!([{"id": "a", "tool": "wheat", "query": "", "dependencies": []}])),
            Err(DagError::MissingField { index: 0, field: "query" })
        );

        let tasks = parse_tasks(&json!([
            {"id": "a", "tool": "wheat", "query": "Oslo", "dependencies": [], "params": {"units": "metric"}}
        ]))
        .unwrap();
        assert_eq!(tasks[0].params["units"], "metric");
    }
}
