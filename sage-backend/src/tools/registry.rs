use crate::error::ToolError;
use crate::tools::types::{ToolContext, ToolDefinition, ToolName, ToolOutput};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition exposed to planners
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool for a query with optional tool-specific parameters
    async fn execute(
        &self,
        query: &str,
        params: &Value,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;

    /// Returns the tool's name
    fn name(&self) -> ToolName {
        self.definition().name
    }
}

/// Registry that holds all available tools, keyed by their typed name.
/// Built once at startup and shared behind an `Arc`.
pub struct ToolRegistry {
    tools: RwLock<HashMap<ToolName, Arc<dyn Tool>>>,
    context: ToolContext,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Self {
        ToolRegistry {
            tools: RwLock::new(HashMap::new()),
            context,
        }
    }

    /// Register a tool, replacing any previous handler for the same name
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(&name).cloned()
    }

    /// List all registered tools, sorted by name
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self.tools.read().values().cloned().collect();
        tools.sort_by_key(|t| t.name());
        tools
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list().iter().map(|t| t.definition()).collect()
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Resolve a tool name coming from a plan or task graph
    pub fn resolve(&self, name: &str) -> Result<ToolName, ToolError> {
        let parsed =
            ToolName::from_str(name.trim()).map_err(|_| ToolError::UnknownTool(name.to_string()))?;
        if self.tools.read().contains_key(&parsed) {
            Ok(parsed)
        } else {
            Err(ToolError::UnknownTool(name.to_string()))
        }
    }

    /// Execute a registered tool
    pub async fn execute_tool(
        &self,
        name: ToolName,
        query: &str,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        log::info!("[TOOLS] Executing {} with query '{}'", name, query);
        log::debug!("[TOOLS] {} params: {}", name, params);

        let result = tool.execute(query, params, &self.context).await;
        match &result {
            Ok(output) => log::debug!(
                "[TOOLS] {} succeeded (source: {:?})",
                name,
                output.source_url
            ),
            Err(e) => log::warn!("[TOOLS] {} failed: {}", name, e),
        }
        result
    }

    /// Execute a tool by its string name; unknown names are rejected
    pub async fn execute(
        &self,
        name: &str,
        query: &str,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.resolve(name)?;
        self.execute_tool(tool, query, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::StubTool;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_tool_names_are_rejected() {
        let registry = ToolRegistry::new(ToolContext::new());
        registry.register(Arc::new(StubTool::ok(ToolName::Coingecko, json!({"price": 1}))));

        let err = registry.execute("telepathy", "q", &Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("telepathy".to_string()));

        // a valid name that has no registered handler is just as unknown
        let err = registry.execute("wheat", "Paris", &Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("wheat".to_string()));
    }

    #[tokio::test]
    async fn test_execute_dispatches_to_registered_tool() {
        let registry = ToolRegistry::new(ToolContext::new());
        let stub = Arc::new(StubTool::ok(ToolName::Coingecko, json!({"price": 42})));
        registry.register(stub.clone());

        let output = registry.execute("coingecko", "bitcoin", &json!({})).await.unwrap();
        assert_eq!(output.data, json!({"price": 42}));
        assert_eq!(stub.queries(), vec!["bitcoin".to_string()]);
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = ToolRegistry::new(ToolContext::new());
        registry.register(Arc::new(StubTool::ok(ToolName::WebScrape, Value::Null)));
        registry.register(Arc::new(StubTool::ok(ToolName::SerperWebSearch, Value::Null)));
        let names: Vec<ToolName> = registry.list().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec![ToolName::SerperWebSearch, ToolName::WebScrape]);
    }
}
