pub mod builtin;
pub mod registry;
pub mod toolkits;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use registry::{Tool, ToolRegistry};
pub use toolkits::{load_toolkits, Toolkit, ToolkitRegistry};
pub use types::{SearchHit, ToolContext, ToolDefinition, ToolKind, ToolName, ToolOutput};

use std::sync::Arc;

/// Register all built-in tools to a registry
fn register_all_tools(registry: &ToolRegistry) {
    // Web search providers
    registry.register(Arc::new(builtin::SerperSearchTool::web()));
    registry.register(Arc::new(builtin::SerperSearchTool::news()));
    registry.register(Arc::new(builtin::WorkerSearchTool::new()));

    // Structured data lookups
    registry.register(Arc::new(builtin::CoinGeckoTool::new()));
    registry.register(Arc::new(builtin::WeatherTool::new()));

    // Page content
    registry.register(Arc::new(builtin::WikipediaContentTool::new()));
    registry.register(Arc::new(builtin::WebScrapeTool::new()));
}

/// Create a new ToolRegistry with all built-in tools registered
pub fn create_default_registry(context: ToolContext) -> ToolRegistry {
    let registry = ToolRegistry::new(context);
    register_all_tools(&registry);
    registry
}
