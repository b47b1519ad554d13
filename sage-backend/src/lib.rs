pub mod ai;
pub mod config;
pub mod controllers;
pub mod dag;
pub mod error;
pub mod orchestration;
pub mod tools;

use ai::OpenAIClient;
use config::Config;
use dag::DagExecutor;
use error::ModelError;
use orchestration::Orchestrator;
use std::sync::Arc;
use tools::{ToolRegistry, ToolkitRegistry};

/// Shared state handed to every request handler
pub struct AppState {
    pub config: Config,
    pub tool_registry: Arc<ToolRegistry>,
    pub toolkits: Arc<ToolkitRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub dag_executor: Arc<DagExecutor>,
}

impl AppState {
    pub fn new(
        config: Config,
        tool_registry: Arc<ToolRegistry>,
        toolkits: Arc<ToolkitRegistry>,
    ) -> Result<Self, ModelError> {
        let orchestrator = Arc::new(build_orchestrator(&config, tool_registry.clone())?);
        let dag_executor = Arc::new(DagExecutor::new(tool_registry.clone(), toolkits.clone()));
        Ok(AppState {
            config,
            tool_registry,
            toolkits,
            orchestrator,
            dag_executor,
        })
    }
}

/// Orchestrator backed by the configured model endpoint
pub fn build_orchestrator(config: &Config, tools: Arc<ToolRegistry>) -> Result<Orchestrator, ModelError> {
    if config.llm_api_key.is_empty() {
        log::warn!("LLM_API_KEY is not set; model calls will be rejected by most endpoints");
    }
    let client = OpenAIClient::new(
        &config.llm_api_key,
        Some(&config.llm_endpoint),
        config.llm_max_tokens,
    )?;
    Ok(Orchestrator::new(
        Arc::new(client),
        tools,
        config.orchestrator_config(),
    ))
}
