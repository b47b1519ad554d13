use crate::ai::openai::DEFAULT_ENDPOINT;
use crate::ai::retry::DEFAULT_MAX_RETRIES;
use crate::ai::RetryPolicy;
use crate::orchestration::{BatchPolicy, BudgetLimits, OrchestratorConfig};
use crate::tools::builtin::{OPENWEATHER_API_KEY, SCRAPER_WORKER_URL, SERPER_API_KEY};
use crate::tools::{ToolContext, ToolName};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub llm_endpoint: String,
    pub llm_api_key: String,
    pub llm_max_tokens: Option<u32>,
    pub classifier_model: String,
    pub extractor_model: String,
    pub writer_model: String,
    pub max_retries: u32,
    pub serper_api_key: Option<String>,
    pub openweather_api_key: Option<String>,
    pub coingecko_api_url: Option<String>,
    pub scraper_worker_url: Option<String>,
    pub limits: BudgetLimits,
    pub batch_policy: BatchPolicy,
    pub config_dir: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("llm_endpoint", &self.llm_endpoint)
            .field("llm_api_key", &mask(&self.llm_api_key))
            .field("classifier_model", &self.classifier_model)
            .field("extractor_model", &self.extractor_model)
            .field("writer_model", &self.writer_model)
            .field("max_retries", &self.max_retries)
            .field("limits", &self.limits)
            .field("batch_policy", &self.batch_policy)
            .field("config_dir", &self.config_dir)
            .finish_non_exhaustive()
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable, falling back to `default` (with a warning) when it is
/// unset or malformed
fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    match optional(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid {}={:?}", name, raw);
            default
        }),
    }
}

impl Config {
    /// Read configuration from the environment. Never panics; bad values fall
    /// back to their defaults.
    pub fn from_env() -> Self {
        let defaults = OrchestratorConfig::default();
        let default_limits = BudgetLimits::default();

        Self {
            port: parsed_or("PORT", DEFAULT_PORT),
            llm_endpoint: optional("LLM_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            llm_api_key: optional("LLM_API_KEY").unwrap_or_default(),
            llm_max_tokens: optional("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()),
            classifier_model: optional("CLASSIFIER_MODEL").unwrap_or(defaults.classifier_model),
            extractor_model: optional("EXTRACTOR_MODEL").unwrap_or(defaults.extractor_model),
            writer_model: optional("WRITER_MODEL").unwrap_or(defaults.writer_model),
            max_retries: parsed_or("LLM_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            serper_api_key: optional(SERPER_API_KEY),
            openweather_api_key: optional(OPENWEATHER_API_KEY),
            coingecko_api_url: optional("COINGECKO_API_URL"),
            scraper_worker_url: optional(SCRAPER_WORKER_URL),
            limits: BudgetLimits {
                max_total_searches: parsed_or("MAX_TOTAL_SEARCHES", default_limits.max_total_searches),
                max_total_scrapes: parsed_or("MAX_TOTAL_SCRAPES", default_limits.max_total_scrapes),
                max_parallel_scrapes_per_turn: parsed_or(
                    "MAX_PARALLEL_SCRAPES_PER_TURN",
                    default_limits.max_parallel_scrapes_per_turn,
                ),
            },
            batch_policy: parsed_or("BATCH_POLICY", BatchPolicy::default()),
            config_dir: optional("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_config_dir),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            classifier_model: self.classifier_model.clone(),
            extractor_model: self.extractor_model.clone(),
            writer_model: self.writer_model.clone(),
            limits: self.limits,
            retry: RetryPolicy::new(self.max_retries),
            batch_policy: self.batch_policy,
        }
    }

    /// Tool context carrying the API keys and endpoint overrides
    pub fn tool_context(&self) -> ToolContext {
        let mut context = ToolContext::new();
        if let Some(key) = &self.serper_api_key {
            context = context.with_api_key(SERPER_API_KEY, key.clone());
        }
        if let Some(key) = &self.openweather_api_key {
            context = context.with_api_key(OPENWEATHER_API_KEY, key.clone());
        }
        if let Some(url) = &self.coingecko_api_url {
            context = context.with_endpoint(ToolName::Coingecko, url.clone());
        }
        if let Some(url) = &self.scraper_worker_url {
            context = context.with_endpoint(ToolName::WorkerWebSearch, url.clone());
        }
        context
    }
}

/// `./config` when present, otherwise `../config` (running from a subdirectory)
fn default_config_dir() -> PathBuf {
    let local = PathBuf::from("./config");
    if local.exists() {
        local
    } else {
        PathBuf::from("../config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_or_falls_back_on_garbage() {
        // SAFETY: variable names are unique to this test
        unsafe {
            env::set_var("SAGE_TEST_PARSED_BAD", "not-a-number");
            env::set_var("SAGE_TEST_PARSED_GOOD", " 42 ");
        }
        assert_eq!(parsed_or("SAGE_TEST_PARSED_BAD", 7u32), 7);
        assert_eq!(parsed_or("SAGE_TEST_PARSED_GOOD", 7u32), 42);
        assert_eq!(parsed_or("SAGE_TEST_PARSED_UNSET", 7u32), 7);
    }

    #[test]
    fn test_batch_policy_parses_from_env_strings() {
        assert_eq!("best_effort".parse::<BatchPolicy>().unwrap(), BatchPolicy::BestEffort);
        assert_eq!("fail_fast".parse::<BatchPolicy>().unwrap(), BatchPolicy::FailFast);
        assert!("sometimes".parse::<BatchPolicy>().is_err());
    }
}
