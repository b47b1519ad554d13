pub mod answer;
pub mod budget;
pub mod enrichment;
pub mod orchestrator;
pub mod validation;

pub use answer::{process_answer, FinalAnswer, SourceRecord};
pub use budget::{BudgetLimits, OrchestrationBudget};
pub use orchestrator::{Orchestrator, TurnOutcome, TurnReport};
pub use validation::{extract_json, validate, Classification, ClassificationResult, SearchPlanStep};

use crate::ai::RetryPolicy;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What to do when one step of a search batch fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchPolicy {
    /// The whole batch fails and the turn ends with the step's error
    #[default]
    FailFast,
    /// Failed steps are logged and left out of the bundle
    BestEffort,
}

/// Models and limits used by the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub classifier_model: String,
    pub extractor_model: String,
    pub writer_model: String,
    pub limits: BudgetLimits,
    pub retry: RetryPolicy,
    pub batch_policy: BatchPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            classifier_model: "gpt-4o-mini".to_string(),
            extractor_model: "gpt-4o-mini".to_string(),
            writer_model: "gpt-4o".to_string(),
            limits: BudgetLimits::default(),
            retry: RetryPolicy::default(),
            batch_policy: BatchPolicy::default(),
        }
    }
}
