use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_TOTAL_SEARCHES: u32 = 12;
pub const DEFAULT_MAX_TOTAL_SCRAPES: u32 = 6;
pub const DEFAULT_MAX_PARALLEL_SCRAPES_PER_TURN: u32 = 3;

/// Ceilings applied to one user query across all of its turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub max_total_searches: u32,
    pub max_total_scrapes: u32,
    pub max_parallel_scrapes_per_turn: u32,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        BudgetLimits {
            max_total_searches: DEFAULT_MAX_TOTAL_SEARCHES,
            max_total_scrapes: DEFAULT_MAX_TOTAL_SCRAPES,
            max_parallel_scrapes_per_turn: DEFAULT_MAX_PARALLEL_SCRAPES_PER_TURN,
        }
    }
}

/// Work already spent on a query. Passed into each turn and handed back in
/// the turn report; nothing else holds it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationBudget {
    #[serde(default)]
    pub total_searches_performed: u32,
    #[serde(default)]
    pub total_scraped_sites: u32,
}

impl OrchestrationBudget {
    pub fn new(total_searches_performed: u32, total_scraped_sites: u32) -> Self {
        OrchestrationBudget {
            total_searches_performed,
            total_scraped_sites,
        }
    }

    /// `performed + requested <= max_total_searches`
    pub fn check_searches(&self, requested: u32, limits: &BudgetLimits) -> Result<(), OrchestratorError> {
        if self.total_searches_performed.saturating_add(requested) > limits.max_total_searches {
            return Err(OrchestratorError::CapacityExceeded {
                performed: self.total_searches_performed,
                requested,
                limit: limits.max_total_searches,
            });
        }
        Ok(())
    }

    pub fn check_scrapes(&self, requested: u32, limits: &BudgetLimits) -> Result<(), OrchestratorError> {
        if requested == 0 {
            return Ok(());
        }
        if requested > limits.max_parallel_scrapes_per_turn
            || self.total_scraped_sites.saturating_add(requested) > limits.max_total_scrapes
        {
            return Err(OrchestratorError::ScrapeCapacityExceeded {
                performed: self.total_scraped_sites,
                requested,
                per_turn_limit: limits.max_parallel_scrapes_per_turn,
                total_limit: limits.max_total_scrapes,
            });
        }
        Ok(())
    }

    /// Budget after a completed batch
    pub fn spend(self, searches: u32, scrapes: u32) -> Self {
        OrchestrationBudget {
            total_searches_performed: self.total_searches_performed.saturating_add(searches),
            total_scraped_sites: self.total_scraped_sites.saturating_add(scrapes),
        }
    }

    pub fn remaining_searches(&self, limits: &BudgetLimits) -> u32 {
        limits
            .max_total_searches
            .saturating_sub(self.total_searches_performed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_ceiling_is_inclusive() {
        let limits = BudgetLimits::default();
        let budget = OrchestrationBudget::new(10, 0);
        assert!(matches!(
            budget.check_searches(3, &limits),
            Err(OrchestratorError::CapacityExceeded { performed: 10, requested: 3, limit: 12 })
        ));
        assert!(budget.check_searches(2, &limits).is_ok());
        assert_eq!(budget.spend(2, 0).remaining_searches(&limits), 0);
    }

    #[test]
    fn test_scrape_ceilings() {
        let limits = BudgetLimits::default();
        let fresh = OrchestrationBudget::default();
        assert!(fresh.check_scrapes(0, &limits).is_ok());
        assert!(fresh.check_scrapes(3, &limits).is_ok());
        // per-turn limit
        assert!(fresh.check_scrapes(4, &limits).is_err());
        // total limit
        assert!(OrchestrationBudget::new(0, 5).check_scrapes(2, &limits).is_err());
    }

    #[test]
    fn test_budget_serializes_camel_case() {
        let json = serde_json::to_value(OrchestrationBudget::new(1, 2)).unwrap();
        assert_eq!(json, serde_json::json!({"totalSearchesPerformed": 1, "totalScrapedSites": 2}));
        let parsed: OrchestrationBudget = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, OrchestrationBudget::default());
    }
}
