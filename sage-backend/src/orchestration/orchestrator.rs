//! Linear orchestrator: one turn of classification, optional tool execution
//! and enrichment, then synthesis by the writer.

use super::answer::{process_answer, FinalAnswer, SourceCollector};
use super::budget::OrchestrationBudget;
use super::enrichment::{find_wikipedia_links, Enricher, WikiExtraction};
use super::validation::{extract_json, Classification, ClassificationResult, SearchPlanStep};
use super::{BatchPolicy, OrchestratorConfig};
use crate::ai::prompts::{CLASSIFIER, WRITER};
use crate::ai::{
    invoke_structured, AgentRole, ModelChannel, ModelReply, ModelRequest, RateLimitSignal,
    StreamSender, StreamSummary, Structured,
};
use crate::error::{ModelError, OrchestratorError, ToolError};
use crate::tools::{SearchHit, ToolKind, ToolName, ToolOutput, ToolRegistry};
use futures_util::future::{join_all, try_join_all};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// How a turn ended
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Buffered writer output
    Answered(FinalAnswer),
    /// The answer was delivered chunk by chunk to the caller's stream
    Streamed(StreamSummary),
    /// A model call hit its quota; the caller may retry after the cooldown
    RateLimited(RateLimitSignal),
    Failed(OrchestratorError),
}

/// Outcome plus the budget to carry into the next turn
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub budget: OrchestrationBudget,
}

/// A plan step that produced output
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub tool: ToolName,
    pub query: String,
    #[serde(flatten)]
    pub output: ToolOutput,
}

pub struct Orchestrator {
    channel: Arc<dyn ModelChannel>,
    tools: Arc<ToolRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        channel: Arc<dyn ModelChannel>,
        tools: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Orchestrator {
            channel,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one turn for `query`. Never panics and never returns an error:
    /// failures are reported through `TurnOutcome::Failed`.
    pub async fn run_turn(
        &self,
        query: &str,
        budget: OrchestrationBudget,
        stream: Option<StreamSender>,
    ) -> TurnReport {
        let mut budget = budget;
        log::info!(
            "[ORCHESTRATOR] Turn started (searches {}/{}, scrapes {}/{})",
            budget.total_searches_performed,
            self.config.limits.max_total_searches,
            budget.total_scraped_sites,
            self.config.limits.max_total_scrapes
        );

        let outcome = match self.drive(query, &mut budget, stream).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("[ORCHESTRATOR] Turn failed: {}", e);
                TurnOutcome::Failed(e)
            }
        };

        TurnReport { outcome, budget }
    }

    async fn drive(
        &self,
        query: &str,
        budget: &mut OrchestrationBudget,
        stream: Option<StreamSender>,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let result = match self.classify(query).await? {
            Structured::Parsed(result) => result,
            Structured::RateLimited(signal) => return Ok(TurnOutcome::RateLimited(signal)),
        };
        log::info!(
            "[ORCHESTRATOR] Classified as {} (action {})",
            result.classification,
            result.action
        );

        match result.action.as_str() {
            "direct" => self.answer_directly(query, &result, stream).await,
            "search" => self.search_and_answer(query, &result, budget, stream).await,
            _ => Err(OrchestratorError::Unhandled(result.classification.to_string())),
        }
    }

    async fn classify(
        &self,
        query: &str,
    ) -> Result<Structured<ClassificationResult>, OrchestratorError> {
        let request = ModelRequest::new(
            AgentRole::Classifier,
            &self.config.classifier_model,
            CLASSIFIER,
            json!({ "query": query }),
        );
        // schema violations from the most recent attempt, if that is why it failed
        let violations: Mutex<Option<Vec<String>>> = Mutex::new(None);
        let parse = |text: &str| -> Result<ClassificationResult, String> {
            let value = extract_json(text).inspect_err(|_| *violations.lock() = None)?;
            log::debug!("[ORCHESTRATOR] Classifier output: {}", value);
            ClassificationResult::from_value(value).map_err(|errors| {
                let reason = errors.join("; ");
                *violations.lock() = Some(errors);
                reason
            })
        };

        match invoke_structured(self.channel.as_ref(), request, &self.config.retry, parse).await {
            Ok(parsed) => Ok(parsed),
            Err(e @ ModelError::MalformedOutput { .. }) => match violations.lock().take() {
                Some(errors) => Err(OrchestratorError::InvalidClassification(errors)),
                None => Err(OrchestratorError::Classification(e)),
            },
            Err(e) => Err(OrchestratorError::Classification(e)),
        }
    }

    async fn answer_directly(
        &self,
        query: &str,
        result: &ClassificationResult,
        stream: Option<StreamSender>,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let forwarded = match result.classification {
            Classification::Direct | Classification::Conversational => query.to_string(),
            _ => result.response.clone().unwrap_or_else(|| query.to_string()),
        };
        let payload = json!({
            "rawQuery": query,
            "query": forwarded,
            "classification": result.classification,
        });
        self.synthesize(payload, &[], stream).await
    }

    async fn search_and_answer(
        &self,
        query: &str,
        result: &ClassificationResult,
        budget: &mut OrchestrationBudget,
        stream: Option<StreamSender>,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let limits = &self.config.limits;
        let plan: &[SearchPlanStep] = result.search_plan.as_deref().unwrap_or(&[]);
        let direct_component = result
            .direct_component
            .as_deref()
            .filter(|c| !c.trim().is_empty());

        if plan.is_empty()
            && !(result.classification == Classification::Hybrid && direct_component.is_some())
        {
            return Err(OrchestratorError::EmptyPlan(result.classification.to_string()));
        }

        let requested = plan.len() as u32;
        let scrapes = plan
            .iter()
            .filter(|step| matches!(step.tool.trim().parse::<ToolName>(), Ok(ToolName::WebScrape)))
            .count() as u32;
        budget.check_searches(requested, limits)?;
        budget.check_scrapes(scrapes, limits)?;

        let steps = self.execute_plan(plan).await?;
        *budget = budget.spend(requested, scrapes);

        let (web_results, other_results): (Vec<StepResult>, Vec<StepResult>) = steps
            .into_iter()
            .partition(|step| step.tool.kind() == ToolKind::WebSearch);

        let hits: Vec<SearchHit> = web_results
            .iter()
            .flat_map(|step| SearchHit::from_data(&step.output.data))
            .collect();

        let links = find_wikipedia_links(&hits);
        let wiki = Enricher {
            channel: self.channel.as_ref(),
            tools: self.tools.as_ref(),
            model: &self.config.extractor_model,
            retry: &self.config.retry,
        }
        .enrich(query, &links)
        .await;

        let mut sources = SourceCollector::new();
        for hit in &hits {
            sources.add(&hit.title, &hit.link, &hit.snippet);
        }
        for step in &other_results {
            if let Some(url) = &step.output.source_url {
                sources.add(&format!("{} ({})", step.tool, step.query), url, "");
            }
        }
        for extraction in &wiki {
            sources.add("Wikipedia", &extraction.source_article_url, "");
        }

        let source_urls = sources.urls();
        let sources = sources.into_sources();
        let bundle = merged_bundle(
            query,
            result,
            direct_component,
            &web_results,
            &other_results,
            &wiki,
            &source_urls,
            &sources,
        );
        self.synthesize(bundle, &sources, stream).await
    }

    /// Run every step concurrently and join on all of them
    async fn execute_plan(&self, plan: &[SearchPlanStep]) -> Result<Vec<StepResult>, OrchestratorError> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }
        log::info!(
            "[ORCHESTRATOR] Executing {} plan steps ({})",
            plan.len(),
            self.config.batch_policy
        );

        let runs = plan.iter().map(|step| self.execute_step(step));
        match self.config.batch_policy {
            BatchPolicy::FailFast => try_join_all(runs).await.map_err(OrchestratorError::Tool),
            BatchPolicy::BestEffort => {
                let mut kept = Vec::with_capacity(plan.len());
                for (step, result) in plan.iter().zip(join_all(runs).await) {
                    match result {
                        Ok(done) => kept.push(done),
                        Err(e) => log::warn!(
                            "[ORCHESTRATOR] Dropping step {} '{}': {}",
                            step.tool,
                            step.query,
                            e
                        ),
                    }
                }
                Ok(kept)
            }
        }
    }

    async fn execute_step(&self, step: &SearchPlanStep) -> Result<StepResult, ToolError> {
        let tool = self.tools.resolve(&step.tool)?;
        let output = self.tools.execute_tool(tool, &step.query, &step.params).await?;
        Ok(StepResult {
            tool,
            query: step.query.clone(),
            output,
        })
    }

    async fn synthesize(
        &self,
        payload: Value,
        sources: &[super::SourceRecord],
        stream: Option<StreamSender>,
    ) -> Result<TurnOutcome, OrchestratorError> {
        log::debug!("[ORCHESTRATOR] Writer payload: {}", payload);
        let mut request =
            ModelRequest::new(AgentRole::Writer, &self.config.writer_model, WRITER, payload);
        if let Some(sender) = stream {
            request = request.streamed(sender);
        }

        let reply = self
            .channel
            .invoke(request)
            .await
            .map_err(OrchestratorError::Synthesis)?;

        Ok(match reply {
            ModelReply::Buffered(text) => TurnOutcome::Answered(process_answer(&text, sources)),
            ModelReply::Streamed(summary) => {
                log::info!("[ORCHESTRATOR] Answer streamed ({} chunks)", summary.chunks);
                TurnOutcome::Streamed(summary)
            }
            ModelReply::RateLimited(signal) => TurnOutcome::RateLimited(signal),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn merged_bundle(
    query: &str,
    result: &ClassificationResult,
    direct_component: Option<&str>,
    web_results: &[StepResult],
    other_results: &[StepResult],
    wiki: &[WikiExtraction],
    source_urls: &[String],
    sources: &[super::SourceRecord],
) -> Value {
    let web: Vec<Value> = web_results
        .iter()
        .map(|step| {
            json!({
                "tool": step.tool,
                "query": step.query,
                "results": step.output.data.get("results").cloned().unwrap_or_else(|| json!([])),
            })
        })
        .collect();

    json!({
        "webSearchResults": web,
        "otherToolResults": other_results,
        "processedWikiData": wiki,
        "rawQuery": query,
        "classification": result.classification,
        "directComponent": direct_component,
        "sourceUrls": source_urls,
        "sources": sources,
    })
}
