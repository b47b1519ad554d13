use actix_web::web::Bytes;
use actix_web::{web, HttpResponse, Responder};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::streaming::create_default_stream_channel;
use crate::ai::{StreamEvent, StreamReceiver};
use crate::orchestration::{OrchestrationBudget, SourceRecord, TurnOutcome, TurnReport};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub stream: bool,
    /// Budget carried over from earlier turns of the same query
    #[serde(default)]
    pub budget: OrchestrationBudget,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum QueryStatus {
    Answered,
    RateLimited,
    Failed,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    status: QueryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<SourceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
    budget: OrchestrationBudget,
}

impl QueryResponse {
    fn from_report(report: TurnReport) -> Self {
        let mut response = QueryResponse {
            status: QueryStatus::Answered,
            answer: None,
            sources: Vec::new(),
            error: None,
            retry_after_secs: None,
            budget: report.budget,
        };
        match report.outcome {
            TurnOutcome::Answered(answer) => {
                response.answer = Some(answer.body);
                response.sources = answer.sources;
            }
            // only reachable when a stream was requested
            TurnOutcome::Streamed(_) => {}
            TurnOutcome::RateLimited(signal) => {
                response.status = QueryStatus::RateLimited;
                response.error = Some(signal.message);
                response.retry_after_secs = signal.retry_after_secs;
            }
            TurnOutcome::Failed(e) => {
                response.status = QueryStatus::Failed;
                response.error = Some(e.to_string());
            }
        }
        response
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/query").route(web::post().to(run_query)));
}

async fn run_query(state: web::Data<AppState>, body: web::Json<QueryRequest>) -> impl Responder {
    let request = body.into_inner();
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "status": "failed",
            "error": "Query must not be empty"
        }));
    }

    let request_id = Uuid::new_v4();
    log::info!(
        "[API] Query {} (stream: {}): {}",
        request_id,
        request.stream,
        query
    );

    if !request.stream {
        let report = state.orchestrator.run_turn(&query, request.budget, None).await;
        log::info!("[API] Query {} finished", request_id);
        return HttpResponse::Ok().json(QueryResponse::from_report(report));
    }

    let (tx, rx) = create_default_stream_channel();
    let orchestrator = state.orchestrator.clone();
    actix_web::rt::spawn(async move {
        let report = orchestrator.run_turn(&query, request.budget, Some(tx.clone())).await;
        for event in closing_events(report) {
            if tx.send(event).await.is_err() {
                log::debug!("[API] Query {}: client went away", request_id);
                break;
            }
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(sse_stream(rx))
}

/// Events that close a streamed turn; the last one is always `done`
fn closing_events(report: TurnReport) -> Vec<StreamEvent> {
    let budget = serde_json::to_value(report.budget).ok();
    let mut events = match report.outcome {
        TurnOutcome::Streamed(_) => Vec::new(),
        TurnOutcome::Answered(answer) => vec![StreamEvent::ContentDelta {
            content: answer.body,
        }],
        TurnOutcome::RateLimited(signal) => vec![StreamEvent::RateLimited {
            retry_after_secs: signal.retry_after_secs,
            message: signal.message,
        }],
        TurnOutcome::Failed(e) => vec![StreamEvent::Error {
            message: e.to_string(),
        }],
    };
    events.push(StreamEvent::Done { budget });
    events
}

fn sse_frame(event: &StreamEvent) -> Bytes {
    let payload = serde_json::to_string(event)
        .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"{}"}}"#, e));
    Bytes::from(format!("data: {}\n\n", payload))
}

fn sse_stream(
    rx: StreamReceiver,
) -> impl futures_util::Stream<Item = Result<Bytes, actix_web::Error>> {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(sse_frame(&event)), rx))
    })
}
