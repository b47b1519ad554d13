use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::DagReport;
use crate::AppState;

#[derive(Deserialize)]
pub struct DagRequest {
    pub tasks: Value,
}

#[derive(Serialize)]
struct DagResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<DagReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/dag").route(web::post().to(run_dag)));
}

async fn run_dag(state: web::Data<AppState>, body: web::Json<DagRequest>) -> impl Responder {
    match state.dag_executor.execute_json(&body.tasks).await {
        Ok(report) => HttpResponse::Ok().json(DagResponse {
            success: report.is_complete_success(),
            report: Some(report),
            error: None,
        }),
        Err(e) => {
            log::warn!("[DAG] Rejected task batch: {}", e);
            HttpResponse::BadRequest().json(DagResponse {
                success: false,
                report: None,
                error: Some(e.to_string()),
            })
        }
    }
}
