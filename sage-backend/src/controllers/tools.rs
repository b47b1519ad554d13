use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::tools::{Toolkit, ToolDefinition};
use crate::AppState;

#[derive(Serialize)]
struct ToolsResponse {
    tools: Vec<ToolDefinition>,
    toolkits: Vec<Toolkit>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/tools").route(web::get().to(list_tools)));
}

async fn list_tools(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ToolsResponse {
        tools: state.tool_registry.definitions(),
        toolkits: state.toolkits.toolkits().to_vec(),
    })
}
