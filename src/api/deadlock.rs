use actix_web::{HttpResponse, Responder, get, post, web};
use log::debug;

use super::models::{AppState, DeadlockResponse, ResourceEdgeRequest};

/// Record that a process holds a resource.
#[post("/deadlock/allocations/")]
pub async fn add_allocation(
    state: web::Data<AppState>,
    body: web::Json<ResourceEdgeRequest>,
) -> impl Responder {
    state.detector.add_allocation(body.process, body.resource);
    debug!("process {} holds resource {}", body.process, body.resource);
    HttpResponse::NoContent().finish()
}

/// Record that a process waits for a resource.
#[post("/deadlock/waits/")]
pub async fn add_wait_for(
    state: web::Data<AppState>,
    body: web::Json<ResourceEdgeRequest>,
) -> impl Responder {
    state.detector.add_wait_for(body.process, body.resource);
    debug!("process {} waits for resource {}", body.process, body.resource);
    HttpResponse::NoContent().finish()
}

/// Run detection over the current wait-for graph.
#[get("/deadlock/")]
pub async fn detect(state: web::Data<AppState>) -> impl Responder {
    let cycles = state.detector.detect_deadlocks();
    HttpResponse::Ok().json(DeadlockResponse {
        deadlocked: !cycles.is_empty(),
        cycles,
    })
}
