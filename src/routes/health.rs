use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Serialize;

use crate::db;
use crate::state::AppState;

#[derive(Serialize)]
pub struct LivenessResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    usage_store: &'static str,
}

/// GET /health - the process is up
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(LivenessResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health/ready - 503 until the usage database answers
pub async fn readiness(state: web::Data<AppState>) -> HttpResponse {
    let (status, usage_store, http_status) = if db::health_check(&state.pool).await {
        ("ready", "ok", StatusCode::OK)
    } else {
        ("not_ready", "error", StatusCode::SERVICE_UNAVAILABLE)
    };

    HttpResponse::build(http_status).json(ReadinessResponse {
        status,
        usage_store,
    })
}

/// Configures the health routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route("", web::get().to(liveness))
            .route("/ready", web::get().to(readiness)),
    );
}
