use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use serde::Serialize;

use crate::auth::verify_signature;
use crate::error::{AppError, AppResult};
use crate::models::WebhookEvent;
use crate::services::DeliveryService;
use crate::state::AppState;
use crate::workflows;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub delivery: String,
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

/// POST /webhooks/github
///
/// Verifies and decodes the delivery, then runs the workflow on a spawned
/// task. Jobs take minutes, so the delivery is acknowledged right away.
pub async fn receive(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: Bytes,
) -> AppResult<HttpResponse> {
    let event_name = header(&req, "X-GitHub-Event")
        .ok_or_else(|| AppError::Validation("Missing X-GitHub-Event header".to_string()))?;
    let delivery = header(&req, "X-GitHub-Delivery")
        .ok_or_else(|| AppError::Validation("Missing X-GitHub-Delivery header".to_string()))?;

    if let Some(ref secret) = state.webhook_secret {
        let signature = header(&req, "X-Hub-Signature-256").unwrap_or_default();
        if !verify_signature(secret, &signature, &body) {
            log::warn!("Rejected delivery {} with a bad signature", delivery);
            return Err(AppError::Unauthorized("Invalid webhook signature".to_string()));
        }
    }

    let event = match WebhookEvent::parse(&event_name, &body)? {
        Some(event) => event,
        None => {
            log::debug!("Ignoring {} delivery {}", event_name, delivery);
            return Ok(HttpResponse::NoContent().finish());
        }
    };

    if !DeliveryService::claim(&state.pool, &delivery, &event_name).await? {
        log::info!("Delivery {} already processed, skipping", delivery);
        return Ok(HttpResponse::Ok().json(WebhookResponse {
            status: "duplicate",
            delivery,
        }));
    }

    let state = state.get_ref().clone();
    let installation_id = event.installation_id();
    let task_delivery = delivery.clone();
    tokio::spawn(async move {
        match state.workflow_context(installation_id).await {
            Ok(ctx) => workflows::dispatch(&ctx, event).await,
            Err(e) => log::error!(
                "Delivery {}: could not authenticate installation {}: {}",
                task_delivery,
                installation_id,
                e
            ),
        }
    });

    Ok(HttpResponse::Accepted().json(WebhookResponse {
        status: "accepted",
        delivery,
    }))
}

/// Configures the webhook route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhooks/github", web::post().to(receive));
}
