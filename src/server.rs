use crate::campaign::CampaignError;
use crate::service::{OutreachService, WebhookLead};
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

type ApiResponse = (StatusCode, Json<Value>);

#[derive(Debug, Default, Deserialize)]
pub struct ApprovalParams {
    pub segment: Option<String>,
    pub template: Option<String>,
}

pub fn router(service: Arc<OutreachService>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/check-new-leads", get(check_new_leads).post(check_new_leads))
        .route("/webhook/crm", post(crm_webhook))
        .route("/daily-report", post(daily_report))
        .route("/approve-campaign", get(approve_campaign))
        .with_state(service)
}

/// Serve until Ctrl-C.
pub async fn serve(service: Arc<OutreachService>) -> anyhow::Result<()> {
    let server = &service.config().server;
    let addr = format!("{}:{}", server.bind_address, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    log::info!("Listening on http://{addr}");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("Shutdown signal received");
    };

    axum::serve(listener, router(service.clone()))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    Ok(())
}

fn error_response(error: &CampaignError) -> ApiResponse {
    let status = match error {
        CampaignError::MissingParameter(_) => StatusCode::BAD_REQUEST,
        CampaignError::MissingTemplate(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CampaignError::LeadSource(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log::error!("Request failed: {error}");
    (
        status,
        Json(json!({"status": "error", "message": error.to_string()})),
    )
}

fn success(body: Value) -> ApiResponse {
    (StatusCode::OK, Json(body))
}

async fn health_check(State(service): State<Arc<OutreachService>>) -> Json<Value> {
    Json(json!(service.health()))
}

async fn check_new_leads(State(service): State<Arc<OutreachService>>) -> ApiResponse {
    match service.poll_new_leads().await {
        Ok(results) => success(json!({"status": "success", "results": results})),
        Err(e) => error_response(&e),
    }
}

async fn crm_webhook(
    State(service): State<Arc<OutreachService>>,
    payload: Result<Json<WebhookLead>, JsonRejection>,
) -> ApiResponse {
    let Json(event) = match payload {
        Ok(event) => event,
        Err(rejection) => {
            log::warn!("Rejected webhook body: {rejection}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "message": rejection.body_text()})),
            );
        }
    };
    log::info!("Received CRM webhook for lead {}", event.id);

    match service.handle_webhook_lead(&event).await {
        Ok(outcome) => success(json!({
            "status": "success",
            "message": "Lead processed",
            "lead": outcome,
        })),
        Err(e) => error_response(&e),
    }
}

async fn daily_report(State(service): State<Arc<OutreachService>>) -> ApiResponse {
    match service.send_daily_report().await {
        Ok(outcome) => success(json!({
            "status": "success",
            "message": "Report generated",
            "emailed": outcome.emailed,
            "report": outcome.report,
        })),
        Err(e) => error_response(&e),
    }
}

async fn approve_campaign(
    State(service): State<Arc<OutreachService>>,
    Query(params): Query<ApprovalParams>,
) -> ApiResponse {
    let outcome = service
        .approve_campaign(params.segment.as_deref(), params.template.as_deref())
        .await;
    match outcome {
        Ok(campaign) => success(json!({"status": "success", "campaign": campaign})),
        Err(e) => error_response(&e),
    }
}
