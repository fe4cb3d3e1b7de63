// handlers/mpesa_handlers.rs
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::{AppError, Result};
use crate::models::payment::{
    FinalOutcome, InitiationResult, PaymentRequest, PaymentStatus, RESULT_GATEWAY_ERROR,
    RESULT_SUCCESS, RESULT_VALIDATION_ERROR,
};
use crate::state::AppState;

// C2B Response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StkPushResponse {
    #[serde(flatten)]
    pub result: InitiationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_at: Option<DateTime<Utc>>,
}

// Status Query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub checkout_request_id: String,
    /// RFC 3339 timestamp handed out by the STK push endpoint.
    pub initiated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    #[serde(flatten)]
    pub outcome: FinalOutcome,
    pub updates: Vec<PaymentStatus>,
}

fn http_status_for(response_code: &str) -> StatusCode {
    match response_code {
        RESULT_SUCCESS => StatusCode::OK,
        RESULT_VALIDATION_ERROR => StatusCode::BAD_REQUEST,
        RESULT_GATEWAY_ERROR => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> impl IntoResponse {
    info!("Received STK push request: {:?}", request);

    let result = state.payment_simulator.initiate(&request).await;
    let initiated_at = result.success.then(|| state.payment_simulator.now());

    if let Some(message) = &result.error_message {
        error!("Failed to initiate STK push: {}", message);
    }

    let status = http_status_for(&result.response_code);
    (status, Json(StkPushResponse { result, initiated_at }))
}

pub async fn check_payment_status(
    State(state): State<AppState>,
    Json(query): Json<StatusQuery>,
) -> Result<Json<PaymentStatus>> {
    info!("Checking payment status: {:?}", query);

    if query.checkout_request_id.trim().is_empty() {
        return Err(AppError::invalid_data("checkoutRequestId is required"));
    }

    let initiated_at = DateTime::parse_from_rfc3339(&query.initiated_at)?.with_timezone(&Utc);

    let status = state
        .payment_simulator
        .check_status(&query.checkout_request_id, initiated_at)
        .await;

    Ok(Json(status))
}

/// Runs the whole flow server-side. Dropping the request (client hang-up)
/// cancels the flow through the drop guard.
pub async fn simulate_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Json<SimulationResponse> {
    info!("Simulating payment flow: {:?}", request);

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let mut updates = Vec::new();
    let mut record = |status: &PaymentStatus| {
        info!("Payment {} is {}", status.checkout_request_id, status.status);
        updates.push(status.clone());
    };

    let outcome = state
        .payment_simulator
        .run_payment_flow(&request, Some(&mut record), &cancel)
        .await;

    Json(SimulationResponse { outcome, updates })
}

pub async fn mpesa_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mpesa-simulator",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["stk-push", "payment-status-check", "simulate"]
    }))
}

pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.config.get_config_info())
}
