use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::mpesa_handlers;
use crate::state::AppState;

pub fn mpesa_routes() -> Router<AppState> {
    Router::new()
        // Health
        .route("/health", get(mpesa_handlers::mpesa_health))
        .route("/config", get(mpesa_handlers::get_config))

        // C2B Routes
        .route("/stk-push", post(mpesa_handlers::initiate_stk_push))
        .route("/check-payment-status", post(mpesa_handlers::check_payment_status))

        // Whole flow in one request
        .route("/simulate", post(mpesa_handlers::simulate_payment))
}
