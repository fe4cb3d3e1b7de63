//! Flow-level tests for the simulated STK push gateway.
//!
//! Every test runs on a paused tokio clock, so the simulated latencies and
//! poll intervals elapse instantly while keeping their ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mock_mpesa::config::SimulatorConfig;
use mock_mpesa::models::payment::{
    PaymentRequest, PaymentState, PaymentStatus, RESULT_FLOW_CANCELLED, RESULT_GATEWAY_ERROR,
    RESULT_PAYMENT_FAILED, RESULT_VALIDATION_ERROR,
};
use mock_mpesa::services::mpesa_service::{PaymentSimulator, StatusSource, FAILURE_REASONS};
use mock_mpesa::services::providers::{Entropy, SeededEntropy, SequenceEntropy, SystemClock};

fn simulator(config: SimulatorConfig, entropy: impl Entropy + 'static) -> PaymentSimulator {
    PaymentSimulator::with_providers(config, Arc::new(SystemClock::new()), Arc::new(entropy))
}

fn gala_ticket() -> PaymentRequest {
    PaymentRequest {
        phone_number: "0712345678".to_string(),
        amount: 1500.0,
        account_reference: "GALA-001".to_string(),
        transaction_desc: "Gala ticket".to_string(),
        purchase_id: Some("purchase-42".to_string()),
    }
}

/// Status source stuck in `processing`.
struct NeverResolves;

#[async_trait]
impl StatusSource for NeverResolves {
    async fn check_status(&self, checkout_request_id: &str, _start_time: DateTime<Utc>) -> PaymentStatus {
        PaymentStatus::new(PaymentState::Processing, checkout_request_id)
    }
}

#[tokio::test(start_paused = true)]
async fn gala_ticket_completes_and_is_enriched() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5));
    let cancel = CancellationToken::new();
    let mut updates = Vec::new();
    let mut record = |status: &PaymentStatus| updates.push(status.clone());

    let outcome = sim
        .run_payment_flow(&gala_ticket(), Some(&mut record), &cancel)
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.status.status, PaymentState::Completed);
    assert!(outcome.status.checkout_request_id.starts_with("ws_CO_"));
    assert_eq!(outcome.status.amount, Some(1500.0));
    assert_eq!(outcome.status.phone_number.as_deref(), Some("254712345678"));
    assert!(outcome.status.transaction_id.is_some());

    let states: Vec<PaymentState> = updates.iter().map(|s| s.status).collect();
    assert_eq!(
        states,
        vec![
            PaymentState::Pending,
            PaymentState::Processing,
            PaymentState::Processing,
            PaymentState::Completed,
        ]
    );
    assert!(updates
        .iter()
        .all(|s| s.checkout_request_id == outcome.status.checkout_request_id));
}

#[tokio::test(start_paused = true)]
async fn terminal_failure_reports_the_reason() {
    // initiation roll, terminal roll, reason pick
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::new([0.5, 0.95, 0.0], 0.5));
    let outcome = sim
        .run_payment_flow(&gala_ticket(), None, &CancellationToken::new())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status.status, PaymentState::Failed);
    assert_eq!(outcome.status.result_code.as_deref(), Some(RESULT_PAYMENT_FAILED));
    assert_eq!(outcome.error.as_deref(), Some("Insufficient funds"));
    assert_eq!(outcome.status.amount, None);
}

#[tokio::test(start_paused = true)]
async fn zero_amount_fails_before_any_polling() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5));
    let mut request = gala_ticket();
    request.amount = 0.0;
    let mut polls = 0;
    let mut count = |_: &PaymentStatus| polls += 1;
    let started = Instant::now();

    let outcome = sim
        .run_payment_flow(&request, Some(&mut count), &CancellationToken::new())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status.status, PaymentState::Failed);
    assert_eq!(outcome.status.checkout_request_id, "");
    assert_eq!(outcome.status.result_code.as_deref(), Some(RESULT_VALIDATION_ERROR));
    assert_eq!(outcome.error.as_deref(), Some("Amount must be greater than 0"));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(polls, 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_phone_is_rejected_immediately() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5));
    let mut request = gala_ticket();
    request.phone_number = "0800000000".to_string();

    let result = sim.initiate(&request).await;

    assert!(!result.success);
    assert_eq!(result.response_code, RESULT_VALIDATION_ERROR);
    assert!(result.checkout_request_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn gateway_flakiness_surfaces_as_failed_outcome() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.01));
    let outcome = sim
        .run_payment_flow(&gala_ticket(), None, &CancellationToken::new())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status.result_code.as_deref(), Some(RESULT_GATEWAY_ERROR));
    assert_eq!(outcome.status.checkout_request_id, "");
    assert!(outcome.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn initiation_can_be_retried_after_gateway_error() {
    let sim = simulator(SimulatorConfig::instant(), SequenceEntropy::new([0.01], 0.5));

    let first = sim.initiate(&gala_ticket()).await;
    let second = sim.initiate(&gala_ticket()).await;

    assert_eq!(first.response_code, RESULT_GATEWAY_ERROR);
    assert!(second.success);
    assert_eq!(
        second.customer_message.as_deref(),
        Some("STK Push sent to 254712345678. Please check your phone and enter your PIN.")
    );
}

#[tokio::test(start_paused = true)]
async fn status_boundaries_follow_elapsed_time() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5));
    let started_ago = |ms: i64| sim.now() - chrono::Duration::milliseconds(ms);

    let id = "ws_CO_boundaries";
    assert_eq!(sim.check_status(id, started_ago(2_900)).await.status, PaymentState::Pending);
    assert_eq!(sim.check_status(id, started_ago(3_100)).await.status, PaymentState::Processing);
    assert_eq!(sim.check_status(id, started_ago(7_900)).await.status, PaymentState::Processing);
    assert!(sim.check_status(id, started_ago(8_100)).await.status.is_terminal());
}

#[tokio::test(start_paused = true)]
async fn future_start_time_reads_as_pending() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5));
    let start = sim.now() + chrono::Duration::seconds(60);

    let status = sim.check_status("ws_CO_future", start).await;

    assert_eq!(status.status, PaymentState::Pending);
}

#[tokio::test(start_paused = true)]
async fn non_terminal_polls_are_repeatable() {
    let sim = simulator(SimulatorConfig::instant(), SeededEntropy::new(3));
    let start = sim.now() - chrono::Duration::milliseconds(4_000);

    let first = sim.check_status("ws_CO_same", start).await;
    let second = sim.check_status("ws_CO_same", start).await;

    assert_eq!(first, second);
    assert_eq!(first.status, PaymentState::Processing);
}

#[tokio::test(start_paused = true)]
async fn stuck_payment_times_out_within_budget() {
    let config = SimulatorConfig::instant();
    let budget = config.max_wait + config.poll_interval;
    let sim = simulator(config, SequenceEntropy::constant(0.5));
    let mut polls = 0;
    let mut count = |_: &PaymentStatus| polls += 1;
    let started = Instant::now();

    let outcome = sim
        .run_payment_flow_with(&NeverResolves, &gala_ticket(), Some(&mut count), &CancellationToken::new())
        .await;

    assert!(started.elapsed() <= budget);
    assert!(!outcome.success);
    assert_eq!(outcome.status.status, PaymentState::Failed);
    assert_eq!(outcome.status.result_code.as_deref(), Some(RESULT_PAYMENT_FAILED));
    assert!(outcome
        .status
        .result_desc
        .as_deref()
        .is_some_and(|desc| desc.to_lowercase().contains("timeout")));
    assert_eq!(polls, 15);
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_flow_yields_cancelled_status() {
    let sim = Arc::new(simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5)));
    let cancel = CancellationToken::new();

    let flow = {
        let sim = Arc::clone(&sim);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut last = None;
            let mut remember = |status: &PaymentStatus| last = Some(status.status);
            let outcome = sim
                .run_payment_flow(&gala_ticket(), Some(&mut remember), &cancel)
                .await;
            (outcome, last)
        })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();
    let (outcome, last) = flow.await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.status.status, PaymentState::Cancelled);
    assert_eq!(outcome.status.result_code.as_deref(), Some(RESULT_FLOW_CANCELLED));
    assert!(outcome.status.checkout_request_id.starts_with("ws_CO_"));
    assert_eq!(last, Some(PaymentState::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_stops_before_initiation() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = sim.run_payment_flow(&gala_ticket(), None, &cancel).await;

    assert_eq!(outcome.status.status, PaymentState::Cancelled);
    assert_eq!(outcome.status.checkout_request_id, "");
}

#[tokio::test(start_paused = true)]
async fn concurrent_flows_are_independent() {
    let sim = simulator(SimulatorConfig::default(), SequenceEntropy::constant(0.5));
    let mut other = gala_ticket();
    other.phone_number = "+254 722 000 111".to_string();
    other.amount = 250.0;
    let first = gala_ticket();
    let cancel = CancellationToken::new();

    let (a, b) = futures::join!(
        sim.run_payment_flow(&first, None, &cancel),
        sim.run_payment_flow(&other, None, &cancel),
    );

    assert!(a.success && b.success);
    assert_ne!(a.status.checkout_request_id, b.status.checkout_request_id);
    assert_eq!(a.status.phone_number.as_deref(), Some("254712345678"));
    assert_eq!(b.status.phone_number.as_deref(), Some("254722000111"));
    assert_eq!(b.status.amount, Some(250.0));
}

#[test]
fn terminal_outcomes_match_configured_odds() {
    let sim = simulator(SimulatorConfig::instant(), SeededEntropy::new(7));
    let draws = 1_000;

    let completed = (0..draws)
        .map(|_| sim.status_at("ws_CO_odds", Duration::from_secs(10)))
        .inspect(|status| {
            if status.status == PaymentState::Failed {
                let reason = status.result_desc.as_deref().unwrap_or_default();
                assert!(FAILURE_REASONS.contains(&reason));
            }
        })
        .filter(|status| status.status == PaymentState::Completed)
        .count();

    let ratio = completed as f64 / draws as f64;
    assert!((0.85..0.95).contains(&ratio), "completion ratio {}", ratio);
}
