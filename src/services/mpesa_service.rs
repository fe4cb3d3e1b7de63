// services/mpesa_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;
use crate::models::payment::{
    FinalOutcome, InitiationResult, PaymentRequest, PaymentState, PaymentStatus,
    RESULT_FLOW_CANCELLED, RESULT_GATEWAY_ERROR, RESULT_PAYMENT_FAILED, RESULT_SUCCESS,
    RESULT_VALIDATION_ERROR,
};
use crate::services::providers::{Clock, Entropy, SystemClock, ThreadEntropy};

pub const FAILURE_REASONS: [&str; 4] = [
    "Insufficient funds",
    "Transaction cancelled by user",
    "Invalid PIN entered",
    "Transaction timeout",
];

const INVALID_PHONE_MESSAGE: &str =
    "Invalid phone number format. Use 07XXXXXXXX, 2547XXXXXXXX or +2547XXXXXXXX";
const INVALID_AMOUNT_MESSAGE: &str = "Amount must be greater than 0";
const GATEWAY_DOWN_MESSAGE: &str = "M-Pesa service is temporarily unavailable. Please try again.";
const PENDING_DESC: &str = "Waiting for customer to enter PIN";
const PROCESSING_DESC: &str = "Customer entered PIN, processing payment";
const COMPLETED_DESC: &str = "The service request is processed successfully.";
const TIMEOUT_DESC: &str = "Payment timeout - no response received from customer";
const CANCELLED_DESC: &str = "Payment flow cancelled";

pub type StatusCallback<'a> = dyn FnMut(&PaymentStatus) + Send + 'a;

/// Anything the polling loop can ask for a status snapshot.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_status(&self, checkout_request_id: &str, start_time: DateTime<Utc>) -> PaymentStatus;
}

/// Canonicalizes a Kenyan mobile number to `2547XXXXXXXX`.
///
/// Accepts `07XXXXXXXX`, `2547XXXXXXXX` and `+2547XXXXXXXX`; whitespace and
/// dashes are ignored. Returns `None` for anything else.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let cleaned: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    let subscriber = if let Some(rest) = cleaned.strip_prefix("+254") {
        rest
    } else if let Some(rest) = cleaned.strip_prefix("254") {
        rest
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        rest
    } else {
        return None;
    };

    let valid = subscriber.len() == 9
        && subscriber.starts_with('7')
        && subscriber.bytes().all(|b| b.is_ascii_digit());

    valid.then(|| format!("254{}", subscriber))
}

/// Simulated M-Pesa STK push gateway.
///
/// Stateless between calls: the caller keeps the `checkoutRequestId` and the
/// initiation time, and every status poll is derived from elapsed time alone.
#[derive(Clone)]
pub struct PaymentSimulator {
    config: SimulatorConfig,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
}

impl std::fmt::Debug for PaymentSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSimulator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PaymentSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_providers(config, Arc::new(SystemClock::new()), Arc::new(ThreadEntropy))
    }

    pub fn with_providers(
        config: SimulatorConfig,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn Entropy>,
    ) -> Self {
        PaymentSimulator {
            config,
            clock,
            entropy,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn elapsed_since(&self, start_time: DateTime<Utc>) -> Duration {
        (self.clock.now() - start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    async fn simulate_latency(&self, latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    // C2B: simulated STK push
    pub async fn initiate(&self, request: &PaymentRequest) -> InitiationResult {
        info!("Simulated STK push for {} - KSh {}", request.phone_number, request.amount);

        let Some(phone) = normalize_phone(&request.phone_number) else {
            warn!("Rejected STK push: invalid phone number {:?}", request.phone_number);
            return InitiationResult::rejected(
                RESULT_VALIDATION_ERROR,
                "Bad Request - Invalid phone number",
                INVALID_PHONE_MESSAGE,
            );
        };

        // NaN fails this comparison too
        if !(request.amount > 0.0) {
            warn!("Rejected STK push: invalid amount {}", request.amount);
            return InitiationResult::rejected(
                RESULT_VALIDATION_ERROR,
                "Bad Request - Invalid amount",
                INVALID_AMOUNT_MESSAGE,
            );
        }

        self.simulate_latency(self.config.initiate_latency).await;

        if self.entropy.roll() < self.config.failure_rate {
            warn!("Injected gateway failure for {}", phone);
            return InitiationResult::rejected(
                RESULT_GATEWAY_ERROR,
                "Service temporarily unavailable",
                GATEWAY_DOWN_MESSAGE,
            );
        }

        let now = self.clock.now();
        let checkout_request_id = format!(
            "ws_CO_{}_{}",
            now.format("%d%m%Y%H%M%S%3f"),
            self.entropy.token(8)
        );
        let merchant_request_id = format!(
            "{}-{}-1",
            now.timestamp_millis() % 100_000,
            self.entropy.token(8)
        );

        info!("STK push accepted: {} ({})", checkout_request_id, request.account_reference);

        InitiationResult {
            success: true,
            checkout_request_id: Some(checkout_request_id),
            merchant_request_id: Some(merchant_request_id),
            response_code: RESULT_SUCCESS.to_string(),
            response_description: "Success. Request accepted for processing".to_string(),
            customer_message: Some(format!(
                "STK Push sent to {}. Please check your phone and enter your PIN.",
                phone
            )),
            error_message: None,
        }
    }

    /// Status of a payment `elapsed` after initiation.
    ///
    /// Deterministic before the processing window closes; past it, every
    /// call rolls the terminal outcome afresh.
    pub fn status_at(&self, checkout_request_id: &str, elapsed: Duration) -> PaymentStatus {
        if elapsed < self.config.pending_window {
            return PaymentStatus::new(PaymentState::Pending, checkout_request_id)
                .with_desc(PENDING_DESC);
        }

        if elapsed < self.config.processing_window {
            return PaymentStatus::new(PaymentState::Processing, checkout_request_id)
                .with_desc(PROCESSING_DESC);
        }

        if self.entropy.roll() < self.config.success_rate {
            let mut status = PaymentStatus::new(PaymentState::Completed, checkout_request_id)
                .with_result(RESULT_SUCCESS, COMPLETED_DESC);
            status.transaction_id = Some(self.entropy.token(10));
            status
        } else {
            let reason = FAILURE_REASONS[self.entropy.pick(FAILURE_REASONS.len())];
            PaymentStatus::new(PaymentState::Failed, checkout_request_id)
                .with_result(RESULT_PAYMENT_FAILED, reason)
        }
    }

    pub async fn check_status(
        &self,
        checkout_request_id: &str,
        start_time: DateTime<Utc>,
    ) -> PaymentStatus {
        let elapsed = self.elapsed_since(start_time);
        self.simulate_latency(self.config.status_latency).await;

        let status = self.status_at(checkout_request_id, elapsed);
        debug!(
            "Status of {} after {}ms: {}",
            checkout_request_id,
            elapsed.as_millis(),
            status.status
        );
        status
    }

    pub async fn run_payment_flow(
        &self,
        request: &PaymentRequest,
        on_status_update: Option<&mut StatusCallback<'_>>,
        cancel: &CancellationToken,
    ) -> FinalOutcome {
        self.run_payment_flow_with(self, request, on_status_update, cancel)
            .await
    }

    /// Full initiate → poll → resolve lifecycle, polling `source`.
    pub async fn run_payment_flow_with<S>(
        &self,
        source: &S,
        request: &PaymentRequest,
        mut on_status_update: Option<&mut StatusCallback<'_>>,
        cancel: &CancellationToken,
    ) -> FinalOutcome
    where
        S: StatusSource + ?Sized,
    {
        let initiation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled_outcome(""),
            result = self.initiate(request) => result,
        };

        let checkout_request_id = match initiation.checkout_request_id {
            Some(id) if initiation.success => id,
            _ => {
                let error = initiation
                    .error_message
                    .unwrap_or(initiation.response_description);
                let status = PaymentStatus::new(PaymentState::Failed, "")
                    .with_result(&initiation.response_code, error);
                return FinalOutcome::failed(status);
            }
        };

        // validated by initiate
        let phone = normalize_phone(&request.phone_number).unwrap_or_default();
        let start_time = self.clock.now();
        let max_wait = self.config.max_wait;

        loop {
            let elapsed = self.elapsed_since(start_time);
            if elapsed >= max_wait {
                warn!("Payment {} timed out after {}ms", checkout_request_id, elapsed.as_millis());
                let status = PaymentStatus::new(PaymentState::Failed, checkout_request_id)
                    .with_result(RESULT_PAYMENT_FAILED, TIMEOUT_DESC);
                return FinalOutcome::failed(status);
            }

            let wait = self.config.poll_interval.min(max_wait - elapsed);
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                status = async {
                    tokio::time::sleep(wait).await;
                    source.check_status(&checkout_request_id, start_time).await
                } => Some(status),
            };

            let Some(status) = status else {
                info!("Payment flow {} cancelled by caller", checkout_request_id);
                let outcome = cancelled_outcome(&checkout_request_id);
                notify(&mut on_status_update, &outcome.status);
                return outcome;
            };

            notify(&mut on_status_update, &status);

            match status.status {
                PaymentState::Completed => {
                    info!("Payment {} completed", checkout_request_id);
                    let mut status = status;
                    status.amount = Some(request.amount);
                    status.phone_number = Some(phone);
                    return FinalOutcome::succeeded(status);
                }
                PaymentState::Failed | PaymentState::Cancelled => {
                    warn!(
                        "Payment {} ended {}: {}",
                        checkout_request_id,
                        status.status,
                        status.result_desc.as_deref().unwrap_or("no reason given")
                    );
                    return FinalOutcome::failed(status);
                }
                PaymentState::Pending | PaymentState::Processing => {}
            }
        }
    }
}

#[async_trait]
impl StatusSource for PaymentSimulator {
    async fn check_status(&self, checkout_request_id: &str, start_time: DateTime<Utc>) -> PaymentStatus {
        PaymentSimulator::check_status(self, checkout_request_id, start_time).await
    }
}

fn notify(callback: &mut Option<&mut StatusCallback<'_>>, status: &PaymentStatus) {
    if let Some(callback) = callback {
        (**callback)(status);
    }
}

fn cancelled_outcome(checkout_request_id: &str) -> FinalOutcome {
    let status = PaymentStatus::new(PaymentState::Cancelled, checkout_request_id)
        .with_result(RESULT_FLOW_CANCELLED, CANCELLED_DESC);
    FinalOutcome::failed(status)
}
