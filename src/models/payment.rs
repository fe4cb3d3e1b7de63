use serde::{Deserialize, Serialize};

// Result codes shared with the checkout UI
pub const RESULT_SUCCESS: &str = "0";
pub const RESULT_VALIDATION_ERROR: &str = "400";
pub const RESULT_GATEWAY_ERROR: &str = "500";
pub const RESULT_PAYMENT_FAILED: &str = "1032";
pub const RESULT_FLOW_CANCELLED: &str = "1031";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub phone_number: String,
    pub amount: f64,
    pub account_reference: String,
    pub transaction_desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<String>,
}

/// Answer to an STK push initiation. `checkout_request_id` is only present
/// when `success` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    pub response_code: String,
    pub response_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InitiationResult {
    pub fn rejected(
        response_code: &str,
        response_description: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        InitiationResult {
            success: false,
            checkout_request_id: None,
            merchant_request_id: None,
            response_code: response_code.to_string(),
            response_description: response_description.into(),
            customer_message: None,
            error_message: Some(error_message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentState::Completed | PaymentState::Failed | PaymentState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Processing => "processing",
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
            PaymentState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a payment as seen by one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub status: PaymentState,
    pub checkout_request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl PaymentStatus {
    pub fn new(status: PaymentState, checkout_request_id: impl Into<String>) -> Self {
        PaymentStatus {
            status,
            checkout_request_id: checkout_request_id.into(),
            result_code: None,
            result_desc: None,
            transaction_id: None,
            amount: None,
            phone_number: None,
        }
    }

    pub fn with_result(mut self, code: &str, desc: impl Into<String>) -> Self {
        self.result_code = Some(code.to_string());
        self.result_desc = Some(desc.into());
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.result_desc = Some(desc.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalOutcome {
    pub success: bool,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FinalOutcome {
    pub fn succeeded(status: PaymentStatus) -> Self {
        FinalOutcome {
            success: true,
            status,
            error: None,
        }
    }

    /// Failed outcome; the error text mirrors the status description.
    pub fn failed(status: PaymentStatus) -> Self {
        let error = status.result_desc.clone();
        FinalOutcome {
            success: false,
            status,
            error,
        }
    }
}
