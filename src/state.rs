use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::mpesa_service::PaymentSimulator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub payment_simulator: Arc<PaymentSimulator>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let payment_simulator = Arc::new(PaymentSimulator::new(config.simulator.clone()));
        AppState {
            config: Arc::new(config),
            payment_simulator,
        }
    }

    pub fn with_simulator(mut self, payment_simulator: Arc<PaymentSimulator>) -> Self {
        self.payment_simulator = payment_simulator;
        self
    }
}
