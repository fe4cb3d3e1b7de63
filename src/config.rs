// config.rs
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Timing and probability knobs of the simulated gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Round-trip delay applied to every successful-validation initiation.
    pub initiate_latency: Duration,
    /// Round-trip delay applied to every status poll.
    pub status_latency: Duration,
    /// Elapsed time below which a payment is still `pending`.
    pub pending_window: Duration,
    /// Elapsed time below which a payment is still `processing`.
    pub processing_window: Duration,
    /// Probability that a valid initiation hits an injected gateway error.
    pub failure_rate: f64,
    /// Probability that a resolved payment ends `completed`.
    pub success_rate: f64,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            initiate_latency: Duration::from_millis(800),
            status_latency: Duration::from_millis(500),
            pending_window: Duration::from_secs(3),
            processing_window: Duration::from_secs(8),
            failure_rate: 0.05,
            success_rate: 0.90,
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl SimulatorConfig {
    /// Default thresholds with no artificial latency.
    pub fn instant() -> Self {
        SimulatorConfig {
            initiate_latency: Duration::ZERO,
            status_latency: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(AppError::configuration(format!(
                "failure rate must be within [0, 1], got {}",
                self.failure_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(AppError::configuration(format!(
                "success rate must be within [0, 1], got {}",
                self.success_rate
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(AppError::configuration("poll interval must be greater than 0"));
        }
        if self.processing_window < self.pending_window {
            return Err(AppError::configuration(
                "processing window must not end before the pending window",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys fall back
    /// to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SimulatorConfig::default();

        let simulator = SimulatorConfig {
            initiate_latency: millis(&lookup, "MPESA_SIM_INITIATE_LATENCY_MS", defaults.initiate_latency)?,
            status_latency: millis(&lookup, "MPESA_SIM_STATUS_LATENCY_MS", defaults.status_latency)?,
            pending_window: millis(&lookup, "MPESA_SIM_PENDING_MS", defaults.pending_window)?,
            processing_window: millis(&lookup, "MPESA_SIM_PROCESSING_MS", defaults.processing_window)?,
            failure_rate: parsed(&lookup, "MPESA_SIM_FAILURE_RATE", defaults.failure_rate)?,
            success_rate: parsed(&lookup, "MPESA_SIM_SUCCESS_RATE", defaults.success_rate)?,
            poll_interval: millis(&lookup, "MPESA_SIM_POLL_INTERVAL_MS", defaults.poll_interval)?,
            max_wait: millis(&lookup, "MPESA_SIM_MAX_WAIT_MS", defaults.max_wait)?,
        };
        simulator.validate()?;

        Ok(AppConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 10000)?,
            simulator,
        })
    }

    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.host,
            "port": self.port,
            "initiate_latency_ms": self.simulator.initiate_latency.as_millis() as u64,
            "status_latency_ms": self.simulator.status_latency.as_millis() as u64,
            "pending_ms": self.simulator.pending_window.as_millis() as u64,
            "processing_ms": self.simulator.processing_window.as_millis() as u64,
            "failure_rate": self.simulator.failure_rate,
            "success_rate": self.simulator.success_rate,
            "poll_interval_ms": self.simulator.poll_interval.as_millis() as u64,
            "max_wait_ms": self.simulator.max_wait.as_millis() as u64,
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::configuration(format!("{} is invalid ({}): {}", key, raw, e))),
        None => Ok(default),
    }
}

fn millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = default.as_millis() as u64;
    parsed(lookup, key, default_ms).map(Duration::from_millis)
}
