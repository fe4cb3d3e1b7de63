//! Simulated M-Pesa STK push gateway for the event registration checkout.
//!
//! [`services::mpesa_service::PaymentSimulator`] models the initiate, poll and
//! resolve round trips without touching the network; [`routes::build_router`]
//! exposes it over HTTP.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
