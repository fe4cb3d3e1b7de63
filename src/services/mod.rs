pub mod mpesa_service;
pub mod providers;
