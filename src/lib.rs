//! KYC verification relay
//!
//! Issues capture tokens for identity-verification jobs, forwards captured
//! evidence to the verification provider, and reconciles the provider's
//! verdict from two channels (pushed callbacks and status polling) into a
//! single versioned job record.

pub mod app_state;
pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod poller;
pub mod routes;
pub mod services;
pub mod store;
