//! Hybrid scaler controller process
//!
//! Configuration and the health/metrics HTTP API; the reconciliation logic
//! lives in `scaler-lib`.

pub mod api;
pub mod config;
