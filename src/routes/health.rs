//! Health check endpoint
//!
//! Liveness only: returns 200 whenever the process is serving, with pool
//! statistics for operators. Database reachability is per-request state
//! here, not a readiness gate.

use hyper::StatusCode;
use serde::Serialize;
use std::sync::Arc;

use crate::routes::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime: u64,
    /// Live database handles currently pooled
    pub pooled_connections: usize,
    pub timestamp: String,
    pub mode: &'static str,
}

pub fn health_check(state: &Arc<AppState>) -> hyper::Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            uptime: state.uptime_secs(),
            pooled_connections: state.pool.len(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode: if state.args.dev_mode {
                "development"
            } else {
                "production"
            },
        },
    )
}
