//! Gatehouse - connection-pooled document-store gateway
//!
//! Maps HTTP-style requests onto MongoDB operations through a pooled,
//! credential-keyed connection layer.
//!
//! ## Components
//!
//! - **Pool**: resolved-URL keyed cache of live client handles with TTL
//!   eviction
//! - **Gateway**: prefix-bound CRUD operations with windowed bulk creates
//! - **Write queue**: per-collection batching worker with threshold and
//!   explicit flushes
//! - **Bulk copy**: chunked collection transfer bounded by window size
//! - **Users**: argon2-backed credential storage and verification

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatehouseError, Result};
