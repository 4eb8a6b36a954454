//! HTTP route handlers
//!
//! Thin marshalling layer: handlers resolve request credentials, run the
//! matching gateway operation, and turn `(error, result)` into a status
//! code plus JSON body.

mod auth_routes;
mod data;
mod health;

pub use auth_routes::handle_auth_request;
pub use data::handle_data_request;
pub use health::health_check;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::types::{GatehouseError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body (bulk arrays included)
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Error payload shape shared by all routes
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub reason: String,
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

/// Map a gateway error onto its status code and payload shape
pub(crate) fn error_response(error: &GatehouseError) -> Response<BoxBody> {
    json_response(
        error.status(),
        &ErrorBody {
            ok: false,
            error: error.label().to_string(),
            reason: error.to_string(),
        },
    )
}

pub(crate) fn not_found(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "Not Found", "path": path }),
    )
}

pub(crate) fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub(crate) fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub(crate) fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Read and decode a JSON request body
pub(crate) async fn read_json_body(req: Request<hyper::body::Incoming>) -> Result<serde_json::Value> {
    let body = req
        .collect()
        .await
        .map_err(|e| GatehouseError::InvalidInput(format!("failed to read body: {e}")))?;

    let bytes = body.to_bytes();
    if bytes.len() > MAX_BODY_BYTES {
        return Err(GatehouseError::InvalidInput("request body too large".into()));
    }
    if bytes.is_empty() {
        return Ok(serde_json::Value::Null);
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| GatehouseError::InvalidInput(format!("invalid JSON: {e}")))
}

/// Decode a typed JSON request body
pub(crate) async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<hyper::body::Incoming>,
) -> Result<T> {
    let value = read_json_body(req).await?;
    serde_json::from_value(value)
        .map_err(|e| GatehouseError::InvalidInput(format!("invalid JSON: {e}")))
}

/// Resolve request credentials from the Authorization header.
///
/// Missing or malformed headers degrade to empty credentials.
pub(crate) fn request_credentials(req: &Request<hyper::body::Incoming>) -> Credentials {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(Credentials::from_header)
        .unwrap_or_default()
}
