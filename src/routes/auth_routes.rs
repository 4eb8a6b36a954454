//! HTTP routes for authentication and user management
//!
//! - POST /auth/login      - verify credentials, return the user context
//! - POST /auth/logout     - expire the caller's pooled connection
//! - GET  /users           - list users (hashes stripped)
//! - POST /users           - create a user with a hashed password
//! - PUT  /users/password  - re-hash and store a new password
//! - DELETE /users/{name}  - remove a user document

use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

use crate::auth::{AuthOutcome, Credentials};
use crate::db::gateway::CreateOutcome;
use crate::db::pool;
use crate::routes::{
    error_response, json_response, not_found, parse_json_body, request_credentials, BoxBody,
    ErrorBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

/// Session-facing view of an authenticated user
#[derive(Debug, Serialize)]
pub struct UserCtx {
    pub db: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl UserCtx {
    fn anonymous() -> Self {
        Self {
            db: String::new(),
            name: String::new(),
            roles: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub ok: bool,
    #[serde(rename = "userCtx")]
    pub user_ctx: UserCtx,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub roles: JsonValue,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub user: String,
    pub password: String,
}

/// Dispatch /auth/* and /users* requests
pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (Method::POST, ["auth", "login"]) => handle_login(req, state).await,
        (Method::POST, ["auth", "logout"]) => handle_logout(req, state).await,
        (Method::GET, ["users"]) => handle_list_users(req, state).await,
        (Method::POST, ["users"]) => handle_create_user(req, state).await,
        (Method::PUT, ["users", "password"]) => handle_update_password(req, state).await,
        (Method::DELETE, ["users", username]) => {
            let username = username.to_string();
            handle_drop_user(req, state, &username).await
        }
        _ => not_found(&path),
    }
}

async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    // Absent credentials are unauthenticated, not an error
    if body.name.is_empty() || body.password.is_empty() {
        return json_response(
            StatusCode::OK,
            &LoginResponse {
                ok: false,
                user_ctx: UserCtx::anonymous(),
            },
        );
    }

    let users = match state.gateway_for(&Credentials::default()).await {
        Ok((gateway, _)) => state.user_service(gateway),
        Err(e) => return error_response(&e),
    };

    match users.authenticate(&body.name, &body.password).await {
        Ok(AuthOutcome::Verified(user)) => {
            info!(user = %body.name, "login verified");
            json_response(
                StatusCode::OK,
                &LoginResponse {
                    ok: true,
                    user_ctx: UserCtx {
                        db: state.args.db_name.clone(),
                        name: user.username.clone(),
                        roles: user.role_names(),
                    },
                },
            )
        }
        Ok(AuthOutcome::Forbidden) => json_response(
            StatusCode::FORBIDDEN,
            &ErrorBody {
                ok: false,
                error: "forbidden".into(),
                reason: "unauthorized".into(),
            },
        ),
        Ok(AuthOutcome::UnknownUser) => json_response(
            StatusCode::NOT_FOUND,
            &ErrorBody {
                ok: false,
                error: "not_found".into(),
                reason: "no such user".into(),
            },
        ),
        Err(e) => error_response(&e),
    }
}

async fn handle_logout(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let credentials = request_credentials(&req);
    if !credentials.is_authenticated() {
        return json_response(StatusCode::OK, &serde_json::json!({ "ok": false }));
    }

    let url = pool::resolve_url(&state.args.db_url_template, &credentials);
    state.pool.expire(&url).await;
    json_response(StatusCode::OK, &serde_json::json!({ "ok": true }))
}

async fn handle_list_users(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let credentials = request_credentials(&req);
    let only = req
        .uri()
        .query()
        .and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("user=").map(str::to_string))
        });

    let users = match state.gateway_for(&credentials).await {
        Ok((gateway, _)) => state.user_service(gateway),
        Err(e) => return error_response(&e),
    };

    match users.list_users(only.as_deref()).await {
        Ok(listed) => json_response(StatusCode::OK, &listed),
        Err(e) => error_response(&e),
    }
}

async fn handle_create_user(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let credentials = request_credentials(&req);
    let body: CreateUserRequest = match parse_json_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    let users = match state.gateway_for(&credentials).await {
        Ok((gateway, _)) => state.user_service(gateway),
        Err(e) => return error_response(&e),
    };

    let mut custom = bson::Document::new();
    if let Some(first_name) = body.first_name {
        custom.insert("first_name", first_name);
    }
    if let Some(last_name) = body.last_name {
        custom.insert("last_name", last_name);
    }

    match users
        .create_user(&body.user, &body.password, &body.roles, custom)
        .await
    {
        Ok(CreateOutcome::Created { id }) => json_response(
            StatusCode::CREATED,
            &serde_json::json!({ "ok": true, "user": id }),
        ),
        Ok(CreateOutcome::DuplicateId { error, reason }) => json_response(
            StatusCode::BAD_REQUEST,
            &ErrorBody {
                ok: false,
                error,
                reason,
            },
        ),
        Err(e) => error_response(&e),
    }
}

async fn handle_update_password(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let credentials = request_credentials(&req);
    let body: UpdatePasswordRequest = match parse_json_body(req).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    let users = match state.gateway_for(&credentials).await {
        Ok((gateway, _)) => state.user_service(gateway),
        Err(e) => return error_response(&e),
    };

    match users.update_password(&body.user, &body.password).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "ok": true })),
        Err(e) => error_response(&e),
    }
}

async fn handle_drop_user(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    username: &str,
) -> Response<BoxBody> {
    let credentials = request_credentials(&req);

    let users = match state.gateway_for(&credentials).await {
        Ok((gateway, _)) => state.user_service(gateway),
        Err(e) => return error_response(&e),
    };

    match users.drop_user(username).await {
        Ok(deleted) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "ok": true, "deleted": deleted }),
        ),
        Err(e) => error_response(&e),
    }
}
