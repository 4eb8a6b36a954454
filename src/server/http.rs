//! HTTP server implementation
//!
//! hyper http1 with TokioIo for async handling. Requests resolve their own
//! credentials into a pooled gateway, so the server itself holds no
//! database handle beyond the shared pool.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{Credentials, UserService};
use crate::config::Args;
use crate::db::gateway::Gateway;
use crate::db::pool::{self, ConnectionPool};
use crate::db::queue::{QueueConfig, WriteQueue};
use crate::db::MongoBackend;
use crate::routes::{self, BoxBody};
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// The process-wide connection pool, keyed by resolved URL
    pub pool: Arc<ConnectionPool>,
    /// Write queues keyed by resolved URL and collection
    queues: dashmap::DashMap<String, WriteQueue>,
    started_at: Instant,
}

impl AppState {
    pub fn new(args: Args) -> Self {
        let pool = Arc::new(ConnectionPool::new(args.pool_ttl()));
        Self {
            args,
            pool,
            queues: dashmap::DashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Resolve credentials into a gateway bound to the pooled connection
    /// for those credentials. Returns the resolved URL alongside so callers
    /// can address per-connection state (queues, logout).
    pub async fn gateway_for(&self, credentials: &Credentials) -> Result<(Gateway, String)> {
        let effective = if credentials.is_authenticated() {
            credentials.clone()
        } else {
            Credentials::new(
                self.args.default_username.clone(),
                self.args.default_password.clone(),
            )
        };

        let url = pool::resolve_url(&self.args.db_url_template, &effective);
        let client = self.pool.acquire(&url).await?;
        let backend = Arc::new(MongoBackend::new(client, self.args.db_name.clone()));

        let gateway = Gateway::new(backend, self.args.collection_prefix.clone())
            .with_insert_window(self.args.insert_window);
        Ok((gateway, url))
    }

    /// User service over a gateway's users collection
    pub fn user_service(&self, gateway: Gateway) -> UserService {
        UserService::new(gateway, self.args.db_name.clone())
    }

    /// The shared write queue for one connection/collection pair
    pub fn queue_for(&self, url: &str, gateway: Gateway, collection: &str) -> WriteQueue {
        let key = format!("{url}::{collection}");
        if let Some(existing) = self.queues.get(&key) {
            return existing.clone();
        }

        let queue = WriteQueue::new(
            gateway,
            collection,
            QueueConfig {
                limit: self.args.queue_limit,
                update: false,
            },
        );
        self.queues.insert(key, queue.clone());
        queue
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Gatehouse listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!(%method, %path, "request");

    if method == Method::OPTIONS {
        return Ok(routes::cors_preflight());
    }

    if path == "/health" || path == "/healthz" {
        return Ok(routes::health_check(&state));
    }

    if path.starts_with("/auth") || path.starts_with("/users") {
        return Ok(routes::handle_auth_request(req, state).await);
    }

    if path.starts_with("/data/") {
        return Ok(routes::handle_data_request(req, state).await);
    }

    Ok(routes::not_found(&path))
}
