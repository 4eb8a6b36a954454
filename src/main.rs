//! Gatehouse - connection-pooled document-store gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse::auth::Credentials;
use gatehouse::config::Args;
use gatehouse::db::pool;
use gatehouse::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gatehouse={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Gatehouse - document-store gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Database: {}", args.db_name);
    info!(
        "Prefix: {}",
        args.collection_prefix.as_deref().unwrap_or("(none)")
    );
    info!("Pool TTL: {} ms", args.pool_ttl_ms);
    info!("Queue limit: {}", args.effective_queue_limit());
    info!("Insert window: {}", args.insert_window);
    info!("Copy window: {}", args.copy_window);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("======================================");

    let state = Arc::new(AppState::new(args.clone()));

    // Probe the default connection so a bad template fails at startup
    let default_credentials = Credentials::new(
        args.default_username.clone(),
        args.default_password.clone(),
    );
    let url = pool::resolve_url(&args.db_url_template, &default_credentials);
    match state.pool.acquire(&url).await {
        Ok(_) => {
            info!("Database reachable");

            // Apply users indexes up front so auth lookups stay fast
            match state.gateway_for(&default_credentials).await {
                Ok((gateway, _)) => {
                    if let Err(e) = state.user_service(gateway).ensure_indexes().await {
                        warn!("Failed to apply users indexes: {}", e);
                    }
                }
                Err(e) => warn!("Failed to bind gateway for index setup: {}", e),
            }
        }
        Err(e) => {
            if args.dev_mode {
                warn!("Database unreachable (dev mode, continuing): {}", e);
            } else {
                error!("Database unreachable: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
