//! Raffle Account Server
//!
//! An HTTP service hosting the raffle account directory and friend graph
//! over one SQLite database:
//!
//! 1. **Accounts**: register, sign in and out, password reset, load, save
//!    and delete the caller's profile.
//!
//! 2. **Friends**: add links, link into another account's list, mutual
//!    links, username search and reverse-friend lists.
//!
//! 3. **Repairs**: list and finish half-completed registrations or
//!    deletions.
//!
//! Each bearer token owns its own client session; all clients share the
//! database.

mod api;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json,
};
use clap::Parser;
use raffle_core::storage::{self, DatabaseConfig};
use raffle_core::CoreConfig;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{ServerConfig, ServerState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "raffle-server", version, about = "Raffle account and friend server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RAFFLE_PORT")]
    port: u16,

    /// SQLite database file. In-memory if omitted.
    #[arg(long, env = "RAFFLE_DATABASE")]
    database: Option<String>,

    /// Idle session TTL in seconds
    #[arg(long, default_value_t = 24 * 3600, env = "SESSION_TTL_SECS")]
    session_ttl_secs: i64,

    /// Cleanup interval in seconds
    #[arg(long, default_value_t = 300, env = "CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,

    /// Attempts at writing a new account's record before giving up
    #[arg(long, default_value_t = 3, env = "PERSIST_ATTEMPTS")]
    persist_attempts: u32,

    /// Collection holding account records
    #[arg(long, default_value = "users", env = "USERS_COLLECTION")]
    users_collection: String,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "raffle_server=info,raffle_core=info,tower_http=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig {
        port: args.port,
        database_path: args.database,
        session_ttl_secs: args.session_ttl_secs,
        core: CoreConfig {
            users_collection: args.users_collection,
            persist_attempts: args.persist_attempts,
            ..CoreConfig::default()
        },
    };

    match config.database_path.as_deref() {
        Some(path) => tracing::info!(path, "Opening database"),
        None => tracing::warn!("No database path configured, accounts are kept in memory"),
    }

    let db = storage::init(DatabaseConfig {
        path: config.database_path.clone(),
    })
    .await
    .expect("Failed to open database");

    let addr = format!("0.0.0.0:{}", config.port);
    let state = ServerState::new(config, Arc::new(db));

    // Spawn periodic cleanup task
    let cleanup_state = state.clone();
    let cleanup_interval = args.cleanup_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval));
        loop {
            interval.tick().await;
            cleanup_state.cleanup_expired();
        }
    });

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let app = api::router(state.clone())
        .merge(
            axum::Router::new()
                .route("/health", get(health_handler))
                .route("/stats", get(stats_handler))
                .with_state(state),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Raffle server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server error");
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "raffle-server",
        "version": env!("CARGO_PKG_VERSION"),
        "core_version": raffle_core::version(),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(json!({
        "active_sessions": state.session_count(),
        "persist_attempts": state.config.core.persist_attempts,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
