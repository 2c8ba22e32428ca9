//! `wagerd`: boots the configured stores, wires every component via
//! [`context::AppState::bootstrap`], and serves the `/api/v1` surface until
//! a shutdown signal drains in-flight connections.

mod auth;
mod component;
mod config;
mod context;
mod engine;
mod error;
mod frame;
mod http;
mod hub;
mod idle_watcher;
mod ledger;
mod matchmaker;
mod payment;
mod payout;
mod session_manager;
mod sms;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{arg, Command};
use redis::aio::ConnectionManager;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use config::StaticConfig;
use context::AppState;
use engine::{EngineError, Outcome, RuleEngine};
use payment::SandboxProvider;
use sms::SandboxSmsSender;
use store::{DurableStore, EphemeralStore};

fn cli() -> Command {
    Command::new("wagerd")
        .about("Two-player real-money wagering platform server")
        .arg(arg!([config] "Path to the TOML config file").default_value("config.toml"))
}

/// A minimal placeholder ruleset so the server has something to run behind
/// the trait boundary: first mover wins outright, on their very first move.
/// A real game swaps this out for its own `RuleEngine` at wiring time.
struct PlaceholderEngine;

impl RuleEngine for PlaceholderEngine {
    fn init_state(&self, player1_id: i64, player2_id: i64) -> Value {
        json!({"player1_id": player1_id, "player2_id": player2_id, "moved": false})
    }

    fn apply_move(&self, state: &Value, player_id: i64, move_type: &str, data: Value) -> Result<Value, EngineError> {
        if move_type != "move" {
            return Err(EngineError(format!("unsupported move type {move_type}")));
        }
        let mut next = state.clone();
        next["moved"] = json!(true);
        next["winner_id"] = json!(player_id);
        next["last_move"] = data;
        Ok(next)
    }

    fn is_terminal(&self, state: &Value) -> Outcome {
        if state.get("moved").and_then(Value::as_bool).unwrap_or(false) {
            state
                .get("winner_id")
                .and_then(Value::as_i64)
                .map(Outcome::Winner)
                .unwrap_or(Outcome::InProgress)
        } else {
            Outcome::InProgress
        }
    }
}

fn init_tracing(static_config: &StaticConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if static_config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let config_path: PathBuf = matches.get_one::<String>("config").unwrap().into();

    let static_config = StaticConfig::load(&config_path).await;
    init_tracing(&static_config);

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&static_config.database_url)
        .await
        .expect("failed to connect to database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("failed to run migrations");
    let store = DurableStore::postgres(pool);

    let redis_client = redis::Client::open(static_config.ephemeral_url.clone()).expect("invalid ephemeral store url");
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .expect("failed to connect to ephemeral store");
    let ephemeral = EphemeralStore::redis(redis_conn);

    let provider = Arc::new(SandboxProvider::new(static_config.provider_webhook_secret.clone()));
    let sms = Arc::new(SandboxSmsSender);
    let engine = Arc::new(PlaceholderEngine);

    let bind_addr = static_config.bind_addr.clone();
    let drain_secs = static_config.shutdown_drain_seconds;

    let state = AppState::bootstrap(static_config, store, ephemeral, provider, sms, engine)
        .await
        .expect("failed to bootstrap application state");

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.expect("failed to bind");
    info!(%bind_addr, "wagerd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_secs))
        .await
        .expect("server error");
}

async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install terminate signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(drain_secs, "shutdown signal received, draining in-flight connections");
    tokio::time::sleep(std::time::Duration::from_secs(drain_secs)).await;
}
