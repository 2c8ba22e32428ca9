//! Process-start configuration: a TOML file overridable by `WAGERD_*`
//! environment variables. Unlike [`wager_core::model::RuntimeConfigValues`]
//! (hot-reloadable game economics, stored in the `runtime_config` table),
//! everything here is fixed for the life of the process. Missing required
//! fields are a fatal error — we never silently default a secret.

use std::path::Path;

use serde::Deserialize;
use tokio::fs;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Raw, partially-optional shape as read off disk. [`StaticConfig::load`]
/// fills in env overrides and fails fast on anything still missing.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    bind_addr: Option<String>,
    database_url: Option<String>,
    ephemeral_url: Option<String>,
    provider_base_url: Option<String>,
    provider_api_key: Option<String>,
    provider_webhook_secret: Option<String>,
    otp_cooldown_seconds: Option<u64>,
    otp_ttl_seconds: Option<u64>,
    otp_max_attempts: Option<i64>,
    action_token_ttl_seconds: Option<u64>,
    session_cookie_ttl_seconds: Option<u64>,
    pin_max_failures: Option<i32>,
    pin_lockout_minutes: Option<i64>,
    matchmaker_period_ms: Option<u64>,
    idle_watch_period_ms: Option<u64>,
    payment_poll_period_ms: Option<u64>,
    payment_poll_grace_seconds: Option<i64>,
    payment_poll_max_age_seconds: Option<i64>,
    shutdown_drain_seconds: Option<u64>,
    log_format: Option<String>,
    game_type: Option<String>,
    join_base_url: Option<String>,
}

/// Process-start configuration, loaded once at boot and handed to every
/// component as an `Arc` (it never changes, unlike `RuntimeConfigValues`).
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub ephemeral_url: String,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub provider_webhook_secret: String,
    pub otp_cooldown_seconds: u64,
    pub otp_ttl_seconds: u64,
    pub otp_max_attempts: i64,
    pub action_token_ttl_seconds: u64,
    pub session_cookie_ttl_seconds: u64,
    pub pin_max_failures: i32,
    pub pin_lockout_minutes: i64,
    pub matchmaker_period_ms: u64,
    pub idle_watch_period_ms: u64,
    pub payment_poll_period_ms: u64,
    pub payment_poll_grace_seconds: i64,
    pub payment_poll_max_age_seconds: i64,
    pub shutdown_drain_seconds: u64,
    pub log_format: String,
    /// The single rule engine this deployment serves; the platform runs one
    /// game per process, matching the spec's "pluggable but singular" design.
    pub game_type: String,
    pub join_base_url: String,
}

macro_rules! required {
    ($raw:expr, $field:ident, $env:literal) => {
        env_override($raw.$field, $env)
            .unwrap_or_else(|| panic!(concat!("missing required config: ", $env)))
    };
}

fn env_override(value: Option<String>, key: &str) -> Option<String> {
    std::env::var(key).ok().or(value)
}

fn env_override_parsed<T: std::str::FromStr>(value: Option<T>, key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).or(value)
}

impl StaticConfig {
    pub async fn load(path: &Path) -> Self {
        let raw = if path.exists() {
            let text = fs::read_to_string(path).await.expect("failed to read config file");
            toml::from_str(&text).unwrap_or_else(|e| panic!("invalid config file: {e}"))
        } else {
            RawConfig::default()
        };
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Self {
        Self {
            bind_addr: env_override(raw.bind_addr, "WAGERD_BIND_ADDR").unwrap_or_else(default_bind_addr),
            database_url: required!(raw, database_url, "WAGERD_DATABASE_URL"),
            ephemeral_url: required!(raw, ephemeral_url, "WAGERD_EPHEMERAL_URL"),
            provider_base_url: required!(raw, provider_base_url, "WAGERD_PROVIDER_BASE_URL"),
            provider_api_key: required!(raw, provider_api_key, "WAGERD_PROVIDER_API_KEY"),
            provider_webhook_secret: required!(raw, provider_webhook_secret, "WAGERD_PROVIDER_WEBHOOK_SECRET"),
            otp_cooldown_seconds: env_override_parsed(raw.otp_cooldown_seconds, "WAGERD_OTP_COOLDOWN_SECONDS").unwrap_or(60),
            otp_ttl_seconds: env_override_parsed(raw.otp_ttl_seconds, "WAGERD_OTP_TTL_SECONDS").unwrap_or(300),
            otp_max_attempts: env_override_parsed(raw.otp_max_attempts, "WAGERD_OTP_MAX_ATTEMPTS").unwrap_or(5),
            action_token_ttl_seconds: env_override_parsed(raw.action_token_ttl_seconds, "WAGERD_ACTION_TOKEN_TTL_SECONDS")
                .unwrap_or(600),
            session_cookie_ttl_seconds: env_override_parsed(
                raw.session_cookie_ttl_seconds,
                "WAGERD_SESSION_COOKIE_TTL_SECONDS",
            )
            .unwrap_or(2_592_000),
            pin_max_failures: env_override_parsed(raw.pin_max_failures, "WAGERD_PIN_MAX_FAILURES").unwrap_or(5),
            pin_lockout_minutes: env_override_parsed(raw.pin_lockout_minutes, "WAGERD_PIN_LOCKOUT_MINUTES").unwrap_or(15),
            matchmaker_period_ms: env_override_parsed(raw.matchmaker_period_ms, "WAGERD_MATCHMAKER_PERIOD_MS").unwrap_or(1000),
            idle_watch_period_ms: env_override_parsed(raw.idle_watch_period_ms, "WAGERD_IDLE_WATCH_PERIOD_MS").unwrap_or(1000),
            payment_poll_period_ms: env_override_parsed(raw.payment_poll_period_ms, "WAGERD_PAYMENT_POLL_PERIOD_MS")
                .unwrap_or(15_000),
            payment_poll_grace_seconds: env_override_parsed(
                raw.payment_poll_grace_seconds,
                "WAGERD_PAYMENT_POLL_GRACE_SECONDS",
            )
            .unwrap_or(30),
            payment_poll_max_age_seconds: env_override_parsed(
                raw.payment_poll_max_age_seconds,
                "WAGERD_PAYMENT_POLL_MAX_AGE_SECONDS",
            )
            .unwrap_or(3600),
            shutdown_drain_seconds: env_override_parsed(raw.shutdown_drain_seconds, "WAGERD_SHUTDOWN_DRAIN_SECONDS")
                .unwrap_or(30),
            log_format: env_override(raw.log_format, "WAGERD_LOG_FORMAT").unwrap_or_else(default_log_format),
            game_type: env_override(raw.game_type, "WAGERD_GAME_TYPE").unwrap_or_else(|| "card_duel".into()),
            join_base_url: env_override(raw.join_base_url, "WAGERD_JOIN_BASE_URL")
                .unwrap_or_else(|| "https://play.example.invalid".into()),
        }
    }
}

/// Shared, hot-reloadable economics knobs — mutated by the admin config
/// surface, read by every component that needs a fresh value per operation.
pub type SharedConfig = std::sync::Arc<tokio::sync::RwLock<wager_core::model::RuntimeConfigValues>>;
