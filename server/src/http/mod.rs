//! The crate's own `/api/v1` surface: everything a client or an admin
//! console speaks to this process over. Every handler returns
//! `Result<_, AppError>` so [`crate::error::AppError`]'s `IntoResponse` impl
//! is the single place a `wager_core::Error` becomes a status code.

pub mod admin;
pub mod auth;
pub mod config;
pub mod game;
pub mod player;
pub mod webhooks;

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wager_core::model::Player;
use wager_core::Error as CoreError;

use crate::auth::session::SESSION_COOKIE_NAME;
use crate::context::AppState;
use crate::error::AppError;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/auth/request-otp", post(auth::request_otp))
        .route("/auth/verify-otp-action", post(auth::verify_otp_action))
        .route("/auth/set-pin", post(auth::set_pin))
        .route("/auth/verify-pin", post(auth::verify_pin))
        .route("/auth/reset-pin", post(auth::reset_pin))
        .route("/player/check", get(auth::check_player))
        .route("/player/:phone/requeue", post(game::requeue))
        .route("/game/stake", post(game::stake))
        .route("/game/queue/status", get(game::queue_status))
        .route("/game/:token/ws", get(game::ws_upgrade))
        .route("/queue/:id/cancel", post(game::cancel_queue))
        .route("/match/decline", post(game::decline_match))
        .route("/match/:match_code", get(game::get_match))
        .route("/me", get(player::me))
        .route("/me/withdraws", get(player::my_withdraws))
        .route("/me/withdraw", post(player::request_withdraw))
        .route("/config", get(config::get_config))
        .route("/webhooks/:provider", post(webhooks::handle_webhook))
        .route("/admin/withdraws", get(admin::list_withdraws))
        .route("/admin/withdraws/:id/approve", post(admin::approve_withdraw))
        .route("/admin/withdraws/:id/reject", post(admin::reject_withdraw))
        .route("/admin/revenue", get(admin::revenue))
        .route("/admin/players/:id/block", post(admin::block_player))
        .route("/admin/players/:id/unblock", post(admin::unblock_player))
        .route("/admin/sessions/:id", get(admin::get_session));

    Router::new().nest("/api/v1", api).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_methods(Any)
                    .allow_origin(Any)
                    .allow_headers(Any),
            ),
    ).with_state(state)
}

/// A logged-in player, resolved from the `wagerd_session` cookie. Every
/// handler behind a player-facing endpoint other than the OTP bootstrap ones
/// takes this instead of a bare phone number from the request body.
pub struct AuthedPlayer(pub Player);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthedPlayer
where
    Arc<AppState>: axum::extract::FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);
        let token =
            cookie_value(&parts.headers, SESSION_COOKIE_NAME).ok_or(AppError::Core(CoreError::AuthRequired))?;
        let player = state
            .auth
            .current_player(&token)
            .await?
            .ok_or(AppError::Core(CoreError::AuthRequired))?;
        Ok(AuthedPlayer(player))
    }
}

/// An admin-role-bearing player. Individual handlers still check the
/// specific roles their endpoint allows via [`require_role`].
pub struct AdminPlayer(pub Player);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AdminPlayer
where
    Arc<AppState>: axum::extract::FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthedPlayer(player) = AuthedPlayer::from_request_parts(parts, state).await?;
        if player.admin_role.is_none() {
            return Err(AppError::Core(CoreError::Forbidden("admin role required".into())));
        }
        Ok(AdminPlayer(player))
    }
}

pub fn require_role(player: &Player, allowed: &[wager_core::model::AdminRole]) -> Result<(), AppError> {
    match player.admin_role {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => Err(AppError::Core(CoreError::Forbidden("insufficient admin role".into()))),
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|kv| {
        let (k, v) = kv.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// Builds the `Set-Cookie` header for a freshly issued session token.
pub fn session_cookie_header(token: &str, ttl_secs: u64) -> (HeaderName, HeaderValue) {
    let value = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={ttl_secs}");
    (header::SET_COOKIE, HeaderValue::from_str(&value).expect("cookie value is valid ASCII"))
}
