//! Phone + OTP bootstrap, the session cookie, and PIN management.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use wager_core::Error as CoreError;

use crate::auth::action_token;
use crate::context::AppState;
use crate::error::AppError;
use crate::http::{session_cookie_header, AuthedPlayer};

#[derive(Deserialize)]
pub struct RequestOtpBody {
    pub phone: String,
    pub action: Option<String>,
}

#[derive(Serialize)]
pub struct RequestOtpResponse {
    pub sent: bool,
}

pub async fn request_otp(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RequestOtpBody>,
) -> Result<Json<RequestOtpResponse>, AppError> {
    state.auth.request_otp(&body.phone, body.action.as_deref()).await?;
    Ok(Json(RequestOtpResponse { sent: true }))
}

#[derive(Deserialize)]
pub struct VerifyOtpActionBody {
    pub phone: String,
    pub code: String,
    pub action: String,
}

#[derive(Serialize)]
pub struct VerifyOtpActionResponse {
    pub action_token: Option<String>,
    pub session_token: Option<String>,
    pub is_new_player: Option<bool>,
}

/// Either logs the player in (action `"login"`, sets the session cookie) or
/// exchanges the OTP for a single-use action token scoped to anything else
/// (e.g. `"reset_pin"`, `"confirm_withdraw"`).
pub async fn verify_otp_action(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyOtpActionBody>,
) -> Result<axum::response::Response, AppError> {
    if body.action == "login" {
        let outcome = state.auth.verify_otp_and_login(&body.phone, &body.code).await?;
        let cookie = session_cookie_header(&outcome.session_token, state.static_config.session_cookie_ttl_seconds);
        let body = Json(VerifyOtpActionResponse {
            action_token: None,
            session_token: Some(outcome.session_token),
            is_new_player: Some(outcome.is_new_player),
        });
        Ok(([cookie], body).into_response())
    } else {
        let token = state
            .auth
            .issue_action_token_after_otp(&body.phone, &body.code, &body.action)
            .await?;
        let body = Json(VerifyOtpActionResponse {
            action_token: Some(token),
            session_token: None,
            is_new_player: None,
        });
        Ok(body.into_response())
    }
}

#[derive(Deserialize)]
pub struct CheckPlayerQuery {
    pub phone: String,
}

#[derive(Serialize)]
pub struct CheckPlayerResponse {
    pub exists: bool,
}

pub async fn check_player(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CheckPlayerQuery>,
) -> Result<Json<CheckPlayerResponse>, AppError> {
    let phone = wager_core::phone::normalize_e164(&q.phone, "254")?;
    let exists = state.store.get_player_by_phone(&phone).await?.is_some();
    Ok(Json(CheckPlayerResponse { exists }))
}

#[derive(Deserialize)]
pub struct SetPinBody {
    pub pin: String,
}

pub async fn set_pin(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
    Json(body): Json<SetPinBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.auth.set_pin(player, &body.pin).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct VerifyPinBody {
    pub pin: String,
}

pub async fn verify_pin(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
    Json(body): Json<VerifyPinBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.auth.verify_pin(player, &body.pin).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct ResetPinBody {
    pub action_token: String,
    pub new_pin: String,
}

/// Redeems a `"reset_pin"` action token (issued after a fresh OTP check) and
/// overwrites the PIN without requiring the old one.
pub async fn reset_pin(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResetPinBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let phone = action_token::redeem(&state.ephemeral, &body.action_token, "reset_pin").await?;
    let player = state
        .store
        .get_player_by_phone(&phone)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("player".into())))?;
    state.auth.set_pin(player, &body.new_pin).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}
