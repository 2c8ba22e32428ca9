//! Staking, queueing, matches, and the websocket upgrade into the hub.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use wager_core::model::{LiveGameState, PlayerRuntime, QueueStatus};
use wager_core::token::{match_code, opaque_token};
use wager_core::Error as CoreError;

use crate::context::AppState;
use crate::error::AppError;
use crate::http::AuthedPlayer;
use crate::store::durable::{NewQueueEntry, NewTransaction};

#[derive(Deserialize)]
pub struct StakeBody {
    pub stake_amount: i64,
    pub display_name: Option<String>,
    pub create_private: Option<bool>,
    pub match_code: Option<String>,
}

#[derive(Serialize)]
pub struct StakeResponse {
    pub queue_token: String,
    pub match_code: Option<String>,
    pub transaction_id: i64,
}

/// Enqueues a stake: writes the queue row and its PENDING transaction
/// together, then kicks off the payin request. Pairing itself happens out
/// of band in the matchmaker sweep once the transaction completes.
pub async fn stake(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
    Json(body): Json<StakeBody>,
) -> Result<Json<StakeResponse>, AppError> {
    stake_inner(state, player, body).await
}

async fn stake_inner(state: Arc<AppState>, mut player: wager_core::model::Player, body: StakeBody) -> Result<Json<StakeResponse>, AppError> {
    if let Some(name) = body.display_name.clone().filter(|n| !n.is_empty()) {
        player.display_name = name;
        state.store.update_player(player.clone()).await?;
    }

    let min_stake = state.config.read().await.min_stake;
    if body.stake_amount < min_stake {
        return Err(AppError::Core(CoreError::validation(format!(
            "stake must be at least {min_stake}"
        ))));
    }
    if state.store.get_waiting_queue_for_player(player.id).await?.is_some() {
        return Err(AppError::Core(CoreError::conflict("already queued")));
    }

    let is_private = body.create_private.unwrap_or(false);
    let code = if is_private { Some(body.match_code.unwrap_or_else(match_code)) } else { None };
    let ttl_minutes = state.config.read().await.game_expiry_minutes;

    let (entry, txn) = state
        .store
        .create_queue_entry(NewQueueEntry {
            player_id: player.id,
            phone: player.phone.clone(),
            stake_amount: body.stake_amount,
            queue_token: opaque_token(),
            is_private,
            match_code: code.clone(),
            expires_at: chrono::Utc::now() + chrono::Duration::minutes(ttl_minutes),
            stake_transaction: NewTransaction {
                player_id: player.id,
                transaction_type: wager_core::model::TransactionType::Stake,
                amount: body.stake_amount,
            },
        })
        .await?;

    state.orchestrator.send_stake_payin_request(&txn, &player.phone).await?;
    state.matchmaker_notify.notify_waiters();

    Ok(Json(StakeResponse {
        queue_token: entry.queue_token,
        match_code: entry.match_code,
        transaction_id: txn.id,
    }))
}

#[derive(Deserialize)]
pub struct QueueStatusQuery {
    pub queue_token: String,
}

#[derive(Serialize)]
pub struct QueueStatusResponse {
    pub status: QueueStatus,
    pub session_id: Option<i64>,
}

pub async fn queue_status(
    State(state): State<Arc<AppState>>,
    Query(q): Query<QueueStatusQuery>,
) -> Result<Json<QueueStatusResponse>, AppError> {
    let entry = state
        .store
        .get_queue_by_token(&q.queue_token)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("queue entry".into())))?;
    Ok(Json(QueueStatusResponse {
        status: entry.status,
        session_id: entry.session_id,
    }))
}

#[derive(Deserialize)]
pub struct RequeueBody {
    pub stake_amount: i64,
    pub create_private: Option<bool>,
    pub match_code: Option<String>,
}

pub async fn requeue(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
    Path(_phone): Path<String>,
    Json(body): Json<RequeueBody>,
) -> Result<Json<StakeResponse>, AppError> {
    stake_inner(
        state,
        player,
        StakeBody {
            stake_amount: body.stake_amount,
            display_name: None,
            create_private: body.create_private,
            match_code: body.match_code,
        },
    )
    .await
}

pub async fn cancel_queue(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entry = state
        .store
        .get_queue_entry(id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("queue entry".into())))?;
    if entry.player_id != player.id {
        return Err(AppError::Core(CoreError::Forbidden("not your queue entry".into())));
    }
    if entry.status != QueueStatus::Waiting {
        return Err(AppError::Core(CoreError::conflict("queue entry is no longer waiting")));
    }
    state.store.mark_queue_cancelled(id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct DeclineMatchBody {
    pub match_code: String,
}

pub async fn decline_match(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
    Json(body): Json<DeclineMatchBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entry = state
        .store
        .get_queue_by_match_code(&body.match_code)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("match".into())))?;
    if entry.player_id != player.id {
        return Err(AppError::Core(CoreError::Forbidden("not your match".into())));
    }
    state.store.mark_queue_cancelled(entry.id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Serialize)]
pub struct MatchResponse {
    pub stake_amount: i64,
    pub status: QueueStatus,
}

pub async fn get_match(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<MatchResponse>, AppError> {
    let entry = state
        .store
        .get_queue_by_match_code(&code)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("match".into())))?;
    Ok(Json(MatchResponse {
        stake_amount: entry.stake_amount,
        status: entry.status,
    }))
}

#[derive(Deserialize)]
pub struct WsQuery {
    pub pt: String,
}

/// Upgrades a connection into the realtime hub. `token` is the session's
/// `game_token`; `pt` is the player's opaque `player_token`, since cookies
/// aren't sent on every websocket client and the token is the simplest
/// per-connection credential that still can't be guessed.
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(q): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .store
        .get_session_by_token(&token)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("session".into())))?;

    let player = state
        .store
        .get_player_by_token(&q.pt)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::AuthRequired))?;

    if !session.has_player(player.id) {
        return Err(AppError::Core(CoreError::Forbidden("not a participant in this session".into())));
    }

    if state.ephemeral.get_live_state(session.id).await?.is_none() {
        let engine_state = state.engine.init_state(session.player1_id, session.player2_id.unwrap_or(0));
        let live = LiveGameState {
            player1: PlayerRuntime::new(session.player1_id, opaque_token(), format!("Player {}", session.player1_id)),
            player2: PlayerRuntime::new(
                session.player2_id.unwrap_or(0),
                opaque_token(),
                format!("Player {}", session.player2_id.unwrap_or(0)),
            ),
            status: session.status,
            current_turn: Some(session.player1_id),
            stake: session.stake_amount,
            engine_state,
        };
        let value = serde_json::to_value(&live).map_err(AppError::from)?;
        state.ephemeral.put_live_state(session.id, value).await?;
    }

    let hub = state.hub.clone();
    let game_id = session.id;
    let player_id = player.id;
    Ok(ws.on_upgrade(move |socket| async move {
        crate::hub::handle_socket(socket, hub, game_id, player_id).await;
    }))
}
