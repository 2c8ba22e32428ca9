//! The logged-in player's own profile, withdraw history, and withdraw
//! requests.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use wager_core::model::{WithdrawRequest, WithdrawStatus};
use wager_core::Error as CoreError;

use crate::context::AppState;
use crate::error::AppError;
use crate::http::AuthedPlayer;
use crate::store::durable::NewWithdraw;

#[derive(Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub phone: String,
    pub display_name: String,
    pub balance: i64,
    pub games_played: i64,
    pub games_won: i64,
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
) -> Result<Json<MeResponse>, AppError> {
    let account = state.ledger.player_winnings_account(player.id).await?;
    Ok(Json(MeResponse {
        id: player.id,
        phone: player.phone.clone(),
        display_name: player.display_name.clone(),
        balance: account.balance,
        games_played: player.stats.games_played,
        games_won: player.stats.games_won,
    }))
}

pub async fn my_withdraws(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
) -> Result<Json<Vec<WithdrawRequest>>, AppError> {
    let withdraws = state.store.list_withdraws_for_player(player.id).await?;
    Ok(Json(withdraws))
}

#[derive(Deserialize)]
pub struct RequestWithdrawBody {
    pub amount: i64,
    pub method: String,
    pub destination: String,
}

#[derive(Serialize)]
pub struct RequestWithdrawResponse {
    pub withdraw_id: i64,
    pub status: WithdrawStatus,
}

/// Moves the full amount out of the player's spendable balance into
/// settlement immediately, before any admin review, so the same cents can't
/// be withdrawn twice or spent on a new stake while the request is pending.
pub async fn request_withdraw(
    State(state): State<Arc<AppState>>,
    AuthedPlayer(player): AuthedPlayer,
    Json(body): Json<RequestWithdrawBody>,
) -> Result<Json<RequestWithdrawResponse>, AppError> {
    let cfg = state.config.read().await.clone();
    if body.amount < cfg.min_withdraw {
        return Err(AppError::Core(CoreError::validation(format!(
            "minimum withdraw is {}",
            cfg.min_withdraw
        ))));
    }

    let winnings = state.ledger.player_winnings_account(player.id).await?;
    if winnings.balance < body.amount {
        return Err(AppError::Core(CoreError::InsufficientFunds { account_id: winnings.id }));
    }

    let fee = wager_core::model::apply_tax(body.amount, cfg.withdraw_provider_fee_percent);
    let net_amount = body.amount - fee;

    let withdraw = state
        .store
        .insert_withdraw(NewWithdraw {
            player_id: player.id,
            amount: body.amount,
            fee,
            net_amount,
            method: body.method,
            destination: body.destination,
        })
        .await?;

    let settlement = state.ledger.settlement_account().await?;
    state
        .ledger
        .transfer(
            winnings.id,
            settlement.id,
            body.amount,
            wager_core::model::ReferenceType::Withdraw,
            withdraw.id,
            "withdraw requested, held pending admin review",
        )
        .await?;

    Ok(Json(RequestWithdrawResponse {
        withdraw_id: withdraw.id,
        status: withdraw.status,
    }))
}
