//! Admin console surface. Role gating is per-endpoint, matching the
//! distinction between who can move money (finance/superadmin) and who can
//! moderate players (support/superadmin). No IP allow-list is enforced
//! here — that's a deployment-level concern (reverse proxy / VPN), not
//! something this crate bakes into its routing.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wager_core::model::{AdminRole, AuditEntry, ReferenceType, WithdrawRequest, WithdrawStatus};
use wager_core::Error as CoreError;

use crate::context::AppState;
use crate::error::AppError;
use crate::http::{require_role, AdminPlayer};

fn audit_actor_ip(headers: &HeaderMap) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

async fn record_audit(
    state: &AppState,
    actor: &str,
    ip: String,
    route: &str,
    action: &str,
    details: serde_json::Value,
    success: bool,
) -> Result<(), AppError> {
    state
        .store
        .insert_audit_entry(AuditEntry {
            id: 0,
            actor: actor.to_string(),
            ip,
            route: route.to_string(),
            action: action.to_string(),
            details,
            success,
            created_at: Utc::now(),
        })
        .await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct ListWithdrawsQuery {
    pub status: Option<WithdrawStatus>,
}

pub async fn list_withdraws(
    State(state): State<Arc<AppState>>,
    AdminPlayer(admin): AdminPlayer,
    Query(q): Query<ListWithdrawsQuery>,
) -> Result<Json<Vec<WithdrawRequest>>, AppError> {
    require_role(&admin, &[AdminRole::Finance, AdminRole::Superadmin])?;
    let status = q.status.unwrap_or(WithdrawStatus::Pending);
    Ok(Json(state.store.list_withdraws_by_status(status).await?))
}

/// Moves the fee portion to platform revenue and sends the net amount to
/// the provider. Doesn't go through the payment orchestrator's stake/payin
/// machinery since a `WithdrawRequest` carries no linked transaction id;
/// the provider result here is applied inline rather than polled.
pub async fn approve_withdraw(
    State(state): State<Arc<AppState>>,
    AdminPlayer(admin): AdminPlayer,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_role(&admin, &[AdminRole::Finance, AdminRole::Superadmin])?;

    let withdraw = state
        .store
        .get_withdraw(id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("withdraw request".into())))?;
    if withdraw.status != WithdrawStatus::Pending {
        return Err(AppError::Core(CoreError::conflict("withdraw is no longer pending")));
    }

    let player = state
        .store
        .get_player(withdraw.player_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::UnknownAccount(withdraw.player_id)))?;

    let settlement = state.ledger.settlement_account().await?;
    let platform = state.ledger.platform_account().await?;
    if withdraw.fee > 0 {
        state
            .ledger
            .transfer(
                settlement.id,
                platform.id,
                withdraw.fee,
                ReferenceType::WithdrawFee,
                withdraw.id,
                "withdraw provider fee",
            )
            .await?;
    }

    state.store.update_withdraw_status(id, WithdrawStatus::Approved).await?;
    let result = state
        .orchestrator
        .initiate_withdraw_payout(withdraw.player_id, withdraw.net_amount, &player.phone)
        .await?;
    state
        .store
        .update_withdraw_status(
            id,
            if result.status == wager_core::model::TransactionStatus::Completed {
                WithdrawStatus::Completed
            } else {
                WithdrawStatus::Approved
            },
        )
        .await?;

    record_audit(
        &state,
        &admin.phone,
        audit_actor_ip(&headers),
        "/admin/withdraws/:id/approve",
        "approve_withdraw",
        serde_json::json!({"withdraw_id": id}),
        true,
    )
    .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn reject_withdraw(
    State(state): State<Arc<AppState>>,
    AdminPlayer(admin): AdminPlayer,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_role(&admin, &[AdminRole::Finance, AdminRole::Superadmin])?;

    let withdraw = state
        .store
        .get_withdraw(id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("withdraw request".into())))?;
    if withdraw.status != WithdrawStatus::Pending {
        return Err(AppError::Core(CoreError::conflict("withdraw is no longer pending")));
    }

    let settlement = state.ledger.settlement_account().await?;
    let winnings = state.ledger.player_winnings_account(withdraw.player_id).await?;
    state
        .ledger
        .transfer(
            settlement.id,
            winnings.id,
            withdraw.amount,
            ReferenceType::Refund,
            withdraw.id,
            "withdraw rejected by admin, refunding player",
        )
        .await?;
    state.store.update_withdraw_status(id, WithdrawStatus::Rejected).await?;

    record_audit(
        &state,
        &admin.phone,
        audit_actor_ip(&headers),
        "/admin/withdraws/:id/reject",
        "reject_withdraw",
        serde_json::json!({"withdraw_id": id}),
        true,
    )
    .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct RevenueQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct RevenueResponse {
    pub commission_cents: i64,
    pub tax_cents: i64,
}

pub async fn revenue(
    State(state): State<Arc<AppState>>,
    AdminPlayer(admin): AdminPlayer,
    Query(q): Query<RevenueQuery>,
) -> Result<Json<RevenueResponse>, AppError> {
    require_role(
        &admin,
        &[AdminRole::Support, AdminRole::Finance, AdminRole::Superadmin],
    )?;
    let (commission_cents, tax_cents) = state.store.sum_revenue_between(q.from, q.to).await?;
    Ok(Json(RevenueResponse { commission_cents, tax_cents }))
}

#[derive(Deserialize)]
pub struct BlockPlayerBody {
    pub reason: String,
    pub until: Option<DateTime<Utc>>,
}

pub async fn block_player(
    State(state): State<Arc<AppState>>,
    AdminPlayer(admin): AdminPlayer,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<BlockPlayerBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_role(&admin, &[AdminRole::Support, AdminRole::Superadmin])?;
    let mut player = state
        .store
        .get_player(id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::UnknownAccount(id)))?;
    player.blocked = true;
    player.block_reason = Some(body.reason.clone());
    player.block_until = body.until;
    state.store.update_player(player).await?;

    record_audit(
        &state,
        &admin.phone,
        audit_actor_ip(&headers),
        "/admin/players/:id/block",
        "block_player",
        serde_json::json!({"player_id": id, "reason": body.reason}),
        true,
    )
    .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn unblock_player(
    State(state): State<Arc<AppState>>,
    AdminPlayer(admin): AdminPlayer,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_role(&admin, &[AdminRole::Support, AdminRole::Superadmin])?;
    let mut player = state
        .store
        .get_player(id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::UnknownAccount(id)))?;
    player.blocked = false;
    player.block_reason = None;
    player.block_until = None;
    state.store.update_player(player).await?;

    record_audit(
        &state,
        &admin.phone,
        audit_actor_ip(&headers),
        "/admin/players/:id/unblock",
        "unblock_player",
        serde_json::json!({"player_id": id}),
        true,
    )
    .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Serialize)]
pub struct SessionDetailResponse {
    pub session: wager_core::model::Session,
    pub moves: Vec<wager_core::model::Move>,
    pub transactions: Vec<wager_core::model::AccountTransaction>,
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    AdminPlayer(admin): AdminPlayer,
    Path(id): Path<i64>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    require_role(
        &admin,
        &[AdminRole::Support, AdminRole::Finance, AdminRole::Superadmin],
    )?;
    let session = state
        .store
        .get_session(id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::NotFound("session".into())))?;
    let moves = state.store.list_moves(id).await?;
    let transactions = state.store.list_account_transactions_for_reference(id).await?;
    Ok(Json(SessionDetailResponse { session, moves, transactions }))
}
