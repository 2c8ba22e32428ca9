//! C7: the matchmaker. Pairs waiting public stakers by stake amount, pairs
//! private rows by match code, and expires rows nobody ever joined. Runs on
//! a timer plus an event-driven wakeup so a fresh queue insert doesn't have
//! to wait out a full period before it is considered.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tracing::{info, warn};
use wager_core::model::QueueEntry;
use wager_core::Result;

use crate::component::{CloseReason, Component, ConsumerPorts, ProducerPorts};
use crate::config::SharedConfig;
use crate::frame::EventFrame;
use crate::ledger::Ledger;
use crate::sms::SmsSender;
use crate::store::durable::{DurableStore, NewSession};

#[derive(Clone)]
pub struct MatchmakerContext {
    pub store: DurableStore,
    pub ledger: Ledger,
    pub sms: Arc<dyn SmsSender>,
    pub notify: Arc<Notify>,
    pub period_ms: u64,
    pub game_type: String,
    pub join_base_url: String,
    pub config: SharedConfig,
}

pub struct Matchmaker;

#[async_trait]
impl Component<ProducerPorts, MatchmakerContext> for Matchmaker {
    fn name(&self) -> &str {
        "matchmaker"
    }

    async fn run(ports: ProducerPorts, ctx: MatchmakerContext) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(ctx.period_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = ctx.notify.notified() => {}
            }
            if let Err(e) = sweep_once(&ctx, &ports).await {
                warn!("matchmaker sweep failed: {}", e);
            }
        }
    }
}

async fn sweep_once(ctx: &MatchmakerContext, ports: &ProducerPorts) -> Result<()> {
    pair_public(ctx, ports).await?;
    pair_private(ctx, ports).await?;
    expire_stale(ctx, ports).await?;
    Ok(())
}

/// Groups waiting public rows by stake amount and pairs adjacent entries
/// (sorted by id, which mirrors creation order) within each group.
async fn pair_public(ctx: &MatchmakerContext, ports: &ProducerPorts) -> Result<()> {
    let candidates = ctx.store.list_all_waiting_public_queue().await?;
    let mut by_stake: std::collections::BTreeMap<i64, Vec<QueueEntry>> = std::collections::BTreeMap::new();
    for entry in candidates {
        by_stake.entry(entry.stake_amount).or_default().push(entry);
    }
    for mut waiting in by_stake.into_values() {
        waiting.sort_by_key(|e| e.id);
        let mut iter = waiting.into_iter();
        while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
            try_pair(ctx, ports, a, b).await?;
        }
    }
    Ok(())
}

/// Groups waiting private rows by match code; a code is only pairable once
/// both the inviter's and the invitee's rows exist for it, so groups of any
/// other size are left waiting for their counterpart or for expiry.
async fn pair_private(ctx: &MatchmakerContext, ports: &ProducerPorts) -> Result<()> {
    let candidates = ctx.store.list_all_waiting_private_queue().await?;
    let mut by_code: std::collections::BTreeMap<String, Vec<QueueEntry>> = std::collections::BTreeMap::new();
    for entry in candidates {
        if let Some(code) = entry.match_code.clone() {
            by_code.entry(code).or_default().push(entry);
        }
    }
    for mut waiting in by_code.into_values() {
        if waiting.len() != 2 {
            continue;
        }
        waiting.sort_by_key(|e| e.id);
        let mut iter = waiting.into_iter();
        let (a, b) = (iter.next().unwrap(), iter.next().unwrap());
        try_pair(ctx, ports, a, b).await?;
    }
    Ok(())
}

async fn try_pair(ctx: &MatchmakerContext, ports: &ProducerPorts, a: QueueEntry, b: QueueEntry) -> Result<()> {
    let escrow = ctx.ledger.escrow_account().await?;
    let platform = ctx.ledger.platform_account().await?;
    let game_expiry_minutes = ctx.config.read().await.game_expiry_minutes;

    let new_session = NewSession {
        game_token: wager_core::token::opaque_token(),
        game_type: ctx.game_type.clone(),
        player1_id: a.player_id,
        player2_id: Some(b.player_id),
        stake_amount: a.stake_amount,
        expiry_time: Utc::now() + chrono::Duration::minutes(game_expiry_minutes),
    };

    let Some(session) = ctx
        .store
        .pair_queue_entries(a.id, b.id, new_session, escrow.id, platform.id)
        .await?
    else {
        return Ok(());
    };

    info!(session_id = session.id, player1 = a.player_id, player2 = b.player_id, "session paired");
    let join_url = format!("{}/g/{}", ctx.join_base_url, session.game_token);
    let _ = ctx.sms.send(&a.phone, &format!("Your opponent is ready! Join here: {join_url}")).await;
    let _ = ctx.sms.send(&b.phone, &format!("Your opponent is ready! Join here: {join_url}")).await;

    ports
        .try_send(EventFrame::SessionStarted {
            game_id: session.id,
            player1_state: serde_json::json!({"player_id": a.player_id}),
            player2_state: serde_json::json!({"player_id": b.player_id}),
        })
        .await
        .ok();
    Ok(())
}

/// Expires WAITING rows past `expires_at`. Whether the stake is refunded via
/// the provider or converted straight to `player_winnings` credit is driven
/// by `expired_stake_becomes_credit` (see `RuntimeConfigValues`).
async fn expire_stale(ctx: &MatchmakerContext, ports: &ProducerPorts) -> Result<()> {
    let expired = ctx.store.list_expired_waiting_queue(Utc::now()).await?;
    let expired_stake_becomes_credit = ctx.config.read().await.expired_stake_becomes_credit;
    for entry in expired {
        if !expired_stake_becomes_credit {
            ctx.store.mark_queue_expired(entry.id).await?;
            continue;
        }
        let winnings = ctx.ledger.player_winnings_account(entry.player_id).await?;
        let platform = ctx.ledger.platform_account().await?;
        if ctx
            .store
            .expire_queue_entry_as_credit(entry.id, winnings.id, platform.id)
            .await?
            .is_some()
        {
            ports
                .try_send(EventFrame::SessionCancelled {
                    game_id: entry.id,
                    message: "matchmaking timed out, stake credited to your balance".into(),
                })
                .await
                .ok();
        }
    }
    Ok(())
}
