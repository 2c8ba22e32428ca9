//! C9: the idle watcher. Polls the warning and forfeit deadline sets C10
//! upserts on every inbound action. A warning pop publishes a notice for
//! the hub to relay; a forfeit pop invokes C8's forfeit transition
//! directly via [`crate::session_manager::complete_win`] and publishes the
//! resulting frame itself.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;
use wager_core::model::WinType;
use wager_core::Result;

use crate::component::{Component, ProducerPorts};
use crate::frame::EventFrame;
use crate::session_manager::{self, SessionOps};
use crate::store::ephemeral::IdleSet;

pub struct IdleWatcherContext {
    pub ops: SessionOps,
    pub period_ms: u64,
}

pub struct IdleWatcher;

#[async_trait]
impl Component<ProducerPorts, IdleWatcherContext> for IdleWatcher {
    fn name(&self) -> &str {
        "idle_watcher"
    }

    async fn run(ports: ProducerPorts, ctx: IdleWatcherContext) {
        let mut interval = tokio::time::interval(Duration::from_millis(ctx.period_ms));
        loop {
            interval.tick().await;
            if let Err(e) = sweep_warnings(&ctx.ops, &ports).await {
                warn!("idle warning sweep failed: {}", e);
            }
            if let Err(e) = sweep_forfeits(&ctx.ops, &ports).await {
                warn!("idle forfeit sweep failed: {}", e);
            }
        }
    }
}

/// Forfeit deadlines are armed alongside warning deadlines off the same
/// `now`, so the gap between the two configured seconds is a faithful
/// estimate of the remaining time even though the set only stores the
/// warning entry's own deadline.
async fn sweep_warnings(ops: &SessionOps, ports: &ProducerPorts) -> Result<()> {
    let now = Utc::now();
    let due = ops.ephemeral.pop_due_idle_deadlines(IdleSet::Warning, now).await?;
    if due.is_empty() {
        return Ok(());
    }
    let cfg = *ops.config.read().await;
    let remaining = (cfg.idle_forfeit_seconds - cfg.idle_warning_seconds).max(0);
    let forfeit_at_unix_ms = (now + chrono::Duration::seconds(remaining)).timestamp_millis();
    for (game_id, player_id) in due {
        ports.try_send(EventFrame::IdleWarning { game_id, player_id, forfeit_at_unix_ms }).await.ok();
    }
    Ok(())
}

async fn sweep_forfeits(ops: &SessionOps, ports: &ProducerPorts) -> Result<()> {
    let due = ops.ephemeral.pop_due_idle_deadlines(IdleSet::Forfeit, Utc::now()).await?;
    for (game_id, idle_player_id) in due {
        let Some(winner_id) = session_manager::opponent_of(ops, game_id, idle_player_id).await else {
            continue;
        };
        if let Some(frame) = session_manager::complete_win(ops, game_id, winner_id, WinType::Idle).await? {
            ports.try_send(frame).await.ok();
        }
    }
    Ok(())
}
