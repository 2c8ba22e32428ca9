//! C8: the session manager. Drives the session status machine off the
//! hub's presence events plus its own periodic sweeps: WAITING sessions
//! that expired one-sided get cancelled, IN_PROGRESS sessions whose
//! disconnect grace elapsed get forfeited. Every terminal transition is
//! guarded by `DurableStore::transition_session`'s optimistic CAS, so a
//! racing sweep and a racing presence event can never both invoke the
//! payout resolver for the same session.
//!
//! [`SessionOps`] carries the transition logic itself (clonable, no
//! receiver) so the idle watcher (C9) can drive the same forfeit path
//! without owning a session manager.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;
use wager_core::model::{Session, SessionStatus, WinType};
use wager_core::Result;

use crate::component::{Component, ProducerPorts};
use crate::config::SharedConfig;
use crate::engine::{Outcome, RuleEngine};
use crate::frame::EventFrame;
use crate::hub::PresenceEvent;
use crate::payout::PayoutResolver;
use crate::store::ephemeral::IdleSet;
use crate::store::{DurableStore, EphemeralStore};

#[derive(Clone)]
pub struct SessionOps {
    pub store: DurableStore,
    pub ephemeral: EphemeralStore,
    pub payout: PayoutResolver,
    pub engine: Arc<dyn RuleEngine>,
    pub config: SharedConfig,
}

pub struct SessionManagerContext {
    pub ops: SessionOps,
    pub presence_rx: mpsc::Receiver<PresenceEvent>,
    pub sweep_period_ms: u64,
}

pub struct SessionManager;

#[async_trait]
impl Component<ProducerPorts, SessionManagerContext> for SessionManager {
    fn name(&self) -> &str {
        "session_manager"
    }

    async fn run(ports: ProducerPorts, mut ctx: SessionManagerContext) {
        let mut interval = tokio::time::interval(Duration::from_millis(ctx.sweep_period_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = sweep_waiting_expiry(&ctx.ops, &ports).await {
                        warn!("waiting-expiry sweep failed: {}", e);
                    }
                    if let Err(e) = sweep_disconnect_grace(&ctx.ops, &ports).await {
                        warn!("disconnect-grace sweep failed: {}", e);
                    }
                }
                event = ctx.presence_rx.recv() => {
                    match event {
                        Some(event) => handle_presence(&ctx.ops, &ports, event).await,
                        None => break,
                    }
                }
            }
        }
    }
}

async fn handle_presence(ops: &SessionOps, ports: &ProducerPorts, event: PresenceEvent) {
    let result = match event {
        PresenceEvent::Connected { game_id, player_id } => on_connected(ops, game_id, player_id).await,
        PresenceEvent::Disconnected { game_id, player_id } => on_disconnected(ops, game_id, player_id).await,
        PresenceEvent::Terminal { game_id, outcome, conceded } => on_terminal(ops, ports, game_id, outcome, conceded).await,
    };
    if let Err(e) = result {
        warn!("session manager failed to handle presence event: {}", e);
    }
}

/// WAITING --(both players connected, rule engine initialized)--> IN_PROGRESS.
/// The live state's own `both_present` is the source of truth for "both
/// connected"; the DB transition only fires once, guarded by the CAS.
async fn on_connected(ops: &SessionOps, game_id: i64, player_id: i64) -> Result<()> {
    ops.ephemeral.cancel_idle_deadline(IdleSet::DisconnectGrace, game_id, player_id).await?;

    let Some(mut state) = load_live_state(ops, game_id).await else {
        return Ok(());
    };
    if !state.both_present() {
        return Ok(());
    }

    let now = Utc::now();
    let transitioned = ops
        .store
        .transition_session(game_id, SessionStatus::Waiting, |s| {
            s.status = SessionStatus::InProgress;
            s.started_at = Some(now);
        })
        .await?;
    if transitioned.is_some() {
        state.status = SessionStatus::InProgress;
        save_live_state(ops, game_id, &state).await;
    }
    Ok(())
}

/// Schedules the disconnect-grace check; a reconnect before it fires clears
/// it again via `on_connected`'s `cancel_idle_deadline` call above.
async fn on_disconnected(ops: &SessionOps, game_id: i64, player_id: i64) -> Result<()> {
    let cfg = *ops.config.read().await;
    let deadline = Utc::now() + chrono::Duration::seconds(cfg.disconnect_grace_seconds);
    ops.ephemeral.schedule_idle_deadline(IdleSet::DisconnectGrace, game_id, player_id, deadline).await
}

/// IN_PROGRESS --(rule engine reports terminal)--> COMPLETED (clean win or
/// draw) or FORFEIT (explicit concede).
async fn on_terminal(ops: &SessionOps, ports: &ProducerPorts, game_id: i64, outcome: Outcome, conceded: bool) -> Result<()> {
    match outcome {
        Outcome::Winner(winner_id) => {
            let win_type = if conceded { WinType::Concede } else { WinType::Normal };
            if let Some(frame) = complete_win(ops, game_id, winner_id, win_type).await? {
                ports.try_send(frame).await.ok();
            }
        }
        Outcome::Draw => {
            if let Some(session) = claim_terminal(ops, game_id, SessionStatus::Completed, None, None).await? {
                ops.payout.resolve_draw(&session).await?;
                disarm_both(ops, &session).await;
                if let Some(frame) = draw_frame(ops, &session).await {
                    ports.try_send(frame).await.ok();
                }
            }
        }
        Outcome::InProgress => {}
    }
    Ok(())
}

/// Shared by the clean-win and concede paths above, and by the idle watcher
/// for an idle-timeout forfeit — same guarded transition, same payout call,
/// just a different `winner_id`/`win_type` origin.
pub async fn complete_win(ops: &SessionOps, game_id: i64, winner_id: i64, win_type: WinType) -> Result<Option<EventFrame>> {
    let final_status = if win_type == WinType::Normal { SessionStatus::Completed } else { SessionStatus::Forfeit };
    let Some(session) = claim_terminal(ops, game_id, final_status, Some(winner_id), Some(win_type)).await? else {
        return Ok(None);
    };
    ops.payout.resolve_win(&session, winner_id, win_type).await?;
    disarm_both(ops, &session).await;

    let Some(loser_id) = session.opponent_of(winner_id) else {
        return Ok(None);
    };
    let (winner_state, loser_state) = project_states(ops, game_id, winner_id, loser_id).await;
    let frame = if win_type == WinType::Normal {
        EventFrame::GameWon { game_id, winner_id, loser_id, player1_state: winner_state, player2_state: loser_state }
    } else {
        EventFrame::PlayerForfeit { game_id, winner_id, loser_id, player1_state: winner_state, player2_state: loser_state }
    };
    Ok(Some(frame))
}

async fn claim_terminal(
    ops: &SessionOps,
    game_id: i64,
    final_status: SessionStatus,
    winner_id: Option<i64>,
    win_type: Option<WinType>,
) -> Result<Option<Session>> {
    let now = Utc::now();
    ops.store
        .transition_session(game_id, SessionStatus::InProgress, |s| {
            s.status = final_status;
            s.winner_id = winner_id;
            s.win_type = win_type;
            s.completed_at = Some(now);
        })
        .await
}

async fn draw_frame(ops: &SessionOps, session: &Session) -> Option<EventFrame> {
    let player2_id = session.player2_id?;
    let (p1_state, p2_state) = project_states(ops, session.id, session.player1_id, player2_id).await;
    Some(EventFrame::GameDraw { game_id: session.id, player1_state: p1_state, player2_state: p2_state })
}

/// WAITING --(expiry_time reached, still one-sided)--> CANCELLED.
async fn sweep_waiting_expiry(ops: &SessionOps, ports: &ProducerPorts) -> Result<()> {
    let now = Utc::now();
    for session in ops.store.list_expired_waiting_sessions(now).await? {
        let claimed = ops
            .store
            .transition_session(session.id, SessionStatus::Waiting, |s| {
                s.status = SessionStatus::Cancelled;
                s.completed_at = Some(now);
            })
            .await?;
        if let Some(session) = claimed {
            ops.payout.resolve_cancel(&session).await?;
            ports
                .try_send(EventFrame::SessionCancelled {
                    game_id: session.id,
                    message: "opponent never connected, stake refunded".into(),
                })
                .await
                .ok();
        }
    }
    Ok(())
}

/// IN_PROGRESS --(player disconnects AND grace elapses without reconnect)--> FORFEIT.
/// The idle set already dropped this (game, player) pair on any reconnect in
/// the meantime; the live-state check below covers the race where the pop
/// and the reconnect land in the same instant.
async fn sweep_disconnect_grace(ops: &SessionOps, ports: &ProducerPorts) -> Result<()> {
    let due = ops.ephemeral.pop_due_idle_deadlines(IdleSet::DisconnectGrace, Utc::now()).await?;
    for (game_id, disconnected_player_id) in due {
        let Some(mut state) = load_live_state(ops, game_id).await else { continue };
        let Some(runtime) = state.runtime_for_mut(disconnected_player_id) else { continue };
        if runtime.connected {
            continue;
        }
        let Some(winner_id) = state.opponent_of(disconnected_player_id).map(|o| o.id) else { continue };
        if let Some(frame) = complete_win(ops, game_id, winner_id, WinType::Disconnect).await? {
            ports.try_send(frame).await.ok();
        }
    }
    Ok(())
}

async fn disarm_both(ops: &SessionOps, session: &Session) {
    disarm_player(ops, session.id, session.player1_id).await;
    if let Some(p2) = session.player2_id {
        disarm_player(ops, session.id, p2).await;
    }
}

async fn disarm_player(ops: &SessionOps, game_id: i64, player_id: i64) {
    let _ = ops.ephemeral.cancel_idle_deadline(IdleSet::Warning, game_id, player_id).await;
    let _ = ops.ephemeral.cancel_idle_deadline(IdleSet::Forfeit, game_id, player_id).await;
    let _ = ops.ephemeral.cancel_idle_deadline(IdleSet::DisconnectGrace, game_id, player_id).await;
}

async fn project_states(ops: &SessionOps, game_id: i64, a_id: i64, b_id: i64) -> (Value, Value) {
    let Some(state) = load_live_state(ops, game_id).await else {
        return (Value::Null, Value::Null);
    };
    (ops.engine.project_for(&state.engine_state, a_id), ops.engine.project_for(&state.engine_state, b_id))
}

/// Used by the idle watcher to resolve the winner for an idle-timeout
/// forfeit without duplicating the live-state lookup.
pub async fn opponent_of(ops: &SessionOps, game_id: i64, player_id: i64) -> Option<i64> {
    let state = load_live_state(ops, game_id).await?;
    state.opponent_of(player_id).map(|o| o.id)
}

async fn load_live_state(ops: &SessionOps, game_id: i64) -> Option<wager_core::model::LiveGameState> {
    let value = ops.ephemeral.get_live_state(game_id).await.ok().flatten()?;
    serde_json::from_value(value).ok()
}

async fn save_live_state(ops: &SessionOps, game_id: i64, state: &wager_core::model::LiveGameState) {
    if let Ok(value) = serde_json::to_value(state) {
        let _ = ops.ephemeral.put_live_state(game_id, value).await;
    }
}
