//! Internal cross-component event envelope (C12's event bus payloads, plus
//! the signals the idle watcher and session manager need to reach the hub).

use serde_json::Value;

use crate::hub::protocol::ServerMessage;

#[derive(Debug, Clone)]
pub enum EventFrame {
    /// `idle_events` channel: a player has gone quiet past the warning threshold.
    IdleWarning {
        game_id: i64,
        player_id: i64,
        forfeit_at_unix_ms: i64,
    },
    /// `idle_events` channel: timers were reset by a valid inbound action.
    IdleCanceled { game_id: i64, player_id: i64 },
    /// `idle_events` / disconnect-grace channel: a player has been forfeited.
    PlayerForfeit {
        game_id: i64,
        winner_id: i64,
        loser_id: i64,
        player1_state: Value,
        player2_state: Value,
    },
    /// `game_events` channel: a WAITING session expired with one side only.
    SessionCancelled { game_id: i64, message: String },
    /// `game_events` channel: the rule engine reported a draw.
    GameDraw {
        game_id: i64,
        player1_state: Value,
        player2_state: Value,
    },
    /// `game_events` channel: both players are present, IN_PROGRESS begins.
    SessionStarted {
        game_id: i64,
        player1_state: Value,
        player2_state: Value,
    },
    /// `game_events` channel: the rule engine reported a clean winner (no
    /// forfeit). `player1_state` is the winner's projected state,
    /// `player2_state` the loser's — mirrors `PlayerForfeit`'s convention.
    GameWon {
        game_id: i64,
        winner_id: i64,
        loser_id: i64,
        player1_state: Value,
        player2_state: Value,
    },
    /// Ask the hub to push a single pre-built message to one player.
    Unicast { player_id: i64, message: ServerMessage },
    Shutdown,
}

impl std::fmt::Display for EventFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventFrame::IdleWarning { game_id, player_id, .. } => {
                write!(f, "IdleWarning(game={game_id}, player={player_id})")
            }
            EventFrame::IdleCanceled { game_id, player_id } => {
                write!(f, "IdleCanceled(game={game_id}, player={player_id})")
            }
            EventFrame::PlayerForfeit { game_id, winner_id, .. } => {
                write!(f, "PlayerForfeit(game={game_id}, winner={winner_id})")
            }
            EventFrame::SessionCancelled { game_id, .. } => {
                write!(f, "SessionCancelled(game={game_id})")
            }
            EventFrame::GameDraw { game_id, .. } => write!(f, "GameDraw(game={game_id})"),
            EventFrame::SessionStarted { game_id, .. } => {
                write!(f, "SessionStarted(game={game_id})")
            }
            EventFrame::GameWon { game_id, winner_id, .. } => {
                write!(f, "GameWon(game={game_id}, winner={winner_id})")
            }
            EventFrame::Unicast { player_id, .. } => write!(f, "Unicast(player={player_id})"),
            EventFrame::Shutdown => write!(f, "Shutdown"),
        }
    }
}
