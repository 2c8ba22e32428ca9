//! Wire schema for `/api/v1/game/{token}/ws`. Rule-engine-agnostic: payloads
//! the engine produces travel as opaque `serde_json::Value`s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    WaitingForOpponent,
    GameStarting {
        state: Value,
    },
    GameState {
        state: Value,
    },
    GameUpdate {
        state: Value,
    },
    ShotRelay {
        data: Value,
    },
    ShotResult {
        data: Value,
    },
    CardPlayed {
        data: Value,
    },
    CardsDrawn {
        data: Value,
    },
    OpponentDrew {
        data: Value,
    },
    TurnPassed {
        data: Value,
    },
    BallPlaced {
        data: Value,
    },
    PlayerConnected {
        player_id: i64,
    },
    PlayerDisconnected {
        player_id: i64,
    },
    PlayerIdleWarning {
        player_id: i64,
        forfeit_at_unix_ms: i64,
    },
    PlayerIdleCanceled {
        player_id: i64,
    },
    PlayerForfeit {
        winner_id: i64,
        loser_id: i64,
        state: Value,
    },
    GameOver {
        winner_id: Option<i64>,
        draw: bool,
        state: Value,
    },
    SessionCancelled {
        message: String,
    },
    Error {
        message: String,
    },
}
