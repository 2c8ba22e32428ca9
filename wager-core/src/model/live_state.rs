use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Cents;
use super::session::SessionStatus;

/// A connected player's runtime presence, tracked independently of the
/// durable `Session` row so reconnects and disconnect-grace windows never
/// touch the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRuntime {
    pub id: i64,
    pub token: String,
    pub connected: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub shown_up_at: Option<DateTime<Utc>>,
    pub display_name: String,
}

impl PlayerRuntime {
    pub fn new(id: i64, token: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            token: token.into(),
            connected: false,
            disconnected_at: None,
            shown_up_at: None,
            display_name: display_name.into(),
        }
    }
}

/// The ephemeral envelope around an engine-specific opaque blob. Stored in
/// C4 keyed by `game:{id}:state` with a TTL of the max session lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveGameState {
    pub player1: PlayerRuntime,
    pub player2: PlayerRuntime,
    pub status: SessionStatus,
    pub current_turn: Option<i64>,
    pub stake: Cents,
    pub engine_state: serde_json::Value,
}

impl LiveGameState {
    pub fn runtime_for_mut(&mut self, player_id: i64) -> Option<&mut PlayerRuntime> {
        if self.player1.id == player_id {
            Some(&mut self.player1)
        } else if self.player2.id == player_id {
            Some(&mut self.player2)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, player_id: i64) -> Option<&PlayerRuntime> {
        if self.player1.id == player_id {
            Some(&self.player2)
        } else if self.player2.id == player_id {
            Some(&self.player1)
        } else {
            None
        }
    }

    pub fn both_present(&self) -> bool {
        self.player1.connected && self.player2.connected
    }
}
