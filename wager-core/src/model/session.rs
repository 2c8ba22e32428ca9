use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
    Forfeit,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "WAITING",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Forfeit => "FORFEIT",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(SessionStatus::Waiting),
            "IN_PROGRESS" => Ok(SessionStatus::InProgress),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            "FORFEIT" => Ok(SessionStatus::Forfeit),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinType {
    Normal,
    Forfeit,
    Concede,
    Idle,
    Disconnect,
}

impl WinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WinType::Normal => "NORMAL",
            WinType::Forfeit => "FORFEIT",
            WinType::Concede => "CONCEDE",
            WinType::Idle => "IDLE",
            WinType::Disconnect => "DISCONNECT",
        }
    }
}

impl std::str::FromStr for WinType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(WinType::Normal),
            "FORFEIT" => Ok(WinType::Forfeit),
            "CONCEDE" => Ok(WinType::Concede),
            "IDLE" => Ok(WinType::Idle),
            "DISCONNECT" => Ok(WinType::Disconnect),
            other => Err(format!("unknown win type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub game_token: String,
    pub game_type: String,
    pub player1_id: i64,
    pub player2_id: Option<i64>,
    pub stake_amount: Cents,
    pub status: SessionStatus,
    pub winner_id: Option<i64>,
    pub win_type: Option<WinType>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expiry_time: DateTime<Utc>,
}

impl Session {
    pub fn opponent_of(&self, player_id: i64) -> Option<i64> {
        if self.player1_id == player_id {
            self.player2_id
        } else if self.player2_id == Some(player_id) {
            Some(self.player1_id)
        } else {
            None
        }
    }

    pub fn has_player(&self, player_id: i64) -> bool {
        self.player1_id == player_id || self.player2_id == Some(player_id)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Forfeit
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Move {
    pub id: i64,
    pub session_id: i64,
    pub player_id: i64,
    pub move_number: i64,
    pub move_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
