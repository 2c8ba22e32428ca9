use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Waiting,
    Matched,
    Expired,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "WAITING",
            QueueStatus::Matched => "MATCHED",
            QueueStatus::Expired => "EXPIRED",
            QueueStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(QueueStatus::Waiting),
            "MATCHED" => Ok(QueueStatus::Matched),
            "EXPIRED" => Ok(QueueStatus::Expired),
            "CANCELLED" => Ok(QueueStatus::Cancelled),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub player_id: i64,
    pub phone: String,
    pub stake_amount: Cents,
    pub status: QueueStatus,
    pub queue_token: String,
    pub is_private: bool,
    pub match_code: Option<String>,
    pub transaction_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub session_id: Option<i64>,
    pub converted_to_credit_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Invariant: `is_private == true` implies a match code was assigned.
    pub fn well_formed(&self) -> bool {
        if self.is_private && self.match_code.is_none() {
            return false;
        }
        if self.status == QueueStatus::Matched && self.session_id.is_none() {
            return false;
        }
        true
    }
}
