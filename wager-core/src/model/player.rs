use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminRole {
    Support,
    Finance,
    Superadmin,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::Support => "SUPPORT",
            AdminRole::Finance => "FINANCE",
            AdminRole::Superadmin => "SUPERADMIN",
        }
    }
}

impl std::str::FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPPORT" => Ok(AdminRole::Support),
            "FINANCE" => Ok(AdminRole::Finance),
            "SUPERADMIN" => Ok(AdminRole::Superadmin),
            other => Err(format!("unknown admin role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStats {
    pub games_played: i64,
    pub games_won: i64,
    pub total_staked: Cents,
    pub total_winnings: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub phone: String,
    pub display_name: String,
    pub pin_hash: Option<String>,
    pub pin_failed_attempts: i32,
    pub pin_locked_until: Option<DateTime<Utc>>,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub block_until: Option<DateTime<Utc>>,
    pub disconnect_count: i64,
    pub no_show_count: i64,
    pub player_token: String,
    pub admin_role: Option<AdminRole>,
    pub stats: PlayerStats,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.pin_locked_until.map(|t| t > now).unwrap_or(false)
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked && self.block_until.map(|t| t > now).unwrap_or(true)
    }
}
