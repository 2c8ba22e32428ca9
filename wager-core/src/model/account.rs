use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    PlayerWinnings,
    Platform,
    Escrow,
    Tax,
    Settlement,
}

impl AccountType {
    pub fn is_system(&self) -> bool {
        !matches!(self, AccountType::PlayerWinnings)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::PlayerWinnings => "player_winnings",
            AccountType::Platform => "platform",
            AccountType::Escrow => "escrow",
            AccountType::Tax => "tax",
            AccountType::Settlement => "settlement",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player_winnings" => Ok(AccountType::PlayerWinnings),
            "platform" => Ok(AccountType::Platform),
            "escrow" => Ok(AccountType::Escrow),
            "tax" => Ok(AccountType::Tax),
            "settlement" => Ok(AccountType::Settlement),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub account_type: AccountType,
    pub owner_player_id: Option<i64>,
    pub balance: Cents,
}

/// Reference a ledger transfer is attached to; drives idempotency lookups
/// and appears verbatim in the AccountTransaction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    Session,
    Stake,
    Commission,
    Tax,
    Payout,
    Refund,
    Withdraw,
    WithdrawFee,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Session => "SESSION",
            ReferenceType::Stake => "STAKE",
            ReferenceType::Commission => "COMMISSION",
            ReferenceType::Tax => "TAX",
            ReferenceType::Payout => "PAYOUT",
            ReferenceType::Refund => "REFUND",
            ReferenceType::Withdraw => "WITHDRAW",
            ReferenceType::WithdrawFee => "WITHDRAW_FEE",
        }
    }
}

impl std::str::FromStr for ReferenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SESSION" => Ok(ReferenceType::Session),
            "STAKE" => Ok(ReferenceType::Stake),
            "COMMISSION" => Ok(ReferenceType::Commission),
            "TAX" => Ok(ReferenceType::Tax),
            "PAYOUT" => Ok(ReferenceType::Payout),
            "REFUND" => Ok(ReferenceType::Refund),
            "WITHDRAW" => Ok(ReferenceType::Withdraw),
            "WITHDRAW_FEE" => Ok(ReferenceType::WithdrawFee),
            other => Err(format!("unknown reference type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub id: i64,
    pub debit_account_id: i64,
    pub credit_account_id: i64,
    pub amount: Cents,
    pub reference_type: ReferenceType,
    pub reference_id: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
