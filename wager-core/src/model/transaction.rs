use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Stake,
    Payout,
    Withdraw,
    Refund,
    Commission,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Stake => "STAKE",
            TransactionType::Payout => "PAYOUT",
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::Refund => "REFUND",
            TransactionType::Commission => "COMMISSION",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STAKE" => Ok(TransactionType::Stake),
            "PAYOUT" => Ok(TransactionType::Payout),
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            "REFUND" => Ok(TransactionType::Refund),
            "COMMISSION" => Ok(TransactionType::Commission),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub player_id: i64,
    pub transaction_type: TransactionType,
    pub amount: Cents,
    pub status: TransactionStatus,
    pub provider_txn_id: Option<String>,
    pub provider_status_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Failed,
}

impl WithdrawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawStatus::Pending => "PENDING",
            WithdrawStatus::Approved => "APPROVED",
            WithdrawStatus::Rejected => "REJECTED",
            WithdrawStatus::Completed => "COMPLETED",
            WithdrawStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for WithdrawStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(WithdrawStatus::Pending),
            "APPROVED" => Ok(WithdrawStatus::Approved),
            "REJECTED" => Ok(WithdrawStatus::Rejected),
            "COMPLETED" => Ok(WithdrawStatus::Completed),
            "FAILED" => Ok(WithdrawStatus::Failed),
            other => Err(format!("unknown withdraw status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub id: i64,
    pub player_id: i64,
    pub amount: Cents,
    pub fee: Cents,
    pub net_amount: Cents,
    pub method: String,
    pub destination: String,
    pub status: WithdrawStatus,
    pub provider_txn_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WithdrawRequest {
    pub fn well_formed(&self) -> bool {
        self.amount == self.fee + self.net_amount
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAudit {
    pub id: i64,
    pub provider: String,
    pub provider_txn_id: String,
    pub raw_payload: serde_json::Value,
    pub signature_valid: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor: String,
    pub ip: String,
    pub route: String,
    pub action: String,
    pub details: serde_json::Value,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}
