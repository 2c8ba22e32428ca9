//! Postgres-backed implementation of the durable store, queried with
//! `sqlx`'s runtime `query`/`query_as` (no compile-time `query!` cache,
//! since these are never checked against a live database here). Enum
//! columns are stored as their `as_str()` text and parsed back with
//! `FromStr`; anything that fails to parse is an `Error::Store` bug in a
//! migration, not a user-facing condition.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction as SqlxTx};
use wager_core::model::*;
use wager_core::{Error, Result};

use super::durable::{NewPlayer, NewQueueEntry, NewSession, NewTransaction, NewWithdraw};

fn store_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

fn parse_err<T: std::fmt::Display>(field: &str, e: T) -> Error {
    Error::Store(format!("corrupt {field} in durable store: {e}"))
}

#[derive(FromRow)]
struct PlayerRow {
    id: i64,
    phone: String,
    display_name: String,
    pin_hash: Option<String>,
    pin_failed_attempts: i32,
    pin_locked_until: Option<DateTime<Utc>>,
    blocked: bool,
    block_reason: Option<String>,
    block_until: Option<DateTime<Utc>>,
    disconnect_count: i64,
    no_show_count: i64,
    player_token: String,
    admin_role: Option<String>,
    games_played: i64,
    games_won: i64,
    total_staked: i64,
    total_winnings: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PlayerRow> for Player {
    type Error = Error;

    fn try_from(r: PlayerRow) -> Result<Self> {
        Ok(Player {
            id: r.id,
            phone: r.phone,
            display_name: r.display_name,
            pin_hash: r.pin_hash,
            pin_failed_attempts: r.pin_failed_attempts,
            pin_locked_until: r.pin_locked_until,
            blocked: r.blocked,
            block_reason: r.block_reason,
            block_until: r.block_until,
            disconnect_count: r.disconnect_count,
            no_show_count: r.no_show_count,
            player_token: r.player_token,
            admin_role: r
                .admin_role
                .map(|s| AdminRole::from_str(&s).map_err(|e| parse_err("admin_role", e)))
                .transpose()?,
            stats: PlayerStats {
                games_played: r.games_played,
                games_won: r.games_won,
                total_staked: r.total_staked,
                total_winnings: r.total_winnings,
            },
            created_at: r.created_at,
        })
    }
}

const PLAYER_COLUMNS: &str = "id, phone, display_name, pin_hash, pin_failed_attempts, pin_locked_until, \
     blocked, block_reason, block_until, disconnect_count, no_show_count, player_token, admin_role, \
     games_played, games_won, total_staked, total_winnings, created_at";

pub async fn get_player(pool: &PgPool, id: i64) -> Result<Option<Player>> {
    let row = sqlx::query_as::<_, PlayerRow>(&format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(store_err)?;
    row.map(Player::try_from).transpose()
}

pub async fn get_player_by_phone(pool: &PgPool, phone: &str) -> Result<Option<Player>> {
    let row = sqlx::query_as::<_, PlayerRow>(&format!("SELECT {PLAYER_COLUMNS} FROM players WHERE phone = $1"))
        .bind(phone)
        .fetch_optional(pool)
        .await
        .map_err(store_err)?;
    row.map(Player::try_from).transpose()
}

pub async fn get_player_by_token(pool: &PgPool, token: &str) -> Result<Option<Player>> {
    let row =
        sqlx::query_as::<_, PlayerRow>(&format!("SELECT {PLAYER_COLUMNS} FROM players WHERE player_token = $1"))
            .bind(token)
            .fetch_optional(pool)
            .await
            .map_err(store_err)?;
    row.map(Player::try_from).transpose()
}

pub async fn insert_player(pool: &PgPool, new: NewPlayer) -> Result<Player> {
    let row = sqlx::query_as::<_, PlayerRow>(&format!(
        "INSERT INTO players (phone, display_name, player_token, pin_failed_attempts, blocked, \
         disconnect_count, no_show_count, games_played, games_won, total_staked, total_winnings, created_at) \
         VALUES ($1, $2, $3, 0, false, 0, 0, 0, 0, 0, 0, now()) RETURNING {PLAYER_COLUMNS}"
    ))
    .bind(new.phone)
    .bind(new.display_name)
    .bind(new.player_token)
    .fetch_one(pool)
    .await
    .map_err(store_err)?;
    Player::try_from(row)
}

pub async fn update_player(pool: &PgPool, player: &Player) -> Result<()> {
    sqlx::query(
        "UPDATE players SET display_name = $2, pin_hash = $3, pin_failed_attempts = $4, \
         pin_locked_until = $5, blocked = $6, block_reason = $7, block_until = $8, \
         disconnect_count = $9, no_show_count = $10, admin_role = $11, \
         games_played = $12, games_won = $13, total_staked = $14, total_winnings = $15 WHERE id = $1",
    )
    .bind(player.id)
    .bind(&player.display_name)
    .bind(&player.pin_hash)
    .bind(player.pin_failed_attempts)
    .bind(player.pin_locked_until)
    .bind(player.blocked)
    .bind(&player.block_reason)
    .bind(player.block_until)
    .bind(player.disconnect_count)
    .bind(player.no_show_count)
    .bind(player.admin_role.map(|r| r.as_str()))
    .bind(player.stats.games_played)
    .bind(player.stats.games_won)
    .bind(player.stats.total_staked)
    .bind(player.stats.total_winnings)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

#[derive(FromRow)]
struct AccountRow {
    id: i64,
    account_type: String,
    owner_player_id: Option<i64>,
    balance: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = Error;

    fn try_from(r: AccountRow) -> Result<Self> {
        Ok(Account {
            id: r.id,
            account_type: AccountType::from_str(&r.account_type).map_err(|e| parse_err("account_type", e))?,
            owner_player_id: r.owner_player_id,
            balance: r.balance,
        })
    }
}

pub async fn get_account(pool: &PgPool, id: i64) -> Result<Option<Account>> {
    let row = sqlx::query_as::<_, AccountRow>("SELECT id, account_type, owner_player_id, balance FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(store_err)?;
    row.map(Account::try_from).transpose()
}

pub async fn get_or_create_account(
    pool: &PgPool,
    account_type: AccountType,
    owner_player_id: Option<i64>,
) -> Result<Account> {
    let existing = sqlx::query_as::<_, AccountRow>(
        "SELECT id, account_type, owner_player_id, balance FROM accounts \
         WHERE account_type = $1 AND owner_player_id IS NOT DISTINCT FROM $2",
    )
    .bind(account_type.as_str())
    .bind(owner_player_id)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    if let Some(row) = existing {
        return Account::try_from(row);
    }
    let row = sqlx::query_as::<_, AccountRow>(
        "INSERT INTO accounts (account_type, owner_player_id, balance) VALUES ($1, $2, 0) \
         ON CONFLICT (account_type, owner_player_id) DO UPDATE SET account_type = EXCLUDED.account_type \
         RETURNING id, account_type, owner_player_id, balance",
    )
    .bind(account_type.as_str())
    .bind(owner_player_id)
    .fetch_one(pool)
    .await
    .map_err(store_err)?;
    Account::try_from(row)
}

#[derive(FromRow)]
struct AccountTransactionRow {
    id: i64,
    debit_account_id: i64,
    credit_account_id: i64,
    amount: i64,
    reference_type: String,
    reference_id: i64,
    description: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountTransactionRow> for AccountTransaction {
    type Error = Error;

    fn try_from(r: AccountTransactionRow) -> Result<Self> {
        Ok(AccountTransaction {
            id: r.id,
            debit_account_id: r.debit_account_id,
            credit_account_id: r.credit_account_id,
            amount: r.amount,
            reference_type: ReferenceType::from_str(&r.reference_type)
                .map_err(|e| parse_err("reference_type", e))?,
            reference_id: r.reference_id,
            description: r.description,
            created_at: r.created_at,
        })
    }
}

/// Locks both accounts in ascending id order to avoid deadlocking against a
/// concurrent transfer moving funds the other way between the same pair.
pub async fn transfer(
    pool: &PgPool,
    debit_account_id: i64,
    credit_account_id: i64,
    amount: i64,
    reference_type: ReferenceType,
    reference_id: i64,
    description: &str,
) -> Result<AccountTransaction> {
    let mut tx = pool.begin().await.map_err(store_err)?;

    if let Some(existing) = sqlx::query_as::<_, AccountTransactionRow>(
        "SELECT id, debit_account_id, credit_account_id, amount, reference_type, reference_id, description, created_at \
         FROM account_transactions WHERE reference_type = $1 AND reference_id = $2 \
         AND debit_account_id = $3 AND credit_account_id = $4",
    )
    .bind(reference_type.as_str())
    .bind(reference_id)
    .bind(debit_account_id)
    .bind(credit_account_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(store_err)?
    {
        tx.commit().await.map_err(store_err)?;
        return AccountTransaction::try_from(existing);
    }

    let (first, second) = if debit_account_id < credit_account_id {
        (debit_account_id, credit_account_id)
    } else {
        (credit_account_id, debit_account_id)
    };
    sqlx::query("SELECT id FROM accounts WHERE id IN ($1, $2) ORDER BY id FOR UPDATE")
        .bind(first)
        .bind(second)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_err)?;

    let debit = sqlx::query_as::<_, AccountRow>("SELECT id, account_type, owner_player_id, balance FROM accounts WHERE id = $1")
        .bind(debit_account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?
        .ok_or(Error::UnknownAccount(debit_account_id))?;
    let credit_exists = sqlx::query("SELECT 1 FROM accounts WHERE id = $1")
        .bind(credit_account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;
    if credit_exists.is_none() {
        return Err(Error::UnknownAccount(credit_account_id));
    }
    let debit_type = AccountType::from_str(&debit.account_type).map_err(|e| parse_err("account_type", e))?;
    if !debit_type.is_system() && debit.balance < amount {
        return Err(Error::InsufficientFunds {
            account_id: debit_account_id,
        });
    }

    sqlx::query("UPDATE accounts SET balance = balance - $2 WHERE id = $1")
        .bind(debit_account_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
    sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
        .bind(credit_account_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

    let inserted = sqlx::query_as::<_, AccountTransactionRow>(
        "INSERT INTO account_transactions (debit_account_id, credit_account_id, amount, reference_type, reference_id, description, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, now()) \
         RETURNING id, debit_account_id, credit_account_id, amount, reference_type, reference_id, description, created_at",
    )
    .bind(debit_account_id)
    .bind(credit_account_id)
    .bind(amount)
    .bind(reference_type.as_str())
    .bind(reference_id)
    .bind(description)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err)?;

    tx.commit().await.map_err(store_err)?;
    AccountTransaction::try_from(inserted)
}

pub async fn list_account_transactions_for_reference(pool: &PgPool, reference_id: i64) -> Result<Vec<AccountTransaction>> {
    let rows = sqlx::query_as::<_, AccountTransactionRow>(
        "SELECT id, debit_account_id, credit_account_id, amount, reference_type, reference_id, description, created_at \
         FROM account_transactions WHERE reference_id = $1 ORDER BY id",
    )
    .bind(reference_id)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(AccountTransaction::try_from).collect()
}

/// Sums commission and tax captured in `[from, to)`, in cents, for the admin
/// revenue report.
pub async fn sum_revenue_between(pool: &PgPool, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(i64, i64)> {
    let commission: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(amount) FROM account_transactions WHERE reference_type = 'COMMISSION' AND created_at >= $1 AND created_at < $2",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
    .map_err(store_err)?;
    let tax: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(amount) FROM account_transactions WHERE reference_type = 'TAX' AND created_at >= $1 AND created_at < $2",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
    .map_err(store_err)?;
    Ok((commission.unwrap_or(0), tax.unwrap_or(0)))
}

#[derive(FromRow)]
struct QueueRow {
    id: i64,
    player_id: i64,
    phone: String,
    stake_amount: i64,
    status: String,
    queue_token: String,
    is_private: bool,
    match_code: Option<String>,
    transaction_id: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    matched_at: Option<DateTime<Utc>>,
    session_id: Option<i64>,
    converted_to_credit_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = Error;

    fn try_from(r: QueueRow) -> Result<Self> {
        Ok(QueueEntry {
            id: r.id,
            player_id: r.player_id,
            phone: r.phone,
            stake_amount: r.stake_amount,
            status: QueueStatus::from_str(&r.status).map_err(|e| parse_err("queue status", e))?,
            queue_token: r.queue_token,
            is_private: r.is_private,
            match_code: r.match_code,
            transaction_id: r.transaction_id,
            created_at: r.created_at,
            expires_at: r.expires_at,
            matched_at: r.matched_at,
            session_id: r.session_id,
            converted_to_credit_at: r.converted_to_credit_at,
        })
    }
}

const QUEUE_COLUMNS: &str = "id, player_id, phone, stake_amount, status, queue_token, is_private, match_code, \
     transaction_id, created_at, expires_at, matched_at, session_id, converted_to_credit_at";

#[derive(FromRow)]
struct TransactionRow {
    id: i64,
    player_id: i64,
    transaction_type: String,
    amount: i64,
    status: String,
    provider_txn_id: Option<String>,
    provider_status_code: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(r: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: r.id,
            player_id: r.player_id,
            transaction_type: TransactionType::from_str(&r.transaction_type)
                .map_err(|e| parse_err("transaction_type", e))?,
            amount: r.amount,
            status: TransactionStatus::from_str(&r.status).map_err(|e| parse_err("transaction status", e))?,
            provider_txn_id: r.provider_txn_id,
            provider_status_code: r.provider_status_code,
            created_at: r.created_at,
            completed_at: r.completed_at,
        })
    }
}

const TXN_COLUMNS: &str = "id, player_id, transaction_type, amount, status, provider_txn_id, \
     provider_status_code, created_at, completed_at";

pub async fn create_queue_entry(pool: &PgPool, new: NewQueueEntry) -> Result<(QueueEntry, Transaction)> {
    let mut tx = pool.begin().await.map_err(store_err)?;

    let txn_row = sqlx::query_as::<_, TransactionRow>(&format!(
        "INSERT INTO transactions (player_id, transaction_type, amount, status, created_at) \
         VALUES ($1, $2, $3, 'PENDING', now()) RETURNING {TXN_COLUMNS}"
    ))
    .bind(new.stake_transaction.player_id)
    .bind(new.stake_transaction.transaction_type.as_str())
    .bind(new.stake_transaction.amount)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err)?;
    let transaction = Transaction::try_from(txn_row)?;

    let queue_row = sqlx::query_as::<_, QueueRow>(&format!(
        "INSERT INTO matchmaking_queue (player_id, phone, stake_amount, status, queue_token, is_private, \
         match_code, transaction_id, created_at, expires_at) \
         VALUES ($1, $2, $3, 'WAITING', $4, $5, $6, $7, now(), $8) RETURNING {QUEUE_COLUMNS}"
    ))
    .bind(new.player_id)
    .bind(new.phone)
    .bind(new.stake_amount)
    .bind(new.queue_token)
    .bind(new.is_private)
    .bind(new.match_code)
    .bind(transaction.id)
    .bind(new.expires_at)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err)?;
    let entry = QueueEntry::try_from(queue_row)?;

    tx.commit().await.map_err(store_err)?;
    Ok((entry, transaction))
}

pub async fn get_queue_entry(pool: &PgPool, id: i64) -> Result<Option<QueueEntry>> {
    let row = sqlx::query_as::<_, QueueRow>(&format!("SELECT {QUEUE_COLUMNS} FROM matchmaking_queue WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(store_err)?;
    row.map(QueueEntry::try_from).transpose()
}

pub async fn get_queue_by_token(pool: &PgPool, token: &str) -> Result<Option<QueueEntry>> {
    let row = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue WHERE queue_token = $1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    row.map(QueueEntry::try_from).transpose()
}

pub async fn get_queue_by_match_code(pool: &PgPool, code: &str) -> Result<Option<QueueEntry>> {
    let row = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue WHERE match_code = $1 AND status = 'WAITING'"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    row.map(QueueEntry::try_from).transpose()
}

pub async fn get_waiting_queue_for_player(pool: &PgPool, player_id: i64) -> Result<Option<QueueEntry>> {
    let row = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue WHERE player_id = $1 AND status = 'WAITING'"
    ))
    .bind(player_id)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    row.map(QueueEntry::try_from).transpose()
}

pub async fn list_waiting_public_queue(pool: &PgPool, stake_amount: i64) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue \
         WHERE status = 'WAITING' AND is_private = false AND stake_amount = $1 ORDER BY created_at ASC"
    ))
    .bind(stake_amount)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

/// All WAITING public rows regardless of stake, oldest first, so the
/// matchmaker sweep can group them by stake amount in one pass.
pub async fn list_all_waiting_public_queue(pool: &PgPool) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue \
         WHERE status = 'WAITING' AND is_private = false ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

/// All WAITING private rows, oldest first, so the matchmaker sweep can group
/// them by match code in one pass.
pub async fn list_all_waiting_private_queue(pool: &PgPool) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue \
         WHERE status = 'WAITING' AND is_private = true ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

pub async fn list_expired_waiting_queue(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue WHERE status = 'WAITING' AND expires_at <= $1"
    ))
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

pub async fn mark_queue_expired(pool: &PgPool, queue_id: i64) -> Result<()> {
    sqlx::query("UPDATE matchmaking_queue SET status = 'EXPIRED' WHERE id = $1")
        .bind(queue_id)
        .execute(pool)
        .await
        .map_err(store_err)?;
    Ok(())
}

pub async fn mark_queue_cancelled(pool: &PgPool, queue_id: i64) -> Result<()> {
    sqlx::query("UPDATE matchmaking_queue SET status = 'CANCELLED' WHERE id = $1")
        .bind(queue_id)
        .execute(pool)
        .await
        .map_err(store_err)?;
    Ok(())
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    game_token: String,
    game_type: String,
    player1_id: i64,
    player2_id: Option<i64>,
    stake_amount: i64,
    status: String,
    winner_id: Option<i64>,
    win_type: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    expiry_time: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = Error;

    fn try_from(r: SessionRow) -> Result<Self> {
        Ok(Session {
            id: r.id,
            game_token: r.game_token,
            game_type: r.game_type,
            player1_id: r.player1_id,
            player2_id: r.player2_id,
            stake_amount: r.stake_amount,
            status: SessionStatus::from_str(&r.status).map_err(|e| parse_err("session status", e))?,
            winner_id: r.winner_id,
            win_type: r
                .win_type
                .map(|s| WinType::from_str(&s).map_err(|e| parse_err("win_type", e)))
                .transpose()?,
            created_at: r.created_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
            expiry_time: r.expiry_time,
        })
    }
}

const SESSION_COLUMNS: &str = "id, game_token, game_type, player1_id, player2_id, stake_amount, status, \
     winner_id, win_type, created_at, started_at, completed_at, expiry_time";

pub async fn pair_queue_entries(
    pool: &PgPool,
    q1_id: i64,
    q2_id: i64,
    new_session: NewSession,
    escrow_account_id: i64,
    stake_source_account_id: i64,
) -> Result<Option<Session>> {
    let mut tx = pool.begin().await.map_err(store_err)?;

    let (first, second) = if q1_id < q2_id { (q1_id, q2_id) } else { (q2_id, q1_id) };
    let rows = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue WHERE id IN ($1, $2) ORDER BY id FOR UPDATE SKIP LOCKED"
    ))
    .bind(first)
    .bind(second)
    .fetch_all(&mut *tx)
    .await
    .map_err(store_err)?;
    if rows.len() != 2 {
        return Ok(None);
    }
    let entries = rows
        .into_iter()
        .map(QueueEntry::try_from)
        .collect::<Result<Vec<_>>>()?;
    let both_waiting = entries.iter().all(|e| e.status == QueueStatus::Waiting);
    if !both_waiting {
        return Ok(None);
    }

    let txn_ids: Vec<i64> = entries.iter().map(|e| e.transaction_id).collect();
    let funded_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions WHERE id = ANY($1) AND status = 'COMPLETED'",
    )
    .bind(&txn_ids)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err)?;
    if funded_count != 2 {
        return Ok(None);
    }

    let session_row = sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO game_sessions (game_token, game_type, player1_id, player2_id, stake_amount, status, \
         created_at, expiry_time) \
         VALUES ($1, $2, $3, $4, $5, 'WAITING', now(), $6) RETURNING {SESSION_COLUMNS}"
    ))
    .bind(&new_session.game_token)
    .bind(&new_session.game_type)
    .bind(new_session.player1_id)
    .bind(new_session.player2_id)
    .bind(new_session.stake_amount)
    .bind(new_session.expiry_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err)?;
    let session = Session::try_from(session_row)?;

    sqlx::query("UPDATE matchmaking_queue SET status = 'MATCHED', session_id = $2, matched_at = now() WHERE id = $1")
        .bind(q1_id)
        .bind(session.id)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
    sqlx::query("UPDATE matchmaking_queue SET status = 'MATCHED', session_id = $2, matched_at = now() WHERE id = $1")
        .bind(q2_id)
        .bind(session.id)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

    for q_id in [q1_id, q2_id] {
        apply_transfer_in_tx(
            &mut tx,
            stake_source_account_id,
            escrow_account_id,
            new_session.stake_amount,
            ReferenceType::Stake,
            q_id,
            "stake into escrow",
        )
        .await?;
    }

    tx.commit().await.map_err(store_err)?;
    Ok(Some(session))
}

/// Shared inner transfer logic used by the multi-step atomic operations
/// below, so they don't have to open a nested transaction to move money.
async fn apply_transfer_in_tx(
    tx: &mut SqlxTx<'_, Postgres>,
    debit_account_id: i64,
    credit_account_id: i64,
    amount: i64,
    reference_type: ReferenceType,
    reference_id: i64,
    description: &str,
) -> Result<()> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM account_transactions WHERE reference_type = $1 AND reference_id = $2 \
         AND debit_account_id = $3 AND credit_account_id = $4",
    )
    .bind(reference_type.as_str())
    .bind(reference_id)
    .bind(debit_account_id)
    .bind(credit_account_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(store_err)?;
    if existing.is_some() {
        return Ok(());
    }

    let (first, second) = if debit_account_id < credit_account_id {
        (debit_account_id, credit_account_id)
    } else {
        (credit_account_id, debit_account_id)
    };
    sqlx::query("SELECT id FROM accounts WHERE id IN ($1, $2) ORDER BY id FOR UPDATE")
        .bind(first)
        .bind(second)
        .fetch_all(&mut **tx)
        .await
        .map_err(store_err)?;

    let debit = sqlx::query_as::<_, AccountRow>(
        "SELECT id, account_type, owner_player_id, balance FROM accounts WHERE id = $1",
    )
    .bind(debit_account_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(store_err)?
    .ok_or(Error::UnknownAccount(debit_account_id))?;
    let debit_type = AccountType::from_str(&debit.account_type).map_err(|e| parse_err("account_type", e))?;
    if !debit_type.is_system() && debit.balance < amount {
        return Err(Error::InsufficientFunds {
            account_id: debit_account_id,
        });
    }

    sqlx::query("UPDATE accounts SET balance = balance - $2 WHERE id = $1")
        .bind(debit_account_id)
        .bind(amount)
        .execute(&mut **tx)
        .await
        .map_err(store_err)?;
    sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
        .bind(credit_account_id)
        .bind(amount)
        .execute(&mut **tx)
        .await
        .map_err(store_err)?;
    sqlx::query(
        "INSERT INTO account_transactions (debit_account_id, credit_account_id, amount, reference_type, \
         reference_id, description, created_at) VALUES ($1, $2, $3, $4, $5, $6, now())",
    )
    .bind(debit_account_id)
    .bind(credit_account_id)
    .bind(amount)
    .bind(reference_type.as_str())
    .bind(reference_id)
    .bind(description)
    .execute(&mut **tx)
    .await
    .map_err(store_err)?;
    Ok(())
}

pub async fn expire_queue_entry_as_credit(
    pool: &PgPool,
    queue_id: i64,
    player_winnings_account_id: i64,
    stake_source_account_id: i64,
) -> Result<Option<QueueEntry>> {
    let mut tx = pool.begin().await.map_err(store_err)?;
    let row = sqlx::query_as::<_, QueueRow>(&format!(
        "SELECT {QUEUE_COLUMNS} FROM matchmaking_queue WHERE id = $1 FOR UPDATE"
    ))
    .bind(queue_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(store_err)?;
    let Some(row) = row else { return Ok(None) };
    let entry = QueueEntry::try_from(row)?;
    if entry.status != QueueStatus::Waiting || entry.converted_to_credit_at.is_some() {
        return Ok(None);
    }

    apply_transfer_in_tx(
        &mut tx,
        stake_source_account_id,
        player_winnings_account_id,
        entry.stake_amount,
        ReferenceType::Refund,
        queue_id,
        "expired queue stake refunded to internal credit",
    )
    .await?;

    let updated = sqlx::query_as::<_, QueueRow>(&format!(
        "UPDATE matchmaking_queue SET status = 'EXPIRED', converted_to_credit_at = now() \
         WHERE id = $1 RETURNING {QUEUE_COLUMNS}"
    ))
    .bind(queue_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err)?;

    tx.commit().await.map_err(store_err)?;
    Ok(Some(QueueEntry::try_from(updated)?))
}

/// Paired sessions stuck in WAITING past their `expiry_time` — at least one
/// side never connected. Feeds C8's cancellation sweep.
pub async fn list_expired_waiting_sessions(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Session>> {
    let rows = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE status = 'WAITING' AND expiry_time <= $1"
    ))
    .bind(now)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(Session::try_from).collect()
}

pub async fn get_session(pool: &PgPool, id: i64) -> Result<Option<Session>> {
    let row = sqlx::query_as::<_, SessionRow>(&format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(store_err)?;
    row.map(Session::try_from).transpose()
}

pub async fn get_session_by_token(pool: &PgPool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE game_token = $1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    row.map(Session::try_from).transpose()
}

pub async fn transition_session(
    pool: &PgPool,
    id: i64,
    expected_status: SessionStatus,
    mutate: impl FnOnce(&mut Session),
) -> Result<Option<Session>> {
    let mut tx = pool.begin().await.map_err(store_err)?;
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(store_err)?;
    let Some(row) = row else { return Ok(None) };
    let mut session = Session::try_from(row)?;
    if session.status != expected_status {
        return Ok(None);
    }
    mutate(&mut session);

    sqlx::query(
        "UPDATE game_sessions SET status = $2, winner_id = $3, win_type = $4, started_at = $5, \
         completed_at = $6 WHERE id = $1",
    )
    .bind(session.id)
    .bind(session.status.as_str())
    .bind(session.winner_id)
    .bind(session.win_type.map(|w| w.as_str()))
    .bind(session.started_at)
    .bind(session.completed_at)
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;

    tx.commit().await.map_err(store_err)?;
    Ok(Some(session))
}

pub async fn resolve_payout(
    pool: &PgPool,
    session_id: i64,
    moves: &[(i64, i64, i64, ReferenceType, String)],
    final_status: SessionStatus,
    winner_id: Option<i64>,
    win_type: Option<WinType>,
) -> Result<()> {
    let mut tx = pool.begin().await.map_err(store_err)?;
    for (debit, credit, amount, ref_type, desc) in moves {
        apply_transfer_in_tx(&mut tx, *debit, *credit, *amount, *ref_type, session_id, desc).await?;
    }
    sqlx::query(
        "UPDATE game_sessions SET status = $2, winner_id = $3, win_type = $4, completed_at = now() \
         WHERE id = $1",
    )
    .bind(session_id)
    .bind(final_status.as_str())
    .bind(winner_id)
    .bind(win_type.map(|w| w.as_str()))
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;
    tx.commit().await.map_err(store_err)?;
    Ok(())
}

pub async fn insert_transaction_pending(pool: &PgPool, new: NewTransaction) -> Result<Transaction> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "INSERT INTO transactions (player_id, transaction_type, amount, status, created_at) \
         VALUES ($1, $2, $3, 'PENDING', now()) RETURNING {TXN_COLUMNS}"
    ))
    .bind(new.player_id)
    .bind(new.transaction_type.as_str())
    .bind(new.amount)
    .fetch_one(pool)
    .await
    .map_err(store_err)?;
    Transaction::try_from(row)
}

#[derive(FromRow)]
struct MoveRow {
    id: i64,
    session_id: i64,
    player_id: i64,
    move_number: i64,
    move_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<MoveRow> for Move {
    fn from(r: MoveRow) -> Self {
        Move {
            id: r.id,
            session_id: r.session_id,
            player_id: r.player_id,
            move_number: r.move_number,
            move_type: r.move_type,
            payload: r.payload,
            created_at: r.created_at,
        }
    }
}

pub async fn append_move(
    pool: &PgPool,
    session_id: i64,
    player_id: i64,
    move_type: &str,
    payload: serde_json::Value,
) -> Result<Move> {
    let row = sqlx::query_as::<_, MoveRow>(
        "INSERT INTO game_moves (session_id, player_id, move_number, move_type, payload, created_at) \
         VALUES ($1, $2, COALESCE((SELECT MAX(move_number) FROM game_moves WHERE session_id = $1), 0) + 1, $3, $4, now()) \
         RETURNING id, session_id, player_id, move_number, move_type, payload, created_at",
    )
    .bind(session_id)
    .bind(player_id)
    .bind(move_type)
    .bind(payload)
    .fetch_one(pool)
    .await
    .map_err(store_err)?;
    Ok(row.into())
}

pub async fn list_moves(pool: &PgPool, session_id: i64) -> Result<Vec<Move>> {
    let rows = sqlx::query_as::<_, MoveRow>(
        "SELECT id, session_id, player_id, move_number, move_type, payload, created_at \
         FROM game_moves WHERE session_id = $1 ORDER BY move_number ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    Ok(rows.into_iter().map(Move::from).collect())
}

pub async fn get_transaction(pool: &PgPool, id: i64) -> Result<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(store_err)?;
    row.map(Transaction::try_from).transpose()
}

pub async fn get_transaction_by_provider_id(pool: &PgPool, provider_txn_id: &str) -> Result<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TXN_COLUMNS} FROM transactions WHERE provider_txn_id = $1"
    ))
    .bind(provider_txn_id)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    row.map(Transaction::try_from).transpose()
}

pub async fn set_transaction_provider_ref(
    pool: &PgPool,
    id: i64,
    provider_txn_id: &str,
    provider_status_code: &str,
) -> Result<()> {
    sqlx::query("UPDATE transactions SET provider_txn_id = $2, provider_status_code = $3 WHERE id = $1")
        .bind(id)
        .bind(provider_txn_id)
        .bind(provider_status_code)
        .execute(pool)
        .await
        .map_err(store_err)?;
    Ok(())
}

pub async fn complete_transaction(pool: &PgPool, id: i64, status: TransactionStatus) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE transactions SET status = $2, completed_at = now() \
         WHERE id = $1 AND status NOT IN ('COMPLETED', 'FAILED')",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(result.rows_affected() > 0)
}

/// Transactions PENDING for longer than `grace_secs` but younger than
/// `max_age_secs`, oldest first, for the fallback poller to reconcile
/// against the provider directly. Transactions past `max_age_secs` are left
/// for manual/admin handling rather than polled forever.
pub async fn list_stale_pending_transactions(
    pool: &PgPool,
    grace_secs: i64,
    max_age_secs: i64,
    limit: i64,
) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TXN_COLUMNS} FROM transactions \
         WHERE status = 'PENDING' AND provider_txn_id IS NOT NULL \
           AND created_at < now() - make_interval(secs => $1) \
           AND created_at > now() - make_interval(secs => $2) \
         ORDER BY created_at ASC LIMIT $3"
    ))
    .bind(grace_secs as f64)
    .bind(max_age_secs as f64)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(Transaction::try_from).collect()
}

#[derive(FromRow)]
struct WithdrawRow {
    id: i64,
    player_id: i64,
    amount: i64,
    fee: i64,
    net_amount: i64,
    method: String,
    destination: String,
    status: String,
    provider_txn_id: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WithdrawRow> for WithdrawRequest {
    type Error = Error;

    fn try_from(r: WithdrawRow) -> Result<Self> {
        Ok(WithdrawRequest {
            id: r.id,
            player_id: r.player_id,
            amount: r.amount,
            fee: r.fee,
            net_amount: r.net_amount,
            method: r.method,
            destination: r.destination,
            status: WithdrawStatus::from_str(&r.status).map_err(|e| parse_err("withdraw status", e))?,
            provider_txn_id: r.provider_txn_id,
            created_at: r.created_at,
            processed_at: r.processed_at,
        })
    }
}

const WITHDRAW_COLUMNS: &str = "id, player_id, amount, fee, net_amount, method, destination, status, \
     provider_txn_id, created_at, processed_at";

pub async fn insert_withdraw(pool: &PgPool, new: NewWithdraw) -> Result<WithdrawRequest> {
    let row = sqlx::query_as::<_, WithdrawRow>(&format!(
        "INSERT INTO withdraw_requests (player_id, amount, fee, net_amount, method, destination, status, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', now()) RETURNING {WITHDRAW_COLUMNS}"
    ))
    .bind(new.player_id)
    .bind(new.amount)
    .bind(new.fee)
    .bind(new.net_amount)
    .bind(new.method)
    .bind(new.destination)
    .fetch_one(pool)
    .await
    .map_err(store_err)?;
    WithdrawRequest::try_from(row)
}

pub async fn get_withdraw(pool: &PgPool, id: i64) -> Result<Option<WithdrawRequest>> {
    let row = sqlx::query_as::<_, WithdrawRow>(&format!(
        "SELECT {WITHDRAW_COLUMNS} FROM withdraw_requests WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(store_err)?;
    row.map(WithdrawRequest::try_from).transpose()
}

pub async fn list_withdraws_for_player(pool: &PgPool, player_id: i64) -> Result<Vec<WithdrawRequest>> {
    let rows = sqlx::query_as::<_, WithdrawRow>(&format!(
        "SELECT {WITHDRAW_COLUMNS} FROM withdraw_requests WHERE player_id = $1 ORDER BY created_at DESC"
    ))
    .bind(player_id)
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(WithdrawRequest::try_from).collect()
}

pub async fn list_withdraws_by_status(pool: &PgPool, status: WithdrawStatus) -> Result<Vec<WithdrawRequest>> {
    let rows = sqlx::query_as::<_, WithdrawRow>(&format!(
        "SELECT {WITHDRAW_COLUMNS} FROM withdraw_requests WHERE status = $1 ORDER BY created_at ASC"
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(WithdrawRequest::try_from).collect()
}

pub async fn update_withdraw_status(pool: &PgPool, id: i64, status: WithdrawStatus) -> Result<()> {
    sqlx::query("UPDATE withdraw_requests SET status = $2, processed_at = now() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await
        .map_err(store_err)?;
    Ok(())
}

pub async fn insert_webhook_audit(
    pool: &PgPool,
    provider: &str,
    provider_txn_id: &str,
    raw_payload: serde_json::Value,
    signature_valid: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO payment_webhooks (provider, provider_txn_id, raw_payload, signature_valid, received_at) \
         VALUES ($1, $2, $3, $4, now())",
    )
    .bind(provider)
    .bind(provider_txn_id)
    .bind(raw_payload)
    .bind(signature_valid)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

pub async fn insert_audit_entry(pool: &PgPool, entry: AuditEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_log (actor, ip, route, action, details, success, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, now())",
    )
    .bind(entry.actor)
    .bind(entry.ip)
    .bind(entry.route)
    .bind(entry.action)
    .bind(entry.details)
    .bind(entry.success)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}

#[derive(FromRow)]
struct RuntimeConfigDbRow {
    key: String,
    value: String,
    value_type: String,
    updated_by: String,
    updated_at: DateTime<Utc>,
}

impl From<RuntimeConfigDbRow> for RuntimeConfigRow {
    fn from(r: RuntimeConfigDbRow) -> Self {
        RuntimeConfigRow {
            key: r.key,
            value: r.value,
            value_type: r.value_type,
            updated_by: r.updated_by,
            updated_at: r.updated_at,
        }
    }
}

pub async fn list_runtime_config(pool: &PgPool) -> Result<Vec<RuntimeConfigRow>> {
    let rows = sqlx::query_as::<_, RuntimeConfigDbRow>(
        "SELECT key, value, value_type, updated_by, updated_at FROM runtime_config",
    )
    .fetch_all(pool)
    .await
    .map_err(store_err)?;
    Ok(rows.into_iter().map(RuntimeConfigRow::from).collect())
}

pub async fn upsert_runtime_config(pool: &PgPool, row: RuntimeConfigRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO runtime_config (key, value, value_type, updated_by, updated_at) VALUES ($1, $2, $3, $4, now()) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, value_type = EXCLUDED.value_type, \
         updated_by = EXCLUDED.updated_by, updated_at = now()",
    )
    .bind(row.key)
    .bind(row.value)
    .bind(row.value_type)
    .bind(row.updated_by)
    .execute(pool)
    .await
    .map_err(store_err)?;
    Ok(())
}
