//! C3: the durable store. Modeled as a small enum over backends (`Postgres`
//! in production, `Memory` in tests) rather than a trait object, so that the
//! handful of genuinely atomic multi-table operations the spec calls out
//! (pairing, payout resolution, webhook reconciliation) can be expressed as
//! a single transaction without fighting object-safety around generic
//! transactions. Every mutation that touches more than one row goes through
//! one of the methods below; nothing outside this module issues a raw
//! `UPDATE accounts SET balance = ...`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use wager_core::model::*;
use wager_core::{Error, Result};

use super::memory::MemoryInner;

pub struct NewPlayer {
    pub phone: String,
    pub display_name: String,
    pub player_token: String,
}

pub struct NewQueueEntry {
    pub player_id: i64,
    pub phone: String,
    pub stake_amount: i64,
    pub queue_token: String,
    pub is_private: bool,
    pub match_code: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub stake_transaction: NewTransaction,
}

pub struct NewTransaction {
    pub player_id: i64,
    pub transaction_type: TransactionType,
    pub amount: i64,
}

pub struct NewSession {
    pub game_token: String,
    pub game_type: String,
    pub player1_id: i64,
    pub player2_id: Option<i64>,
    pub stake_amount: i64,
    pub expiry_time: DateTime<Utc>,
}

pub struct NewWithdraw {
    pub player_id: i64,
    pub amount: i64,
    pub fee: i64,
    pub net_amount: i64,
    pub method: String,
    pub destination: String,
}

/// The durable store backend. Cloning is cheap: `Postgres` clones a pool
/// handle, `Memory` clones an `Arc`.
#[derive(Clone)]
pub enum DurableStore {
    Postgres(PgPool),
    Memory(std::sync::Arc<tokio::sync::Mutex<MemoryInner>>),
}

impl DurableStore {
    pub fn postgres(pool: PgPool) -> Self {
        DurableStore::Postgres(pool)
    }

    pub fn in_memory() -> Self {
        DurableStore::Memory(std::sync::Arc::new(tokio::sync::Mutex::new(
            MemoryInner::default(),
        )))
    }

    // ---- players ----------------------------------------------------

    pub async fn get_player(&self, id: i64) -> Result<Option<Player>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_player(pool, id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_player(id)),
        }
    }

    pub async fn get_player_by_phone(&self, phone: &str) -> Result<Option<Player>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_player_by_phone(pool, phone).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_player_by_phone(phone)),
        }
    }

    pub async fn get_player_by_token(&self, token: &str) -> Result<Option<Player>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_player_by_token(pool, token).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_player_by_token(token)),
        }
    }

    pub async fn insert_player(&self, new: NewPlayer) -> Result<Player> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::insert_player(pool, new).await,
            DurableStore::Memory(m) => Ok(m.lock().await.insert_player(new)),
        }
    }

    pub async fn update_player(&self, player: Player) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::update_player(pool, &player).await,
            DurableStore::Memory(m) => {
                m.lock().await.update_player(player);
                Ok(())
            }
        }
    }

    // ---- accounts / ledger -------------------------------------------

    pub async fn get_or_create_account(
        &self,
        account_type: AccountType,
        owner_player_id: Option<i64>,
    ) -> Result<Account> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::get_or_create_account(pool, account_type, owner_player_id).await
            }
            DurableStore::Memory(m) => Ok(m.lock().await.get_or_create_account(account_type, owner_player_id)),
        }
    }

    /// C2's `Transfer`: locks both accounts in ascending id order, checks the
    /// debit side can afford it (system accounts may run negative), moves the
    /// balance, and appends the ledger row. No-ops (returns the prior entry)
    /// if `(reference_type, reference_id, debit, credit)` was already
    /// recorded, so retries are idempotent.
    pub async fn transfer(
        &self,
        debit_account_id: i64,
        credit_account_id: i64,
        amount: i64,
        reference_type: ReferenceType,
        reference_id: i64,
        description: &str,
    ) -> Result<AccountTransaction> {
        if amount <= 0 {
            return Err(Error::validation("transfer amount must be positive"));
        }
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::transfer(
                    pool,
                    debit_account_id,
                    credit_account_id,
                    amount,
                    reference_type,
                    reference_id,
                    description,
                )
                .await
            }
            DurableStore::Memory(m) => m.lock().await.transfer(
                debit_account_id,
                credit_account_id,
                amount,
                reference_type,
                reference_id,
                description,
            ),
        }
    }

    pub async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_account(pool, id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_account(id)),
        }
    }

    /// Every ledger row tied to a given `reference_id` (a session id for
    /// payout/commission/tax/refund moves) — feeds the admin dispute view.
    pub async fn list_account_transactions_for_reference(&self, reference_id: i64) -> Result<Vec<AccountTransaction>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::list_account_transactions_for_reference(pool, reference_id).await
            }
            DurableStore::Memory(m) => Ok(m.lock().await.list_account_transactions_for_reference(reference_id)),
        }
    }

    /// Commission + tax captured in `[from, to)`, in cents.
    pub async fn sum_revenue_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(i64, i64)> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::sum_revenue_between(pool, from, to).await,
            DurableStore::Memory(m) => Ok(m.lock().await.sum_revenue_between(from, to)),
        }
    }

    // ---- matchmaking queue --------------------------------------------

    /// CREATED step: writes the local transaction row and the queue row
    /// together, so a crash between the two never leaves an orphan.
    pub async fn create_queue_entry(&self, new: NewQueueEntry) -> Result<(QueueEntry, Transaction)> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::create_queue_entry(pool, new).await,
            DurableStore::Memory(m) => Ok(m.lock().await.create_queue_entry(new)),
        }
    }

    pub async fn get_queue_entry(&self, id: i64) -> Result<Option<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_queue_entry(pool, id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_queue_entry(id)),
        }
    }

    pub async fn get_queue_by_token(&self, token: &str) -> Result<Option<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_queue_by_token(pool, token).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_queue_by_token(token)),
        }
    }

    pub async fn get_queue_by_match_code(&self, code: &str) -> Result<Option<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_queue_by_match_code(pool, code).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_queue_by_match_code(code)),
        }
    }

    pub async fn get_waiting_queue_for_player(&self, player_id: i64) -> Result<Option<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::get_waiting_queue_for_player(pool, player_id).await
            }
            DurableStore::Memory(m) => Ok(m.lock().await.get_waiting_queue_for_player(player_id)),
        }
    }

    pub async fn list_waiting_public_queue(&self, stake_amount: i64) -> Result<Vec<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::list_waiting_public_queue(pool, stake_amount).await
            }
            DurableStore::Memory(m) => Ok(m.lock().await.list_waiting_public_queue(stake_amount)),
        }
    }

    pub async fn list_all_waiting_public_queue(&self) -> Result<Vec<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_all_waiting_public_queue(pool).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_all_waiting_public_queue()),
        }
    }

    pub async fn list_all_waiting_private_queue(&self) -> Result<Vec<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_all_waiting_private_queue(pool).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_all_waiting_private_queue()),
        }
    }

    pub async fn list_expired_waiting_queue(&self, now: DateTime<Utc>) -> Result<Vec<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_expired_waiting_queue(pool, now).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_expired_waiting_queue(now)),
        }
    }

    /// Pairing atomicity: re-verifies both rows are still WAITING with a
    /// COMPLETED stake, creates the session, marks both rows MATCHED, and
    /// moves both stakes into escrow, all in one transaction. Returns `None`
    /// if either row raced out from under us (already paired/expired).
    pub async fn pair_queue_entries(
        &self,
        q1_id: i64,
        q2_id: i64,
        session: NewSession,
        escrow_account_id: i64,
        stake_source_account_id: i64,
    ) -> Result<Option<Session>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::pair_queue_entries(
                    pool,
                    q1_id,
                    q2_id,
                    session,
                    escrow_account_id,
                    stake_source_account_id,
                )
                .await
            }
            DurableStore::Memory(m) => m.lock().await.pair_queue_entries(
                q1_id,
                q2_id,
                session,
                escrow_account_id,
                stake_source_account_id,
            ),
        }
    }

    /// Expiry path: marks a WAITING queue row EXPIRED and converts its stake
    /// straight to `player_winnings` credit, guarded by
    /// `converted_to_credit_at` so a retry is a no-op. The provider-refund
    /// branch of expiry is handled by the payment orchestrator directly
    /// against the transaction row, not here.
    pub async fn expire_queue_entry_as_credit(
        &self,
        queue_id: i64,
        player_winnings_account_id: i64,
        stake_source_account_id: i64,
    ) -> Result<Option<QueueEntry>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::expire_queue_entry_as_credit(
                    pool,
                    queue_id,
                    player_winnings_account_id,
                    stake_source_account_id,
                )
                .await
            }
            DurableStore::Memory(m) => m.lock().await.expire_queue_entry_as_credit(
                queue_id,
                player_winnings_account_id,
                stake_source_account_id,
            ),
        }
    }

    pub async fn mark_queue_expired(&self, queue_id: i64) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::mark_queue_expired(pool, queue_id).await,
            DurableStore::Memory(m) => {
                m.lock().await.mark_queue_status(queue_id, QueueStatus::Expired);
                Ok(())
            }
        }
    }

    pub async fn mark_queue_cancelled(&self, queue_id: i64) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::mark_queue_cancelled(pool, queue_id).await,
            DurableStore::Memory(m) => {
                m.lock().await.mark_queue_status(queue_id, QueueStatus::Cancelled);
                Ok(())
            }
        }
    }

    // ---- sessions -------------------------------------------------------

    pub async fn get_session(&self, id: i64) -> Result<Option<Session>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_session(pool, id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_session(id)),
        }
    }

    pub async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_session_by_token(pool, token).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_session_by_token(token)),
        }
    }

    /// Paired sessions stuck in WAITING past their `expiry_time` — at least
    /// one side never connected. Feeds the session manager's cancellation
    /// sweep.
    pub async fn list_expired_waiting_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_expired_waiting_sessions(pool, now).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_expired_waiting_sessions(now)),
        }
    }

    /// Optimistic status transition: succeeds only if the session is still
    /// in `expected_status` at the time of the update. Returns the new row
    /// on success, `None` if it had already moved on.
    pub async fn transition_session(
        &self,
        id: i64,
        expected_status: SessionStatus,
        mutate: impl FnOnce(&mut Session) + Send,
    ) -> Result<Option<Session>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::transition_session(pool, id, expected_status, mutate).await
            }
            DurableStore::Memory(m) => Ok(m.lock().await.transition_session(id, expected_status, mutate)),
        }
    }

    /// Payout resolution: executes every ledger move in `moves` (debit
    /// account, credit account, amount, reference type, description), sets
    /// the session to `final_status` (COMPLETED for a win/draw, FORFEIT for
    /// a forfeit, CANCELLED for a one-sided expiry), and records `winner_id`
    /// / `win_type`, all in one transaction.
    pub async fn resolve_payout(
        &self,
        session_id: i64,
        moves: &[(i64, i64, i64, ReferenceType, String)],
        final_status: SessionStatus,
        winner_id: Option<i64>,
        win_type: Option<WinType>,
    ) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::resolve_payout(pool, session_id, moves, final_status, winner_id, win_type).await
            }
            DurableStore::Memory(m) => {
                m.lock()
                    .await
                    .resolve_payout(session_id, moves, final_status, winner_id, win_type)
            }
        }
    }

    /// Creates a bare PENDING transaction not tied to a queue entry (used
    /// for withdraw payouts, where the withdraw row already exists and only
    /// the provider-facing transaction needs to be created).
    pub async fn insert_transaction_pending(&self, new: NewTransaction) -> Result<Transaction> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::insert_transaction_pending(pool, new).await,
            DurableStore::Memory(m) => Ok(m.lock().await.insert_transaction_pending(new)),
        }
    }

    // ---- moves ------------------------------------------------------

    pub async fn append_move(
        &self,
        session_id: i64,
        player_id: i64,
        move_type: &str,
        payload: serde_json::Value,
    ) -> Result<Move> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::append_move(pool, session_id, player_id, move_type, payload).await
            }
            DurableStore::Memory(m) => {
                m.lock().await.append_move(session_id, player_id, move_type, payload)
            }
        }
    }

    pub async fn list_moves(&self, session_id: i64) -> Result<Vec<Move>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_moves(pool, session_id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_moves(session_id)),
        }
    }

    // ---- payments -----------------------------------------------------

    pub async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_transaction(pool, id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_transaction(id)),
        }
    }

    pub async fn get_transaction_by_provider_id(&self, provider_txn_id: &str) -> Result<Option<Transaction>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::get_transaction_by_provider_id(pool, provider_txn_id).await
            }
            DurableStore::Memory(m) => Ok(m.lock().await.get_transaction_by_provider_id(provider_txn_id)),
        }
    }

    pub async fn set_transaction_provider_ref(
        &self,
        id: i64,
        provider_txn_id: &str,
        provider_status_code: &str,
    ) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::set_transaction_provider_ref(pool, id, provider_txn_id, provider_status_code)
                    .await
            }
            DurableStore::Memory(m) => {
                m.lock()
                    .await
                    .set_transaction_provider_ref(id, provider_txn_id, provider_status_code);
                Ok(())
            }
        }
    }

    /// Idempotent terminal transition for a payin/payout transaction. Returns
    /// `true` if this call actually changed status (i.e. is not a replay).
    pub async fn complete_transaction(&self, id: i64, status: TransactionStatus) -> Result<bool> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::complete_transaction(pool, id, status).await,
            DurableStore::Memory(m) => Ok(m.lock().await.complete_transaction(id, status)),
        }
    }

    pub async fn list_stale_pending_transactions(
        &self,
        grace_secs: i64,
        max_age_secs: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::list_stale_pending_transactions(pool, grace_secs, max_age_secs, limit).await
            }
            DurableStore::Memory(m) => Ok(m.lock().await.list_stale_pending_transactions(
                grace_secs,
                max_age_secs,
                limit as usize,
            )),
        }
    }

    pub async fn insert_withdraw(&self, new: NewWithdraw) -> Result<WithdrawRequest> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::insert_withdraw(pool, new).await,
            DurableStore::Memory(m) => Ok(m.lock().await.insert_withdraw(new)),
        }
    }

    pub async fn get_withdraw(&self, id: i64) -> Result<Option<WithdrawRequest>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::get_withdraw(pool, id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.get_withdraw(id)),
        }
    }

    pub async fn list_withdraws_for_player(&self, player_id: i64) -> Result<Vec<WithdrawRequest>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_withdraws_for_player(pool, player_id).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_withdraws_for_player(player_id)),
        }
    }

    pub async fn list_withdraws_by_status(&self, status: WithdrawStatus) -> Result<Vec<WithdrawRequest>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_withdraws_by_status(pool, status).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_withdraws_by_status(status)),
        }
    }

    pub async fn update_withdraw_status(&self, id: i64, status: WithdrawStatus) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::update_withdraw_status(pool, id, status).await,
            DurableStore::Memory(m) => {
                m.lock().await.update_withdraw_status(id, status);
                Ok(())
            }
        }
    }

    pub async fn insert_webhook_audit(
        &self,
        provider: &str,
        provider_txn_id: &str,
        raw_payload: serde_json::Value,
        signature_valid: bool,
    ) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => {
                super::postgres::insert_webhook_audit(pool, provider, provider_txn_id, raw_payload, signature_valid)
                    .await
            }
            DurableStore::Memory(m) => {
                m.lock()
                    .await
                    .insert_webhook_audit(provider, provider_txn_id, raw_payload, signature_valid);
                Ok(())
            }
        }
    }

    // ---- audit / config -------------------------------------------------

    pub async fn insert_audit_entry(&self, entry: AuditEntry) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::insert_audit_entry(pool, entry).await,
            DurableStore::Memory(m) => {
                m.lock().await.insert_audit_entry(entry);
                Ok(())
            }
        }
    }

    pub async fn list_runtime_config(&self) -> Result<Vec<RuntimeConfigRow>> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::list_runtime_config(pool).await,
            DurableStore::Memory(m) => Ok(m.lock().await.list_runtime_config()),
        }
    }

    pub async fn upsert_runtime_config(&self, row: RuntimeConfigRow) -> Result<()> {
        match self {
            DurableStore::Postgres(pool) => super::postgres::upsert_runtime_config(pool, row).await,
            DurableStore::Memory(m) => {
                m.lock().await.upsert_runtime_config(row);
                Ok(())
            }
        }
    }
}
