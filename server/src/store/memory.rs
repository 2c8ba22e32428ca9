//! In-memory double for `DurableStore`, used by unit and scenario tests.
//! Single `Mutex`-guarded struct, so every "transaction" here is trivially
//! atomic by holding the lock for the whole operation — the property the
//! Postgres backend gets from `BEGIN`/`COMMIT`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use wager_core::model::*;
use wager_core::{Error, Result};

use super::durable::{NewPlayer, NewQueueEntry, NewSession, NewTransaction, NewWithdraw};

#[derive(Default)]
pub struct MemoryInner {
    next_id: i64,
    pub players: HashMap<i64, Player>,
    pub accounts: HashMap<i64, Account>,
    pub account_transactions: Vec<AccountTransaction>,
    pub queue: HashMap<i64, QueueEntry>,
    pub sessions: HashMap<i64, Session>,
    pub moves: HashMap<i64, Vec<Move>>,
    pub transactions: HashMap<i64, Transaction>,
    pub withdraws: HashMap<i64, WithdrawRequest>,
    pub webhook_audits: Vec<WebhookAudit>,
    pub audit_entries: Vec<AuditEntry>,
    pub runtime_config: HashMap<String, RuntimeConfigRow>,
}

impl MemoryInner {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // ---- players ----------------------------------------------------

    pub fn get_player(&self, id: i64) -> Option<Player> {
        self.players.get(&id).cloned()
    }

    pub fn get_player_by_phone(&self, phone: &str) -> Option<Player> {
        self.players.values().find(|p| p.phone == phone).cloned()
    }

    pub fn get_player_by_token(&self, token: &str) -> Option<Player> {
        self.players.values().find(|p| p.player_token == token).cloned()
    }

    pub fn insert_player(&mut self, new: NewPlayer) -> Player {
        let id = self.alloc_id();
        let player = Player {
            id,
            phone: new.phone,
            display_name: new.display_name,
            pin_hash: None,
            pin_failed_attempts: 0,
            pin_locked_until: None,
            blocked: false,
            block_reason: None,
            block_until: None,
            disconnect_count: 0,
            no_show_count: 0,
            player_token: new.player_token,
            admin_role: None,
            stats: PlayerStats::default(),
            created_at: Self::now(),
        };
        self.players.insert(id, player.clone());
        player
    }

    pub fn update_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    // ---- accounts / ledger --------------------------------------------

    pub fn get_account(&self, id: i64) -> Option<Account> {
        self.accounts.get(&id).cloned()
    }

    pub fn get_or_create_account(&mut self, account_type: AccountType, owner_player_id: Option<i64>) -> Account {
        if let Some(existing) = self
            .accounts
            .values()
            .find(|a| a.account_type == account_type && a.owner_player_id == owner_player_id)
        {
            return existing.clone();
        }
        let id = self.alloc_id();
        let account = Account {
            id,
            account_type,
            owner_player_id,
            balance: 0,
        };
        self.accounts.insert(id, account.clone());
        account
    }

    pub fn transfer(
        &mut self,
        debit_account_id: i64,
        credit_account_id: i64,
        amount: i64,
        reference_type: ReferenceType,
        reference_id: i64,
        description: &str,
    ) -> Result<AccountTransaction> {
        if let Some(existing) = self.account_transactions.iter().find(|t| {
            t.reference_type == reference_type
                && t.reference_id == reference_id
                && t.debit_account_id == debit_account_id
                && t.credit_account_id == credit_account_id
        }) {
            return Ok(existing.clone());
        }

        let debit_balance = self
            .accounts
            .get(&debit_account_id)
            .ok_or(Error::UnknownAccount(debit_account_id))?
            .balance;
        if !self.accounts.contains_key(&credit_account_id) {
            return Err(Error::UnknownAccount(credit_account_id));
        }
        let debit_is_system = self.accounts[&debit_account_id].account_type.is_system();
        if !debit_is_system && debit_balance < amount {
            return Err(Error::InsufficientFunds {
                account_id: debit_account_id,
            });
        }

        self.accounts.get_mut(&debit_account_id).unwrap().balance -= amount;
        self.accounts.get_mut(&credit_account_id).unwrap().balance += amount;

        let entry = AccountTransaction {
            id: self.alloc_id(),
            debit_account_id,
            credit_account_id,
            amount,
            reference_type,
            reference_id,
            description: description.to_string(),
            created_at: Self::now(),
        };
        self.account_transactions.push(entry.clone());
        Ok(entry)
    }

    pub fn list_account_transactions_for_reference(&self, reference_id: i64) -> Vec<AccountTransaction> {
        self.account_transactions.iter().filter(|t| t.reference_id == reference_id).cloned().collect()
    }

    pub fn sum_revenue_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> (i64, i64) {
        let mut commission = 0;
        let mut tax = 0;
        for t in &self.account_transactions {
            if t.created_at < from || t.created_at >= to {
                continue;
            }
            match t.reference_type {
                ReferenceType::Commission => commission += t.amount,
                ReferenceType::Tax => tax += t.amount,
                _ => {}
            }
        }
        (commission, tax)
    }

    // ---- matchmaking queue --------------------------------------------

    pub fn create_queue_entry(&mut self, new: NewQueueEntry) -> (QueueEntry, Transaction) {
        let txn_id = self.alloc_id();
        let now = Self::now();
        let transaction = Transaction {
            id: txn_id,
            player_id: new.stake_transaction.player_id,
            transaction_type: new.stake_transaction.transaction_type,
            status: TransactionStatus::Pending,
            amount: new.stake_transaction.amount,
            provider_txn_id: None,
            provider_status_code: None,
            created_at: now,
            completed_at: None,
        };
        self.transactions.insert(txn_id, transaction.clone());

        let queue_id = self.alloc_id();
        let entry = QueueEntry {
            id: queue_id,
            player_id: new.player_id,
            phone: new.phone,
            stake_amount: new.stake_amount,
            status: QueueStatus::Waiting,
            queue_token: new.queue_token,
            is_private: new.is_private,
            match_code: new.match_code,
            transaction_id: txn_id,
            created_at: now,
            expires_at: new.expires_at,
            matched_at: None,
            session_id: None,
            converted_to_credit_at: None,
        };
        self.queue.insert(queue_id, entry.clone());
        (entry, transaction)
    }

    pub fn get_queue_entry(&self, id: i64) -> Option<QueueEntry> {
        self.queue.get(&id).cloned()
    }

    pub fn get_queue_by_token(&self, token: &str) -> Option<QueueEntry> {
        self.queue.values().find(|q| q.queue_token == token).cloned()
    }

    pub fn get_queue_by_match_code(&self, code: &str) -> Option<QueueEntry> {
        self.queue
            .values()
            .find(|q| q.match_code.as_deref() == Some(code) && q.status == QueueStatus::Waiting)
            .cloned()
    }

    pub fn get_waiting_queue_for_player(&self, player_id: i64) -> Option<QueueEntry> {
        self.queue
            .values()
            .find(|q| q.player_id == player_id && q.status == QueueStatus::Waiting)
            .cloned()
    }

    pub fn list_waiting_public_queue(&self, stake_amount: i64) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .queue
            .values()
            .filter(|q| q.status == QueueStatus::Waiting && !q.is_private && q.stake_amount == stake_amount)
            .cloned()
            .collect();
        entries.sort_by_key(|q| q.created_at);
        entries
    }

    pub fn list_all_waiting_public_queue(&self) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .queue
            .values()
            .filter(|q| q.status == QueueStatus::Waiting && !q.is_private)
            .cloned()
            .collect();
        entries.sort_by_key(|q| q.created_at);
        entries
    }

    pub fn list_all_waiting_private_queue(&self) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .queue
            .values()
            .filter(|q| q.status == QueueStatus::Waiting && q.is_private)
            .cloned()
            .collect();
        entries.sort_by_key(|q| q.created_at);
        entries
    }

    pub fn list_expired_waiting_queue(&self, now: DateTime<Utc>) -> Vec<QueueEntry> {
        self.queue
            .values()
            .filter(|q| q.status == QueueStatus::Waiting && q.expires_at <= now)
            .cloned()
            .collect()
    }

    pub fn mark_queue_status(&mut self, queue_id: i64, status: QueueStatus) {
        if let Some(entry) = self.queue.get_mut(&queue_id) {
            entry.status = status;
        }
    }

    pub fn pair_queue_entries(
        &mut self,
        q1_id: i64,
        q2_id: i64,
        new_session: NewSession,
        escrow_account_id: i64,
        stake_source_account_id: i64,
    ) -> Result<Option<Session>> {
        let both_waiting = matches!(
            (self.queue.get(&q1_id), self.queue.get(&q2_id)),
            (Some(a), Some(b)) if a.status == QueueStatus::Waiting && b.status == QueueStatus::Waiting
        );
        if !both_waiting {
            return Ok(None);
        }
        let q1_txn = self.queue[&q1_id].transaction_id;
        let q2_txn = self.queue[&q2_id].transaction_id;
        let both_funded = self
            .transactions
            .get(&q1_txn)
            .map(|t| t.status == TransactionStatus::Completed)
            .unwrap_or(false)
            && self
                .transactions
                .get(&q2_txn)
                .map(|t| t.status == TransactionStatus::Completed)
                .unwrap_or(false);
        if !both_funded {
            return Ok(None);
        }

        let session_id = self.alloc_id();
        let now = Self::now();
        let session = Session {
            id: session_id,
            game_token: new_session.game_token,
            game_type: new_session.game_type,
            player1_id: new_session.player1_id,
            player2_id: new_session.player2_id,
            stake_amount: new_session.stake_amount,
            status: SessionStatus::Waiting,
            winner_id: None,
            win_type: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            expiry_time: new_session.expiry_time,
        };
        self.sessions.insert(session_id, session.clone());

        for q_id in [q1_id, q2_id] {
            let entry = self.queue.get_mut(&q_id).unwrap();
            entry.status = QueueStatus::Matched;
            entry.session_id = Some(session_id);
            entry.matched_at = Some(now);
        }

        self.transfer(
            stake_source_account_id,
            escrow_account_id,
            new_session.stake_amount,
            ReferenceType::Stake,
            q1_id,
            "stake into escrow",
        )?;
        self.transfer(
            stake_source_account_id,
            escrow_account_id,
            new_session.stake_amount,
            ReferenceType::Stake,
            q2_id,
            "stake into escrow",
        )?;

        Ok(Some(session))
    }

    pub fn expire_queue_entry_as_credit(
        &mut self,
        queue_id: i64,
        player_winnings_account_id: i64,
        stake_source_account_id: i64,
    ) -> Result<Option<QueueEntry>> {
        let Some(entry) = self.queue.get(&queue_id).cloned() else {
            return Ok(None);
        };
        if entry.status != QueueStatus::Waiting || entry.converted_to_credit_at.is_some() {
            return Ok(None);
        }
        self.transfer(
            stake_source_account_id,
            player_winnings_account_id,
            entry.stake_amount,
            ReferenceType::Refund,
            queue_id,
            "expired queue stake refunded to internal credit",
        )?;
        let now = Self::now();
        if let Some(entry) = self.queue.get_mut(&queue_id) {
            entry.status = QueueStatus::Expired;
            entry.converted_to_credit_at = Some(now);
        }
        Ok(self.queue.get(&queue_id).cloned())
    }

    // ---- sessions -------------------------------------------------------

    pub fn get_session(&self, id: i64) -> Option<Session> {
        self.sessions.get(&id).cloned()
    }

    pub fn list_expired_waiting_sessions(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.sessions
            .values()
            .filter(|s| s.status == SessionStatus::Waiting && s.expiry_time <= now)
            .cloned()
            .collect()
    }

    pub fn get_session_by_token(&self, token: &str) -> Option<Session> {
        self.sessions.values().find(|s| s.game_token == token).cloned()
    }

    pub fn transition_session(
        &mut self,
        id: i64,
        expected_status: SessionStatus,
        mutate: impl FnOnce(&mut Session),
    ) -> Option<Session> {
        let session = self.sessions.get_mut(&id)?;
        if session.status != expected_status {
            return None;
        }
        mutate(session);
        Some(session.clone())
    }

    pub fn resolve_payout(
        &mut self,
        session_id: i64,
        moves: &[(i64, i64, i64, ReferenceType, String)],
        final_status: SessionStatus,
        winner_id: Option<i64>,
        win_type: Option<WinType>,
    ) -> Result<()> {
        for (debit, credit, amount, ref_type, desc) in moves {
            self.transfer(*debit, *credit, *amount, *ref_type, session_id, desc)?;
        }
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.status = final_status;
            session.winner_id = winner_id;
            session.win_type = win_type;
            session.completed_at = Some(Self::now());
        }
        Ok(())
    }

    // ---- moves ------------------------------------------------------

    pub fn append_move(
        &mut self,
        session_id: i64,
        player_id: i64,
        move_type: &str,
        payload: serde_json::Value,
    ) -> Result<Move> {
        let move_number = self.moves.get(&session_id).map(|v| v.len()).unwrap_or(0) as i64 + 1;
        let m = Move {
            id: self.alloc_id(),
            session_id,
            player_id,
            move_number,
            move_type: move_type.to_string(),
            payload,
            created_at: Self::now(),
        };
        self.moves.entry(session_id).or_default().push(m.clone());
        Ok(m)
    }

    pub fn list_moves(&self, session_id: i64) -> Vec<Move> {
        self.moves.get(&session_id).cloned().unwrap_or_default()
    }

    // ---- payments -----------------------------------------------------

    pub fn get_transaction(&self, id: i64) -> Option<Transaction> {
        self.transactions.get(&id).cloned()
    }

    pub fn get_transaction_by_provider_id(&self, provider_txn_id: &str) -> Option<Transaction> {
        self.transactions
            .values()
            .find(|t| t.provider_txn_id.as_deref() == Some(provider_txn_id))
            .cloned()
    }

    pub fn set_transaction_provider_ref(&mut self, id: i64, provider_txn_id: &str, provider_status_code: &str) {
        if let Some(t) = self.transactions.get_mut(&id) {
            t.provider_txn_id = Some(provider_txn_id.to_string());
            t.provider_status_code = Some(provider_status_code.to_string());
        }
    }

    pub fn complete_transaction(&mut self, id: i64, status: TransactionStatus) -> bool {
        let Some(t) = self.transactions.get_mut(&id) else {
            return false;
        };
        if t.status == TransactionStatus::Completed || t.status == TransactionStatus::Failed {
            return false;
        }
        t.status = status;
        t.completed_at = Some(Self::now());
        true
    }

    pub fn insert_transaction_pending(&mut self, new: NewTransaction) -> Transaction {
        let id = self.alloc_id();
        let txn = Transaction {
            id,
            player_id: new.player_id,
            transaction_type: new.transaction_type,
            amount: new.amount,
            status: TransactionStatus::Pending,
            provider_txn_id: None,
            provider_status_code: None,
            created_at: Self::now(),
            completed_at: None,
        };
        self.transactions.insert(id, txn.clone());
        txn
    }

    pub fn list_stale_pending_transactions(
        &self,
        grace_secs: i64,
        max_age_secs: i64,
        limit: usize,
    ) -> Vec<Transaction> {
        let now = Self::now();
        let grace_cutoff = now - chrono::Duration::seconds(grace_secs);
        let max_age_cutoff = now - chrono::Duration::seconds(max_age_secs);
        let mut txns: Vec<Transaction> = self
            .transactions
            .values()
            .filter(|t| {
                t.status == TransactionStatus::Pending
                    && t.provider_txn_id.is_some()
                    && t.created_at < grace_cutoff
                    && t.created_at > max_age_cutoff
            })
            .cloned()
            .collect();
        txns.sort_by_key(|t| t.created_at);
        txns.truncate(limit);
        txns
    }

    pub fn insert_withdraw(&mut self, new: NewWithdraw) -> WithdrawRequest {
        let id = self.alloc_id();
        let w = WithdrawRequest {
            id,
            player_id: new.player_id,
            amount: new.amount,
            fee: new.fee,
            net_amount: new.net_amount,
            method: new.method,
            destination: new.destination,
            status: WithdrawStatus::Pending,
            provider_txn_id: None,
            created_at: Self::now(),
            processed_at: None,
        };
        self.withdraws.insert(id, w.clone());
        w
    }

    pub fn get_withdraw(&self, id: i64) -> Option<WithdrawRequest> {
        self.withdraws.get(&id).cloned()
    }

    pub fn list_withdraws_for_player(&self, player_id: i64) -> Vec<WithdrawRequest> {
        self.withdraws.values().filter(|w| w.player_id == player_id).cloned().collect()
    }

    pub fn list_withdraws_by_status(&self, status: WithdrawStatus) -> Vec<WithdrawRequest> {
        self.withdraws.values().filter(|w| w.status == status).cloned().collect()
    }

    pub fn update_withdraw_status(&mut self, id: i64, status: WithdrawStatus) {
        if let Some(w) = self.withdraws.get_mut(&id) {
            w.status = status;
            w.processed_at = Some(Self::now());
        }
    }

    pub fn insert_webhook_audit(
        &mut self,
        provider: &str,
        provider_txn_id: &str,
        raw_payload: serde_json::Value,
        signature_valid: bool,
    ) {
        let id = self.alloc_id();
        self.webhook_audits.push(WebhookAudit {
            id,
            provider: provider.to_string(),
            provider_txn_id: provider_txn_id.to_string(),
            raw_payload,
            signature_valid,
            received_at: Self::now(),
        });
    }

    pub fn insert_audit_entry(&mut self, mut entry: AuditEntry) {
        entry.id = self.alloc_id();
        self.audit_entries.push(entry);
    }

    pub fn list_runtime_config(&self) -> Vec<RuntimeConfigRow> {
        self.runtime_config.values().cloned().collect()
    }

    pub fn upsert_runtime_config(&mut self, row: RuntimeConfigRow) {
        self.runtime_config.insert(row.key.clone(), row);
    }
}
