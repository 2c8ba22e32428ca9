//! C6: payment orchestrator. Drives the payin/payout state machine, the
//! webhook reconciliation path, and the fallback poller that covers
//! webhooks that never arrive.

pub mod poller;
pub mod provider;

use std::sync::Arc;

use serde_json::Value;
use wager_core::model::{ReferenceType, Transaction, TransactionStatus, TransactionType};
use wager_core::{Error, Result};

pub use provider::{InitiateResult, PaymentProvider, ProviderStatus, SandboxProvider};

use crate::ledger::Ledger;
use crate::store::durable::{DurableStore, NewTransaction};

#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: DurableStore,
    ledger: Ledger,
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentOrchestrator {
    pub fn new(store: DurableStore, ledger: Ledger, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { store, ledger, provider }
    }

    /// Sends an already-created PENDING stake transaction (written alongside
    /// its queue row by `DurableStore::create_queue_entry` so a crash
    /// between the two never leaves an orphan) to the provider, using the
    /// local transaction id as the idempotency key. Finalizes inline if the
    /// provider resolves synchronously.
    pub async fn send_stake_payin_request(&self, txn: &Transaction, phone: &str) -> Result<Transaction> {
        let result = self.provider.initiate_payin(&txn.id.to_string(), phone, txn.amount).await?;

        self.store
            .set_transaction_provider_ref(txn.id, &result.provider_txn_id, provider_status_code(result.status))
            .await?;

        if result.status != ProviderStatus::Pending {
            self.finalize_payin(txn.id, result.status).await?;
        }

        self.store
            .get_transaction(txn.id)
            .await?
            .ok_or_else(|| Error::Store("transaction vanished after insert".into()))
    }

    /// Initiates a withdraw payout: creates the bare transaction row, sends
    /// it to the provider, and finalizes inline on a synchronous result. On
    /// FAILED, `finalize_payout` issues the compensating refund.
    pub async fn initiate_withdraw_payout(&self, player_id: i64, amount: i64, phone: &str) -> Result<Transaction> {
        let txn = self
            .store
            .insert_transaction_pending(NewTransaction {
                player_id,
                transaction_type: TransactionType::Withdraw,
                amount,
            })
            .await?;

        let result = self.provider.initiate_payout(&txn.id.to_string(), phone, amount).await?;
        self.store
            .set_transaction_provider_ref(txn.id, &result.provider_txn_id, provider_status_code(result.status))
            .await?;

        if result.status != ProviderStatus::Pending {
            self.finalize_payout(&txn, result.status).await?;
        }

        self.store
            .get_transaction(txn.id)
            .await?
            .ok_or_else(|| Error::Store("transaction vanished after insert".into()))
    }

    /// Applies a provider webhook payload: records the raw payload in the
    /// append-only audit regardless of signature validity, then — only if
    /// valid — finalizes the matching transaction. Idempotent: a replayed
    /// webhook for an already-terminal transaction is a no-op.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        provider_txn_id: &str,
        status: ProviderStatus,
        raw_payload: Value,
    ) -> Result<()> {
        let signature_valid = self.provider.verify_webhook_signature(raw_body, signature_header);
        self.store
            .insert_webhook_audit("sandbox", provider_txn_id, raw_payload, signature_valid)
            .await?;

        if !signature_valid {
            return Err(Error::ProviderAuthError("webhook signature did not verify".into()));
        }

        let Some(txn) = self.store.get_transaction_by_provider_id(provider_txn_id).await? else {
            return Err(Error::not_found(format!("transaction for provider id {provider_txn_id}")));
        };

        if txn.status != TransactionStatus::Pending {
            return Ok(());
        }

        self.finalize_by_type(&txn, status).await
    }

    /// Fallback path: the poller calls this for every PENDING transaction
    /// past the poll-eligible window. Shares the exact same finalization
    /// code as the webhook path, so whichever arrives first wins and the
    /// other is a no-op against the `complete_transaction` idempotency guard.
    pub async fn poll_and_reconcile(&self, txn: &Transaction) -> Result<()> {
        let Some(provider_txn_id) = txn.provider_txn_id.as_deref() else {
            return Ok(());
        };
        let status = self.provider.get_status(provider_txn_id).await?;
        if status == ProviderStatus::Pending {
            return Ok(());
        }
        self.finalize_by_type(txn, status).await
    }

    async fn finalize_by_type(&self, txn: &Transaction, status: ProviderStatus) -> Result<()> {
        match txn.transaction_type {
            TransactionType::Stake => self.finalize_payin(txn.id, status).await,
            TransactionType::Withdraw => self.finalize_payout(txn, status).await,
            _ => Ok(()),
        }
    }

    /// STAKE COMPLETED only marks the transaction terminal. The matchmaker
    /// treats a COMPLETED stake transaction as "funded" and is the sole
    /// place that moves the stake from the platform's received-payin
    /// staging account into escrow, atomically with session creation —
    /// doing it here too would credit escrow twice for the same stake.
    async fn finalize_payin(&self, transaction_id: i64, status: ProviderStatus) -> Result<()> {
        let target_status = match status {
            ProviderStatus::Completed => TransactionStatus::Completed,
            ProviderStatus::Failed => TransactionStatus::Failed,
            ProviderStatus::Pending => return Ok(()),
        };
        self.store.complete_transaction(transaction_id, target_status).await?;
        Ok(())
    }

    /// Synchronous payout path: on FAILED, a compensating refund re-credits
    /// the player's winnings account from settlement in the same logical
    /// step as the terminal transition.
    async fn finalize_payout(&self, txn: &Transaction, status: ProviderStatus) -> Result<()> {
        let target_status = match status {
            ProviderStatus::Completed => TransactionStatus::Completed,
            ProviderStatus::Failed => TransactionStatus::Failed,
            ProviderStatus::Pending => return Ok(()),
        };

        let changed = self.store.complete_transaction(txn.id, target_status).await?;
        if !changed {
            return Ok(());
        }

        if target_status == TransactionStatus::Failed {
            let settlement = self.ledger.settlement_account().await?;
            let winnings = self.ledger.player_winnings_account(txn.player_id).await?;
            self.ledger
                .transfer(
                    settlement.id,
                    winnings.id,
                    txn.amount,
                    ReferenceType::Refund,
                    txn.id,
                    "withdraw payout failed, refunding player",
                )
                .await?;
        }
        Ok(())
    }
}

fn provider_status_code(status: ProviderStatus) -> &'static str {
    match status {
        ProviderStatus::Pending => "PENDING",
        ProviderStatus::Completed => "COMPLETED",
        ProviderStatus::Failed => "FAILED",
    }
}
