//! C2: the account ledger. A thin, named-account façade over
//! [`DurableStore::transfer`] so callers never hold a bare account id —
//! they ask for "the escrow account" or "this player's winnings account"
//! and the ledger resolves (and lazily creates) the row underneath.

use wager_core::model::{Account, AccountType, ReferenceType};
use wager_core::Result;

use crate::store::DurableStore;

#[derive(Clone)]
pub struct Ledger {
    store: DurableStore,
}

impl Ledger {
    pub fn new(store: DurableStore) -> Self {
        Self { store }
    }

    pub async fn player_winnings_account(&self, player_id: i64) -> Result<Account> {
        self.store
            .get_or_create_account(AccountType::PlayerWinnings, Some(player_id))
            .await
    }

    pub async fn platform_account(&self) -> Result<Account> {
        self.store.get_or_create_account(AccountType::Platform, None).await
    }

    pub async fn escrow_account(&self) -> Result<Account> {
        self.store.get_or_create_account(AccountType::Escrow, None).await
    }

    pub async fn tax_account(&self) -> Result<Account> {
        self.store.get_or_create_account(AccountType::Tax, None).await
    }

    pub async fn settlement_account(&self) -> Result<Account> {
        self.store.get_or_create_account(AccountType::Settlement, None).await
    }

    /// The payment provider's clearing account: money lands here before a
    /// player's stake is confirmed, and withdrawals debit it on their way
    /// out. Modeled as the platform account's counterpart for provider
    /// movements so provider-facing transfers stay out of player balances.
    pub async fn provider_clearing_account(&self) -> Result<Account> {
        self.store.get_or_create_account(AccountType::Settlement, None).await
    }

    pub async fn transfer(
        &self,
        debit_account_id: i64,
        credit_account_id: i64,
        amount: i64,
        reference_type: ReferenceType,
        reference_id: i64,
        description: &str,
    ) -> Result<()> {
        self.store
            .transfer(debit_account_id, credit_account_id, amount, reference_type, reference_id, description)
            .await?;
        Ok(())
    }

    pub async fn balance_of(&self, account_id: i64) -> Result<i64> {
        Ok(self.store.get_account(account_id).await?.map(|a| a.balance).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wager_core::Error;

    #[tokio::test]
    async fn transfer_moves_balance_between_player_accounts() {
        let store = DurableStore::in_memory();
        let ledger = Ledger::new(store);

        let alice = ledger.player_winnings_account(1).await.unwrap();
        let bob = ledger.player_winnings_account(2).await.unwrap();
        let platform = ledger.platform_account().await.unwrap();

        // Seed Alice's balance via a system-originated credit.
        ledger
            .transfer(platform.id, alice.id, 5_000, ReferenceType::Payout, 1, "seed")
            .await
            .unwrap();
        assert_eq!(ledger.balance_of(alice.id).await.unwrap(), 5_000);

        ledger
            .transfer(alice.id, bob.id, 2_000, ReferenceType::Session, 42, "settle")
            .await
            .unwrap();
        assert_eq!(ledger.balance_of(alice.id).await.unwrap(), 3_000);
        assert_eq!(ledger.balance_of(bob.id).await.unwrap(), 2_000);
    }

    #[tokio::test]
    async fn transfer_is_idempotent_on_reference() {
        let store = DurableStore::in_memory();
        let ledger = Ledger::new(store);
        let alice = ledger.player_winnings_account(1).await.unwrap();
        let platform = ledger.platform_account().await.unwrap();

        ledger
            .transfer(platform.id, alice.id, 1_000, ReferenceType::Payout, 7, "payout")
            .await
            .unwrap();
        ledger
            .transfer(platform.id, alice.id, 1_000, ReferenceType::Payout, 7, "payout retry")
            .await
            .unwrap();

        assert_eq!(ledger.balance_of(alice.id).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn transfer_rejects_insufficient_funds_from_a_player_account() {
        let store = DurableStore::in_memory();
        let ledger = Ledger::new(store);
        let alice = ledger.player_winnings_account(1).await.unwrap();
        let bob = ledger.player_winnings_account(2).await.unwrap();

        let err = ledger
            .transfer(alice.id, bob.id, 500, ReferenceType::Session, 1, "overdraw")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }
}
