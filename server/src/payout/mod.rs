//! C11: the payout resolver. Computes the commission/tax/payout split and
//! executes the resulting ledger moves and player stat updates as a single
//! durable-store transaction. Invoked exactly once per terminal session
//! transition by the session manager.

use wager_core::model::{apply_tax, ReferenceType, Session, SessionStatus, WinType};
use wager_core::Result;

use crate::config::SharedConfig;
use crate::ledger::Ledger;
use crate::store::durable::DurableStore;

#[derive(Clone)]
pub struct PayoutResolver {
    store: DurableStore,
    ledger: Ledger,
    config: SharedConfig,
}

impl PayoutResolver {
    pub fn new(store: DurableStore, ledger: Ledger, config: SharedConfig) -> Self {
        Self { store, ledger, config }
    }

    /// WIN/FORFEIT path. `win_type` distinguishes a clean rule-engine win
    /// (`Normal`, status COMPLETED) from every other terminal reason
    /// (status FORFEIT).
    pub async fn resolve_win(&self, session: &Session, winner_id: i64, win_type: WinType) -> Result<()> {
        let cfg = *self.config.read().await;
        let stake = session.stake_amount;
        let gross_pot = stake * 2;
        let commission = cfg.commission_flat.min(gross_pot);
        let taxable = gross_pot - commission;
        let tax = apply_tax(taxable, cfg.payout_tax_percent);
        let net_winner = taxable - tax;

        let escrow = self.ledger.escrow_account().await?;
        let platform = self.ledger.platform_account().await?;
        let tax_account = self.ledger.tax_account().await?;
        let winner_account = self.ledger.player_winnings_account(winner_id).await?;

        let mut moves = vec![(
            escrow.id,
            platform.id,
            commission,
            ReferenceType::Commission,
            format!("session {} commission", session.id),
        )];
        if tax > 0 {
            moves.push((
                escrow.id,
                tax_account.id,
                tax,
                ReferenceType::Tax,
                format!("session {} tax", session.id),
            ));
        }
        moves.push((
            escrow.id,
            winner_account.id,
            net_winner,
            ReferenceType::Payout,
            format!("session {} payout", session.id),
        ));

        let final_status = if win_type == WinType::Normal { SessionStatus::Completed } else { SessionStatus::Forfeit };
        self.store.resolve_payout(session.id, &moves, final_status, Some(winner_id), Some(win_type)).await?;

        self.bump_stats(winner_id, true, net_winner).await?;
        if let Some(loser_id) = session.opponent_of(winner_id) {
            self.bump_stats(loser_id, false, 0).await?;
        }
        Ok(())
    }

    /// DRAW path: both players get their stake back, less a per-player share
    /// of the flat commission when `draw_commission_enabled`. No tax.
    pub async fn resolve_draw(&self, session: &Session) -> Result<()> {
        let cfg = *self.config.read().await;
        let share = if cfg.draw_commission_enabled { cfg.commission_flat / 2 } else { 0 };
        let stake = session.stake_amount;

        let escrow = self.ledger.escrow_account().await?;
        let platform = self.ledger.platform_account().await?;

        let mut moves = Vec::new();
        for player_id in [Some(session.player1_id), session.player2_id].into_iter().flatten() {
            let account = self.ledger.player_winnings_account(player_id).await?;
            if share > 0 {
                moves.push((
                    escrow.id,
                    platform.id,
                    share,
                    ReferenceType::Commission,
                    format!("session {} draw commission ({player_id})", session.id),
                ));
            }
            moves.push((
                escrow.id,
                account.id,
                stake - share,
                ReferenceType::Refund,
                format!("session {} draw refund ({player_id})", session.id),
            ));
        }

        self.store.resolve_payout(session.id, &moves, SessionStatus::Completed, None, None).await?;
        for player_id in [Some(session.player1_id), session.player2_id].into_iter().flatten() {
            self.bump_stats(player_id, false, 0).await?;
        }
        Ok(())
    }

    /// CANCEL path: a paired session that expired WAITING because at least
    /// one side never connected. Both stakes are returned in full; the game
    /// never started, so neither player's stats move.
    pub async fn resolve_cancel(&self, session: &Session) -> Result<()> {
        let escrow = self.ledger.escrow_account().await?;
        let mut moves = Vec::new();
        for player_id in [Some(session.player1_id), session.player2_id].into_iter().flatten() {
            let account = self.ledger.player_winnings_account(player_id).await?;
            moves.push((
                escrow.id,
                account.id,
                session.stake_amount,
                ReferenceType::Refund,
                format!("session {} cancel refund ({player_id})", session.id),
            ));
        }
        self.store.resolve_payout(session.id, &moves, SessionStatus::Cancelled, None, None).await
    }

    async fn bump_stats(&self, player_id: i64, won: bool, winnings: i64) -> Result<()> {
        if let Some(mut player) = self.store.get_player(player_id).await? {
            player.stats.games_played += 1;
            if won {
                player.stats.games_won += 1;
                player.stats.total_winnings += winnings;
            }
            self.store.update_player(player).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wager_core::model::{RuntimeConfigValues, SessionStatus};

    fn session(stake: i64) -> Session {
        Session {
            id: 1,
            game_token: "tok".into(),
            game_type: "card_duel".into(),
            player1_id: 1,
            player2_id: Some(2),
            stake_amount: stake,
            status: SessionStatus::InProgress,
            winner_id: None,
            win_type: None,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
            expiry_time: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolve_win_matches_the_worked_example() {
        let store = DurableStore::in_memory();
        let ledger = Ledger::new(store.clone());
        let cfg = RuntimeConfigValues { commission_flat: 1000, payout_tax_percent: 15, ..Default::default() };
        let config: SharedConfig = std::sync::Arc::new(tokio::sync::RwLock::new(cfg));
        let resolver = PayoutResolver::new(store.clone(), ledger.clone(), config);

        let escrow = ledger.escrow_account().await.unwrap();
        let platform = ledger.platform_account().await.unwrap();
        ledger.transfer(platform.id, escrow.id, 20_000, ReferenceType::Stake, 1, "seed").await.unwrap();

        let sess = session(10_000);
        resolver.resolve_win(&sess, 1, WinType::Normal).await.unwrap();

        let winner_account = ledger.player_winnings_account(1).await.unwrap();
        assert_eq!(ledger.balance_of(winner_account.id).await.unwrap(), 16_150);
    }
}
