use chrono::{Duration, Utc};
use wager_core::model::Player;
use wager_core::{Error, Result};

use super::hashing::{hash_secret, verify_secret};
use crate::store::DurableStore;

const PIN_MAX_ATTEMPTS: i32 = 5;
const PIN_LOCKOUT_MINUTES: i64 = 15;

pub async fn set_pin(store: &DurableStore, mut player: Player, pin: &str) -> Result<()> {
    if pin.len() != 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("pin must be exactly 4 digits"));
    }
    player.pin_hash = Some(hash_secret(pin)?);
    player.pin_failed_attempts = 0;
    player.pin_locked_until = None;
    store.update_player(player).await
}

/// Verifies `pin` against `player`'s stored hash, enforcing the lockout
/// window: `PIN_MAX_ATTEMPTS` consecutive failures locks the account for
/// `PIN_LOCKOUT_MINUTES`, reset by any successful verification.
pub async fn verify_pin(store: &DurableStore, mut player: Player, pin: &str) -> Result<()> {
    let now = Utc::now();
    if player.is_locked(now) {
        let minutes_remaining = (player.pin_locked_until.unwrap() - now).num_minutes().max(1);
        return Err(Error::Locked { minutes_remaining });
    }

    let Some(hash) = player.pin_hash.clone() else {
        return Err(Error::validation("pin not set for this player"));
    };

    if verify_secret(pin, &hash) {
        if player.pin_failed_attempts != 0 {
            player.pin_failed_attempts = 0;
            player.pin_locked_until = None;
            store.update_player(player).await?;
        }
        return Ok(());
    }

    player.pin_failed_attempts += 1;
    let just_locked = player.pin_failed_attempts >= PIN_MAX_ATTEMPTS;
    if just_locked {
        player.pin_locked_until = Some(now + Duration::minutes(PIN_LOCKOUT_MINUTES));
    }
    store.update_player(player).await?;

    if just_locked {
        Err(Error::Locked {
            minutes_remaining: PIN_LOCKOUT_MINUTES,
        })
    } else {
        Err(Error::validation("incorrect pin"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::durable::NewPlayer;

    async fn seeded_player(store: &DurableStore) -> Player {
        store
            .insert_player(NewPlayer {
                phone: "+15555550200".into(),
                display_name: "Test Player".into(),
                player_token: "tok-1".into(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn correct_pin_verifies() {
        let store = DurableStore::in_memory();
        let player = seeded_player(&store).await;
        set_pin(&store, player.clone(), "4321").await.unwrap();
        let player = store.get_player(player.id).await.unwrap().unwrap();
        verify_pin(&store, player, "4321").await.unwrap();
    }

    #[tokio::test]
    async fn five_failed_attempts_locks_the_account() {
        let store = DurableStore::in_memory();
        let player = seeded_player(&store).await;
        set_pin(&store, player.clone(), "4321").await.unwrap();

        for _ in 0..4 {
            let player = store.get_player(player.id).await.unwrap().unwrap();
            assert!(verify_pin(&store, player, "0000").await.is_err());
        }
        let player = store.get_player(player.id).await.unwrap().unwrap();
        let err = verify_pin(&store, player.clone(), "0000").await.unwrap_err();
        assert!(matches!(err, Error::Locked { .. }));

        let player = store.get_player(player.id).await.unwrap().unwrap();
        let err = verify_pin(&store, player, "4321").await.unwrap_err();
        assert!(matches!(err, Error::Locked { .. }));
    }
}
