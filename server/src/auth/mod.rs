//! C5: authentication core. Phone + OTP is the primary credential; a PIN is
//! an optional second factor players can layer on for withdrawals. Sessions
//! are opaque bearer tokens in the ephemeral store, never JWTs — revocation
//! has to be a single key delete, not a blocklist.

pub mod action_token;
mod hashing;
pub mod otp;
pub mod pin;
pub mod session;

use wager_core::model::Player;
use wager_core::phone::normalize_e164;
use wager_core::token::opaque_token;
use wager_core::Result;

use crate::store::durable::NewPlayer;
use crate::store::{DurableStore, EphemeralStore};

#[derive(Clone)]
pub struct AuthService {
    store: DurableStore,
    ephemeral: EphemeralStore,
    default_country_code: String,
}

pub struct LoginOutcome {
    pub player: Player,
    pub session_token: String,
    pub is_new_player: bool,
}

impl AuthService {
    pub fn new(store: DurableStore, ephemeral: EphemeralStore, default_country_code: impl Into<String>) -> Self {
        Self {
            store,
            ephemeral,
            default_country_code: default_country_code.into(),
        }
    }

    pub async fn request_otp(&self, raw_phone: &str, action: Option<&str>) -> Result<String> {
        let phone = normalize_e164(raw_phone, &self.default_country_code)?;
        otp::request_otp(&self.ephemeral, &phone, action).await
    }

    /// Verifies the OTP and logs the player in, registering a new player
    /// record on first contact with this phone number.
    pub async fn verify_otp_and_login(&self, raw_phone: &str, code: &str) -> Result<LoginOutcome> {
        let phone = normalize_e164(raw_phone, &self.default_country_code)?;
        otp::verify_otp(&self.ephemeral, &phone, code).await?;

        let (player, is_new_player) = match self.store.get_player_by_phone(&phone).await? {
            Some(player) => (player, false),
            None => {
                let player = self
                    .store
                    .insert_player(NewPlayer {
                        phone: phone.clone(),
                        display_name: format!("Player {}", &phone[phone.len().saturating_sub(4)..]),
                        player_token: opaque_token(),
                    })
                    .await?;
                (player, true)
            }
        };

        let session_token = session::create_session(&self.ephemeral, player.id, &phone).await?;
        Ok(LoginOutcome {
            player,
            session_token,
            is_new_player,
        })
    }

    pub async fn issue_action_token_after_otp(
        &self,
        raw_phone: &str,
        code: &str,
        action: &str,
    ) -> Result<String> {
        let phone = normalize_e164(raw_phone, &self.default_country_code)?;
        otp::verify_otp(&self.ephemeral, &phone, code).await?;
        action_token::issue(&self.ephemeral, &phone, action).await
    }

    pub async fn current_player(&self, session_token: &str) -> Result<Option<Player>> {
        let Some(record) = session::resolve_session(&self.ephemeral, session_token).await? else {
            return Ok(None);
        };
        self.store.get_player(record.player_id).await
    }

    pub async fn logout(&self, session_token: &str) -> Result<()> {
        session::destroy_session(&self.ephemeral, session_token).await
    }

    pub async fn set_pin(&self, player: Player, pin: &str) -> Result<()> {
        pin::set_pin(&self.store, player, pin).await
    }

    pub async fn verify_pin(&self, player: Player, pin: &str) -> Result<()> {
        pin::verify_pin(&self.store, player, pin).await
    }
}
