use chrono::{Duration, Utc};
use wager_core::model::ActionToken;
use wager_core::token::opaque_token;
use wager_core::{Error, Result};

use crate::store::EphemeralStore;

const ACTION_TOKEN_TTL_SECS: u64 = 600;

/// Issues a single-use token binding `phone` to `action` (e.g. "reset_pin",
/// "confirm_withdraw"). Meant to be handed out right after a successful OTP
/// verification and redeemed by exactly one follow-up request.
pub async fn issue(ephemeral: &EphemeralStore, phone: &str, action: &str) -> Result<String> {
    let token = opaque_token();
    let record = ActionToken {
        token: token.clone(),
        phone: phone.to_string(),
        action: action.to_string(),
        expires_at: Utc::now() + Duration::seconds(ACTION_TOKEN_TTL_SECS as i64),
    };
    ephemeral.put_action_token(&token, record, ACTION_TOKEN_TTL_SECS).await?;
    Ok(token)
}

/// Consumes `token`, failing unless it is unexpired and was issued for
/// `expected_action`.
pub async fn redeem(ephemeral: &EphemeralStore, token: &str, expected_action: &str) -> Result<String> {
    let Some(record) = ephemeral.take_action_token(token).await? else {
        return Err(Error::Forbidden("action token invalid or already used".into()));
    };
    if record.expires_at <= Utc::now() {
        return Err(Error::Forbidden("action token expired".into()));
    }
    if record.action != expected_action {
        return Err(Error::Forbidden("action token issued for a different action".into()));
    }
    Ok(record.phone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_redeems_exactly_once() {
        let ephemeral = EphemeralStore::in_memory();
        let token = issue(&ephemeral, "+15555550300", "reset_pin").await.unwrap();
        let phone = redeem(&ephemeral, &token, "reset_pin").await.unwrap();
        assert_eq!(phone, "+15555550300");
        assert!(redeem(&ephemeral, &token, "reset_pin").await.is_err());
    }

    #[tokio::test]
    async fn token_rejects_mismatched_action() {
        let ephemeral = EphemeralStore::in_memory();
        let token = issue(&ephemeral, "+15555550301", "reset_pin").await.unwrap();
        assert!(redeem(&ephemeral, &token, "confirm_withdraw").await.is_err());
    }
}
