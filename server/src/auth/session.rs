use chrono::{Duration, Utc};
use wager_core::model::SessionRecord;
use wager_core::token::opaque_token;
use wager_core::Result;

use crate::store::EphemeralStore;

pub const SESSION_COOKIE_NAME: &str = "wagerd_session";
const SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

pub async fn create_session(ephemeral: &EphemeralStore, player_id: i64, phone: &str) -> Result<String> {
    let token = opaque_token();
    let record = SessionRecord {
        player_id,
        phone: phone.to_string(),
        expires_at: Utc::now() + Duration::seconds(SESSION_TTL_SECS as i64),
    };
    ephemeral.put_session(&token, record, SESSION_TTL_SECS).await?;
    Ok(token)
}

pub async fn resolve_session(ephemeral: &EphemeralStore, token: &str) -> Result<Option<SessionRecord>> {
    let Some(record) = ephemeral.get_session(token).await? else {
        return Ok(None);
    };
    if record.expires_at <= Utc::now() {
        ephemeral.delete_session(token).await?;
        return Ok(None);
    }
    Ok(Some(record))
}

pub async fn destroy_session(ephemeral: &EphemeralStore, token: &str) -> Result<()> {
    ephemeral.delete_session(token).await
}
