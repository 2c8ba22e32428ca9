//! C4: the ephemeral store. Same enum-over-backend shape as `durable`, but
//! scoped to what actually belongs in fast, TTL'd storage: OTP state, rate
//! limit counters, session cookies, action tokens, and the two deadline-
//! ordered sets the idle watcher polls.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use wager_core::model::{ActionToken, OtpRecord, SessionRecord};
use wager_core::Result;

use super::memory_ephemeral::MemoryEphemeralInner;

/// Which deadline set a game+player pair lives in. The idle watcher polls
/// `Warning` first; when it fires, the entry moves to `Forfeit`. The session
/// manager owns `DisconnectGrace` independently of the other two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleSet {
    Warning,
    Forfeit,
    DisconnectGrace,
}

#[derive(Clone)]
pub enum EphemeralStore {
    Redis(ConnectionManager),
    Memory(std::sync::Arc<tokio::sync::Mutex<MemoryEphemeralInner>>),
}

impl EphemeralStore {
    pub fn redis(conn: ConnectionManager) -> Self {
        EphemeralStore::Redis(conn)
    }

    pub fn in_memory() -> Self {
        EphemeralStore::Memory(std::sync::Arc::new(tokio::sync::Mutex::new(
            MemoryEphemeralInner::default(),
        )))
    }

    // ---- OTP ------------------------------------------------------------

    pub async fn put_otp(&self, phone: &str, record: OtpRecord, ttl_secs: u64) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::put_otp(conn.clone(), phone, record, ttl_secs).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.put_otp(phone, record, ttl_secs);
                Ok(())
            }
        }
    }

    pub async fn get_otp(&self, phone: &str) -> Result<Option<OtpRecord>> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::get_otp(conn.clone(), phone).await,
            EphemeralStore::Memory(m) => Ok(m.lock().await.get_otp(phone)),
        }
    }

    pub async fn delete_otp(&self, phone: &str) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::delete_otp(conn.clone(), phone).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.delete_otp(phone);
                Ok(())
            }
        }
    }

    // ---- rate limiting / lockout -----------------------------------------

    /// Increments the named counter and returns the post-increment value,
    /// setting `window_secs` TTL only on the first increment in the window.
    pub async fn incr_counter(&self, key: &str, window_secs: u64) -> Result<i64> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::incr_counter(conn.clone(), key, window_secs).await,
            EphemeralStore::Memory(m) => Ok(m.lock().await.incr_counter(key, window_secs)),
        }
    }

    pub async fn get_counter(&self, key: &str) -> Result<i64> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::get_counter(conn.clone(), key).await,
            EphemeralStore::Memory(m) => Ok(m.lock().await.get_counter(key)),
        }
    }

    pub async fn reset_counter(&self, key: &str) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::reset_counter(conn.clone(), key).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.reset_counter(key);
                Ok(())
            }
        }
    }

    pub async fn set_lock_until(&self, player_id: i64, until: DateTime<Utc>) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::set_lock_until(conn.clone(), player_id, until).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.set_lock_until(player_id, until);
                Ok(())
            }
        }
    }

    pub async fn get_lock_until(&self, player_id: i64) -> Result<Option<DateTime<Utc>>> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::get_lock_until(conn.clone(), player_id).await,
            EphemeralStore::Memory(m) => Ok(m.lock().await.get_lock_until(player_id)),
        }
    }

    // ---- sessions / action tokens ----------------------------------------

    pub async fn put_session(&self, token: &str, record: SessionRecord, ttl_secs: u64) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::put_session(conn.clone(), token, record, ttl_secs).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.put_session(token, record, ttl_secs);
                Ok(())
            }
        }
    }

    pub async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::get_session(conn.clone(), token).await,
            EphemeralStore::Memory(m) => Ok(m.lock().await.get_session(token)),
        }
    }

    pub async fn delete_session(&self, token: &str) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::delete_session(conn.clone(), token).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.delete_session(token);
                Ok(())
            }
        }
    }

    pub async fn put_action_token(&self, token: &str, action: ActionToken, ttl_secs: u64) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => {
                super::redis_store::put_action_token(conn.clone(), token, action, ttl_secs).await
            }
            EphemeralStore::Memory(m) => {
                m.lock().await.put_action_token(token, action, ttl_secs);
                Ok(())
            }
        }
    }

    /// One-shot consume: returns the token's payload and deletes it
    /// atomically, so a replayed request sees nothing.
    pub async fn take_action_token(&self, token: &str) -> Result<Option<ActionToken>> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::take_action_token(conn.clone(), token).await,
            EphemeralStore::Memory(m) => Ok(m.lock().await.take_action_token(token)),
        }
    }

    // ---- idle deadlines ---------------------------------------------------

    pub async fn schedule_idle_deadline(
        &self,
        set: IdleSet,
        game_id: i64,
        player_id: i64,
        deadline: DateTime<Utc>,
    ) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => {
                super::redis_store::schedule_idle_deadline(conn.clone(), set, game_id, player_id, deadline).await
            }
            EphemeralStore::Memory(m) => {
                m.lock().await.schedule_idle_deadline(set, game_id, player_id, deadline);
                Ok(())
            }
        }
    }

    pub async fn cancel_idle_deadline(&self, set: IdleSet, game_id: i64, player_id: i64) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => {
                super::redis_store::cancel_idle_deadline(conn.clone(), set, game_id, player_id).await
            }
            EphemeralStore::Memory(m) => {
                m.lock().await.cancel_idle_deadline(set, game_id, player_id);
                Ok(())
            }
        }
    }

    /// Pops every `(game_id, player_id)` whose deadline is `<= now`, removing
    /// them from the set in the same call.
    pub async fn pop_due_idle_deadlines(&self, set: IdleSet, now: DateTime<Utc>) -> Result<Vec<(i64, i64)>> {
        match self {
            EphemeralStore::Redis(conn) => {
                super::redis_store::pop_due_idle_deadlines(conn.clone(), set, now).await
            }
            EphemeralStore::Memory(m) => Ok(m.lock().await.pop_due_idle_deadlines(set, now)),
        }
    }

    // ---- live game state cache -------------------------------------------

    pub async fn put_live_state(&self, game_id: i64, state: serde_json::Value) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::put_live_state(conn.clone(), game_id, state).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.put_live_state(game_id, state);
                Ok(())
            }
        }
    }

    pub async fn get_live_state(&self, game_id: i64) -> Result<Option<serde_json::Value>> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::get_live_state(conn.clone(), game_id).await,
            EphemeralStore::Memory(m) => Ok(m.lock().await.get_live_state(game_id)),
        }
    }

    pub async fn delete_live_state(&self, game_id: i64) -> Result<()> {
        match self {
            EphemeralStore::Redis(conn) => super::redis_store::delete_live_state(conn.clone(), game_id).await,
            EphemeralStore::Memory(m) => {
                m.lock().await.delete_live_state(game_id);
                Ok(())
            }
        }
    }
}
