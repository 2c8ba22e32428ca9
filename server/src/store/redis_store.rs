//! Redis-backed implementation of the ephemeral store. OTP/session/action
//! tokens ride on native key TTLs; the idle deadline queues are Redis sorted
//! sets scored by unix-millis deadline, which makes "everything due" a
//! single `ZRANGEBYSCORE` + `ZREM` pair.

use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use wager_core::model::{ActionToken, OtpRecord, SessionRecord};
use wager_core::{Error, Result};

use super::ephemeral::IdleSet;

fn redis_err(e: redis::RedisError) -> Error {
    Error::Store(e.to_string())
}

fn json_err(e: serde_json::Error) -> Error {
    Error::Store(format!("corrupt json in ephemeral store: {e}"))
}

fn otp_key(phone: &str) -> String {
    format!("otp:{phone}")
}

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

fn action_token_key(token: &str) -> String {
    format!("action_token:{token}")
}

fn lock_key(player_id: i64) -> String {
    format!("lock_until:{player_id}")
}

fn live_state_key(game_id: i64) -> String {
    format!("live_state:{game_id}")
}

fn idle_set_key(set: IdleSet) -> &'static str {
    match set {
        IdleSet::Warning => "idle_warning",
        IdleSet::Forfeit => "idle_forfeit",
        IdleSet::DisconnectGrace => "disconnect_grace",
    }
}

fn idle_member(game_id: i64, player_id: i64) -> String {
    format!("{game_id}:{player_id}")
}

pub async fn put_otp(mut conn: ConnectionManager, phone: &str, record: OtpRecord, ttl_secs: u64) -> Result<()> {
    let payload = serde_json::to_string(&record).map_err(json_err)?;
    conn.set_ex::<_, _, ()>(otp_key(phone), payload, ttl_secs)
        .await
        .map_err(redis_err)
}

pub async fn get_otp(mut conn: ConnectionManager, phone: &str) -> Result<Option<OtpRecord>> {
    let raw: Option<String> = conn.get(otp_key(phone)).await.map_err(redis_err)?;
    raw.map(|s| serde_json::from_str(&s).map_err(json_err)).transpose()
}

pub async fn delete_otp(mut conn: ConnectionManager, phone: &str) -> Result<()> {
    conn.del::<_, ()>(otp_key(phone)).await.map_err(redis_err)
}

pub async fn incr_counter(mut conn: ConnectionManager, key: &str, window_secs: u64) -> Result<i64> {
    let count: i64 = conn.incr(key, 1).await.map_err(redis_err)?;
    if count == 1 {
        conn.expire::<_, ()>(key, window_secs as i64).await.map_err(redis_err)?;
    }
    Ok(count)
}

pub async fn get_counter(mut conn: ConnectionManager, key: &str) -> Result<i64> {
    let count: Option<i64> = conn.get(key).await.map_err(redis_err)?;
    Ok(count.unwrap_or(0))
}

pub async fn reset_counter(mut conn: ConnectionManager, key: &str) -> Result<()> {
    conn.del::<_, ()>(key).await.map_err(redis_err)
}

pub async fn set_lock_until(mut conn: ConnectionManager, player_id: i64, until: DateTime<Utc>) -> Result<()> {
    let ttl = (until - Utc::now()).num_seconds().max(1) as i64;
    conn.set_ex::<_, _, ()>(lock_key(player_id), until.timestamp_millis(), ttl as u64)
        .await
        .map_err(redis_err)
}

pub async fn get_lock_until(mut conn: ConnectionManager, player_id: i64) -> Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = conn.get(lock_key(player_id)).await.map_err(redis_err)?;
    Ok(millis.and_then(|m| Utc.timestamp_millis_opt(m).single()))
}

pub async fn put_session(
    mut conn: ConnectionManager,
    token: &str,
    record: SessionRecord,
    ttl_secs: u64,
) -> Result<()> {
    let payload = serde_json::to_string(&record).map_err(json_err)?;
    conn.set_ex::<_, _, ()>(session_key(token), payload, ttl_secs)
        .await
        .map_err(redis_err)
}

pub async fn get_session(mut conn: ConnectionManager, token: &str) -> Result<Option<SessionRecord>> {
    let raw: Option<String> = conn.get(session_key(token)).await.map_err(redis_err)?;
    raw.map(|s| serde_json::from_str(&s).map_err(json_err)).transpose()
}

pub async fn delete_session(mut conn: ConnectionManager, token: &str) -> Result<()> {
    conn.del::<_, ()>(session_key(token)).await.map_err(redis_err)
}

pub async fn put_action_token(
    mut conn: ConnectionManager,
    token: &str,
    action: ActionToken,
    ttl_secs: u64,
) -> Result<()> {
    let payload = serde_json::to_string(&action).map_err(json_err)?;
    conn.set_ex::<_, _, ()>(action_token_key(token), payload, ttl_secs)
        .await
        .map_err(redis_err)
}

pub async fn take_action_token(mut conn: ConnectionManager, token: &str) -> Result<Option<ActionToken>> {
    let key = action_token_key(token);
    let raw: Option<String> = redis::pipe()
        .atomic()
        .get(&key)
        .del(&key)
        .ignore()
        .query_async(&mut conn)
        .await
        .map_err(redis_err)?;
    raw.map(|s| serde_json::from_str(&s).map_err(json_err)).transpose()
}

pub async fn schedule_idle_deadline(
    mut conn: ConnectionManager,
    set: IdleSet,
    game_id: i64,
    player_id: i64,
    deadline: DateTime<Utc>,
) -> Result<()> {
    conn.zadd::<_, _, _, ()>(idle_set_key(set), idle_member(game_id, player_id), deadline.timestamp_millis())
        .await
        .map_err(redis_err)
}

pub async fn cancel_idle_deadline(
    mut conn: ConnectionManager,
    set: IdleSet,
    game_id: i64,
    player_id: i64,
) -> Result<()> {
    conn.zrem::<_, _, ()>(idle_set_key(set), idle_member(game_id, player_id))
        .await
        .map_err(redis_err)
}

pub async fn pop_due_idle_deadlines(
    mut conn: ConnectionManager,
    set: IdleSet,
    now: DateTime<Utc>,
) -> Result<Vec<(i64, i64)>> {
    let key = idle_set_key(set);
    let due: Vec<String> = conn
        .zrangebyscore(key, 0, now.timestamp_millis())
        .await
        .map_err(redis_err)?;
    if due.is_empty() {
        return Ok(vec![]);
    }
    let _: () = conn.zrem(key, due.clone()).await.map_err(redis_err)?;
    Ok(due
        .into_iter()
        .filter_map(|m| {
            let (g, p) = m.split_once(':')?;
            Some((g.parse().ok()?, p.parse().ok()?))
        })
        .collect())
}

pub async fn put_live_state(mut conn: ConnectionManager, game_id: i64, state: serde_json::Value) -> Result<()> {
    let payload = serde_json::to_string(&state).map_err(json_err)?;
    conn.set::<_, _, ()>(live_state_key(game_id), payload).await.map_err(redis_err)
}

pub async fn get_live_state(mut conn: ConnectionManager, game_id: i64) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn.get(live_state_key(game_id)).await.map_err(redis_err)?;
    raw.map(|s| serde_json::from_str(&s).map_err(json_err)).transpose()
}

pub async fn delete_live_state(mut conn: ConnectionManager, game_id: i64) -> Result<()> {
    conn.del::<_, ()>(live_state_key(game_id)).await.map_err(redis_err)
}
