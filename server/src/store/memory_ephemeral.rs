//! In-memory double for `EphemeralStore`. TTLs are honored lazily: reads
//! check the stored expiry and treat an expired entry as absent rather than
//! running a background reaper, since nothing in this process needs active
//! eviction for memory pressure reasons.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use wager_core::model::{ActionToken, OtpRecord, SessionRecord};

use super::ephemeral::IdleSet;

struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryEphemeralInner {
    otp: HashMap<String, Expiring<OtpRecord>>,
    counters: HashMap<String, Expiring<i64>>,
    locks: HashMap<i64, DateTime<Utc>>,
    sessions: HashMap<String, Expiring<SessionRecord>>,
    action_tokens: HashMap<String, Expiring<ActionToken>>,
    /// `(deadline, game_id, player_id) -> ()`, ordered by deadline for cheap
    /// "pop everything due" scans.
    idle_warning: BTreeMap<(DateTime<Utc>, i64, i64), ()>,
    idle_forfeit: BTreeMap<(DateTime<Utc>, i64, i64), ()>,
    disconnect_grace: BTreeMap<(DateTime<Utc>, i64, i64), ()>,
    live_state: HashMap<i64, serde_json::Value>,
}

impl MemoryEphemeralInner {
    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn idle_set_mut(&mut self, set: IdleSet) -> &mut BTreeMap<(DateTime<Utc>, i64, i64), ()> {
        match set {
            IdleSet::Warning => &mut self.idle_warning,
            IdleSet::Forfeit => &mut self.idle_forfeit,
            IdleSet::DisconnectGrace => &mut self.disconnect_grace,
        }
    }

    // ---- OTP ------------------------------------------------------------

    pub fn put_otp(&mut self, phone: &str, record: OtpRecord, ttl_secs: u64) {
        self.otp.insert(
            phone.to_string(),
            Expiring {
                value: record,
                expires_at: Self::now() + Duration::seconds(ttl_secs as i64),
            },
        );
    }

    pub fn get_otp(&self, phone: &str) -> Option<OtpRecord> {
        self.otp.get(phone).filter(|e| e.expires_at > Self::now()).map(|e| e.value.clone())
    }

    pub fn delete_otp(&mut self, phone: &str) {
        self.otp.remove(phone);
    }

    // ---- counters / lockout -----------------------------------------------

    pub fn incr_counter(&mut self, key: &str, window_secs: u64) -> i64 {
        let now = Self::now();
        let entry = self.counters.get(key);
        let fresh = entry.map(|e| e.expires_at > now).unwrap_or(false);
        if fresh {
            let e = self.counters.get_mut(key).unwrap();
            e.value += 1;
            e.value
        } else {
            self.counters.insert(
                key.to_string(),
                Expiring {
                    value: 1,
                    expires_at: now + Duration::seconds(window_secs as i64),
                },
            );
            1
        }
    }

    pub fn get_counter(&self, key: &str) -> i64 {
        self.counters
            .get(key)
            .filter(|e| e.expires_at > Self::now())
            .map(|e| e.value)
            .unwrap_or(0)
    }

    pub fn reset_counter(&mut self, key: &str) {
        self.counters.remove(key);
    }

    pub fn set_lock_until(&mut self, player_id: i64, until: DateTime<Utc>) {
        self.locks.insert(player_id, until);
    }

    pub fn get_lock_until(&self, player_id: i64) -> Option<DateTime<Utc>> {
        self.locks.get(&player_id).copied().filter(|t| *t > Self::now())
    }

    // ---- sessions / action tokens ------------------------------------------

    pub fn put_session(&mut self, token: &str, record: SessionRecord, ttl_secs: u64) {
        self.sessions.insert(
            token.to_string(),
            Expiring {
                value: record,
                expires_at: Self::now() + Duration::seconds(ttl_secs as i64),
            },
        );
    }

    pub fn get_session(&self, token: &str) -> Option<SessionRecord> {
        self.sessions
            .get(token)
            .filter(|e| e.expires_at > Self::now())
            .map(|e| e.value.clone())
    }

    pub fn delete_session(&mut self, token: &str) {
        self.sessions.remove(token);
    }

    pub fn put_action_token(&mut self, token: &str, action: ActionToken, ttl_secs: u64) {
        self.action_tokens.insert(
            token.to_string(),
            Expiring {
                value: action,
                expires_at: Self::now() + Duration::seconds(ttl_secs as i64),
            },
        );
    }

    pub fn take_action_token(&mut self, token: &str) -> Option<ActionToken> {
        let now = Self::now();
        let entry = self.action_tokens.remove(token)?;
        if entry.expires_at > now {
            Some(entry.value)
        } else {
            None
        }
    }

    // ---- idle deadlines -----------------------------------------------------

    pub fn schedule_idle_deadline(&mut self, set: IdleSet, game_id: i64, player_id: i64, deadline: DateTime<Utc>) {
        self.idle_set_mut(set).insert((deadline, game_id, player_id), ());
    }

    pub fn cancel_idle_deadline(&mut self, set: IdleSet, game_id: i64, player_id: i64) {
        let keys: Vec<_> = self
            .idle_set_mut(set)
            .range(..)
            .map(|(k, _)| *k)
            .filter(|(_, g, p)| *g == game_id && *p == player_id)
            .collect();
        let map = self.idle_set_mut(set);
        for k in keys {
            map.remove(&k);
        }
    }

    pub fn pop_due_idle_deadlines(&mut self, set: IdleSet, now: DateTime<Utc>) -> Vec<(i64, i64)> {
        let map = self.idle_set_mut(set);
        let due: Vec<(DateTime<Utc>, i64, i64)> = map.range(..=(now, i64::MAX, i64::MAX)).map(|(k, _)| *k).collect();
        for k in &due {
            map.remove(k);
        }
        due.into_iter().map(|(_, g, p)| (g, p)).collect()
    }

    // ---- live game state ------------------------------------------------

    pub fn put_live_state(&mut self, game_id: i64, state: serde_json::Value) {
        self.live_state.insert(game_id, state);
    }

    pub fn get_live_state(&self, game_id: i64) -> Option<serde_json::Value> {
        self.live_state.get(&game_id).cloned()
    }

    pub fn delete_live_state(&mut self, game_id: i64) {
        self.live_state.remove(&game_id);
    }
}
